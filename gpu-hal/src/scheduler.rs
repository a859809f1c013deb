//! Command-buffer recorder tied to a timeline semaphore, exposing the four-operation
//! scheduler contract directly: `submit`, `wait`, `create_external_submit`, `then`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ash::vk;
use parking_lot::Mutex;

use crate::device::DeviceShared;
use crate::error::Result;

pub type TimelineValue = u64;

struct PendingCallback {
    value: TimelineValue,
    callback: Box<dyn FnOnce() + Send>,
}

/// One command pool + timeline semaphore pair. `submit` closes the currently-recording
/// command buffer, bumps the timeline value, and reopens a fresh one; `wait` blocks the
/// host on the semaphore reaching the last value it signaled.
pub struct Scheduler {
    device: Arc<DeviceShared>,
    semaphore: vk::Semaphore,
    queue: vk::Queue,
    /// Last value this scheduler has committed to signal, via `submit` or
    /// `createExternalSubmit`. Monotonically increasing.
    next_value: AtomicU64,
    last_signaled: AtomicU64,
    command_pool: vk::CommandPool,
    active_command_buffer: Mutex<vk::CommandBuffer>,
    pending_callbacks: Mutex<Vec<PendingCallback>>,
}

impl Scheduler {
    pub(crate) fn new(device: Arc<DeviceShared>, queue: vk::Queue, queue_family: u32) -> Result<Self> {
        let mut timeline_create_info =
            vk::SemaphoreTypeCreateInfo::builder().semaphore_type(vk::SemaphoreType::TIMELINE).initial_value(0);
        let semaphore_info = vk::SemaphoreCreateInfo::builder().push_next(&mut timeline_create_info);
        let semaphore = unsafe { device.raw.create_semaphore(&semaphore_info, None)? };

        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool = unsafe { device.raw.create_command_pool(&pool_info, None)? };

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let command_buffer = unsafe { device.raw.allocate_command_buffers(&alloc_info)? }[0];
        unsafe {
            device.raw.begin_command_buffer(command_buffer, &vk::CommandBufferBeginInfo::builder())?;
        }

        Ok(Scheduler {
            device,
            semaphore,
            queue,
            next_value: AtomicU64::new(1),
            last_signaled: AtomicU64::new(0),
            command_pool,
            active_command_buffer: Mutex::new(command_buffer),
            pending_callbacks: Mutex::new(Vec::new()),
        })
    }

    pub fn active_command_buffer(&self) -> vk::CommandBuffer {
        *self.active_command_buffer.lock()
    }

    /// Closes the current command buffer, signals `value` on the timeline, and
    /// reopens a fresh recording buffer. Returns the value just signaled.
    pub fn submit(&self) -> Result<TimelineValue> {
        self.submit_waiting_on(None)
    }

    /// Like [`Self::submit`], but the submission also waits on a binary semaphore
    /// before executing, used to consume a swapchain image's acquire semaphore
    /// before recording work that reads or writes that image.
    pub fn submit_waiting_on(&self, wait: Option<(vk::Semaphore, vk::PipelineStageFlags)>) -> Result<TimelineValue> {
        let value = self.next_value.fetch_add(1, Ordering::AcqRel);
        let mut active = self.active_command_buffer.lock();

        unsafe { self.device.raw.end_command_buffer(*active)? };

        let command_buffers = [*active];
        let signal_semaphores = [self.semaphore];
        let signal_values = [value];
        let wait_semaphores = wait.map(|(s, _)| [s]);
        let wait_stages = wait.map(|(_, stage)| [stage]);
        // A timeline submit info's wait_semaphore_values entry is ignored for any
        // wait semaphore that is binary (non-timeline), so this can be zero.
        let wait_values = [0u64];
        let mut timeline_info = vk::TimelineSemaphoreSubmitInfo::builder().signal_semaphore_values(&signal_values);
        if wait_semaphores.is_some() {
            timeline_info = timeline_info.wait_semaphore_values(&wait_values);
        }
        let mut submit_info = vk::SubmitInfo::builder()
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .push_next(&mut timeline_info);
        if let (Some(semaphores), Some(stages)) = (wait_semaphores.as_ref(), wait_stages.as_ref()) {
            submit_info = submit_info.wait_semaphores(semaphores).wait_dst_stage_mask(stages);
        }

        {
            profiling::scope!("vkQueueSubmit");
            unsafe {
                self.device.raw.queue_submit(self.queue, &[submit_info.build()], vk::Fence::null())?;
            }
        }

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let next_buffer = unsafe { self.device.raw.allocate_command_buffers(&alloc_info)? }[0];
        unsafe {
            self.device.raw.begin_command_buffer(next_buffer, &vk::CommandBufferBeginInfo::builder())?;
        }
        *active = next_buffer;

        self.last_signaled.store(value, Ordering::Release);
        self.run_ready_callbacks(value);
        Ok(value)
    }

    /// Blocks the host until the timeline reaches the last value this scheduler has
    /// signaled (via `submit` or an external submission reserved through
    /// `create_external_submit`).
    pub fn wait(&self) -> Result<()> {
        self.wait_for(self.last_signaled.load(Ordering::Acquire))
    }

    pub fn wait_for(&self, value: TimelineValue) -> Result<()> {
        if value == 0 {
            return Ok(());
        }
        let semaphores = [self.semaphore];
        let values = [value];
        let wait_info = vk::SemaphoreWaitInfo::builder().semaphores(&semaphores).values(&values);
        unsafe { self.device.raw.wait_semaphores(&wait_info, u64::MAX)? };
        self.run_ready_callbacks(value);
        Ok(())
    }

    /// Reserves a timeline value that the caller will signal through a submission made
    /// outside this scheduler (e.g. a swapchain present chained via relay semaphore).
    /// Subsequent scheduler work that calls `wait_for` on this value blocks correctly
    /// even though this scheduler never itself called `vkQueueSubmit` for it.
    pub fn create_external_submit(&self) -> TimelineValue {
        self.next_value.fetch_add(1, Ordering::AcqRel)
    }

    pub fn timeline_semaphore(&self) -> vk::Semaphore {
        self.semaphore
    }

    /// Schedules `f` to run once the current (most recently reserved) submission
    /// completes. Runs synchronously if that value has already signaled.
    pub fn then(&self, f: impl FnOnce() + Send + 'static) {
        let target = self.next_value.load(Ordering::Acquire).saturating_sub(1).max(1);
        let current = self.current_semaphore_value();
        if current.map(|v| v >= target).unwrap_or(false) {
            f();
            return;
        }
        self.pending_callbacks.lock().push(PendingCallback { value: target, callback: Box::new(f) });
    }

    fn current_semaphore_value(&self) -> Result<u64> {
        unsafe { Ok(self.device.raw.get_semaphore_counter_value(self.semaphore)?) }
    }

    fn run_ready_callbacks(&self, reached: TimelineValue) {
        let ready = {
            let mut pending = self.pending_callbacks.lock();
            let (ready, remaining): (Vec<_>, Vec<_>) =
                pending.drain(..).partition(|cb| cb.value <= reached);
            *pending = remaining;
            ready
        };
        for cb in ready {
            (cb.callback)();
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.raw.device_wait_idle();
            self.device.raw.destroy_command_pool(self.command_pool, None);
            self.device.raw.destroy_semaphore(self.semaphore, None);
        }
    }
}
