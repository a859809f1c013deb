//! A queue handle plus its [`Scheduler`], one pair per present/graphics/compute queue
//! set.

use std::sync::Arc;

use ash::vk;

use crate::device::DeviceShared;
use crate::error::Result;
use crate::scheduler::Scheduler;

pub struct Queue {
    raw: vk::Queue,
    family_index: u32,
    scheduler: Scheduler,
}

impl Queue {
    pub(crate) fn new(device: Arc<DeviceShared>, family_index: u32) -> Self {
        let raw = unsafe { device.raw.get_device_queue(family_index, 0) };
        let scheduler = Scheduler::new(Arc::clone(&device), raw, family_index)
            .expect("scheduler creation should not fail for a freshly created queue");
        Queue { raw, family_index, scheduler }
    }

    pub fn raw(&self) -> vk::Queue {
        self.raw
    }

    pub fn family_index(&self) -> u32 {
        self.family_index
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// # Safety
    /// `swapchain` and `image_index` must belong to a swapchain created against this
    /// queue's device, and `wait_semaphore` must be signaled (or null) by the time this
    /// call reaches the driver.
    pub unsafe fn present(
        &self,
        swapchain_fn: &ash::extensions::khr::Swapchain,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphore: Option<vk::Semaphore>,
    ) -> Result<bool> {
        let swapchains = [swapchain];
        let image_indices = [image_index];
        let wait = wait_semaphore.map(|s| [s]);
        let mut info = vk::PresentInfoKHR::builder().swapchains(&swapchains).image_indices(&image_indices);
        if let Some(wait) = wait.as_ref() {
            info = info.wait_semaphores(wait);
        }
        profiling::scope!("vkQueuePresentKHR");
        Ok(swapchain_fn.queue_present(self.raw, &info)?)
    }
}
