//! The bindless indirection buffer a `Tag`'s shaders dereference through instead of
//! binding resources directly: descriptor set 0 binding 0 (`gpu_types::binding::
//! MEMORY_TABLE_BINDING`) is always this buffer, and every `UniformInfo` binding
//! elsewhere in the pipeline carries a slot index into it rather than a direct
//! `VkBuffer`/`VkImageView` handle.

use ash::vk;
use bytemuck::{Pod, Zeroable};

use gpu_hal::Device;

use crate::bitpool::ConcurrentBitPool;
use crate::error::{CacheError, Result};

/// Slots per memory table, and concurrently live tables (one per in-flight `Tag` whose
/// shaders reserve bindless slots). Literal constants from `Cache.hpp`.
pub const SLOT_COUNT: usize = 0x10000;
pub const TABLE_COUNT: usize = 64;

/// One entry: a guest `[address, address+size)` window the shader dereferences by slot
/// index, plus the host-side `VkDeviceAddress` it currently resolves to. The low 4 bits
/// of `size_and_flags` hold [`SlotFlags`]; the host is responsible for keeping the size
/// within 40 bits.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct MemoryTableSlot {
    pub address: u64,
    pub size_and_flags: u64,
    pub device_address: u64,
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SlotFlags: u64 {
        const STORAGE = 1 << 0;
        const READ_ONLY = 1 << 1;
    }
}

impl MemoryTableSlot {
    pub fn new(address: u64, size: u64, flags: SlotFlags, device_address: u64) -> Self {
        debug_assert!(size < (1u64 << 40), "slot size must fit gpu-types's 40-bit VM window");
        MemoryTableSlot { address, size_and_flags: (size << 4) | flags.bits(), device_address }
    }
}

/// One table's worth of bindless slots, backed by a single host-visible, mapped
/// `VkBuffer`. Slot allocation inside the table is a [`ConcurrentBitPool`] so concurrent
/// `getBuffer`/`getImage` calls on the same tag don't serialize behind a mutex.
pub struct MemoryTable {
    buffer: vk::Buffer,
    allocation: Option<gpu_alloc::MemoryBlock<vk::DeviceMemory>>,
    mapped: std::ptr::NonNull<MemoryTableSlot>,
    slots: ConcurrentBitPool,
}

unsafe impl Send for MemoryTable {}
unsafe impl Sync for MemoryTable {}

impl MemoryTable {
    fn create(device: &Device) -> Result<Self> {
        let size_bytes = (SLOT_COUNT * std::mem::size_of::<MemoryTableSlot>()) as u64;
        let info = vk::BufferCreateInfo::builder()
            .size(size_bytes)
            .usage(vk::BufferUsageFlags::STORAGE_BUFFER)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe { device.raw().create_buffer(&info, None).map_err(gpu_hal::Error::from)? };
        let requirements = unsafe { device.raw().get_buffer_memory_requirements(buffer) };

        let request = gpu_alloc::Request {
            size: requirements.size,
            align_mask: requirements.alignment - 1,
            usage: gpu_alloc::UsageFlags::HOST_ACCESS | gpu_alloc::UsageFlags::UPLOAD,
            memory_types: requirements.memory_type_bits,
        };
        let mut allocation =
            unsafe { device.host_visible.allocate(device.raw(), request) }?;
        unsafe {
            device
                .raw()
                .bind_buffer_memory(buffer, *allocation.memory(), allocation.offset())
                .map_err(gpu_hal::Error::from)?;
        }
        let mapped = unsafe { allocation.map(&AshMemoryDeviceRef(device.raw()), 0, size_bytes as usize) }
            .map_err(|_| gpu_hal::Error::OutOfMemory)?
            .cast::<MemoryTableSlot>();

        Ok(MemoryTable { buffer, allocation: Some(allocation), mapped, slots: ConcurrentBitPool::new(SLOT_COUNT) })
    }

    pub fn buffer(&self) -> vk::Buffer {
        self.buffer
    }

    pub fn acquire_slot(&self, slot: MemoryTableSlot) -> Result<u32> {
        let index = self
            .slots
            .acquire()
            .ok_or(CacheError::PoolExhausted { kind: "memory table slot", count: SLOT_COUNT })?;
        unsafe { *self.mapped.as_ptr().add(index) = slot };
        Ok(index as u32)
    }

    pub fn release_slot(&self, index: u32) {
        self.slots.release(index as usize);
    }

    pub(crate) fn destroy(mut self, device: &Device) {
        if let Some(allocation) = self.allocation.take() {
            unsafe {
                allocation.unmap(&AshMemoryDeviceRef(device.raw()));
                device.host_visible.deallocate(device.raw(), allocation);
            }
        }
        unsafe { device.raw().destroy_buffer(self.buffer, None) };
    }
}

/// Thin `gpu_alloc::MemoryDevice` adapter borrowed for the lifetime of one call, mirroring
/// `gpu-hal::memory::AshMemoryDevice` (not exported; `gpu-cache` needs its own narrow copy
/// to map/unmap through the `gpu_alloc::MemoryBlock` API directly).
pub(crate) struct AshMemoryDeviceRef<'a>(&'a ash::Device);

/// Builds the adapter `cache.rs` borrows whenever it maps/unmaps a host-visible
/// allocation outside this module.
pub(crate) fn ash_memory_device(device: &ash::Device) -> AshMemoryDeviceRef<'_> {
    AshMemoryDeviceRef(device)
}

unsafe impl<'a> gpu_alloc::MemoryDevice<vk::DeviceMemory> for AshMemoryDeviceRef<'a> {
    unsafe fn allocate_memory(
        &self,
        _size: u64,
        _memory_type: u32,
        _flags: gpu_alloc::AllocationFlags,
    ) -> std::result::Result<vk::DeviceMemory, gpu_alloc::OutOfMemory> {
        unreachable!("MemoryTable never allocates through this adapter directly")
    }

    unsafe fn deallocate_memory(&self, memory: vk::DeviceMemory) {
        self.0.free_memory(memory, None);
    }

    unsafe fn map_memory(
        &self,
        memory: &mut vk::DeviceMemory,
        offset: u64,
        size: u64,
    ) -> std::result::Result<std::ptr::NonNull<u8>, gpu_alloc::DeviceMapError> {
        let ptr = self
            .0
            .map_memory(*memory, offset, size, vk::MemoryMapFlags::empty())
            .map_err(|_| gpu_alloc::DeviceMapError::OutOfDeviceMemory)?;
        std::ptr::NonNull::new(ptr as *mut u8).ok_or(gpu_alloc::DeviceMapError::OutOfDeviceMemory)
    }

    unsafe fn unmap_memory(&self, memory: &mut vk::DeviceMemory) {
        self.0.unmap_memory(*memory);
    }

    unsafe fn invalidate_memory_ranges(
        &self,
        _ranges: &[gpu_alloc::MappedMemoryRange<'_, vk::DeviceMemory>],
    ) -> std::result::Result<(), gpu_alloc::OutOfMemory> {
        Ok(())
    }

    unsafe fn flush_memory_ranges(
        &self,
        _ranges: &[gpu_alloc::MappedMemoryRange<'_, vk::DeviceMemory>],
    ) -> std::result::Result<(), gpu_alloc::OutOfMemory> {
        Ok(())
    }
}

/// The fixed pool of [`TABLE_COUNT`] memory tables, one checked out per live `Tag`.
pub struct MemoryTablePool {
    tables: Vec<MemoryTable>,
    available: ConcurrentBitPool,
}

impl MemoryTablePool {
    pub fn new(device: &Device) -> Result<Self> {
        let mut tables = Vec::with_capacity(TABLE_COUNT);
        for _ in 0..TABLE_COUNT {
            tables.push(MemoryTable::create(device)?);
        }
        Ok(MemoryTablePool { tables, available: ConcurrentBitPool::new(TABLE_COUNT) })
    }

    pub fn checkout(&self) -> Result<usize> {
        self.available.acquire().ok_or(CacheError::PoolExhausted { kind: "memory table", count: TABLE_COUNT })
    }

    pub fn table(&self, index: usize) -> &MemoryTable {
        &self.tables[index]
    }

    pub fn checkin(&self, index: usize) {
        self.available.release(index);
    }

    /// Destroys every table's `VkBuffer`/allocation. Callers must ensure no `Tag` still
    /// holds a checked-out table (drain tags before dropping the owning `Cache`), the
    /// same ordering `gpu-hal::Scheduler::drop` relies on for its command pool.
    pub fn destroy(self, device: &Device) {
        for table in self.tables {
            table.destroy(device);
        }
    }
}
