//! Host-visible and device-local memory resources that sub-allocate pages for the
//! resource cache, backed directly on `gpu-alloc`'s sub-allocator.

use ash::vk;
use parking_lot::Mutex;

use crate::error::Result;

/// Adapts `ash::Device` to `gpu_alloc`'s `MemoryDevice` trait. `gpu-alloc` expects the
/// embedder to provide this binding inline rather than pulling in a separate adapter
/// crate.
pub(crate) struct AshMemoryDevice<'a>(&'a ash::Device);

impl<'a> AshMemoryDevice<'a> {
    pub(crate) fn wrap(device: &'a ash::Device) -> Self {
        AshMemoryDevice(device)
    }
}

unsafe impl<'a> gpu_alloc::MemoryDevice<vk::DeviceMemory> for AshMemoryDevice<'a> {
    unsafe fn allocate_memory(
        &self,
        size: u64,
        memory_type: u32,
        flags: gpu_alloc::AllocationFlags,
    ) -> Result<vk::DeviceMemory, gpu_alloc::OutOfMemory> {
        let mut alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(size)
            .memory_type_index(memory_type);
        let mut flags_info = vk::MemoryAllocateFlagsInfo::builder();
        if flags.contains(gpu_alloc::AllocationFlags::DEVICE_ADDRESS) {
            flags_info = flags_info.flags(vk::MemoryAllocateFlags::DEVICE_ADDRESS);
            alloc_info = alloc_info.push_next(&mut flags_info);
        }
        self.0
            .allocate_memory(&alloc_info, None)
            .map_err(|_| gpu_alloc::OutOfMemory::OutOfDeviceMemory)
    }

    unsafe fn deallocate_memory(&self, memory: vk::DeviceMemory) {
        self.0.free_memory(memory, None);
    }

    unsafe fn map_memory(
        &self,
        memory: &mut vk::DeviceMemory,
        offset: u64,
        size: u64,
    ) -> Result<std::ptr::NonNull<u8>, gpu_alloc::DeviceMapError> {
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
        ranges: &[gpu_alloc::MappedMemoryRange<'_, vk::DeviceMemory>],
    ) -> Result<(), gpu_alloc::OutOfMemory> {
        let ranges: Vec<_> = ranges
            .iter()
            .map(|r| {
                vk::MappedMemoryRange::builder()
                    .memory(*r.memory)
                    .offset(r.offset)
                    .size(r.size)
                    .build()
            })
            .collect();
        self.0
            .invalidate_mapped_memory_ranges(&ranges)
            .map_err(|_| gpu_alloc::OutOfMemory::OutOfDeviceMemory)
    }

    unsafe fn flush_memory_ranges(
        &self,
        ranges: &[gpu_alloc::MappedMemoryRange<'_, vk::DeviceMemory>],
    ) -> Result<(), gpu_alloc::OutOfMemory> {
        let ranges: Vec<_> = ranges
            .iter()
            .map(|r| {
                vk::MappedMemoryRange::builder()
                    .memory(*r.memory)
                    .offset(r.offset)
                    .size(r.size)
                    .build()
            })
            .collect();
        self.0
            .flush_mapped_memory_ranges(&ranges)
            .map_err(|_| gpu_alloc::OutOfMemory::OutOfDeviceMemory)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryKind {
    HostVisible,
    DeviceLocal,
}

/// A sized sub-allocation pool for one [`MemoryKind`]. The size caps mirror the
/// original context's `min(hostVisible/2, 1 GiB)` / `min(localMemory/4, 4 GiB)`
/// budget so caches don't starve the rest of the process's address space.
pub struct MemoryResource {
    kind: MemoryKind,
    budget_bytes: u64,
    allocator: Mutex<gpu_alloc::GpuAllocator<vk::DeviceMemory>>,
}

pub const HOST_VISIBLE_CAP_BYTES: u64 = 1 << 30; // 1 GiB
pub const DEVICE_LOCAL_CAP_BYTES: u64 = 4 << 30; // 4 GiB

/// Computes the budget for a memory resource from the underlying heap size, applying
/// a half-of-heap fraction for host-visible memory and a quarter for device-local
/// memory, each capped at a fixed ceiling.
pub fn budget_for(kind: MemoryKind, heap_size_bytes: u64) -> u64 {
    match kind {
        MemoryKind::HostVisible => (heap_size_bytes / 2).min(HOST_VISIBLE_CAP_BYTES),
        MemoryKind::DeviceLocal => (heap_size_bytes / 4).min(DEVICE_LOCAL_CAP_BYTES),
    }
}

impl MemoryResource {
    pub(crate) fn new(
        kind: MemoryKind,
        heap_size_bytes: u64,
        device_properties: &gpu_alloc::DeviceProperties<'static>,
    ) -> Self {
        let budget_bytes = budget_for(kind, heap_size_bytes);
        let config = gpu_alloc::Config::i_am_prototyping();
        let allocator = gpu_alloc::GpuAllocator::new(config, device_properties.clone());
        MemoryResource { kind, budget_bytes, allocator: Mutex::new(allocator) }
    }

    pub fn kind(&self) -> MemoryKind {
        self.kind
    }

    pub fn budget_bytes(&self) -> u64 {
        self.budget_bytes
    }

    /// # Safety
    /// `device` must be the same `ash::Device` this resource's allocator was created
    /// against, and the returned block must be deallocated through the same allocator.
    pub unsafe fn allocate(
        &self,
        device: &ash::Device,
        request: gpu_alloc::Request,
    ) -> Result<gpu_alloc::MemoryBlock<vk::DeviceMemory>> {
        let wrapped = AshMemoryDevice::wrap(device);
        self.allocator
            .lock()
            .alloc(&wrapped, request)
            .map_err(|_| crate::error::Error::OutOfMemory)
    }

    /// # Safety
    /// `block` must have come from [`Self::allocate`] on this same resource.
    pub unsafe fn deallocate(
        &self,
        device: &ash::Device,
        block: gpu_alloc::MemoryBlock<vk::DeviceMemory>,
    ) {
        let wrapped = AshMemoryDevice::wrap(device);
        self.allocator.lock().dealloc(&wrapped, block);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_visible_budget_is_half_capped_at_one_gib() {
        assert_eq!(budget_for(MemoryKind::HostVisible, 512 << 20), 256 << 20);
        assert_eq!(budget_for(MemoryKind::HostVisible, 16 << 30), HOST_VISIBLE_CAP_BYTES);
    }

    #[test]
    fn device_local_budget_is_a_quarter_capped_at_four_gib() {
        assert_eq!(budget_for(MemoryKind::DeviceLocal, 4 << 30), 1 << 30);
        assert_eq!(budget_for(MemoryKind::DeviceLocal, 64 << 30), DEVICE_LOCAL_CAP_BYTES);
    }
}
