//! Logical device and queue-set creation. Extension function pointers are resolved
//! once here and cached on [`DeviceShared`], rather than re-resolved through
//! `vkGetDeviceProcAddr` at each call site.

use std::sync::Arc;

use ash::vk;

use crate::error::{Error, Result};
use crate::instance::{Instance, InstanceConfig};
use crate::memory::{MemoryKind, MemoryResource};

/// Extension function pointers resolved once at device creation.
pub(crate) struct DeviceExtensionFunctions {
    pub(crate) timeline_semaphore: Option<ash::extensions::khr::TimelineSemaphore>,
    pub(crate) swapchain: ash::extensions::khr::Swapchain,
}

pub struct DeviceShared {
    pub(crate) raw: ash::Device,
    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) instance: Arc<crate::instance::InstanceShared>,
    pub(crate) extension_fns: DeviceExtensionFunctions,
    pub(crate) present_queue_family: u32,
    pub(crate) graphics_queue_family: u32,
    pub(crate) compute_queue_family: u32,
}

impl Drop for DeviceShared {
    fn drop(&mut self) {
        unsafe { self.raw.destroy_device(None) };
    }
}

pub struct QueueSet {
    pub present: crate::queue::Queue,
    pub graphics: crate::queue::Queue,
    pub compute: crate::queue::Queue,
}

pub struct Device {
    pub(crate) shared: Arc<DeviceShared>,
    pub host_visible: MemoryResource,
    pub device_local: MemoryResource,
}

fn find_queue_family(
    properties: &[vk::QueueFamilyProperties],
    required: vk::QueueFlags,
) -> Option<u32> {
    properties
        .iter()
        .position(|p| p.queue_flags.contains(required))
        .map(|i| i as u32)
}

impl Device {
    /// Creates present/graphics/compute queue sets on the given physical device,
    /// resolves extension function pointers once, and sizes the two memory resources
    /// per the `hostVisible/2` (capped 1 GiB) / `localMemory/4` (capped 4 GiB) budget.
    pub fn create(
        instance: &Instance,
        physical_device: vk::PhysicalDevice,
        _config: &InstanceConfig,
    ) -> Result<(Self, QueueSet)> {
        let raw_instance = instance.raw();
        let queue_families =
            unsafe { raw_instance.get_physical_device_queue_family_properties(physical_device) };

        let graphics_queue_family =
            find_queue_family(&queue_families, vk::QueueFlags::GRAPHICS)
                .ok_or(Error::MissingExtension("graphics queue family"))?;
        let compute_queue_family =
            find_queue_family(&queue_families, vk::QueueFlags::COMPUTE)
                .unwrap_or(graphics_queue_family);
        // present capability is surface-dependent; until a surface is bound we
        // provisionally share the graphics family, matching the common single-GPU case.
        let present_queue_family = graphics_queue_family;

        let mut unique_families = vec![graphics_queue_family, compute_queue_family];
        unique_families.sort_unstable();
        unique_families.dedup();

        let queue_priority = [1.0f32];
        let queue_create_infos: Vec<_> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priority)
                    .build()
            })
            .collect();

        let mut timeline_semaphore_features =
            vk::PhysicalDeviceTimelineSemaphoreFeatures::builder().timeline_semaphore(true);

        let extension_names = [
            ash::extensions::khr::Swapchain::name().as_ptr(),
            ash::extensions::khr::TimelineSemaphore::name().as_ptr(),
        ];

        let device_create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .push_next(&mut timeline_semaphore_features);

        let raw = unsafe {
            raw_instance.create_device(physical_device, &device_create_info, None)?
        };

        let swapchain = ash::extensions::khr::Swapchain::new(raw_instance, &raw);
        let timeline_semaphore =
            Some(ash::extensions::khr::TimelineSemaphore::new(raw_instance, &raw));

        let shared = Arc::new(DeviceShared {
            raw,
            physical_device,
            instance: Arc::clone(&instance.shared),
            extension_fns: DeviceExtensionFunctions { timeline_semaphore, swapchain },
            present_queue_family,
            graphics_queue_family,
            compute_queue_family,
        });

        let present = crate::queue::Queue::new(Arc::clone(&shared), present_queue_family);
        let graphics = crate::queue::Queue::new(Arc::clone(&shared), graphics_queue_family);
        let compute = crate::queue::Queue::new(Arc::clone(&shared), compute_queue_family);

        let memory_properties =
            unsafe { raw_instance.get_physical_device_memory_properties(physical_device) };
        let device_properties = gpu_alloc_device_properties(&memory_properties);

        let host_heap_size = largest_heap_for(&memory_properties, vk::MemoryPropertyFlags::HOST_VISIBLE);
        let device_heap_size = largest_heap_for(&memory_properties, vk::MemoryPropertyFlags::DEVICE_LOCAL);

        let host_visible =
            MemoryResource::new(MemoryKind::HostVisible, host_heap_size, &device_properties);
        let device_local =
            MemoryResource::new(MemoryKind::DeviceLocal, device_heap_size, &device_properties);

        Ok((Device { shared, host_visible, device_local }, QueueSet { present, graphics, compute }))
    }

    pub fn raw(&self) -> &ash::Device {
        &self.shared.raw
    }

    pub(crate) fn shared(&self) -> &Arc<DeviceShared> {
        &self.shared
    }
}

fn largest_heap_for(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    required: vk::MemoryPropertyFlags,
) -> u64 {
    memory_properties.memory_types[..memory_properties.memory_type_count as usize]
        .iter()
        .filter(|t| t.property_flags.contains(required))
        .map(|t| memory_properties.memory_heaps[t.heap_index as usize].size)
        .max()
        .unwrap_or(0)
}

fn gpu_alloc_device_properties(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
) -> gpu_alloc::DeviceProperties<'static> {
    let memory_types: Vec<gpu_alloc::MemoryType> = memory_properties.memory_types
        [..memory_properties.memory_type_count as usize]
        .iter()
        .map(|t| gpu_alloc::MemoryType {
            props: gpu_alloc::MemoryPropertyFlags::from_bits_truncate(t.property_flags.as_raw()),
            heap: t.heap_index,
        })
        .collect();
    let memory_heaps: Vec<gpu_alloc::MemoryHeap> = memory_properties.memory_heaps
        [..memory_properties.memory_heap_count as usize]
        .iter()
        .map(|h| gpu_alloc::MemoryHeap { size: h.size })
        .collect();

    gpu_alloc::DeviceProperties {
        memory_types: Box::leak(memory_types.into_boxed_slice()),
        memory_heaps: Box::leak(memory_heaps.into_boxed_slice()),
        max_memory_allocation_count: 4096,
        max_memory_allocation_size: u64::MAX,
        non_coherent_atom_size: 256,
        buffer_device_address: false,
    }
}
