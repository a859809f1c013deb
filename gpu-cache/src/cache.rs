//! The resource cache itself: per-kind interval maps over guest address ranges, a
//! shared sampler/shader map, and the `Tag`-scoped acquisition surface PM4 opcode
//! handlers (`gpu-pm4`, C7) drive.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ash::vk;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use gpu_hal::Device;
use gpu_types::{AddressRange, ImageKey, SamplerKey, ShaderKey, TagId};

use crate::error::{CacheError, Result};
use crate::memory_table::{MemoryTablePool, MemoryTableSlot, SlotFlags};
use crate::registry::{Handle, Slab};
use crate::sync_table::SyncTable;
use crate::tag::{ComputeTag, GraphicsTag, Tag, TouchLog};

pub const DESCRIPTOR_SET_COUNT: usize = 128;
pub const TAG_STORAGE_COUNT: usize = 128;

/// `acquireTag` from the data model: the last [`TagId`] (read or write) that acquired
/// this entry. Stored as the raw `u64` so every acquisition can bump it with a plain
/// atomic store instead of taking the map's write lock.
struct BufferEntry {
    buffer: vk::Buffer,
    allocation: Option<gpu_alloc::MemoryBlock<vk::DeviceMemory>>,
    mapped: std::ptr::NonNull<u8>,
    range: AddressRange,
    acquire_tag: AtomicU64,
}

unsafe impl Send for BufferEntry {}
unsafe impl Sync for BufferEntry {}

struct ImageEntry {
    image: vk::Image,
    view: vk::ImageView,
    allocation: Option<gpu_alloc::MemoryBlock<vk::DeviceMemory>>,
    key: ImageKey,
    range: AddressRange,
    acquire_tag: AtomicU64,
}

unsafe impl Send for ImageEntry {}
unsafe impl Sync for ImageEntry {}

#[derive(Debug, Clone, Copy)]
pub struct CachedBuffer {
    pub buffer: vk::Buffer,
    pub memory_table_slot: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct CachedImage {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub memory_table_slot: u32,
}

/// Per-kind entry storage. `gpu_types::IntervalMap` finds the entry (if any) exactly
/// covering a queried range; the registry [`Slab`] is what [`Tag::end`] and eviction
/// actually index to destroy Vulkan objects, keeping a stable handle even if the
/// interval map's internal tree shape changes under insert/remove.
#[derive(Default)]
struct BufferMap {
    by_range: gpu_types::IntervalMap<Handle<BufferEntry>>,
    slab: Slab<BufferEntry>,
}

#[derive(Default)]
struct ImageMap {
    by_range: gpu_types::IntervalMap<Handle<ImageEntry>>,
    slab: Slab<ImageEntry>,
}

pub struct Cache {
    device: Arc<Device>,
    buffers: RwLock<BufferMap>,
    images: RwLock<ImageMap>,
    samplers: Mutex<FxHashMap<SamplerKey, vk::Sampler>>,
    shaders: Mutex<FxHashMap<ShaderKey, Arc<gcn_shader::convert::Shader>>>,
    sync: RwLock<SyncTable>,
    memory_tables: MemoryTablePool,
    next_write_tag: AtomicU64,
}

/// `gcn_shader::convert::GuestMemory` view over this cache's host-visible mirror of
/// guest memory, used while resolving descriptor chains during shader translation and
/// by any other caller (e.g. `gpu-pm4`'s indirect-buffer resolution) that needs to
/// read already-mapped guest bytes by absolute address.
pub struct CacheGuestMemory<'a>(&'a Cache);

impl<'a> gcn_shader::convert::GuestMemory for CacheGuestMemory<'a> {
    fn read_u32(&self, address: u64) -> Option<u32> {
        let mut bytes = [0u8; 4];
        self.0.read_memory(AddressRange::from_begin_size(address, 4), &mut bytes).ok()?;
        Some(u32::from_le_bytes(bytes))
    }
}

impl Cache {
    pub fn new(device: Arc<Device>) -> Result<Self> {
        let memory_tables = MemoryTablePool::new(&device)?;
        Ok(Cache {
            device,
            buffers: RwLock::new(BufferMap::default()),
            images: RwLock::new(ImageMap::default()),
            samplers: Mutex::new(FxHashMap::default()),
            shaders: Mutex::new(FxHashMap::default()),
            sync: RwLock::new(SyncTable::new()),
            memory_tables,
            next_write_tag: AtomicU64::new(TagId::INITIAL.next_write().raw()),
        })
    }

    fn allocate_tag_id(&self) -> TagId {
        TagId::from_raw(self.next_write_tag.fetch_add(2, Ordering::AcqRel))
    }

    fn begin_tag(&self) -> Result<(TagId, usize)> {
        let id = self.allocate_tag_id();
        let memory_table = self.memory_tables.checkout()?;
        Ok((id, memory_table))
    }

    pub fn begin_graphics_tag(&self) -> Result<GraphicsTag<'_>> {
        let (id, memory_table) = self.begin_tag()?;
        Ok(GraphicsTag {
            inner: Tag { cache: self, id, memory_table, touched: TouchLog::default() },
            color_targets: Default::default(),
            depth_target: None,
        })
    }

    pub fn begin_compute_tag(&self) -> Result<ComputeTag<'_>> {
        let (id, memory_table) = self.begin_tag()?;
        Ok(ComputeTag { inner: Tag { cache: self, id, memory_table, touched: TouchLog::default() } })
    }

    pub(crate) fn end_tag(&self, id: TagId, memory_table: usize, touched: TouchLog) {
        let mut sync = self.sync.write();
        for range in touched.writes {
            sync.record_write(range, id);
        }
        for range in touched.reads {
            sync.record_read(range, id.paired_read());
        }
        self.memory_tables.checkin(memory_table);
    }

    fn create_mapped_buffer(&self, range: AddressRange) -> Result<BufferEntry> {
        let size = range.size().max(1);
        let info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::TRANSFER_DST)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe { self.device.raw().create_buffer(&info, None).map_err(gpu_hal::Error::from)? };
        let requirements = unsafe { self.device.raw().get_buffer_memory_requirements(buffer) };
        let request = gpu_alloc::Request {
            size: requirements.size,
            align_mask: requirements.alignment - 1,
            usage: gpu_alloc::UsageFlags::HOST_ACCESS,
            memory_types: requirements.memory_type_bits,
        };
        let mut allocation =
            unsafe { self.device.host_visible.allocate(self.device.raw(), request) }?;
        unsafe {
            self.device
                .raw()
                .bind_buffer_memory(buffer, *allocation.memory(), allocation.offset())
                .map_err(gpu_hal::Error::from)?;
        }
        let mapped = unsafe {
            allocation.map(&crate::memory_table::ash_memory_device(self.device.raw()), 0, size as usize)
        }
        .map_err(|_| gpu_hal::Error::OutOfMemory)?;

        Ok(BufferEntry { buffer, allocation: Some(allocation), mapped, range, acquire_tag: AtomicU64::new(TagId::INITIAL.raw()) })
    }

    /// Makes a prior writer's bytes visible through `entry`'s host-visible mapping
    /// before a GPU read: on non-coherent memory types, a CPU write is only guaranteed
    /// visible to a later reader once the covering range has been invalidated.
    fn invalidate_buffer_range(&self, entry: &BufferEntry) -> Result<()> {
        let Some(allocation) = entry.allocation.as_ref() else { return Ok(()) };
        let range = vk::MappedMemoryRange::builder()
            .memory(*allocation.memory())
            .offset(allocation.offset())
            .size(entry.range.size().max(1))
            .build();
        unsafe {
            self.device.raw().invalidate_mapped_memory_ranges(&[range]).map_err(gpu_hal::Error::from)?;
        }
        Ok(())
    }

    pub(crate) fn acquire_buffer(
        &self,
        tag: TagId,
        memory_table: usize,
        range: AddressRange,
        write: bool,
    ) -> Result<CachedBuffer> {
        let existing = self.buffers.read().by_range.get_exact(range).copied();
        let handle = match existing {
            Some(h) => h,
            None => {
                let entry = self.create_mapped_buffer(range)?;
                let mut buffers = self.buffers.write();
                let handle = buffers.slab.insert(entry);
                buffers.by_range.insert(range, handle);
                handle
            }
        };
        let buffer = {
            let buffers = self.buffers.read();
            let entry = buffers.slab.get(handle).expect("just-inserted or looked-up handle is current");
            if write {
                entry.acquire_tag.store(tag.raw(), Ordering::Release);
            } else {
                let newest_write = self.sync.read().last_touch(range).last_write;
                if newest_write.raw() > entry.acquire_tag.load(Ordering::Acquire) {
                    self.invalidate_buffer_range(entry)?;
                    entry.acquire_tag.store(newest_write.raw(), Ordering::Release);
                }
            }
            entry.buffer
        };
        let flags = if write { SlotFlags::STORAGE } else { SlotFlags::STORAGE | SlotFlags::READ_ONLY };
        let slot = self.memory_tables.table(memory_table).acquire_slot(MemoryTableSlot::new(
            range.begin(),
            range.size(),
            flags,
            0,
        ))?;
        Ok(CachedBuffer { buffer, memory_table_slot: slot })
    }

    fn create_image(&self, key: &ImageKey) -> Result<ImageEntry> {
        let (format, _numeric) = crate::image_format::resolve(key.data_format, key.numeric_format);
        let extent = vk::Extent3D { width: key.extent.width, height: key.extent.height, depth: key.extent.depth };
        let image_type = match key.dim {
            gpu_types::ImageDimension::D1 => vk::ImageType::TYPE_1D,
            gpu_types::ImageDimension::D3 => vk::ImageType::TYPE_3D,
            _ => vk::ImageType::TYPE_2D,
        };
        let usage = match key.aspect {
            gpu_types::ImageAspect::Color => {
                vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST
            }
            gpu_types::ImageAspect::Depth | gpu_types::ImageAspect::Stencil => {
                vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED
            }
        };
        let info = vk::ImageCreateInfo::builder()
            .image_type(image_type)
            .format(format)
            .extent(extent)
            .mip_levels(key.mip_count.max(1) as u32)
            .array_layers(key.array_layer_count.max(1) as u32)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let image = unsafe { self.device.raw().create_image(&info, None).map_err(gpu_hal::Error::from)? };
        let requirements = unsafe { self.device.raw().get_image_memory_requirements(image) };
        let request = gpu_alloc::Request {
            size: requirements.size,
            align_mask: requirements.alignment - 1,
            usage: gpu_alloc::UsageFlags::FAST_DEVICE_ACCESS,
            memory_types: requirements.memory_type_bits,
        };
        let allocation = unsafe { self.device.device_local.allocate(self.device.raw(), request) }?;
        unsafe {
            self.device
                .raw()
                .bind_image_memory(image, *allocation.memory(), allocation.offset())
                .map_err(gpu_hal::Error::from)?;
        }

        let aspect_mask = match key.aspect {
            gpu_types::ImageAspect::Color => vk::ImageAspectFlags::COLOR,
            gpu_types::ImageAspect::Depth => vk::ImageAspectFlags::DEPTH,
            gpu_types::ImageAspect::Stencil => vk::ImageAspectFlags::STENCIL,
        };
        let subresource = vk::ImageSubresourceRange::builder()
            .aspect_mask(aspect_mask)
            .base_mip_level(key.base_mip as u32)
            .level_count(key.mip_count.max(1) as u32)
            .base_array_layer(key.base_array_layer as u32)
            .layer_count(key.array_layer_count.max(1) as u32)
            .build();
        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(subresource);
        let view = unsafe { self.device.raw().create_image_view(&view_info, None).map_err(gpu_hal::Error::from)? };

        let range = AddressRange::from_begin_size(
            0,
            crate::image_size(key),
        );
        Ok(ImageEntry { image, view, allocation: Some(allocation), key: key.clone(), range, acquire_tag: AtomicU64::new(TagId::INITIAL.raw()) })
    }

    pub(crate) fn acquire_image(
        &self,
        tag: TagId,
        memory_table: usize,
        key: &ImageKey,
        range: AddressRange,
        write: bool,
    ) -> Result<CachedImage> {
        let existing = self.images.read().by_range.get_exact(range).copied();
        let handle = match existing {
            Some(h) => h,
            None => {
                let entry = self.create_image(key)?;
                let mut images = self.images.write();
                let handle = images.slab.insert(entry);
                images.by_range.insert(range, handle);
                handle
            }
        };
        let (image, view) = {
            let images = self.images.read();
            let entry = images.slab.get(handle).expect("just-inserted or looked-up handle is current");
            if write {
                entry.acquire_tag.store(tag.raw(), Ordering::Release);
            } else {
                let newest_write = self.sync.read().last_touch(range).last_write;
                if newest_write.raw() > entry.acquire_tag.load(Ordering::Acquire) {
                    // Device-local images carry no host mapping to invalidate; the
                    // detile/memcpy upload that repopulates them from guest memory is
                    // the present/draw path's job (`gpu-present::record_detile_blit`
                    // and the draw-time image population it mirrors). Bump the tag so
                    // this entry stops reporting itself fresh once that upload runs.
                    entry.acquire_tag.store(newest_write.raw(), Ordering::Release);
                }
            }
            (entry.image, entry.view)
        };
        let flags = if write { SlotFlags::empty() } else { SlotFlags::READ_ONLY };
        let slot = self.memory_tables.table(memory_table).acquire_slot(MemoryTableSlot::new(
            range.begin(),
            range.size(),
            flags,
            0,
        ))?;
        Ok(CachedImage { image, view, memory_table_slot: slot })
    }

    pub(crate) fn acquire_sampler(&self, key: SamplerKey) -> Result<vk::Sampler> {
        if let Some(&sampler) = self.samplers.lock().get(&key) {
            return Ok(sampler);
        }
        let info = crate::sampler::create_info(&key);
        let sampler = unsafe { self.device.raw().create_sampler(&info, None).map_err(gpu_hal::Error::from)? };
        self.samplers.lock().insert(key, sampler);
        Ok(sampler)
    }

    pub(crate) fn acquire_shader(
        &self,
        key: &ShaderKey,
        blocks: &[gcn_shader::front::gcn::BasicBlock],
        user_sgprs: &[u32],
    ) -> Result<Arc<gcn_shader::convert::Shader>> {
        if let Some(shader) = self.shaders.lock().get(key) {
            return Ok(Arc::clone(shader));
        }
        let memory = CacheGuestMemory(self);
        let shader = gcn_shader::convert::convert(blocks, key.stage, &key.environment, user_sgprs, &memory)?;
        let shader = Arc::new(shader);
        self.shaders.lock().insert(key.clone(), Arc::clone(&shader));
        Ok(shader)
    }

    /// A [`gcn_shader::convert::GuestMemory`] view over this cache's host-visible
    /// mirror of guest memory, keyed by absolute (VM-windowed) address.
    pub fn guest_memory(&self) -> CacheGuestMemory<'_> {
        CacheGuestMemory(self)
    }

    pub fn read_memory(&self, range: AddressRange, out: &mut [u8]) -> Result<()> {
        let buffers = self.buffers.read();
        let (found_range, handle) = buffers
            .by_range
            .overlapping(range)
            .next()
            .map(|(r, h)| (r, *h))
            .ok_or(CacheError::UnmappedRange { begin: range.begin(), end: range.end() })?;
        let entry = buffers.slab.get(handle).expect("range map and slab stay in sync");
        let local_offset = (range.begin() - found_range.begin()) as usize;
        debug_assert!(local_offset + out.len() <= entry.range.size() as usize);
        unsafe {
            std::ptr::copy_nonoverlapping(entry.mapped.as_ptr().add(local_offset), out.as_mut_ptr(), out.len());
        }
        Ok(())
    }

    pub fn write_memory(&self, range: AddressRange, data: &[u8]) -> Result<()> {
        let buffers = self.buffers.read();
        let (found_range, handle) = buffers
            .by_range
            .overlapping(range)
            .next()
            .map(|(r, h)| (r, *h))
            .ok_or(CacheError::UnmappedRange { begin: range.begin(), end: range.end() })?;
        let entry = buffers.slab.get(handle).expect("range map and slab stay in sync");
        let local_offset = (range.begin() - found_range.begin()) as usize;
        debug_assert!(local_offset + data.len() <= entry.range.size() as usize);
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), entry.mapped.as_ptr().add(local_offset), data.len());
        }
        Ok(())
    }

    pub fn compare_memory(&self, range: AddressRange, expected: &[u8]) -> Result<bool> {
        let mut actual = vec![0u8; expected.len()];
        self.read_memory(range, &mut actual)?;
        Ok(actual == expected)
    }

    /// Invalidates (evicts) every image entry overlapping `range`, called by the
    /// cache-update thread once a watched page underneath an image is written.
    pub fn flush_images(&self, range: AddressRange) {
        let removed: Vec<_> = {
            let mut images = self.images.write();
            let handles: Vec<_> = images.by_range.overlapping(range).map(|(r, h)| (r, *h)).collect();
            for (r, _) in &handles {
                images.by_range.remove_overlapping(*r);
            }
            handles.into_iter().filter_map(|(_, h)| images.slab.remove(h)).collect()
        };
        for entry in removed {
            unsafe {
                self.device.raw().destroy_image_view(entry.view, None);
                self.device.raw().destroy_image(entry.image, None);
                if let Some(allocation) = entry.allocation {
                    self.device.device_local.deallocate(self.device.raw(), allocation);
                }
            }
        }
    }

    pub fn flush_image_buffers(&self, range: AddressRange) {
        self.flush_images(range);
    }

    pub fn flush_buffers(&self, range: AddressRange) {
        let removed: Vec<_> = {
            let mut buffers = self.buffers.write();
            let handles: Vec<_> = buffers.by_range.overlapping(range).map(|(r, h)| (r, *h)).collect();
            for (r, _) in &handles {
                buffers.by_range.remove_overlapping(*r);
            }
            handles.into_iter().filter_map(|(_, h)| buffers.slab.remove(h)).collect()
        };
        for entry in removed {
            unsafe {
                if let Some(mut allocation) = entry.allocation {
                    allocation.unmap(&crate::memory_table::ash_memory_device(self.device.raw()));
                    self.device.raw().destroy_buffer(entry.buffer, None);
                    self.device.host_visible.deallocate(self.device.raw(), allocation);
                }
            }
        }
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }
}

fn image_size(key: &ImageKey) -> u64 {
    (key.extent.width as u64) * (key.extent.height as u64) * (key.extent.depth as u64) * 4
}
