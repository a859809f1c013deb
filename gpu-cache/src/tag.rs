//! `Tag`/`GraphicsTag`/`ComputeTag`: the scope a PM4 submission acquires resources
//! through. CAS-based tag-id allocation lives in
//! [`Cache::begin_graphics_tag`]/[`Cache::begin_compute_tag`] in `cache.rs`.

use gpu_types::{AddressRange, TagId};

use crate::cache::Cache;
use crate::error::Result;

/// Resources a tag acquired, recorded so [`Tag::end`] can release its memory-table slots
/// and update the sync table with this tag's final read/write ranges in one pass rather
/// than on every individual `getBuffer`/`getImage` call.
#[derive(Default)]
pub(crate) struct TouchLog {
    pub reads: Vec<AddressRange>,
    pub writes: Vec<AddressRange>,
}

/// A submission-scoped acquisition context. `id` is the write [`TagId`] this tag
/// allocates resources under; every `getX` call records the ranges it touched into
/// `touched`, which [`Tag::end`] replays into the cache's [`crate::sync_table::SyncTable`].
pub struct Tag<'a> {
    pub(crate) cache: &'a Cache,
    pub(crate) id: TagId,
    pub(crate) memory_table: usize,
    pub(crate) touched: TouchLog,
}

impl<'a> Tag<'a> {
    pub fn id(&self) -> TagId {
        self.id
    }

    pub fn get_buffer(&mut self, range: AddressRange, write: bool) -> Result<crate::cache::CachedBuffer> {
        let entry = self.cache.acquire_buffer(self.id, self.memory_table, range, write)?;
        if write {
            self.touched.writes.push(range);
        } else {
            self.touched.reads.push(range);
        }
        Ok(entry)
    }

    pub fn get_image(
        &mut self,
        key: &gpu_types::ImageKey,
        range: AddressRange,
        write: bool,
    ) -> Result<crate::cache::CachedImage> {
        let entry = self.cache.acquire_image(self.id, self.memory_table, key, range, write)?;
        if write {
            self.touched.writes.push(range);
        } else {
            self.touched.reads.push(range);
        }
        Ok(entry)
    }

    pub fn get_sampler(&mut self, key: gpu_types::SamplerKey) -> Result<ash::vk::Sampler> {
        self.cache.acquire_sampler(key)
    }

    /// Resolves `key` to a translated [`gcn_shader::convert::Shader`], translating on a
    /// cache miss via `gcn_shader::convert::convert(blocks, key.stage, &key.environment,
    /// user_sgprs, self)` (`self` as [`gcn_shader::convert::GuestMemory`]).
    pub fn get_shader(
        &mut self,
        key: &gpu_types::ShaderKey,
        blocks: &[gcn_shader::front::gcn::BasicBlock],
        user_sgprs: &[u32],
    ) -> Result<std::sync::Arc<gcn_shader::convert::Shader>> {
        self.cache.acquire_shader(key, blocks, user_sgprs)
    }

    pub fn read_memory(&self, range: AddressRange, out: &mut [u8]) -> Result<()> {
        self.cache.read_memory(range, out)
    }

    pub fn write_memory(&mut self, range: AddressRange, data: &[u8]) -> Result<()> {
        self.cache.write_memory(range, data)?;
        self.touched.writes.push(range);
        Ok(())
    }

    /// Consumes the tag, releasing its memory table and folding every touched range
    /// into the cache's sync table under this tag's id.
    pub fn end(self) {
        self.cache.end_tag(self.id, self.memory_table, self.touched);
    }
}

/// A tag acquired for the graphics pipe: in addition to the shared `Tag` surface, it
/// tracks which color/depth targets are bound this submission so `gpu-present` (C8) can
/// find the presented surface's backing image without a second cache walk.
pub struct GraphicsTag<'a> {
    pub(crate) inner: Tag<'a>,
    pub(crate) color_targets: arrayvec::ArrayVec<crate::cache::CachedImage, 8>,
    pub(crate) depth_target: Option<crate::cache::CachedImage>,
}

impl<'a> GraphicsTag<'a> {
    pub fn inner(&mut self) -> &mut Tag<'a> {
        &mut self.inner
    }

    pub fn bind_color_target(&mut self, image: crate::cache::CachedImage) {
        self.color_targets.push(image);
    }

    pub fn bind_depth_target(&mut self, image: crate::cache::CachedImage) {
        self.depth_target = Some(image);
    }

    pub fn end(self) {
        self.inner.end();
    }
}

/// A tag acquired for the compute pipe. `ComputeTag` adds indirect dispatch argument
/// tracking over the shared `Tag` surface; that bookkeeping lives on the PM4 dispatch
/// path (`gpu-pm4`, C7) which owns the indirect buffer's address.
pub struct ComputeTag<'a> {
    pub(crate) inner: Tag<'a>,
}

impl<'a> ComputeTag<'a> {
    pub fn inner(&mut self) -> &mut Tag<'a> {
        &mut self.inner
    }

    pub fn end(self) {
        self.inner.end();
    }
}
