//! Descriptor binding layout: per stage, in order, Storage-buffer / Sampler /
//! Sampled-image / Storage-image. The memory-table buffer always sits at binding 0 of
//! descriptor set 0; every other resource is indexed into it rather than bound
//! directly, see `gpu-cache`'s `MemoryTable`.
//!
//! `Stage` has six members, so each stage's resource block gets its own
//! non-overlapping offset via `stage_offset` (see the note there) rather than the
//! two-stage scheme a GCN pipeline with only Vertex/Fragment/Compute would need.

use crate::Stage;

pub const BUFFER_SLOTS: u32 = 16;
pub const IMAGE_SLOTS: u32 = 16;
pub const SAMPLER_SLOTS: u32 = 16;

pub const BUFFER_OFFSET: u32 = 0;
pub const IMAGE_OFFSET: u32 = BUFFER_OFFSET + BUFFER_SLOTS;
pub const SAMPLER_OFFSET: u32 = IMAGE_OFFSET + IMAGE_SLOTS;

pub const STAGE_SIZE: u32 = SAMPLER_OFFSET + SAMPLER_SLOTS;

/// The memory-table indirection buffer itself always occupies binding 0 of descriptor
/// set 0, ahead of every per-stage block.
pub const MEMORY_TABLE_BINDING: u32 = 0;
pub const MEMORY_TABLE_SET: u32 = 0;

/// Resource-binding descriptor set index for everything *other* than the memory table.
pub const RESOURCE_SET: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Buffer,
    Sampler,
    StorageImage,
    Image,
}

/// Byte/slot offset of `stage`'s resource block within [`RESOURCE_SET`].
///
/// Compute and Vertex never coexist in one pipeline, so both could in principle share
/// offset 0; with all six [`Stage`] variants now first-class, each stage instead gets
/// its own non-overlapping block: `stage.index() * STAGE_SIZE`.
pub const fn stage_offset(stage: Stage) -> u32 {
    stage.index() * STAGE_SIZE
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformBinding {
    pub set: u32,
    pub binding: u32,
    pub kind: UniformKind,
}

pub fn buffer_binding(stage: Stage, index: u32) -> Option<UniformBinding> {
    (index < BUFFER_SLOTS).then(|| UniformBinding {
        set: RESOURCE_SET,
        binding: index + stage_offset(stage) + BUFFER_OFFSET,
        kind: UniformKind::Buffer,
    })
}

pub fn image_binding(stage: Stage, index: u32) -> Option<UniformBinding> {
    (index < IMAGE_SLOTS).then(|| UniformBinding {
        set: RESOURCE_SET,
        binding: index + stage_offset(stage) + IMAGE_OFFSET,
        kind: UniformKind::Image,
    })
}

pub fn sampler_binding(stage: Stage, index: u32) -> Option<UniformBinding> {
    (index < SAMPLER_SLOTS).then(|| UniformBinding {
        set: RESOURCE_SET,
        binding: index + stage_offset(stage) + SAMPLER_OFFSET,
        kind: UniformKind::Sampler,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_size_matches_original_constants() {
        assert_eq!(BUFFER_SLOTS, 16);
        assert_eq!(IMAGE_OFFSET, 16);
        assert_eq!(SAMPLER_OFFSET, 32);
        assert_eq!(STAGE_SIZE, 48);
    }

    #[test]
    fn compute_offset_is_zero() {
        assert_eq!(stage_offset(Stage::Compute), 0);
    }

    #[test]
    fn stage_blocks_are_disjoint() {
        let offsets: Vec<u32> = Stage::ALL.iter().map(|s| stage_offset(*s)).collect();
        for (i, a) in offsets.iter().enumerate() {
            for (j, b) in offsets.iter().enumerate() {
                if i != j {
                    assert!((a + STAGE_SIZE <= *b) || (b + STAGE_SIZE <= *a));
                }
            }
        }
    }

    #[test]
    fn out_of_range_index_is_none() {
        assert!(buffer_binding(Stage::Vertex, BUFFER_SLOTS).is_none());
        assert!(image_binding(Stage::Vertex, IMAGE_SLOTS).is_none());
        assert!(sampler_binding(Stage::Vertex, SAMPLER_SLOTS).is_none());
    }
}
