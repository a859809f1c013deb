//! Fingerprint-keyed GPU resource cache: per-range buffer/image entries, a shared
//! sampler/shader map, and the `Tag`-scoped acquisition surface `gpu-pm4` (C7) drives
//! its draw/dispatch handling through. Cache entries live in an epoch-tagged slab
//! rather than a plain map, so a stale handle held across an eviction is detectable.

mod bitpool;
mod cache;
mod error;
mod image_format;
mod memory_table;
mod page_table;
mod registry;
mod sampler;
mod sync_table;
mod tag;

pub use cache::{Cache, CacheGuestMemory, CachedBuffer, CachedImage, DESCRIPTOR_SET_COUNT, TAG_STORAGE_COUNT};
pub use error::{CacheError, Result};
pub use memory_table::{MemoryTableSlot, SlotFlags, SLOT_COUNT, TABLE_COUNT};
pub use page_table::{ChangeChannel, PageFlags, PageTable, PAGE_SHIFT, PAGE_SIZE};
pub use registry::{Handle, Slab};
pub use sync_table::{SyncEntry, SyncTable};
pub use tag::{ComputeTag, GraphicsTag, Tag};
