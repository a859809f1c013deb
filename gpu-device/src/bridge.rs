//! The shared-memory command bridge: a POSIX-named segment holding a
//! small header plus fixed-capacity PM4 rings external producers write into, a
//! per-process guest-memory import, and a per-process direct-memory (`dmem`) fd table.
//!
//! The ring layout mirrors `gpu_pm4::Ring`'s own wrap-on-push convention, so a bridge
//! poll is just "copy the newly written words, then push them."

use std::sync::atomic::{AtomicU32, Ordering};

use memmap2::MmapMut;
use shared_memory::{Shmem, ShmemConf};

use crate::error::Result;

/// Matches `gpu_pm4::ring::Ring`'s own notion of ring capacity for bridge-fed rings;
/// a producer writing more than this between two polls would overrun unread data,
/// same as any other bounded ring.
pub const RING_CAPACITY_WORDS: u32 = 4096;
const MAGIC: u32 = 0x4750_5834; // "GPX4"

#[repr(C)]
struct BridgeHeader {
    magic: AtomicU32,
    ring_count: AtomicU32,
    wptr: [AtomicU32; Self::MAX_RINGS],
}

impl BridgeHeader {
    const MAX_RINGS: usize = 16;
}

fn header_size() -> usize {
    std::mem::size_of::<BridgeHeader>()
}

fn segment_size() -> usize {
    header_size() + BridgeHeader::MAX_RINGS * RING_CAPACITY_WORDS as usize * 4
}

/// Creates a fresh segment at `os_id`, or attaches to one a prior run (or another
/// process) already created at the same size, whichever a bare `create()` can't tell
/// apart from "somebody else got there first" without pinning to a specific
/// `ShmemError` variant.
fn open_or_create(os_id: &str, size: usize) -> Result<Shmem> {
    match ShmemConf::new().os_id(os_id).size(size).create() {
        Ok(shmem) => Ok(shmem),
        Err(_) => Ok(ShmemConf::new().os_id(os_id).open()?),
    }
}

/// Tracks how much of ring `index` this consumer has already pulled in.
#[derive(Default)]
pub struct RingCursor {
    rptr: u32,
}

/// The named shared-memory segment carrying every ring's wptr and backing words.
/// Owns the mapping; producers on the guest side attach to the same `os_id` and write
/// through the same layout.
pub struct CommandBridge {
    shmem: Shmem,
    ring_count: u32,
}

impl CommandBridge {
    /// Creates (or attaches to an already-created) `<path_prefix>` segment sized for
    /// up to [`BridgeHeader::MAX_RINGS`] rings, and publishes `ring_count` for
    /// producers to read back.
    pub fn open(path_prefix: &str, ring_count: u32) -> Result<Self> {
        let size = segment_size();
        let shmem = open_or_create(path_prefix, size)?;
        let bridge = CommandBridge { shmem, ring_count };
        bridge.header().magic.store(MAGIC, Ordering::Release);
        bridge.header().ring_count.store(ring_count, Ordering::Release);
        Ok(bridge)
    }

    fn header(&self) -> &BridgeHeader {
        unsafe { &*(self.shmem.as_ptr() as *const BridgeHeader) }
    }

    fn ring_words(&self, index: usize) -> &[u32] {
        let base = unsafe { self.shmem.as_ptr().add(header_size()) as *const u32 };
        unsafe { std::slice::from_raw_parts(base.add(index * RING_CAPACITY_WORDS as usize), RING_CAPACITY_WORDS as usize) }
    }

    pub fn ring_count(&self) -> u32 {
        self.ring_count
    }

    /// Copies every word written to ring `index` since `cursor`'s last poll, in order,
    /// handling the buffer's wraparound. Returns an empty vec if nothing new arrived.
    pub fn poll(&self, index: usize, cursor: &mut RingCursor) -> Vec<u32> {
        let wptr = self.header().wptr[index].load(Ordering::Acquire);
        if wptr == cursor.rptr {
            return Vec::new();
        }
        let words = self.ring_words(index);
        let capacity = words.len() as u32;
        let pending = if wptr >= cursor.rptr { wptr - cursor.rptr } else { capacity - cursor.rptr + wptr };
        let mut out = Vec::with_capacity(pending as usize);
        let mut p = cursor.rptr;
        for _ in 0..pending {
            out.push(words[p as usize]);
            p = (p + 1) % capacity;
        }
        cursor.rptr = wptr;
        out
    }
}

/// A guest process's full virtual-memory image, imported read-write
/// from `/<shmPath>/memory-<pid>`. Windowing this import under the owning `VmId`'s
/// address range is the caller's job (this type only owns the mapping itself).
pub struct ProcessMemoryImport {
    shmem: Shmem,
}

unsafe impl Send for ProcessMemoryImport {}

impl ProcessMemoryImport {
    pub fn open(path_prefix: &str, pid: u32, size: usize) -> Result<Self> {
        let os_id = format!("{path_prefix}/memory-{pid}");
        let shmem = open_or_create(&os_id, size)?;
        Ok(ProcessMemoryImport { shmem })
    }

    pub fn len(&self) -> usize {
        self.shmem.len()
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.shmem.as_ptr(), self.shmem.len()) }
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.shmem.as_ptr(), self.shmem.len()) }
    }
}

/// One retained direct-memory backing: the file plus its current mapping.
struct DmemSlot {
    file: std::fs::File,
    mapping: MmapMut,
}

/// Retains up to `I` direct-memory fds per process, opened and mapped lazily as `mapMemory` packets reference a `dmem_index` not
/// seen before. Large allocations (render targets, big vertex buffers) live here rather
/// than in the per-process `memory-<pid>` image.
#[derive(Default)]
pub struct DmemTable {
    slots: Vec<Option<DmemSlot>>,
}

impl DmemTable {
    pub fn new(capacity: usize) -> Self {
        DmemTable { slots: (0..capacity).map(|_| None).collect() }
    }

    pub fn open(&mut self, path_prefix: &str, index: u32, size: u64) -> Result<&mut [u8]> {
        let slot = index as usize;
        if self.slots.len() <= slot {
            self.slots.resize_with(slot + 1, || None);
        }
        if self.slots[slot].is_none() {
            let dir = format!("/dev/shm/{path_prefix}");
            std::fs::create_dir_all(&dir)?;
            let path = format!("{dir}/dmem-{index}");
            let file = std::fs::OpenOptions::new().read(true).write(true).create(true).open(&path)?;
            file.set_len(size)?;
            let mapping = unsafe { MmapMut::map_mut(&file)? };
            self.slots[slot] = Some(DmemSlot { file, mapping });
        }
        let slot = self.slots[slot].as_mut().expect("just inserted");
        if (slot.mapping.len() as u64) < size {
            slot.file.set_len(size)?;
            slot.mapping = unsafe { MmapMut::map_mut(&slot.file)? };
        }
        Ok(&mut slot.mapping[..])
    }
}
