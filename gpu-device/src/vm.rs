//! Per-process VM address table: `mapMemory`/`unmapMemory`/`protectMemory` over a
//! guest process's window. `gpu_types::IntervalMap` already enforces the
//! never-overlapping invariant (mapping on top of an overlap truncates the overlap) by
//! construction, so this is a thin, VM-id-aware wrapper rather than a second interval
//! tree implementation.

use gpu_types::{AddressRange, IntervalMap, VmId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Protection {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
}

impl Protection {
    /// Decodes the `prot` bitmask carried by `mapMemory`/`protectMemory`:
    /// bit 0 read, bit 1 write, bit 2 execute, matching the POSIX `PROT_*` convention
    /// the kernel-facing methods take their `prot` argument in.
    pub fn from_bits(prot: u32) -> Self {
        Protection { read: prot & 0x1 != 0, write: prot & 0x2 != 0, execute: prot & 0x4 != 0 }
    }
}

/// One mapped region of a process's VM window: the `dmem` fd/offset it's backed by (if
/// any, `memory_type < 0` spans are anonymous/host-only) and the protection bits.
#[derive(Debug, Clone, Copy)]
pub struct VmMapSlot {
    pub dmem_index: Option<u32>,
    pub dmem_offset: u64,
    pub memory_type: i32,
    pub protection: Protection,
}

/// One guest process's mapped address ranges, windowed by its [`VmId`].
/// `mapMemory` inserts, `unmapMemory` removes, `protectMemory` rewrites the protection
/// bits of whatever it overlaps without disturbing the underlying `dmem` backing.
pub struct VmTable {
    vm_id: VmId,
    slots: IntervalMap<VmMapSlot>,
}

impl VmTable {
    pub fn new(vm_id: VmId) -> Self {
        VmTable { vm_id, slots: IntervalMap::new() }
    }

    pub fn vm_id(&self) -> VmId {
        self.vm_id
    }

    /// Translates a process-relative address into this VM id's window.
    fn windowed(&self, address: u64) -> u64 {
        self.vm_id.window_base() + address
    }

    pub fn map(&mut self, address: u64, size: u64, memory_type: i32, dmem_index: u32, prot: u32, offset: u64) {
        let range = AddressRange::from_begin_size(self.windowed(address), size);
        let slot = VmMapSlot {
            dmem_index: (memory_type >= 0).then_some(dmem_index),
            dmem_offset: offset,
            memory_type,
            protection: Protection::from_bits(prot),
        };
        self.slots.insert(range, slot);
    }

    pub fn unmap(&mut self, address: u64, size: u64) {
        let range = AddressRange::from_begin_size(self.windowed(address), size);
        self.slots.remove_overlapping(range);
    }

    /// Rewrites the protection bits over `range`, leaving every slot's `dmem` backing
    /// untouched. Ranges that straddle more than one existing slot each get their own
    /// copy with the new bits, same as a fresh `map` over the overlap.
    pub fn protect(&mut self, address: u64, size: u64, prot: u32) {
        let range = AddressRange::from_begin_size(self.windowed(address), size);
        let overlapped = self.slots.remove_overlapping(range);
        let protection = Protection::from_bits(prot);
        for (existing_range, mut slot) in overlapped {
            slot.protection = protection;
            let clipped = existing_range.intersection(range);
            if clipped.is_valid() {
                self.slots.insert(clipped, slot);
            }
            if existing_range.begin() < range.begin() {
                self.slots.insert(AddressRange::from_begin_end(existing_range.begin(), range.begin()), slot);
            }
            if existing_range.end() > range.end() {
                self.slots.insert(AddressRange::from_begin_end(range.end(), existing_range.end()), slot);
            }
        }
    }

    pub fn is_mapped(&self, address: u64) -> bool {
        self.slots.get(self.windowed(address)).is_some()
    }

    pub fn slot_at(&self, address: u64) -> Option<&VmMapSlot> {
        self.slots.get(self.windowed(address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_then_unmapping_clears_the_range() {
        let mut table = VmTable::new(VmId::new(0));
        table.map(0x1000, 0x1000, 0, 0, 0x3, 0);
        assert!(table.is_mapped(0x1000));
        table.unmap(0x1000, 0x1000);
        assert!(!table.is_mapped(0x1000));
    }

    #[test]
    fn protect_preserves_dmem_backing_outside_the_narrowed_range() {
        let mut table = VmTable::new(VmId::new(0));
        table.map(0x1000, 0x2000, 0, 7, 0x3, 0);
        table.protect(0x1800, 0x100, 0x1);
        let protected = table.slot_at(0x1800).unwrap();
        assert!(protected.protection.read && !protected.protection.write);
        assert_eq!(protected.dmem_index, Some(7));
        let untouched = table.slot_at(0x1000).unwrap();
        assert!(untouched.protection.write);
    }

    #[test]
    fn overlapping_map_truncates_the_earlier_slot() {
        let mut table = VmTable::new(VmId::new(0));
        table.map(0x1000, 0x2000, 0, 1, 0x3, 0);
        table.map(0x1800, 0x100, 0, 2, 0x3, 0);
        assert_eq!(table.slot_at(0x1000).unwrap().dmem_index, Some(1));
        assert_eq!(table.slot_at(0x1800).unwrap().dmem_index, Some(2));
        assert_eq!(table.slot_at(0x1a00).unwrap().dmem_index, Some(1));
    }
}
