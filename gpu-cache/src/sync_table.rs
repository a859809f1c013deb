//! Tracks the most recent [`TagId`] to read or write each address range, so a new
//! acquisition can tell whether it must wait on (or invalidate) a resource a prior tag
//! touched.

use gpu_types::{AddressRange, IntervalMap, TagId};

#[derive(Debug, Clone, Copy)]
pub struct SyncEntry {
    pub last_write: TagId,
    pub last_read: TagId,
}

impl Default for SyncEntry {
    fn default() -> Self {
        SyncEntry { last_write: TagId::INITIAL, last_read: TagId::INITIAL }
    }
}

#[derive(Default)]
pub struct SyncTable {
    map: IntervalMap<SyncEntry>,
}

impl SyncTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent writer/reader overlapping `range`, merged across every entry that
    /// overlaps it (a write covering a superset of `range` still counts).
    pub fn last_touch(&self, range: AddressRange) -> SyncEntry {
        self.map.overlapping(range).fold(SyncEntry::default(), |acc, (_, entry)| SyncEntry {
            last_write: acc.last_write.max(entry.last_write),
            last_read: acc.last_read.max(entry.last_read),
        })
    }

    pub fn record_write(&mut self, range: AddressRange, tag: TagId) {
        debug_assert!(tag.is_write());
        self.map.insert(range, SyncEntry { last_write: tag, last_read: tag.paired_read() });
    }

    pub fn record_read(&mut self, range: AddressRange, tag: TagId) {
        debug_assert!(tag.is_read());
        let mut entry = self.map.get(range.begin()).copied().unwrap_or_default();
        entry.last_read = entry.last_read.max(tag);
        self.map.insert(range, entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_touch_reflects_most_recent_write() {
        let mut table = SyncTable::new();
        let range = AddressRange::from_begin_size(0x1000, 0x100);
        table.record_write(range, TagId::from_raw(2));
        table.record_write(range, TagId::from_raw(4));
        assert_eq!(table.last_touch(range).last_write, TagId::from_raw(4));
    }

    #[test]
    fn unrecorded_range_reports_initial_tag() {
        let table = SyncTable::new();
        let entry = table.last_touch(AddressRange::from_begin_size(0, 0x100));
        assert_eq!(entry.last_write, TagId::INITIAL);
    }
}
