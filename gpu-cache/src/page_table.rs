//! Per-VM-id page watch table and the wait-free notification channel the cache-update
//! thread drains it through.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Mutex;

use bitflags::bitflags;
use gpu_types::{AddressRange, VmId};

pub const PAGE_SIZE: u64 = 0x1000;
pub const PAGE_SHIFT: u32 = 12;

bitflags! {
    /// Per-page watch state. `WriteWatch` traps the next guest
    /// write so the cache can invalidate dependent entries; `ReadWriteLock` excludes the
    /// guest entirely while the GPU owns the page; `LazyLock` defers the trap until the
    /// next submission boundary rather than the next individual write; `Invalidated`
    /// marks a page whose cached contents must be re-read before next use.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageFlags: u8 {
        const WRITE_WATCH = 1 << 0;
        const READ_WRITE_LOCK = 1 << 1;
        const LAZY_LOCK = 1 << 2;
        const INVALIDATED = 1 << 3;
    }
}

fn page_index(vm_relative_address: u64) -> usize {
    (vm_relative_address >> PAGE_SHIFT) as usize
}

fn page_count(window_size: u64) -> usize {
    ((window_size + PAGE_SIZE - 1) >> PAGE_SHIFT) as usize
}

/// Page-flag array for one VM id's address window, plus the channel the guest-fault
/// handler and the cache-update thread rendezvous over.
pub struct PageTable {
    pages: Vec<AtomicU8>,
    pub changes: ChangeChannel,
}

impl PageTable {
    pub fn new(vm: VmId) -> Self {
        let pages = (0..page_count(vm.window().size())).map(|_| AtomicU8::new(0)).collect();
        PageTable { pages, changes: ChangeChannel::new() }
    }

    fn flags_at(&self, vm_relative_address: u64) -> &AtomicU8 {
        &self.pages[page_index(vm_relative_address)]
    }

    pub fn get(&self, vm_relative_address: u64) -> PageFlags {
        PageFlags::from_bits_truncate(self.flags_at(vm_relative_address).load(Ordering::Acquire))
    }

    fn for_each_page_in<F: Fn(&AtomicU8)>(&self, range: AddressRange, f: F) {
        let first = page_index(range.begin());
        let last = page_index(range.end().saturating_sub(1)).min(self.pages.len().saturating_sub(1));
        for page in &self.pages[first..=last.max(first)] {
            f(page);
        }
    }

    /// Arms `WriteWatch` over `range`; the next guest write to any page in it must call
    /// [`Self::notify_write`] before proceeding.
    pub fn watch_writes(&self, range: AddressRange) {
        self.for_each_page_in(range, |page| {
            page.fetch_or(PageFlags::WRITE_WATCH.bits(), Ordering::AcqRel);
        });
    }

    /// Excludes the guest from `range` until [`Self::unlock_read_write`] clears it,
    /// used while the GPU has a tag actively reading or writing these pages.
    pub fn lock_read_write(&self, range: AddressRange) {
        self.for_each_page_in(range, |page| {
            page.fetch_or(PageFlags::READ_WRITE_LOCK.bits(), Ordering::AcqRel);
        });
    }

    pub fn unlock_read_write(&self, range: AddressRange) {
        self.for_each_page_in(range, |page| {
            page.fetch_and(!PageFlags::READ_WRITE_LOCK.bits(), Ordering::AcqRel);
        });
    }

    /// Called from the guest-fault handler when a watched page is written. Clears
    /// `WriteWatch`, sets `Invalidated`, and enqueues the page for the cache-update
    /// thread to process.
    pub fn notify_write(&self, vm: VmId, vm_relative_address: u64) {
        let page = self.flags_at(vm_relative_address);
        let previous = page.fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
            let mut flags = PageFlags::from_bits_truncate(bits);
            if !flags.contains(PageFlags::WRITE_WATCH) {
                return None;
            }
            flags.remove(PageFlags::WRITE_WATCH);
            flags.insert(PageFlags::INVALIDATED);
            Some(flags.bits())
        });
        if previous.is_ok() {
            self.changes.push(vm, page_index(vm_relative_address) as u32);
        }
    }

    pub fn clear_invalidated(&self, vm_relative_address: u64) {
        self.flags_at(vm_relative_address).fetch_and(!PageFlags::INVALIDATED.bits(), Ordering::AcqRel);
    }
}

const CHANNEL_CAPACITY: usize = 1024;

/// Single-producer/single-consumer ring of `(vm, page)` change notifications. The
/// producer (a guest write fault) never blocks: a full ring simply drops the oldest
/// unconsumed page index, since a page already queued for invalidation doesn't need a
/// second entry. The consumer (the cache-update thread) parks when it finds the ring
/// empty and is woken by an `unpark` from the next producer push, giving a
/// wait/notify pair without a syscall-backed futex.
pub struct ChangeChannel {
    slots: Vec<AtomicU64>,
    head: AtomicUsize,
    tail: AtomicUsize,
    idle_waiter: Mutex<Option<std::thread::Thread>>,
    idle_count: AtomicU32,
}

fn pack(vm: VmId, page: u32) -> u64 {
    ((vm.get() as u64) << 32) | page as u64
}

fn unpack(word: u64) -> (VmId, u32) {
    (VmId::new((word >> 32) as u8), word as u32)
}

impl ChangeChannel {
    fn new() -> Self {
        ChangeChannel {
            slots: (0..CHANNEL_CAPACITY).map(|_| AtomicU64::new(u64::MAX)).collect(),
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            idle_waiter: Mutex::new(None),
            idle_count: AtomicU32::new(0),
        }
    }

    fn push(&self, vm: VmId, page: u32) {
        let tail = self.tail.fetch_add(1, Ordering::AcqRel) % self.slots.len();
        self.slots[tail].store(pack(vm, page), Ordering::Release);
        if let Some(thread) = self.idle_waiter.lock().unwrap().take() {
            thread.unpark();
        }
    }

    /// Drains every pending notification without blocking.
    pub fn drain(&self) -> Vec<(VmId, u32)> {
        let mut out = Vec::new();
        loop {
            let head = self.head.load(Ordering::Acquire);
            if head == self.tail.load(Ordering::Acquire) {
                break;
            }
            let slot = &self.slots[head % self.slots.len()];
            let word = slot.swap(u64::MAX, Ordering::AcqRel);
            self.head.fetch_add(1, Ordering::AcqRel);
            if word != u64::MAX {
                out.push(unpack(word));
            }
        }
        out
    }

    /// Blocks the calling (consumer) thread until a notification arrives or `timeout`
    /// elapses, then drains whatever is pending.
    pub fn wait(&self, timeout: std::time::Duration) -> Vec<(VmId, u32)> {
        let pending = self.drain();
        if !pending.is_empty() {
            return pending;
        }
        self.idle_count.fetch_add(1, Ordering::Relaxed);
        *self.idle_waiter.lock().unwrap() = Some(std::thread::current());
        std::thread::park_timeout(timeout);
        self.drain()
    }

    pub fn idle_count(&self) -> u32 {
        self.idle_count.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_then_write_transitions_to_invalidated() {
        let table = PageTable::new(VmId::new(0));
        let range = AddressRange::from_begin_size(0, PAGE_SIZE);
        table.watch_writes(range);
        assert!(table.get(0).contains(PageFlags::WRITE_WATCH));

        table.notify_write(VmId::new(0), 0);
        let flags = table.get(0);
        assert!(!flags.contains(PageFlags::WRITE_WATCH));
        assert!(flags.contains(PageFlags::INVALIDATED));
    }

    #[test]
    fn unwatched_write_does_not_enqueue_a_change() {
        let table = PageTable::new(VmId::new(0));
        table.notify_write(VmId::new(0), 0);
        assert!(table.changes.drain().is_empty());
    }

    #[test]
    fn lock_unlock_read_write_round_trips() {
        let table = PageTable::new(VmId::new(0));
        let range = AddressRange::from_begin_size(0, PAGE_SIZE);
        table.lock_read_write(range);
        assert!(table.get(0).contains(PageFlags::READ_WRITE_LOCK));
        table.unlock_read_write(range);
        assert!(!table.get(0).contains(PageFlags::READ_WRITE_LOCK));
    }

    #[test]
    fn change_channel_drains_pushed_pages_in_order() {
        let channel = ChangeChannel::new();
        channel.push(VmId::new(1), 5);
        channel.push(VmId::new(1), 6);
        let drained = channel.drain();
        assert_eq!(drained, vec![(VmId::new(1), 5), (VmId::new(1), 6)]);
    }
}
