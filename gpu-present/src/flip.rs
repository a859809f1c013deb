//! Per-VM-id flip bookkeeping: `flipBuffer`/`flipArg`/`flipCount`, mirroring
//! `Device::flip`'s negative-bufferIndex fast path (update the triple, skip the actual
//! swapchain present) against its ordinary path (present, then update).

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Copy, Default)]
pub struct FlipState {
    pub flip_buffer: i32,
    pub flip_arg: i64,
    pub flip_count: u64,
}

/// Tracks one [`FlipState`] per VM id. A negative `buffer_index` in
/// [`Self::record`] means "just latch the pending flip, no buffer actually changed",
/// which the guest uses to update `flipArg` between real flips.
#[derive(Default)]
pub struct FlipTable {
    states: Mutex<FxHashMap<u8, FlipState>>,
}

impl FlipTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, vm_id: u8) -> FlipState {
        self.states.lock().get(&vm_id).copied().unwrap_or_default()
    }

    /// Records a flip request. Returns `true` if a buffer swap should actually be
    /// presented (`buffer_index >= 0`), `false` for the argument-only fast path.
    pub fn record(&self, vm_id: u8, buffer_index: i32, flip_arg: i64) -> bool {
        let mut states = self.states.lock();
        let state = states.entry(vm_id).or_default();
        state.flip_arg = flip_arg;
        state.flip_count += 1;
        if buffer_index >= 0 {
            state.flip_buffer = buffer_index;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_buffer_index_is_argument_only() {
        let table = FlipTable::new();
        assert!(!table.record(0, -1, 42));
        let state = table.get(0);
        assert_eq!(state.flip_arg, 42);
        assert_eq!(state.flip_count, 1);
        assert_eq!(state.flip_buffer, 0);
    }

    #[test]
    fn nonnegative_buffer_index_updates_flip_buffer() {
        let table = FlipTable::new();
        assert!(table.record(3, 2, 7));
        assert_eq!(table.get(3).flip_buffer, 2);
    }

    #[test]
    fn vm_ids_are_tracked_independently() {
        let table = FlipTable::new();
        table.record(0, 0, 1);
        table.record(1, 0, 2);
        assert_eq!(table.get(0).flip_arg, 1);
        assert_eq!(table.get(1).flip_arg, 2);
        assert_eq!(table.get(2).flip_count, 0);
    }
}
