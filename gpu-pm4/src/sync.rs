//! Host-side synchronization primitives PM4 opcodes drive: the event-flag bits
//! `IT_EVENT_WRITE_EOP` sets and clears, and the compare function
//! `IT_WAIT_REG_MEM` evaluates against a polled memory word.

use std::sync::atomic::{AtomicU32, Ordering};

/// A bitset of outstanding GPU events, written by `IT_EVENT_WRITE_EOP` completion and
/// polled by `IT_WAIT_REG_MEM`. `clear` is a single `fetch_and`: a
/// read-then-mask-then-store sequence could drop a concurrent `set` landing between
/// the read and the store, so this keeps it to one atomic RMW.
pub struct EventFlag {
    bits: AtomicU32,
}

impl EventFlag {
    pub fn new() -> Self {
        EventFlag { bits: AtomicU32::new(0) }
    }

    pub fn set(&self, mask: u32) -> u32 {
        self.bits.fetch_or(mask, Ordering::AcqRel)
    }

    pub fn clear(&self, mask: u32) -> u32 {
        self.bits.fetch_and(!mask, Ordering::AcqRel)
    }

    pub fn get(&self) -> u32 {
        self.bits.load(Ordering::Acquire)
    }
}

impl Default for EventFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// `IT_WAIT_REG_MEM`'s function field: how the polled word compares against the
/// packet's reference value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareFn {
    Always,
    LessThan,
    LessEqual,
    Equal,
    NotEqual,
    GreaterEqual,
    GreaterThan,
}

impl CompareFn {
    pub fn from_bits(bits: u32) -> Self {
        match bits & 0x7 {
            0 => CompareFn::Always,
            1 => CompareFn::LessThan,
            2 => CompareFn::LessEqual,
            3 => CompareFn::Equal,
            4 => CompareFn::NotEqual,
            5 => CompareFn::GreaterEqual,
            6 => CompareFn::GreaterThan,
            _ => CompareFn::Always,
        }
    }

    pub fn evaluate(self, polled: u32, reference: u32) -> bool {
        match self {
            CompareFn::Always => true,
            CompareFn::LessThan => polled < reference,
            CompareFn::LessEqual => polled <= reference,
            CompareFn::Equal => polled == reference,
            CompareFn::NotEqual => polled != reference,
            CompareFn::GreaterEqual => polled >= reference,
            CompareFn::GreaterThan => polled > reference,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn set_then_clear_round_trips() {
        let flag = EventFlag::new();
        flag.set(0b101);
        assert_eq!(flag.get(), 0b101);
        flag.clear(0b001);
        assert_eq!(flag.get(), 0b100);
    }

    #[test]
    fn concurrent_set_during_clear_is_not_lost() {
        let flag = Arc::new(EventFlag::new());
        flag.set(0b01);
        let setter = {
            let flag = Arc::clone(&flag);
            thread::spawn(move || flag.set(0b10))
        };
        flag.clear(0b01);
        setter.join().unwrap();
        assert_eq!(flag.get() & 0b10, 0b10);
    }

    #[test]
    fn compare_fn_matches_gnm_function_field() {
        assert!(CompareFn::from_bits(3).evaluate(5, 5));
        assert!(!CompareFn::from_bits(3).evaluate(5, 6));
        assert!(CompareFn::from_bits(6).evaluate(7, 3));
        assert!(CompareFn::from_bits(0).evaluate(0, 9999));
    }
}
