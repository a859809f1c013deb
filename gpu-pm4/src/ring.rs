//! Circular command ring: `Ring{base,size,rptr,wptr}`, mirroring `submitCommand`'s
//! wraparound-with-NOP-padding write path and the consumer-side draining
//! `processAllRings` performs over each pipe's rings.

use crate::packet::Packet;
use crate::error::Result;

/// A Type-2 no-op word, used to pad the tail of the ring when a write would otherwise
/// split a packet across the wrap boundary.
const NOP_WORD: u32 = 2u32 << 30;

pub struct Ring {
    base: u64,
    words: Box<[u32]>,
    rptr: u32,
    wptr: u32,
}

impl Ring {
    pub fn new(base: u64, size_words: u32) -> Self {
        let size_words = size_words.max(1);
        Ring { base, words: vec![0u32; size_words as usize].into_boxed_slice(), rptr: 0, wptr: 0 }
    }

    pub fn from_byte_range(base: u64, size_bytes: u32) -> Self {
        Self::new(base, size_bytes / 4)
    }

    /// Replaces this ring's contents wholesale and rewinds both pointers to the start.
    /// Used when a CE/DE ring is repointed at a freshly-resolved indirect buffer: the
    /// caller has already copied the referenced guest words in, and draining should
    /// start from the beginning of that buffer.
    pub fn load(&mut self, words: &[u32]) {
        self.words = words.to_vec().into_boxed_slice();
        self.rptr = 0;
        self.wptr = self.words.len() as u32;
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn size_words(&self) -> u32 {
        self.words.len() as u32
    }

    pub fn rptr(&self) -> u32 {
        self.rptr
    }

    pub fn wptr(&self) -> u32 {
        self.wptr
    }

    pub fn is_empty(&self) -> bool {
        self.rptr == self.wptr
    }

    /// Number of unread words currently queued.
    pub fn pending_len(&self) -> u32 {
        if self.wptr >= self.rptr {
            self.wptr - self.rptr
        } else {
            self.size_words() - self.rptr + self.wptr
        }
    }

    /// Appends `command` at `wptr`. If the command would straddle the end of the
    /// backing buffer, the remainder of the buffer is first padded with Type-2 NOPs
    /// and the write restarts at index 0, matching `submitCommand`'s behavior of never
    /// splitting a packet across the wrap boundary.
    pub fn push(&mut self, command: &[u32]) {
        let size = self.size_words();
        debug_assert!(command.len() as u32 <= size, "command longer than the ring itself");

        if self.wptr + command.len() as u32 > size {
            for i in self.wptr..size {
                self.words[i as usize] = NOP_WORD;
            }
            self.wptr = 0;
        }
        for &word in command {
            self.words[self.wptr as usize] = word;
            self.wptr += 1;
            if self.wptr == size {
                self.wptr = 0;
            }
        }
    }

    /// Reads out a single logical packet at `rptr`, advancing `rptr` past it.
    /// Straddling packets are copied into `scratch` first since [`Packet::decode`]
    /// needs a contiguous slice.
    pub fn pop_packet<'s>(&mut self, scratch: &'s mut Vec<u32>) -> Result<Option<Packet<'s>>> {
        if self.is_empty() {
            return Ok(None);
        }
        let size = self.size_words();
        let header_word = self.words[self.rptr as usize];
        let header = crate::packet::decode_header(header_word);

        scratch.clear();
        for i in 0..header.word_count {
            scratch.push(self.words[((self.rptr + i) % size) as usize]);
        }
        let (packet, consumed) = Packet::decode(scratch)?;
        self.rptr = (self.rptr + consumed) % size;
        // Safety-by-construction: `packet` borrows from `scratch`, which outlives this
        // call via the caller-supplied lifetime `'s`.
        Ok(Some(packet))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode;

    fn dispatch_packet() -> [u32; 4] {
        let header = (3u32 << 30) | (2u32 << 16) | ((opcode::IT_DISPATCH_DIRECT as u32) << 8);
        [header, 1, 1, 1]
    }

    #[test]
    fn push_then_pop_round_trips() {
        let mut ring = Ring::new(0x1000, 16);
        ring.push(&dispatch_packet());
        let mut scratch = Vec::new();
        let packet = ring.pop_packet(&mut scratch).unwrap().unwrap();
        match packet {
            Packet::Opcode { opcode, .. } => assert_eq!(opcode, opcode::IT_DISPATCH_DIRECT),
            Packet::Nop => panic!("expected dispatch"),
        }
        assert!(ring.is_empty());
    }

    #[test]
    fn push_pads_with_nop_on_wrap() {
        // A ring with only 5 words of room left before the end; the 4-word packet
        // fits, but a second one forces a NOP pad and restart at index 0.
        let mut ring = Ring::new(0, 6);
        ring.push(&dispatch_packet());
        ring.push(&dispatch_packet());
        // First packet consumed 4 of 6 words, 2 remain before wrap; the second
        // 4-word packet cannot fit there and should have forced a pad + restart.
        assert_eq!(ring.wptr(), 4);
    }

    #[test]
    fn empty_ring_pops_nothing() {
        let mut ring = Ring::new(0, 8);
        let mut scratch = Vec::new();
        assert!(ring.pop_packet(&mut scratch).unwrap().is_none());
    }
}
