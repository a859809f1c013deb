//! Type-2/Type-3 packet framing: a PM4 packet is either a one-word Type-2 no-op, or a
//! Type-3 packet consisting of a header word (opcode + length) followed by `length - 1`
//! body words.
//!
//! Header layout (bits, MSB first): `type` at 31:30, `count` at 29:16 (body word count
//! minus one), `opcode` at 15:8, `predicate` at bit 0. Total packet word count is
//! `count + 2` (the header word plus `count + 1` body words).

use crate::error::{PipeError, Result};
use crate::opcode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    /// Type-0/Type-1 are legacy register-write encodings this core never emits or
    /// consumes; only Type-2 (no-op) and Type-3 (opcode+body) appear on the wire here.
    Nop,
    Opcode,
}

#[derive(Debug, Clone, Copy)]
pub struct PacketHeader {
    pub ty: PacketType,
    pub opcode: u8,
    pub predicate: bool,
    /// Total word count of the packet, header included.
    pub word_count: u32,
}

pub fn decode_header(word: u32) -> PacketHeader {
    let ty = (word >> 30) & 0x3;
    if ty == 2 {
        return PacketHeader { ty: PacketType::Nop, opcode: 0, predicate: false, word_count: 1 };
    }
    let count = (word >> 16) & 0x3FFF;
    PacketHeader {
        ty: PacketType::Opcode,
        opcode: ((word >> 8) & 0xFF) as u8,
        predicate: word & 1 != 0,
        word_count: count + 2,
    }
}

/// One decoded packet: either a no-op or an opcode with its body words borrowed from
/// the ring.
#[derive(Debug, Clone)]
pub enum Packet<'a> {
    Nop,
    Opcode { opcode: u8, predicate: bool, body: &'a [u32] },
}

impl<'a> Packet<'a> {
    /// Decodes the packet starting at `words[0]`, returning it plus the total word
    /// count consumed. `words` must contain at least the header word; a Type-3 packet
    /// whose declared length runs past `words.len()` is a malformed-packet error.
    pub fn decode(words: &'a [u32]) -> Result<(Packet<'a>, u32)> {
        let header = decode_header(words[0]);
        if words.len() < header.word_count as usize {
            return Err(PipeError::MalformedPacket { header: words[0], offset: 0 });
        }
        match header.ty {
            PacketType::Nop => Ok((Packet::Nop, 1)),
            PacketType::Opcode => {
                if let Some(expected_body) = opcode::static_body_length(header.opcode) {
                    let declared_body = header.word_count - 1;
                    if declared_body != expected_body {
                        return Err(PipeError::LengthMismatch {
                            opcode: header.opcode,
                            declared: declared_body,
                            expected: expected_body,
                        });
                    }
                }
                let body = &words[1..header.word_count as usize];
                Ok((Packet::Opcode { opcode: header.opcode, predicate: header.predicate, body }, header.word_count))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// An `IT_INDIRECT_BUFFER` packet whose header encodes a 3-body-word Type-3
    /// packet, `body[2]`'s top byte carrying the VM id.
    #[test]
    fn decodes_indirect_buffer_header() {
        let count_field = 2u32; // body words - 1
        let header = (3u32 << 30) | (count_field << 16) | ((opcode::IT_INDIRECT_BUFFER as u32) << 8);
        let words = [header, 0x0000_1000, 0x0000_0000, 0x0000_0000];
        let (packet, consumed) = Packet::decode(&words).unwrap();
        assert_eq!(consumed, 4);
        match packet {
            Packet::Opcode { opcode, body, .. } => {
                assert_eq!(opcode, opcode::IT_INDIRECT_BUFFER);
                assert_eq!(body.len(), 3);
                assert_eq!(body[2] >> 24, 0);
            }
            Packet::Nop => panic!("expected an opcode packet"),
        }
    }

    #[test]
    fn nop_is_a_single_word() {
        let header = 2u32 << 30;
        let words = [header];
        let (packet, consumed) = Packet::decode(&words).unwrap();
        assert_eq!(consumed, 1);
        assert!(matches!(packet, Packet::Nop));
    }

    #[test]
    fn declared_length_past_buffer_end_is_malformed() {
        let header = (3u32 << 30) | (10u32 << 16) | ((opcode::IT_DISPATCH_DIRECT as u32) << 8);
        let words = [header, 0, 0];
        assert!(Packet::decode(&words).is_err());
    }

    /// Decoding the same word twice must agree: `decode_header` has no hidden state
    /// to make a second application disagree with the first.
    #[test]
    fn decode_is_idempotent_on_the_same_word() {
        let word = (3u32 << 30) | (1u32 << 16) | ((opcode::IT_WAIT_REG_MEM as u32) << 8);
        assert_eq!(decode_header(word).opcode, decode_header(word).opcode);
    }

    #[test]
    fn wrong_static_length_is_rejected() {
        // IT_DISPATCH_DIRECT's fixed body length is 3; declare 5 instead.
        let header = (3u32 << 30) | (4u32 << 16) | ((opcode::IT_DISPATCH_DIRECT as u32) << 8);
        let words = [header, 0, 0, 0, 0, 0];
        assert!(matches!(Packet::decode(&words), Err(PipeError::LengthMismatch { .. })));
    }
}
