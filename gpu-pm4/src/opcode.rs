//! PM4 opcode surface: the real-AMD subset this core consumes, plus the synthetic
//! opcodes that drive the device façade. Opcode values below follow AMD's public GCN
//! PM4 packet reference for the real opcodes; the synthetic ones occupy vacant slots
//! in that space rather than colliding with a real IT_ opcode.

pub const IT_NOP: u8 = 0x10;
pub const IT_SET_CONTEXT_REG: u8 = 0x69;
pub const IT_SET_SH_REG: u8 = 0x76;
pub const IT_SET_UCONFIG_REG: u8 = 0x79;
pub const IT_INDIRECT_BUFFER: u8 = 0x3F;
pub const IT_INDIRECT_BUFFER_CNST: u8 = 0x33;
pub const IT_DRAW_INDEX_AUTO: u8 = 0x2D;
pub const IT_DRAW_INDEX_2: u8 = 0x36;
pub const IT_DISPATCH_DIRECT: u8 = 0x15;
pub const IT_EVENT_WRITE_EOP: u8 = 0x47;
pub const IT_WAIT_REG_MEM: u8 = 0x3C;
pub const IT_SWITCH_BUFFER: u8 = 0x8B;

/// Synthetic opcodes: each carries a target `pid` in its first body word, multiplexing
/// several guest processes' façade calls over one ring.
pub const IT_FLIP: u8 = 0xF0;
pub const IT_MAP_MEMORY: u8 = 0xF1;
pub const IT_UNMAP_MEMORY: u8 = 0xF2;
pub const IT_PROTECT_MEMORY: u8 = 0xF3;
pub const IT_MAP_PROCESS: u8 = 0xF4;
pub const IT_UNMAP_PROCESS: u8 = 0xF5;

/// Fixed body-word count (not counting the header word) for opcodes whose length is an
/// invariant of the opcode itself: `wordCount(header) == 1 + staticBodyLength(opcode)`
/// is checked on every decoded Type-3 packet that has an entry here. Opcodes not listed
/// are variable-length (register-set packets, whose length depends on how many
/// registers are being written) and go unchecked.
pub fn static_body_length(opcode: u8) -> Option<u32> {
    match opcode {
        IT_INDIRECT_BUFFER | IT_INDIRECT_BUFFER_CNST => Some(3),
        IT_DISPATCH_DIRECT => Some(3),
        IT_EVENT_WRITE_EOP => Some(4),
        IT_WAIT_REG_MEM => Some(5),
        IT_SWITCH_BUFFER => Some(0),
        IT_FLIP => Some(4),
        IT_MAP_MEMORY => Some(10),
        IT_UNMAP_MEMORY => Some(5),
        IT_PROTECT_MEMORY => Some(6),
        IT_MAP_PROCESS => Some(2),
        IT_UNMAP_PROCESS => Some(1),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indirect_buffer_has_three_body_words() {
        assert_eq!(static_body_length(IT_INDIRECT_BUFFER), Some(3));
    }

    #[test]
    fn unknown_opcode_has_no_static_length() {
        assert_eq!(static_body_length(IT_SET_CONTEXT_REG), None);
    }
}
