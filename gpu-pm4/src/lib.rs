//! Multi-ring PM4 dispatch: packet framing, per-pipe register banks, and the
//! command/compute/graphics pipe set a device façade drains every cycle.

mod error;
mod opcode;
mod packet;
mod pipe;
mod registers;
mod ring;
mod sync;

pub use error::{PipeError, Result};
pub use opcode::*;
pub use packet::{decode_header, Packet, PacketHeader, PacketType};
pub use pipe::{CommandPipe, ComputePipe, GraphicsPipe, PipeHost};
pub use registers::{RegisterBank, RegisterFile};
pub use ring::Ring;
pub use sync::{CompareFn, EventFlag};

/// Patches a submitted gfx command's VM id into body word 3, bits 31:24, matching
/// `submitGfxCommand`'s `patchedCommand[3] &= ~(~0u << 24); patchedCommand[3] |= vmId
/// << 24;`. Only `IT_INDIRECT_BUFFER`/`IT_INDIRECT_BUFFER_CNST` carry a VM id this way;
/// callers are expected to have already checked the opcode and declared length.
pub fn patch_vm_id(command: &mut [u32], vm_id: u8) {
    debug_assert!(command.len() >= 4, "indirect buffer command is at least 4 words");
    command[3] &= !(0xFFu32 << 24);
    command[3] |= (vm_id as u32) << 24;
}

/// Decodes the `(address, size_bytes)` an `IT_INDIRECT_BUFFER`/`IT_INDIRECT_BUFFER_CNST`
/// submission points at: word[1] is the address low 32 bits, word[2] the byte size,
/// word[3] bits 23:0 the address high bits with the VM id (patched in separately) over
/// bits 31:24. Validates the packet shape first via [`validate_gfx_command`].
pub fn decode_indirect_buffer(command: &[u32]) -> Result<(u64, u64)> {
    validate_gfx_command(command)?;
    let address = (command[1] as u64) | (((command[3] & 0x00FF_FFFF) as u64) << 32);
    let size_bytes = command[2] as u64;
    Ok((address, size_bytes))
}

/// Validates that `command` is a well-formed gfx submission: Type-3,
/// `IT_INDIRECT_BUFFER` or `IT_INDIRECT_BUFFER_CNST`, and exactly as long as its own
/// header declares. Mirrors `submitGfxCommand`'s guard before it forwards the command
/// onward.
pub fn validate_gfx_command(command: &[u32]) -> Result<()> {
    if command.is_empty() {
        return Err(PipeError::MalformedPacket { header: 0, offset: 0 });
    }
    let header = decode_header(command[0]);
    if header.ty != PacketType::Opcode
        || (header.opcode != IT_INDIRECT_BUFFER && header.opcode != IT_INDIRECT_BUFFER_CNST)
    {
        return Err(PipeError::UnsupportedOpcode {
            opcode: header.opcode,
            len: header.word_count,
            pipe: "gfx-submit",
        });
    }
    if command.len() != header.word_count as usize {
        return Err(PipeError::LengthMismatch {
            opcode: header.opcode,
            declared: command.len() as u32,
            expected: header.word_count,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_vm_id_only_touches_the_top_byte() {
        let mut command = [0u32, 0, 0, 0x0000_1234];
        patch_vm_id(&mut command, 0x05);
        assert_eq!(command[3], 0x0500_1234);
    }

    #[test]
    fn validate_gfx_command_accepts_matching_length() {
        let header = (3u32 << 30) | (2u32 << 16) | ((IT_INDIRECT_BUFFER as u32) << 8);
        let command = [header, 0, 0, 0];
        assert!(validate_gfx_command(&command).is_ok());
    }

    #[test]
    fn validate_gfx_command_rejects_wrong_opcode() {
        let header = (3u32 << 30) | (2u32 << 16) | ((IT_DISPATCH_DIRECT as u32) << 8);
        let command = [header, 0, 0, 0];
        assert!(validate_gfx_command(&command).is_err());
    }

    #[test]
    fn validate_gfx_command_rejects_length_mismatch() {
        let header = (3u32 << 30) | (2u32 << 16) | ((IT_INDIRECT_BUFFER as u32) << 8);
        let command = [header, 0, 0];
        assert!(validate_gfx_command(&command).is_err());
    }

    #[test]
    fn decode_indirect_buffer_splits_address_and_size() {
        let header = (3u32 << 30) | (2u32 << 16) | ((IT_INDIRECT_BUFFER as u32) << 8);
        let mut command = [header, 0x2000_0000, 0x40, 0x0000_0007];
        patch_vm_id(&mut command, 0x05);
        let (address, size_bytes) = decode_indirect_buffer(&command).unwrap();
        assert_eq!(address, 0x0007_2000_0000);
        assert_eq!(size_bytes, 0x40);
    }
}
