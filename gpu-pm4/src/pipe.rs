//! Pipe dispatch: routes decoded packets to register writes, draw/dispatch hooks, or
//! the synthetic façade opcodes, in the order `processPipes` walks them: command
//! pipe first, then each compute pipe, then each graphics pipe's CE ring ahead of its
//! DE ring.

use crate::error::{PipeError, Result};
use crate::opcode::*;
use crate::packet::Packet;
use crate::registers::RegisterFile;
use crate::ring::Ring;

/// Side effects a pipe can't perform on its own: cache-backed draw/dispatch work and
/// the synthetic opcodes that drive process/VM lifecycle. A `gpu-device` façade
/// implements this against its VM table and `gpu-cache` tags; `gpu-pm4` only knows how
/// to decode and route packets.
pub trait PipeHost {
    fn draw_index_auto(&mut self, regs: &RegisterFile, body: &[u32]) -> Result<()>;
    fn draw_index_2(&mut self, regs: &RegisterFile, body: &[u32]) -> Result<()>;
    fn dispatch_direct(&mut self, regs: &RegisterFile, body: &[u32]) -> Result<()>;
    fn event_write_eop(&mut self, body: &[u32]) -> Result<()>;
    fn wait_reg_mem(&mut self, body: &[u32]) -> Result<bool>;

    fn flip(&mut self, pid: u32, buffer_index: i32, flip_arg: i64) -> Result<()>;
    fn map_memory(
        &mut self,
        pid: u32,
        address: u64,
        size: u64,
        memory_type: i32,
        dmem_index: u32,
        prot: u32,
        offset: u64,
    ) -> Result<()>;
    fn unmap_memory(&mut self, pid: u32, address: u64, size: u64) -> Result<()>;
    fn protect_memory(&mut self, pid: u32, address: u64, size: u64, prot: u32) -> Result<()>;
    fn map_process(&mut self, pid: u32, vm_id: u32) -> Result<()>;
    fn unmap_process(&mut self, pid: u32) -> Result<()>;
}

fn word_pair_to_u64(lo: u32, hi: u32) -> u64 {
    (lo as u64) | ((hi as u64) << 32)
}

fn dispatch_synthetic(opcode: u8, body: &[u32], host: &mut dyn PipeHost) -> Result<()> {
    match opcode {
        IT_FLIP => {
            let buffer_index = body[0] as i32;
            let flip_arg = word_pair_to_u64(body[1], body[2]) as i64;
            let pid = body[3];
            host.flip(pid, buffer_index, flip_arg)
        }
        IT_MAP_MEMORY => {
            let pid = body[0];
            let address = word_pair_to_u64(body[1], body[2]);
            let size = word_pair_to_u64(body[3], body[4]);
            let memory_type = body[5] as i32;
            let dmem_index = body[6];
            let prot = body[7];
            let offset = word_pair_to_u64(body[8], body[9]);
            host.map_memory(pid, address, size, memory_type, dmem_index, prot, offset)
        }
        IT_UNMAP_MEMORY => {
            let pid = body[0];
            let address = word_pair_to_u64(body[1], body[2]);
            let size = word_pair_to_u64(body[3], body[4]);
            host.unmap_memory(pid, address, size)
        }
        IT_PROTECT_MEMORY => {
            let pid = body[0];
            let address = word_pair_to_u64(body[1], body[2]);
            let size = word_pair_to_u64(body[3], body[4]);
            let prot = body[5];
            host.protect_memory(pid, address, size, prot)
        }
        IT_MAP_PROCESS => {
            let pid = body[0];
            let vm_id = body[1];
            host.map_process(pid, vm_id)
        }
        IT_UNMAP_PROCESS => {
            let pid = body[0];
            host.unmap_process(pid)
        }
        _ => unreachable!("dispatch_synthetic called with a non-synthetic opcode"),
    }
}

fn dispatch_one(
    opcode_byte: u8,
    body: &[u32],
    regs: &mut RegisterFile,
    host: &mut dyn PipeHost,
    pipe_name: &'static str,
) -> Result<()> {
    match opcode_byte {
        IT_NOP | IT_SWITCH_BUFFER => Ok(()),
        IT_SET_CONTEXT_REG => {
            regs.context.apply_set(body);
            Ok(())
        }
        IT_SET_SH_REG => {
            regs.sh.apply_set(body);
            Ok(())
        }
        IT_SET_UCONFIG_REG => {
            regs.uconfig.apply_set(body);
            Ok(())
        }
        IT_DRAW_INDEX_AUTO => host.draw_index_auto(regs, body),
        IT_DRAW_INDEX_2 => host.draw_index_2(regs, body),
        IT_DISPATCH_DIRECT => host.dispatch_direct(regs, body),
        IT_EVENT_WRITE_EOP => host.event_write_eop(body),
        IT_WAIT_REG_MEM => host.wait_reg_mem(body).map(|_| ()),
        IT_FLIP | IT_MAP_MEMORY | IT_UNMAP_MEMORY | IT_PROTECT_MEMORY | IT_MAP_PROCESS | IT_UNMAP_PROCESS => {
            dispatch_synthetic(opcode_byte, body, host)
        }
        IT_INDIRECT_BUFFER | IT_INDIRECT_BUFFER_CNST => {
            Err(PipeError::UnsupportedOpcode { opcode: opcode_byte, len: body.len() as u32 + 1, pipe: pipe_name })
        }
        other => Err(PipeError::UnsupportedOpcode { opcode: other, len: body.len() as u32 + 1, pipe: pipe_name }),
    }
}

fn drain(ring: &mut Ring, regs: &mut RegisterFile, host: &mut dyn PipeHost, pipe_name: &'static str) -> Result<bool> {
    let mut processed_any = false;
    let mut scratch = Vec::new();
    while let Some(packet) = ring.pop_packet(&mut scratch)? {
        processed_any = true;
        if let Packet::Opcode { opcode, body, .. } = packet {
            log::trace!("{pipe_name}: dispatching opcode {opcode:#04x} ({} body words)", body.len());
            dispatch_one(opcode, body, regs, host, pipe_name)?;
        }
    }
    Ok(processed_any)
}

/// The command pipe: a single ring carrying synthetic façade opcodes
/// (`IT_FLIP`/`IT_MAP_MEMORY`/...) alongside plain register-set packets, drained first
/// in `processPipes`' per-cycle sweep.
pub struct CommandPipe {
    ring: Ring,
    registers: RegisterFile,
}

impl CommandPipe {
    pub fn new(base: u64, size_words: u32) -> Self {
        CommandPipe { ring: Ring::new(base, size_words), registers: RegisterFile::default() }
    }

    pub fn ring_mut(&mut self) -> &mut Ring {
        &mut self.ring
    }

    pub fn process_all(&mut self, host: &mut dyn PipeHost) -> Result<bool> {
        drain(&mut self.ring, &mut self.registers, host, "command")
    }
}

/// A compute pipe: one ring, its own register file.
pub struct ComputePipe {
    ring: Ring,
    registers: RegisterFile,
}

impl ComputePipe {
    pub fn new(base: u64, size_words: u32) -> Self {
        ComputePipe { ring: Ring::new(base, size_words), registers: RegisterFile::default() }
    }

    pub fn ring_mut(&mut self) -> &mut Ring {
        &mut self.ring
    }

    pub fn process_all(&mut self, host: &mut dyn PipeHost) -> Result<bool> {
        drain(&mut self.ring, &mut self.registers, host, "compute")
    }
}

/// A graphics pipe: separate CE and DE rings sharing one register file, CE always
/// drained ahead of DE so constant-engine state lands before the draw engine packets
/// that depend on it are processed.
pub struct GraphicsPipe {
    ce_ring: Ring,
    de_ring: Ring,
    registers: RegisterFile,
}

impl GraphicsPipe {
    pub fn new(ce_base: u64, ce_size_words: u32, de_base: u64, de_size_words: u32) -> Self {
        GraphicsPipe {
            ce_ring: Ring::new(ce_base, ce_size_words),
            de_ring: Ring::new(de_base, de_size_words),
            registers: RegisterFile::default(),
        }
    }

    pub fn ce_ring_mut(&mut self) -> &mut Ring {
        &mut self.ce_ring
    }

    pub fn de_ring_mut(&mut self) -> &mut Ring {
        &mut self.de_ring
    }

    /// Resolves an `IT_INDIRECT_BUFFER`/`IT_INDIRECT_BUFFER_CNST` submission's address
    /// range through `memory` and loads the resolved packet words into the matching
    /// ring, mirroring `onCommandBuffer`'s `RemoteMemory`-backed read before it queues
    /// the buffer onto the CE/DE queue.
    pub fn load_indirect_buffer(
        &mut self,
        opcode: u8,
        command: &[u32],
        memory: &dyn gcn_shader::convert::GuestMemory,
    ) -> Result<()> {
        let (address, size_bytes) = crate::decode_indirect_buffer(command)?;
        let word_count = (size_bytes / 4) as usize;
        let mut words = Vec::with_capacity(word_count);
        for i in 0..word_count {
            let word = memory
                .read_u32(address + (i as u64) * 4)
                .ok_or(PipeError::MalformedPacket { header: command[0], offset: i })?;
            words.push(word);
        }
        self.set_indirect_buffer(opcode, &words)
    }

    /// Routes a submitted indirect-buffer command to the CE or DE ring, matching
    /// `onCommandBuffer`'s opcode switch: `IT_INDIRECT_BUFFER_CNST` loads the constant
    /// engine ring, plain `IT_INDIRECT_BUFFER` loads the draw engine ring.
    pub fn set_indirect_buffer(&mut self, opcode: u8, words: &[u32]) -> Result<()> {
        match opcode {
            IT_INDIRECT_BUFFER_CNST => {
                self.ce_ring.load(words);
                Ok(())
            }
            IT_INDIRECT_BUFFER => {
                self.de_ring.load(words);
                Ok(())
            }
            other => Err(PipeError::UnsupportedOpcode { opcode: other, len: words.len() as u32, pipe: "graphics" }),
        }
    }

    pub fn process_all(&mut self, host: &mut dyn PipeHost) -> Result<bool> {
        let ce_processed = drain(&mut self.ce_ring, &mut self.registers, host, "graphics-ce")?;
        let de_processed = drain(&mut self.de_ring, &mut self.registers, host, "graphics-de")?;
        Ok(ce_processed || de_processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingHost {
        flips: RefCell<Vec<(u32, i32, i64)>>,
        dispatches: RefCell<u32>,
    }

    impl PipeHost for RecordingHost {
        fn draw_index_auto(&mut self, _regs: &RegisterFile, _body: &[u32]) -> Result<()> {
            Ok(())
        }
        fn draw_index_2(&mut self, _regs: &RegisterFile, _body: &[u32]) -> Result<()> {
            Ok(())
        }
        fn dispatch_direct(&mut self, _regs: &RegisterFile, _body: &[u32]) -> Result<()> {
            *self.dispatches.borrow_mut() += 1;
            Ok(())
        }
        fn event_write_eop(&mut self, _body: &[u32]) -> Result<()> {
            Ok(())
        }
        fn wait_reg_mem(&mut self, _body: &[u32]) -> Result<bool> {
            Ok(true)
        }
        fn flip(&mut self, pid: u32, buffer_index: i32, flip_arg: i64) -> Result<()> {
            self.flips.borrow_mut().push((pid, buffer_index, flip_arg));
            Ok(())
        }
        fn map_memory(&mut self, _: u32, _: u64, _: u64, _: i32, _: u32, _: u32, _: u64) -> Result<()> {
            Ok(())
        }
        fn unmap_memory(&mut self, _: u32, _: u64, _: u64) -> Result<()> {
            Ok(())
        }
        fn protect_memory(&mut self, _: u32, _: u64, _: u64, _: u32) -> Result<()> {
            Ok(())
        }
        fn map_process(&mut self, _: u32, _: u32) -> Result<()> {
            Ok(())
        }
        fn unmap_process(&mut self, _: u32) -> Result<()> {
            Ok(())
        }
    }

    fn flip_packet(pid: u32, buffer_index: i32, flip_arg: i64) -> [u32; 5] {
        let header = (3u32 << 30) | (3u32 << 16) | ((IT_FLIP as u32) << 8);
        [header, buffer_index as u32, flip_arg as u32, (flip_arg >> 32) as u32, pid]
    }

    #[test]
    fn command_pipe_forwards_flip_to_host() {
        let mut pipe = CommandPipe::new(0, 16);
        pipe.ring_mut().push(&flip_packet(7, 2, -1));
        let mut host = RecordingHost::default();
        assert!(pipe.process_all(&mut host).unwrap());
        assert_eq!(host.flips.borrow()[0], (7, 2, -1));
    }

    #[test]
    fn graphics_pipe_drains_ce_before_de() {
        let mut pipe = GraphicsPipe::new(0, 16, 0, 16);
        let dispatch = {
            let header = (3u32 << 30) | (2u32 << 16) | ((IT_DISPATCH_DIRECT as u32) << 8);
            vec![header, 1, 1, 1]
        };
        let set_ctx = {
            let header = (3u32 << 30) | (1u32 << 16) | ((IT_SET_CONTEXT_REG as u32) << 8);
            vec![header, 0x10, 42]
        };
        pipe.set_indirect_buffer(IT_INDIRECT_BUFFER_CNST, &set_ctx).unwrap();
        pipe.set_indirect_buffer(IT_INDIRECT_BUFFER, &dispatch).unwrap();
        let mut host = RecordingHost::default();
        assert!(pipe.process_all(&mut host).unwrap());
        assert_eq!(*host.dispatches.borrow(), 1);
        assert_eq!(pipe.registers.context.get(0x10), 42);
    }

    #[test]
    fn empty_pipes_report_nothing_processed() {
        let mut pipe = ComputePipe::new(0, 8);
        let mut host = RecordingHost::default();
        assert!(!pipe.process_all(&mut host).unwrap());
    }

    struct FlatGuestMemory {
        base: u64,
        bytes: Vec<u8>,
    }

    impl gcn_shader::convert::GuestMemory for FlatGuestMemory {
        fn read_u32(&self, address: u64) -> Option<u32> {
            let offset = address.checked_sub(self.base)? as usize;
            let slice = self.bytes.get(offset..offset + 4)?;
            Some(u32::from_le_bytes(slice.try_into().unwrap()))
        }
    }

    #[test]
    fn load_indirect_buffer_resolves_guest_memory_before_loading_the_ring() {
        let dispatch_header = (3u32 << 30) | (2u32 << 16) | ((IT_DISPATCH_DIRECT as u32) << 8);
        let dispatch_words = [dispatch_header, 1, 1, 1];
        let mut bytes = Vec::new();
        for word in dispatch_words {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        let memory = FlatGuestMemory { base: 0x1000, bytes };

        let ib_header = (3u32 << 30) | (2u32 << 16) | ((IT_INDIRECT_BUFFER as u32) << 8);
        let command = [ib_header, 0x1000, (dispatch_words.len() as u32) * 4, 0];

        let mut pipe = GraphicsPipe::new(0, 16, 0, 16);
        pipe.load_indirect_buffer(IT_INDIRECT_BUFFER, &command, &memory).unwrap();

        let mut host = RecordingHost::default();
        assert!(pipe.process_all(&mut host).unwrap());
        assert_eq!(*host.dispatches.borrow(), 1);
    }

    #[test]
    fn load_indirect_buffer_reports_malformed_packet_on_unreadable_address() {
        let memory = FlatGuestMemory { base: 0x1000, bytes: Vec::new() };
        let ib_header = (3u32 << 30) | (2u32 << 16) | ((IT_INDIRECT_BUFFER as u32) << 8);
        let command = [ib_header, 0x1000, 4, 0];
        let mut pipe = GraphicsPipe::new(0, 16, 0, 16);
        assert!(matches!(
            pipe.load_indirect_buffer(IT_INDIRECT_BUFFER, &command, &memory),
            Err(PipeError::MalformedPacket { .. })
        ));
    }
}
