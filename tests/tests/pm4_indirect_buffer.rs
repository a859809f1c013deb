//! A graphics pipe receiving an `IT_INDIRECT_BUFFER` submission loads it onto the draw
//! engine ring and drains it on the next sweep, while `IT_INDIRECT_BUFFER_CNST` goes to
//! the constant engine ring and is drained first.

use gpu_pm4::{
    decode_header, patch_vm_id, validate_gfx_command, GraphicsPipe, PipeHost, RegisterFile, Result,
    IT_DISPATCH_DIRECT, IT_INDIRECT_BUFFER, IT_SET_CONTEXT_REG,
};

#[derive(Default)]
struct RecordingHost {
    dispatches: std::cell::RefCell<u32>,
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
    fn flip(&mut self, _pid: u32, _buffer_index: i32, _flip_arg: i64) -> Result<()> {
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

/// A `IT_INDIRECT_BUFFER` submission with three body words and vmId patched into
/// word 3's top byte, the exact framing `submitGfxCommand` is checked against before
/// it ever reaches a ring.
fn indirect_buffer_command() -> [u32; 4] {
    let header = (3u32 << 30) | (2u32 << 16) | ((IT_INDIRECT_BUFFER as u32) << 8);
    [header, 0x0000_0003, 0, 0]
}

#[test]
fn submitted_indirect_buffer_is_well_formed_and_carries_its_vm_id() {
    let mut command = indirect_buffer_command();
    assert!(validate_gfx_command(&command).is_ok());

    patch_vm_id(&mut command, 0);
    assert_eq!(command[3] >> 24, 0, "vmId 0 leaves the top byte clear");

    patch_vm_id(&mut command, 5);
    assert_eq!(command[3] >> 24, 5);
    assert_eq!(command[3] & 0x00FF_FFFF, 0, "patching the vm id must not disturb the low 24 bits");
}

#[test]
fn rejects_a_submission_whose_opcode_is_not_an_indirect_buffer() {
    let header = (3u32 << 30) | (2u32 << 16) | ((IT_DISPATCH_DIRECT as u32) << 8);
    let command = [header, 0, 0, 0];
    assert!(validate_gfx_command(&command).is_err());
}

#[test]
fn graphics_pipe_drains_the_loaded_indirect_buffer_and_runs_its_draw() {
    let mut pipe = GraphicsPipe::new(0, 64, 0, 64);

    let set_ctx = {
        let header = (3u32 << 30) | (1u32 << 16) | ((IT_SET_CONTEXT_REG as u32) << 8);
        vec![header, 0x20, 7]
    };
    let dispatch = {
        let header = (3u32 << 30) | (2u32 << 16) | ((IT_DISPATCH_DIRECT as u32) << 8);
        vec![header, 1, 1, 1]
    };

    pipe.set_indirect_buffer(gpu_pm4::IT_INDIRECT_BUFFER_CNST, &set_ctx).unwrap();
    pipe.set_indirect_buffer(IT_INDIRECT_BUFFER, &dispatch).unwrap();

    let mut host = RecordingHost::default();
    let processed = pipe.process_all(&mut host).unwrap();
    assert!(processed);
    assert_eq!(*host.dispatches.borrow(), 1);
}

#[test]
fn decode_header_round_trips_the_opcode_it_was_built_from() {
    let command = indirect_buffer_command();
    let header = decode_header(command[0]);
    assert_eq!(header.opcode, IT_INDIRECT_BUFFER);
    assert_eq!(header.word_count, command.len() as u32);
}
