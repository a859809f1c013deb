//! Cross-pipe synchronization: one graphics pipe's `IT_EVENT_WRITE_EOP` sets a bit in
//! a shared `EventFlag`, and a second pipe's `IT_WAIT_REG_MEM` only reports satisfied
//! once that bit is visible, modeling the producer/consumer handoff between two
//! independently-drained pipes sharing one event-flag bank.

use std::cell::RefCell;
use std::rc::Rc;

use gpu_pm4::{CompareFn, EventFlag, GraphicsPipe, PipeHost, RegisterFile, Result, IT_EVENT_WRITE_EOP, IT_INDIRECT_BUFFER, IT_WAIT_REG_MEM};

struct SharedEventHost {
    flags: Rc<EventFlag>,
    wait_results: RefCell<Vec<bool>>,
}

impl PipeHost for SharedEventHost {
    fn draw_index_auto(&mut self, _regs: &RegisterFile, _body: &[u32]) -> Result<()> {
        Ok(())
    }
    fn draw_index_2(&mut self, _regs: &RegisterFile, _body: &[u32]) -> Result<()> {
        Ok(())
    }
    fn dispatch_direct(&mut self, _regs: &RegisterFile, _body: &[u32]) -> Result<()> {
        Ok(())
    }
    fn event_write_eop(&mut self, body: &[u32]) -> Result<()> {
        let mask = body[0];
        self.flags.set(mask);
        Ok(())
    }
    fn wait_reg_mem(&mut self, body: &[u32]) -> Result<bool> {
        let compare = CompareFn::from_bits(body[0]);
        let mask = body[1];
        let reference = body[2];
        let satisfied = compare.evaluate(self.flags.get() & mask, reference);
        self.wait_results.borrow_mut().push(satisfied);
        Ok(satisfied)
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

/// `IT_EVENT_WRITE_EOP`'s fixed body length is 4 words; only the first (the event
/// mask) matters to this file's host.
fn eop_packet(mask: u32) -> Vec<u32> {
    let header = (3u32 << 30) | (3u32 << 16) | ((IT_EVENT_WRITE_EOP as u32) << 8);
    vec![header, mask, 0, 0, 0]
}

/// `IT_WAIT_REG_MEM`'s fixed body length is 5 words: function, mask, reference, and
/// two trailing words this file's host doesn't consult.
fn wait_reg_mem_packet(compare: u32, mask: u32, reference: u32) -> Vec<u32> {
    let header = (3u32 << 30) | (4u32 << 16) | ((IT_WAIT_REG_MEM as u32) << 8);
    vec![header, compare, mask, reference, 0, 0]
}

#[test]
fn wait_reg_mem_sees_an_event_set_by_a_different_pipe_through_the_shared_host() {
    let flags = Rc::new(EventFlag::new());
    let mut host = SharedEventHost { flags: Rc::clone(&flags), wait_results: RefCell::new(Vec::new()) };

    // Pipe A is drained first: it writes an EOP event with mask 0x1.
    let mut pipe_a = GraphicsPipe::new(0, 32, 0, 32);
    pipe_a.set_indirect_buffer(IT_INDIRECT_BUFFER, &eop_packet(0x1)).unwrap();
    pipe_a.process_all(&mut host).unwrap();

    // Pipe B is drained second: its WAIT_REG_MEM must observe pipe A's bit already
    // set, since both pipes dispatch into the same host/EventFlag synchronously.
    let mut pipe_b = GraphicsPipe::new(0, 32, 0, 32);
    pipe_b
        .set_indirect_buffer(IT_INDIRECT_BUFFER, &wait_reg_mem_packet(CompareFnBits::EQUAL, 0x1, 0x1))
        .unwrap();
    pipe_b.process_all(&mut host).unwrap();

    assert_eq!(host.wait_results.borrow().as_slice(), &[true]);
    assert_eq!(flags.get(), 0x1);
}

#[test]
fn wait_reg_mem_reports_unsatisfied_before_the_matching_event_has_landed() {
    let flags = Rc::new(EventFlag::new());
    let mut host = SharedEventHost { flags: Rc::clone(&flags), wait_results: RefCell::new(Vec::new()) };

    let mut pipe_b = GraphicsPipe::new(0, 32, 0, 32);
    pipe_b
        .set_indirect_buffer(IT_INDIRECT_BUFFER, &wait_reg_mem_packet(CompareFnBits::EQUAL, 0x1, 0x1))
        .unwrap();
    pipe_b.process_all(&mut host).unwrap();
    assert_eq!(host.wait_results.borrow().as_slice(), &[false]);

    let mut pipe_a = GraphicsPipe::new(0, 32, 0, 32);
    pipe_a.set_indirect_buffer(IT_INDIRECT_BUFFER, &eop_packet(0x1)).unwrap();
    pipe_a.process_all(&mut host).unwrap();
    assert_eq!(flags.get(), 0x1);
}

/// `IT_WAIT_REG_MEM`'s function-field encoding, spelled out for the packets this file
/// builds by hand.
struct CompareFnBits;
impl CompareFnBits {
    const EQUAL: u32 = 3;
}
