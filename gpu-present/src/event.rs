//! Events the present engine raises outward: a completed flip, and the VBlank
//! thread's two-stage tick.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentEvent {
    /// A flip actually swapped the presented buffer for this VM id.
    Flip { vm_id: u8, buffer_index: i32 },
    /// Fires shortly before `VBlank`, giving a waiting title a chance to submit a
    /// flip that lands in this frame.
    PreVBlankStart,
    VBlank,
}
