//! Flip/present engine: swapchain acquire/present with recreate-on-`OUT_OF_DATE`,
//! registered-buffer pixel-format resolution, the detile blit, and the 59.94 Hz VBlank
//! background thread.

mod engine;
mod error;
mod event;
mod flip;
mod vblank;

pub use engine::{FlipRequest, PresentEngine};
pub use error::{PresentError, Result};
pub use event::PresentEvent;
pub use flip::{FlipState, FlipTable};
pub use vblank::{VBlankThread, DEFAULT_VBLANK_HZ};
