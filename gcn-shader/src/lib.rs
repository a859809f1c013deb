//! GCN microcode decoder (C2) and GCN→SPIR-V converter (C3).

pub mod convert;
pub mod error;
pub mod front;

pub use error::{Error, Result};
