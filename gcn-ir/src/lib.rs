//! In-memory IR mirroring SPIR-V's module layout, plus a codec (serialize/deserialize/
//! disassemble/validate/optimize/merge) and a per-opcode builder. `gcn-shader`'s
//! converter is the only producer of real modules in this workspace; this crate has no
//! GCN-specific knowledge itself.

pub mod builder;
pub mod codec;
pub mod context;
pub mod disassemble;
pub mod error;
pub mod handle;
pub mod ir;
pub mod passes;

pub use codec::{deserialize, serialize};
pub use context::Context;
pub use disassemble::disassemble;
pub use error::{Error, Result};
pub use handle::Handle;
pub use ir::Location;
pub use passes::{merge, optimize, validate};
