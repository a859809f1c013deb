//! AMD 2-D tile-mode offset math (C4): pure `(x,y,z,mip,array,tile-mode,
//! extent,format) ↔ linear offset` functions, plus detile SPIR-V helper-function
//! generation for injection into `gcn-shader`'s converter output.
//!
//! Structured as pure functions with no internal mutable state: every mapping is
//! derived purely from its coordinate and format arguments.

pub mod detile;
pub mod morton;
pub mod tile_mode;

pub use gpu_types::TileMode;
pub use tile_mode::{SurfaceParams, TileParams};
