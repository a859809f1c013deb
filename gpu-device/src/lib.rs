//! The device façade (C9): per-process VM tables, the shared-memory command bridge,
//! process/buffer registration, startup configuration, and the `Device` struct tying
//! `gpu-cache`/`gpu-pm4`/`gpu-present`/`gpu-hal` together into the kernel-facing
//! submit/event surface.

mod bridge;
mod config;
mod device;
mod error;
mod process;
mod vm;

pub use bridge::{CommandBridge, DmemTable, ProcessMemoryImport, RingCursor, RING_CAPACITY_WORDS};
pub use config::{init_logging, Config};
pub use device::Device;
pub use error::{DeviceError, Result};
pub use process::{Buffer, BufferAttribute, ProcessState};
pub use vm::{Protection, VmMapSlot, VmTable};
