//! Vulkan host backend (C5): instance/device/queue-set creation,
//! swapchain ownership, host-visible and device-local memory resources, and a
//! `Scheduler` that ties command-buffer recording to a timeline semaphore.
//!
//! One `InstanceShared`/`DeviceShared` pair holds everything resolved once at setup
//! (extension function pointers, allocators, queue handles), with call sites
//! borrowing from it rather than re-resolving per call.

mod device;
mod error;
mod instance;
mod memory;
mod queue;
mod scheduler;
mod surface;

pub use device::{Device, DeviceShared, QueueSet};
pub use error::{Error, Result};
pub use instance::{Instance, InstanceConfig};
pub use memory::{MemoryKind, MemoryResource};
pub use queue::Queue;
pub use scheduler::{Scheduler, TimelineValue};
pub use surface::{Surface, SurfaceError, Swapchain, SwapchainConfig};
