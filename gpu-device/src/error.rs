//! The façade's own error enum, in addition to every crate below it: recoverable
//! command-bridge and registration failures get a typed variant here, while malformed
//! PM4/guest-mapping failures are fatal and never constructed as `Err` past `Device`'s
//! boundary.

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error(transparent)]
    Hal(#[from] gpu_hal::Error),
    #[error(transparent)]
    Cache(#[from] gpu_cache::CacheError),
    #[error(transparent)]
    Pipe(#[from] gpu_pm4::PipeError),
    #[error(transparent)]
    Present(#[from] gpu_present::PresentError),
    #[error(transparent)]
    Surface(#[from] gpu_hal::SurfaceError),
    #[error(transparent)]
    Shader(#[from] gcn_shader::Error),
    #[error("no process is mapped at pid {0}")]
    UnknownProcess(u32),
    #[error("vm id {0} is not mapped to any process")]
    UnmappedVmId(u8),
    #[error("a title registered more than 10 buffers for pid {0}")]
    TooManyBuffers { pid: u32 },
    #[error("a title registered more than 10 buffer attributes for pid {0}")]
    TooManyBufferAttributes { pid: u32 },
    #[error("buffer index {index} was never registered for pid {pid}")]
    UnregisteredBuffer { pid: u32, index: u32 },
    #[error("command bridge error: {0}")]
    Bridge(#[from] std::io::Error),
    #[error("shared memory error: {0}")]
    SharedMemory(#[from] shared_memory::ShmemError),
}

pub type Result<T> = std::result::Result<T, DeviceError>;
