#[derive(Debug, thiserror::Error)]
pub enum PresentError {
    #[error(transparent)]
    Device(#[from] gpu_hal::Error),
    #[error(transparent)]
    Surface(#[from] gpu_hal::SurfaceError),
    #[error(transparent)]
    Cache(#[from] gpu_cache::CacheError),
    #[error("unresolvable pixel format: {0}")]
    PixelFormat(#[from] gpu_types::pixel_format::PixelFormatError),
    #[error("no swapchain configured for this surface yet")]
    NotConfigured,
}

pub type Result<T> = std::result::Result<T, PresentError>;
