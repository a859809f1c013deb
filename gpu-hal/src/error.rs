use ash::vk;

/// A `vk::Result` is collapsed to one of a small set of host-meaningful outcomes
/// rather than threading the raw code everywhere.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("out of memory")]
    OutOfMemory,
    #[error("device lost")]
    Lost,
    #[error("surface out of date")]
    Outdated,
    #[error("surface lost")]
    SurfaceLost,
    #[error("no physical device matched the configured GPU index {0}")]
    NoMatchingAdapter(u32),
    #[error("required Vulkan extension {0} is not available")]
    MissingExtension(&'static str),
    #[error("vulkan loading failed: {0}")]
    Loading(#[from] ash::LoadingError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<vk::Result> for Error {
    fn from(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_OUT_OF_HOST_MEMORY | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => {
                Self::OutOfMemory
            }
            vk::Result::ERROR_DEVICE_LOST => Self::Lost,
            vk::Result::ERROR_OUT_OF_DATE_KHR => Self::Outdated,
            vk::Result::ERROR_SURFACE_LOST_KHR => Self::SurfaceLost,
            _ => {
                log::warn!("unrecognized vulkan result {result:?}");
                Self::Lost
            }
        }
    }
}
