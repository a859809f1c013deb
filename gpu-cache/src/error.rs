#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error(transparent)]
    Device(#[from] gpu_hal::Error),
    #[error(transparent)]
    Shader(#[from] gcn_shader::Error),
    #[error("no VM mapping covers address range {begin:#x}..{end:#x}")]
    UnmappedRange { begin: u64, end: u64 },
    #[error("exhausted the {count}-slot {kind} pool")]
    PoolExhausted { kind: &'static str, count: usize },
    #[error("descriptor set allocation failed")]
    Descriptor(#[from] gpu_descriptor::DescriptorAllocationError),
}

pub type Result<T> = std::result::Result<T, CacheError>;
