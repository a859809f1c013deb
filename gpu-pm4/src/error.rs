#[derive(Debug, thiserror::Error)]
pub enum PipeError {
    #[error("malformed PM4 packet: header {header:#010x} at ring offset {offset}")]
    MalformedPacket { header: u32, offset: usize },
    #[error("unsupported PM4 opcode {opcode:#04x} (len {len}) on {pipe} pipe")]
    UnsupportedOpcode { opcode: u8, len: u32, pipe: &'static str },
    #[error("type-3 packet opcode {opcode:#04x} declared length {declared} but the fixed table expects {expected}")]
    LengthMismatch { opcode: u8, declared: u32, expected: u32 },
    #[error(transparent)]
    Cache(#[from] gpu_cache::CacheError),
    #[error(transparent)]
    Shader(#[from] gcn_shader::Error),
    #[error(transparent)]
    Device(#[from] gpu_hal::Error),
}

pub type Result<T> = std::result::Result<T, PipeError>;
