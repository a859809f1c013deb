use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed SPIR-V module: {0}")]
    Malformed(&'static str),
    #[error("word stream ended inside an instruction at offset {0}")]
    TruncatedInstruction(usize),
    #[error("unsupported SPIR-V opcode {0:#x}")]
    UnsupportedOpcode(u16),
    #[error("validation failed: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, Error>;
