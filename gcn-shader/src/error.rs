use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("word stream ended mid-instruction at offset {0}")]
    Truncated(usize),
    #[error("instruction word {word:#010x} at offset {offset} does not match any known encoding")]
    UnknownEncoding { word: u32, offset: usize },
    #[error("shader translation failed: {0}")]
    Translation(String),
    #[error("ir error: {0}")]
    Ir(#[from] gcn_ir::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
