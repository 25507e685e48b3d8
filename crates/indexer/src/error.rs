use lookalike_vector_store::{ErrorKind, VectorStoreError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexerError>;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Vector store error: {0}")]
    VectorStoreError(#[from] VectorStoreError),

    #[error("Invalid source directory: {0}")]
    InvalidPath(String),

    #[error("{0}")]
    Other(String),
}

impl IndexerError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::VectorStoreError(err) => err.kind(),
            Self::InvalidPath(_) => ErrorKind::InvalidInput,
            Self::IoError(_) | Self::Other(_) => ErrorKind::StoreIoFailure,
        }
    }
}
