use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, VectorStoreError>;

/// Coarse classification callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Dimension mismatch, zero vector, undecodable image, encoder mismatch.
    InvalidInput,
    /// Opaque failure from the embedding backend.
    EncoderFailure,
    /// The persisted store could not be read, parsed or written.
    StoreIoFailure,
}

#[derive(Error, Debug)]
pub enum VectorStoreError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Vector has zero L2 norm")]
    ZeroVector,

    #[error("Failed to decode image {}: {reason}", path.display())]
    ImageDecode { path: PathBuf, reason: String },

    #[error("Encoder mismatch: store was built with {store}, query uses {query}")]
    EncoderMismatch { store: String, query: String },

    #[error("Embedding error: {0}")]
    EncoderError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Corrupt store: {0}")]
    CorruptStore(String),
}

impl VectorStoreError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_)
            | Self::InvalidDimension { .. }
            | Self::ZeroVector
            | Self::ImageDecode { .. }
            | Self::EncoderMismatch { .. } => ErrorKind::InvalidInput,
            Self::EncoderError(_) => ErrorKind::EncoderFailure,
            Self::IoError(_) | Self::SerializationError(_) | Self::CorruptStore(_) => {
                ErrorKind::StoreIoFailure
            }
        }
    }
}
