//! # Lookalike Vector Store
//!
//! Image embeddings, their persisted store, and exhaustive similarity search.
//!
//! ## Architecture
//!
//! ```text
//! Image file
//!     │
//!     ├──> Decode (image crate)
//!     │
//!     ├──> Encoder (CLIP vision tower on ONNX Runtime, or stub)
//!     │      └─> Vector[512/768]
//!     │
//!     ├──> EmbeddingStore (ordered records + encoder fingerprint)
//!     │      └─> JSON, written with write-then-rename
//!     │
//!     └──> QueryEngine
//!            └─> Linear cosine scan, first record wins ties
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use lookalike_vector_store::{EmbeddingModel, EmbeddingStore, QueryEngine};
//!
//! #[tokio::main]
//! async fn main() -> lookalike_vector_store::Result<()> {
//!     let store = EmbeddingStore::load("embeddings.json").await?;
//!     let encoder = EmbeddingModel::from_env()?;
//!
//!     let result = QueryEngine::new(&store)
//!         .query_path(&encoder, "query.jpg")
//!         .await?;
//!
//!     if let Some(best) = result.best_identifier {
//!         println!("{best}: {:.4}", result.score);
//!     }
//!     Ok(())
//! }
//! ```

mod embeddings;
mod error;
mod images;
mod models;
mod paths;
mod preprocess;
mod query;
mod similarity;
mod store;
mod types;

pub use embeddings::{EmbeddingModel, ImageEncoder};
pub use error::{ErrorKind, Result, VectorStoreError};
pub use images::{
    decode_image, decode_image_blocking, decode_image_bytes, has_supported_extension,
    sniff_mime_type, SUPPORTED_IMAGE_EXTENSIONS,
};
pub use models::{EmbeddingMode, EncoderConfig, ModelId, DEFAULT_MODEL_ID};
pub use paths::{default_store_path_for, model_dir, DEFAULT_STORE_FILE_NAME};
pub use preprocess::PreprocessConfig;
pub use query::QueryEngine;
pub use similarity::{cosine_similarity, is_zero_vector, l2_norm};
pub use store::{EmbeddingStore, STORE_SCHEMA_VERSION};
pub use types::{EmbeddingRecord, EncoderFingerprint, MatchResult, RankedMatch};
