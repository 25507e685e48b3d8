//! # Lookalike Indexer
//!
//! Offline construction of the embedding store for a reference collection.
//!
//! ## Pipeline
//!
//! ```text
//! Directory
//!     │
//!     ├──> File Scanner (flat, image extensions only)
//!     │      └─> Image files in name order
//!     │
//!     ├──> Decode + Encoder (per file, failures skipped)
//!     │      └─> Embedding records
//!     │
//!     └──> Embedding Store (locked write-then-rename)
//!            └─> embeddings.json
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use lookalike_indexer::IndexBuilder;
//! use lookalike_vector_store::EmbeddingModel;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let encoder = Arc::new(EmbeddingModel::from_env()?);
//!     let stats = IndexBuilder::new("public/dataset", encoder)
//!         .build_and_save("public/embeddings.json")
//!         .await?;
//!
//!     println!("Embedded {} images, skipped {}", stats.embedded, stats.skipped);
//!     Ok(())
//! }
//! ```

mod error;
mod index_lock;
mod indexer;
mod scanner;
mod stats;

pub use error::{IndexerError, Result};
pub use indexer::IndexBuilder;
pub use scanner::FileScanner;
pub use stats::{BuildStats, FailedImage};
