use crate::error::{Result, VectorStoreError};
use crate::similarity::is_zero_vector;
use crate::types::{EmbeddingRecord, EncoderFingerprint};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const STORE_SCHEMA_VERSION: u32 = 1;

/// Ordered, in-memory collection of reference embeddings.
///
/// Every vector has the same length and a non-zero norm, and identifiers are
/// unique. Order is insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddingStore {
    records: Vec<EmbeddingRecord>,
    positions: HashMap<String, usize>,
    encoder: Option<EncoderFingerprint>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedStore {
    schema_version: u32,
    #[serde(default)]
    encoder: Option<EncoderFingerprint>,
    records: Vec<EmbeddingRecord>,
}

impl EmbeddingStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_encoder(encoder: EncoderFingerprint) -> Self {
        Self {
            encoder: Some(encoder),
            ..Self::default()
        }
    }

    /// Build a store from records in order, validating each one.
    pub fn from_records(
        records: Vec<EmbeddingRecord>,
        encoder: Option<EncoderFingerprint>,
    ) -> Result<Self> {
        let mut store = Self {
            records: Vec::with_capacity(records.len()),
            positions: HashMap::with_capacity(records.len()),
            encoder,
        };
        for record in records {
            store.insert(record)?;
        }
        Ok(store)
    }

    #[must_use]
    pub const fn encoder(&self) -> Option<&EncoderFingerprint> {
        self.encoder.as_ref()
    }

    /// Vector length shared by every record, if known.
    #[must_use]
    pub fn dimension(&self) -> Option<usize> {
        self.encoder
            .as_ref()
            .map(|e| e.dimension)
            .or_else(|| self.records.first().map(|r| r.vector.len()))
    }

    /// Append a record. An identifier that is already present keeps its
    /// position and takes the new vector.
    pub fn insert(&mut self, record: EmbeddingRecord) -> Result<()> {
        if record.identifier.is_empty() {
            return Err(VectorStoreError::InvalidInput(
                "record identifier is empty".to_string(),
            ));
        }
        if let Some(expected) = self.dimension() {
            if record.vector.len() != expected {
                return Err(VectorStoreError::InvalidDimension {
                    expected,
                    actual: record.vector.len(),
                });
            }
        }
        if is_zero_vector(&record.vector) {
            return Err(VectorStoreError::ZeroVector);
        }

        if let Some(&pos) = self.positions.get(&record.identifier) {
            log::debug!("Replacing embedding for '{}'", record.identifier);
            self.records[pos] = record;
        } else {
            self.positions
                .insert(record.identifier.clone(), self.records.len());
            self.records.push(record);
        }
        Ok(())
    }

    #[must_use]
    pub fn get(&self, identifier: &str) -> Option<&EmbeddingRecord> {
        self.positions
            .get(identifier)
            .and_then(|&pos| self.records.get(pos))
    }

    #[must_use]
    pub fn records(&self) -> &[EmbeddingRecord] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &EmbeddingRecord> {
        self.records.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Load a persisted store, accepting both the versioned document and the
    /// legacy bare array.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        log::info!("Loading embedding store from {}", path.display());
        let bytes = tokio::fs::read(path).await?;
        let store = Self::from_json_slice(&bytes).map_err(|err| match err {
            VectorStoreError::IoError(_) | VectorStoreError::SerializationError(_) => err,
            VectorStoreError::CorruptStore(msg) => {
                VectorStoreError::CorruptStore(format!("{}: {msg}", path.display()))
            }
            other => VectorStoreError::CorruptStore(format!("{}: {other}", path.display())),
        })?;
        log::info!(
            "Loaded {} embeddings (dim {})",
            store.len(),
            store
                .dimension()
                .map_or_else(|| "unknown".to_string(), |d| d.to_string())
        );
        Ok(store)
    }

    /// Parse a store document. A top-level array is the legacy
    /// `[{filename, embedding}]` form written before the encoder was recorded.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        if is_legacy_array(bytes) {
            let records: Vec<EmbeddingRecord> = serde_json::from_slice(bytes)?;
            log::warn!(
                "Embedding store has no encoder fingerprint; query-time encoder checks are disabled"
            );
            return Self::from_records(records, None);
        }

        let persisted: PersistedStore = serde_json::from_slice(bytes)?;
        if persisted.schema_version != STORE_SCHEMA_VERSION {
            return Err(VectorStoreError::CorruptStore(format!(
                "unsupported store schema_version {} (expected {STORE_SCHEMA_VERSION})",
                persisted.schema_version
            )));
        }
        Self::from_records(persisted.records, persisted.encoder)
    }

    pub fn to_json_vec(&self) -> Result<Vec<u8>> {
        let persisted = PersistedStore {
            schema_version: STORE_SCHEMA_VERSION,
            encoder: self.encoder.clone(),
            records: self.records.clone(),
        };
        Ok(serde_json::to_vec_pretty(&persisted)?)
    }

    /// Write the store with write-then-rename so readers only ever see a
    /// complete file. On failure the previous file is left untouched.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref().to_path_buf();
        log::info!(
            "Saving {} embeddings to {}",
            self.records.len(),
            path.display()
        );
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = self.to_json_vec()?;
        let tmp = tmp_path_for(&path);
        if let Err(err) = tokio::fs::write(&tmp, bytes).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(err.into());
        }
        if let Err(err) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(err.into());
        }
        log::info!("Embedding store saved");
        Ok(())
    }
}

fn is_legacy_array(bytes: &[u8]) -> bool {
    bytes.iter().find(|b| !b.is_ascii_whitespace()) == Some(&b'[')
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "embeddings.json".into());
    name.push(".tmp");
    path.with_file_name(name)
}
