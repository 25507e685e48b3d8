use serde::{Deserialize, Serialize};
use std::fmt;

/// One reference image and its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    #[serde(rename = "filename")]
    pub identifier: String,
    #[serde(rename = "embedding")]
    pub vector: Vec<f32>,
}

impl EmbeddingRecord {
    pub fn new(identifier: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            identifier: identifier.into(),
            vector,
        }
    }
}

/// Identifies the encoder configuration a set of vectors came from.
///
/// Vectors are only comparable when every field matches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EncoderFingerprint {
    pub model_id: String,
    pub quantized: bool,
    pub dimension: usize,
}

impl EncoderFingerprint {
    pub fn new(model_id: impl Into<String>, quantized: bool, dimension: usize) -> Self {
        Self {
            model_id: model_id.into(),
            quantized,
            dimension,
        }
    }
}

impl fmt::Display for EncoderFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, dim {})",
            self.model_id,
            if self.quantized { "quantized" } else { "fp32" },
            self.dimension
        )
    }
}

/// Best match for a query. `best_identifier` is `None` only for an empty store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub best_identifier: Option<String>,
    pub score: f32,
}

impl MatchResult {
    /// Score reported when nothing was compared.
    pub const NO_MATCH_SCORE: f32 = f32::NEG_INFINITY;

    #[must_use]
    pub const fn no_match() -> Self {
        Self {
            best_identifier: None,
            score: Self::NO_MATCH_SCORE,
        }
    }

    #[must_use]
    pub const fn is_match(&self) -> bool {
        self.best_identifier.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedMatch {
    pub identifier: String,
    pub score: f32,
    /// Index of the record in store order.
    pub position: usize,
}
