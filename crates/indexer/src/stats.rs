use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A reference image that was skipped during a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedImage {
    pub file: String,
    pub reason: String,
}

/// Statistics about a build run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildStats {
    /// Image files found in the source directory
    pub discovered: usize,

    /// Records written to the store
    pub embedded: usize,

    /// Files that failed to decode or embed
    pub skipped: usize,

    pub failures: Vec<FailedImage>,

    /// Time taken in milliseconds
    pub time_ms: u64,

    /// Where the store was published, if it was saved
    pub store_path: Option<PathBuf>,
}

impl BuildStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_embedded(&mut self) {
        self.embedded += 1;
    }

    pub fn add_failure(&mut self, file: impl Into<String>, reason: impl Into<String>) {
        self.skipped += 1;
        self.failures.push(FailedImage {
            file: file.into(),
            reason: reason.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn failures_serialize_with_file_and_reason() {
        let mut stats = BuildStats::new();
        stats.discovered = 2;
        stats.add_embedded();
        stats.add_failure("broken.png", "Failed to decode image");

        let value = serde_json::to_value(&stats).unwrap();
        assert_eq!(value["skipped"], 1);
        assert_eq!(value["failures"][0]["file"], "broken.png");
        assert_eq!(value["store_path"], serde_json::Value::Null);
    }
}
