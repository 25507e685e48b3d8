use anyhow::{bail, Context, Result};
use lookalike_vector_store::sniff_mime_type;
use std::path::Path;

const MIB: u64 = 1024 * 1024;

/// Gate applied to a user-supplied query image before it is decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPolicy {
    pub max_bytes: u64,
    pub allowed_mime_types: Vec<&'static str>,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_bytes: 5 * MIB,
            allowed_mime_types: vec!["image/jpeg", "image/png", "image/gif"],
        }
    }
}

impl UploadPolicy {
    /// Read a query file, rejecting it on its size before any bytes are loaded.
    pub async fn read(&self, path: &Path) -> Result<(Vec<u8>, &'static str)> {
        let meta = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("Failed to read query image {}", path.display()))?;
        self.check_size(meta.len())?;

        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read query image {}", path.display()))?;
        let mime = self.validate(&bytes)?;
        Ok((bytes, mime))
    }

    /// Accept `bytes` and return their sniffed MIME type, or explain the rejection.
    pub fn validate(&self, bytes: &[u8]) -> Result<&'static str> {
        self.check_size(bytes.len() as u64)?;
        let Some(mime) = sniff_mime_type(bytes) else {
            bail!("Query file is not a recognised image");
        };
        if !self.allowed_mime_types.contains(&mime) {
            bail!(
                "Query image type {mime} is not allowed (expected one of: {})",
                self.allowed_mime_types.join(", ")
            );
        }
        Ok(mime)
    }

    fn check_size(&self, len: u64) -> Result<()> {
        if len > self.max_bytes {
            bail!(
                "Query image is {len} bytes, larger than the {} byte limit",
                self.max_bytes
            );
        }
        Ok(())
    }
}
