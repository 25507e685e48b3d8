use crate::Result;
use lookalike_vector_store::has_supported_extension;
use std::path::{Path, PathBuf};

/// Scanner for finding reference images in a directory
pub struct FileScanner {
    root: PathBuf,
}

impl FileScanner {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// List image files directly inside the root, sorted by file name.
    ///
    /// Subdirectories are not descended into.
    pub fn scan(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        for entry in std::fs::read_dir(&self.root)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("Failed to read entry: {e}");
                    continue;
                }
            };

            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if !has_supported_extension(&path) {
                log::debug!("Skipping non-image file {}", path.display());
                continue;
            }
            files.push(path);
        }

        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        log::info!("Found {} image files in {}", files.len(), self.root.display());
        Ok(files)
    }
}
