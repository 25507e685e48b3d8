use crate::error::{IndexerError, Result};
use crate::index_lock::acquire_store_write_lock;
use crate::scanner::FileScanner;
use crate::stats::BuildStats;
use lookalike_vector_store::{decode_image, EmbeddingRecord, EmbeddingStore, ImageEncoder};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Files between two progress log lines.
const PROGRESS_LOG_EVERY: usize = 100;

type ProgressCallback = Box<dyn Fn(usize, usize) + Send + Sync>;

/// Builds an [`EmbeddingStore`] from a flat directory of reference images.
pub struct IndexBuilder {
    source_dir: PathBuf,
    encoder: Arc<dyn ImageEncoder>,
    progress: Option<ProgressCallback>,
}

impl IndexBuilder {
    pub fn new(source_dir: impl AsRef<Path>, encoder: Arc<dyn ImageEncoder>) -> Self {
        Self {
            source_dir: source_dir.as_ref().to_path_buf(),
            encoder,
            progress: None,
        }
    }

    /// Call `callback(processed, total)` after every file, successful or not.
    #[must_use]
    pub fn with_progress(
        mut self,
        callback: impl Fn(usize, usize) + Send + Sync + 'static,
    ) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    /// Embed every image in the source directory.
    ///
    /// Files that fail to decode or embed are recorded in
    /// [`BuildStats::failures`] and left out of the store.
    pub async fn build(&self) -> Result<(EmbeddingStore, BuildStats)> {
        let start = Instant::now();
        self.check_source_dir().await?;

        let scanner = FileScanner::new(&self.source_dir);
        let files = scanner.scan()?;
        let total = files.len();

        let fingerprint = self.encoder.fingerprint();
        log::info!("Embedding {total} images with {fingerprint}");

        let mut store = EmbeddingStore::with_encoder(fingerprint);
        let mut stats = BuildStats::new();
        stats.discovered = total;

        for (i, path) in files.iter().enumerate() {
            let file_name = path.file_name().unwrap_or_default();
            // Lossy names could collide and silently replace each other.
            match file_name.to_str() {
                Some(identifier) => {
                    match self.embed_and_insert(&mut store, identifier, path).await {
                        Ok(()) => {
                            log::debug!("Embedded {identifier}");
                            stats.add_embedded();
                        }
                        Err(e) => {
                            log::warn!("Skipping {identifier}: {e}");
                            stats.add_failure(identifier, e.to_string());
                        }
                    }
                }
                None => {
                    let lossy = file_name.to_string_lossy();
                    log::warn!("Skipping {lossy}: file name is not valid UTF-8");
                    stats.add_failure(lossy, "file name is not valid UTF-8");
                }
            }

            let processed = i + 1;
            if processed % PROGRESS_LOG_EVERY == 0 {
                log::info!("Processed {processed}/{total} images");
            }
            if let Some(progress) = &self.progress {
                progress(processed, total);
            }
        }

        #[allow(clippy::cast_possible_truncation)]
        {
            stats.time_ms = start.elapsed().as_millis() as u64;
        }
        log::info!(
            "Embedded {} of {} images ({} skipped) in {} ms",
            stats.embedded,
            stats.discovered,
            stats.skipped,
            stats.time_ms
        );

        Ok((store, stats))
    }

    /// Build, then publish the store at `target` under the store write lock.
    ///
    /// A failed write is fatal and leaves any previous store at `target` intact.
    pub async fn build_and_save(&self, target: impl AsRef<Path>) -> Result<BuildStats> {
        let target = target.as_ref();
        let (store, mut stats) = self.build().await?;

        let _write_lock = acquire_store_write_lock(target).await?;
        store.save(target).await?;
        log::info!("Saved {} records to {}", store.len(), target.display());

        stats.store_path = Some(target.to_path_buf());
        Ok(stats)
    }

    async fn check_source_dir(&self) -> Result<()> {
        match tokio::fs::metadata(&self.source_dir).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(IndexerError::InvalidPath(format!(
                "{} is not a directory",
                self.source_dir.display()
            ))),
            Err(e) => Err(IndexerError::InvalidPath(format!(
                "{}: {e}",
                self.source_dir.display()
            ))),
        }
    }

    async fn embed_and_insert(
        &self,
        store: &mut EmbeddingStore,
        identifier: &str,
        path: &Path,
    ) -> Result<()> {
        let image = decode_image(path).await?;
        let vector = self.encoder.encode(image).await?;
        store.insert(EmbeddingRecord::new(identifier, vector))?;
        Ok(())
    }
}
