use crate::{IndexerError, Result};
use fs2::FileExt;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Exclusive advisory lock on `<store>.lock`, released on drop.
pub(crate) struct StoreWriteLock {
    file: std::fs::File,
}

impl Drop for StoreWriteLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

pub(crate) fn lock_path_for_store(store_path: &Path) -> PathBuf {
    let mut name = store_path
        .file_name()
        .map_or_else(OsString::new, OsString::from);
    name.push(".lock");
    store_path.with_file_name(name)
}

pub(crate) async fn acquire_store_write_lock(store_path: &Path) -> Result<StoreWriteLock> {
    let path = lock_path_for_store(store_path);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    tokio::task::spawn_blocking(move || -> Result<StoreWriteLock> {
        use std::fs::OpenOptions;

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|err| {
                IndexerError::Other(format!("open store lock {}: {err}", path.display()))
            })?;

        let start = Instant::now();
        file.lock_exclusive().map_err(|err| {
            IndexerError::Other(format!("acquire store lock {}: {err}", path.display()))
        })?;
        log::debug!(
            "Acquired store lock {} after {} ms",
            path.display(),
            start.elapsed().as_millis()
        );

        Ok(StoreWriteLock { file })
    })
    .await
    .map_err(|err| IndexerError::Other(format!("join store lock task: {err}")))?
}
