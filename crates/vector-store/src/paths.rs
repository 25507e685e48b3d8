use std::path::{Path, PathBuf};

pub const CACHE_DIR_NAME: &str = "lookalike";
pub const MODELS_DIR_NAME: &str = "models";
pub const MODELS_MANIFEST_NAME: &str = "manifest.json";
pub const DEFAULT_STORE_FILE_NAME: &str = "embeddings.json";

/// Resolve the directory holding model assets.
///
/// Order: `LOOKALIKE_MODEL_DIR`, then the nearest `models/` with a manifest
/// walking up from the executable and then from the working directory, then
/// the user cache dir.
#[must_use]
pub fn model_dir() -> PathBuf {
    if let Ok(path) = std::env::var("LOOKALIKE_MODEL_DIR") {
        return PathBuf::from(path);
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(found) = exe.parent().and_then(find_models_dir_upwards) {
            return found;
        }
    }

    if let Ok(cwd) = std::env::current_dir() {
        if let Some(found) = find_models_dir_upwards(&cwd) {
            return found;
        }
    }

    cache_models_dir()
}

fn find_models_dir_upwards(start: &Path) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(MODELS_DIR_NAME);
        if candidate.join(MODELS_MANIFEST_NAME).exists() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}

fn cache_models_dir() -> PathBuf {
    if let Ok(path) = std::env::var("XDG_CACHE_HOME") {
        return PathBuf::from(path)
            .join(CACHE_DIR_NAME)
            .join(MODELS_DIR_NAME);
    }
    std::env::var("HOME")
        .map_or_else(|_| PathBuf::from("."), PathBuf::from)
        .join(".cache")
        .join(CACHE_DIR_NAME)
        .join(MODELS_DIR_NAME)
}

/// Default store location for a reference directory: `embeddings.json` next to it.
#[must_use]
pub fn default_store_path_for(source_dir: &Path) -> PathBuf {
    match source_dir.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(DEFAULT_STORE_FILE_NAME),
        _ => PathBuf::from(DEFAULT_STORE_FILE_NAME),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn finds_models_dir_in_ancestor() {
        let tmp = TempDir::new().unwrap();
        let models = tmp.path().join(MODELS_DIR_NAME);
        std::fs::create_dir_all(&models).unwrap();
        std::fs::write(models.join(MODELS_MANIFEST_NAME), b"{}").unwrap();
        let nested = tmp.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_models_dir_upwards(&nested), Some(models));
    }

    #[test]
    fn store_path_sits_next_to_source_dir() {
        assert_eq!(
            default_store_path_for(Path::new("public/dataset")),
            PathBuf::from("public/embeddings.json")
        );
        assert_eq!(
            default_store_path_for(Path::new("dataset")),
            PathBuf::from("embeddings.json")
        );
    }
}
