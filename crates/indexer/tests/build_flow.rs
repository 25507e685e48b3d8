use async_trait::async_trait;
use image::{DynamicImage, Rgb, RgbImage};
use lookalike_indexer::{IndexBuilder, IndexerError};
use lookalike_vector_store::{
    EmbeddingModel, EmbeddingStore, EncoderConfig, EncoderFingerprint, ErrorKind, ImageEncoder,
    VectorStoreError,
};
use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

fn write_png(dir: &Path, name: &str, width: u32, color: [u8; 3]) {
    RgbImage::from_pixel(width, 6, Rgb(color))
        .save(dir.join(name))
        .expect("write png");
}

fn stub_encoder() -> Arc<dyn ImageEncoder> {
    Arc::new(EmbeddingModel::new(&EncoderConfig::stub("clip-vit-base-patch16")).expect("stub"))
}

fn identifiers(store: &EmbeddingStore) -> Vec<&str> {
    store.iter().map(|r| r.identifier.as_str()).collect()
}

/// Rejects images of a given width, embeds everything else as a fixed vector.
struct PickyEncoder {
    reject_width: u32,
}

#[async_trait]
impl ImageEncoder for PickyEncoder {
    fn fingerprint(&self) -> EncoderFingerprint {
        EncoderFingerprint::new("picky", false, 2)
    }

    async fn encode(&self, image: DynamicImage) -> lookalike_vector_store::Result<Vec<f32>> {
        if image.width() == self.reject_width {
            return Err(VectorStoreError::EncoderError("model refused input".into()));
        }
        Ok(vec![1.0, f32::from(u8::try_from(image.width()).unwrap_or(0))])
    }
}

#[tokio::test]
async fn embeds_every_valid_image_in_name_order() {
    let tmp = TempDir::new().expect("tempdir");
    let dataset = tmp.path().join("dataset");
    std::fs::create_dir(&dataset).expect("dataset");
    write_png(&dataset, "cherry.png", 4, [200, 0, 0]);
    write_png(&dataset, "apple.png", 5, [0, 200, 0]);
    write_png(&dataset, "banana.png", 6, [0, 0, 200]);

    let (store, stats) = IndexBuilder::new(&dataset, stub_encoder())
        .build()
        .await
        .expect("build");

    assert_eq!(identifiers(&store), vec!["apple.png", "banana.png", "cherry.png"]);
    assert_eq!(store.dimension(), Some(512));
    assert_eq!((stats.discovered, stats.embedded, stats.skipped), (3, 3, 0));
    assert!(stats.failures.is_empty());
    assert_eq!(stats.store_path, None);
}

#[tokio::test]
async fn corrupt_files_are_skipped_and_recorded() {
    let tmp = TempDir::new().expect("tempdir");
    write_png(tmp.path(), "good-1.png", 4, [10, 20, 30]);
    write_png(tmp.path(), "good-2.png", 4, [30, 20, 10]);
    std::fs::write(tmp.path().join("broken.jpg"), b"not a jpeg").expect("write");
    std::fs::write(tmp.path().join("empty.gif"), b"").expect("write");
    std::fs::write(tmp.path().join("README.md"), b"# dataset").expect("write");

    let (store, stats) = IndexBuilder::new(tmp.path(), stub_encoder())
        .build()
        .await
        .expect("build");

    assert_eq!(identifiers(&store), vec!["good-1.png", "good-2.png"]);
    assert_eq!((stats.discovered, stats.embedded, stats.skipped), (4, 2, 2));
    let failed: Vec<&str> = stats.failures.iter().map(|f| f.file.as_str()).collect();
    assert_eq!(failed, vec!["broken.jpg", "empty.gif"]);
}

#[tokio::test]
async fn encoder_failures_do_not_abort_the_batch() {
    let tmp = TempDir::new().expect("tempdir");
    write_png(tmp.path(), "a.png", 3, [1, 2, 3]);
    write_png(tmp.path(), "b.png", 7, [1, 2, 3]);
    write_png(tmp.path(), "c.png", 9, [1, 2, 3]);

    let progress = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&progress);
    let (store, stats) = IndexBuilder::new(tmp.path(), Arc::new(PickyEncoder { reject_width: 7 }))
        .with_progress(move |processed, total| {
            assert_eq!(total, 3);
            seen.store(processed, Ordering::SeqCst);
        })
        .build()
        .await
        .expect("build");

    assert_eq!(identifiers(&store), vec!["a.png", "c.png"]);
    assert_eq!(stats.failures.len(), 1);
    assert_eq!(stats.failures[0].file, "b.png");
    assert!(stats.failures[0].reason.contains("model refused input"));
    assert_eq!(progress.load(Ordering::SeqCst), 3);
    assert_eq!(store.encoder().map(|e| e.model_id.as_str()), Some("picky"));
}

#[tokio::test]
async fn build_and_save_publishes_a_loadable_store() {
    let tmp = TempDir::new().expect("tempdir");
    let dataset = tmp.path().join("dataset");
    std::fs::create_dir(&dataset).expect("dataset");
    write_png(&dataset, "one.png", 4, [9, 9, 9]);
    write_png(&dataset, "two.bmp", 4, [90, 90, 90]);
    let target = tmp.path().join("embeddings.json");

    let stats = IndexBuilder::new(&dataset, stub_encoder())
        .build_and_save(&target)
        .await
        .expect("build and save");
    assert_eq!(stats.store_path.as_deref(), Some(target.as_path()));

    let loaded = EmbeddingStore::load(&target).await.expect("load");
    assert_eq!(identifiers(&loaded), vec!["one.png", "two.bmp"]);
    assert_eq!(
        loaded.encoder().map(|e| e.model_id.as_str()),
        Some("stub:clip-vit-base-patch16")
    );
}

#[tokio::test]
async fn empty_directory_yields_empty_store() {
    let tmp = TempDir::new().expect("tempdir");
    let (store, stats) = IndexBuilder::new(tmp.path(), stub_encoder())
        .build()
        .await
        .expect("build");
    assert!(store.is_empty());
    assert_eq!(stats.discovered, 0);
}

#[tokio::test]
async fn missing_source_dir_fails_fast() {
    let tmp = TempDir::new().expect("tempdir");
    let err = IndexBuilder::new(tmp.path().join("missing"), stub_encoder())
        .build()
        .await
        .unwrap_err();
    assert!(matches!(err, IndexerError::InvalidPath(_)), "{err}");
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let file = tmp.path().join("file.png");
    write_png(tmp.path(), "file.png", 4, [0, 0, 0]);
    let err = IndexBuilder::new(&file, stub_encoder())
        .build()
        .await
        .unwrap_err();
    assert!(matches!(err, IndexerError::InvalidPath(_)), "{err}");
}

#[cfg(unix)]
#[tokio::test]
async fn non_utf8_file_names_are_recorded_as_failures() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let tmp = TempDir::new().expect("tempdir");
    write_png(tmp.path(), "plain.png", 4, [5, 5, 5]);
    // Both names would collapse to the same lossy identifier.
    let first = tmp.path().join(OsStr::from_bytes(b"img\xff.png"));
    let second = tmp.path().join(OsStr::from_bytes(b"img\xfe.png"));
    let made = std::fs::copy(tmp.path().join("plain.png"), &first)
        .and_then(|_| std::fs::copy(tmp.path().join("plain.png"), &second));
    if made.is_err() {
        // Filesystem refuses non-UTF-8 names.
        return;
    }

    let (store, stats) = IndexBuilder::new(tmp.path(), stub_encoder())
        .build()
        .await
        .expect("build");

    assert_eq!(identifiers(&store), vec!["plain.png"]);
    assert_eq!((stats.discovered, stats.embedded, stats.skipped), (3, 1, 2));
    assert!(stats
        .failures
        .iter()
        .all(|f| f.reason.contains("not valid UTF-8")));
}
