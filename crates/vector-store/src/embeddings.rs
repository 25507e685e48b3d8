use crate::error::{Result, VectorStoreError};
use crate::models::{
    builtin_model_spec, resolve_model_spec, EmbeddingMode, EncoderConfig, ModelSpec,
};
use crate::preprocess::PreprocessConfig;
use crate::similarity::is_zero_vector;
use crate::types::EncoderFingerprint;
use async_trait::async_trait;
use image::DynamicImage;
use ndarray::{Axis, Ix2};
use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, ExecutionProvider, ExecutionProviderDispatch,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use ort::Error as OrtError;
use std::sync::{Arc, Mutex};
use tokio::task::spawn_blocking;

/// Capability to turn a decoded image into a fixed-length vector.
///
/// The same configuration must be used when building a store and when
/// querying it; `fingerprint` is what gets compared.
#[async_trait]
pub trait ImageEncoder: Send + Sync {
    fn fingerprint(&self) -> EncoderFingerprint;

    fn dimension(&self) -> usize {
        self.fingerprint().dimension
    }

    async fn encode(&self, image: DynamicImage) -> Result<Vec<f32>>;
}

const IMAGE_INPUT_NAME: &str = "pixel_values";
const IMAGE_OUTPUT_NAME: &str = "image_embeds";

struct OrtBackend {
    session: Mutex<Session>,
    preprocess: PreprocessConfig,
    input_name: String,
    output_name: String,
    dimension: usize,
}

impl OrtBackend {
    fn new(spec: &ModelSpec, config: &EncoderConfig) -> Result<Self> {
        let assets = spec.assets_in(&config.model_dir, config.quantized);
        if !assets.model_path.exists() {
            return Err(VectorStoreError::EncoderError(format!(
                "Vision model for '{}' is missing. Expected ONNX at {} (set LOOKALIKE_MODEL_DIR to point at your models directory).",
                spec.id,
                assets.model_path.display(),
            )));
        }

        let base = PreprocessConfig::clip(spec.image_size);
        let preprocess = if assets.preprocessor_path.exists() {
            PreprocessConfig::from_file(&assets.preprocessor_path, &base)?
        } else {
            log::debug!(
                "No preprocessor config at {}; using CLIP defaults",
                assets.preprocessor_path.display()
            );
            base
        };

        let providers = build_execution_providers(config.use_cuda);
        let session = Session::builder()
            .map_err(|e| to_encoder_error(&e))?
            .with_intra_threads(default_intra_threads())
            .map_err(|e| {
                VectorStoreError::EncoderError(format!("Failed to set ORT intra threads: {e}"))
            })?
            .with_execution_providers(providers)
            .map_err(|e| {
                VectorStoreError::EncoderError(format!(
                    "Failed to register execution providers: {e}"
                ))
            })?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                VectorStoreError::EncoderError(format!("Failed to set optimization level: {e}"))
            })?
            .commit_from_file(&assets.model_path)
            .map_err(|e| {
                VectorStoreError::EncoderError(format!("Failed to load ONNX model: {e}"))
            })?;

        let input_name = session
            .inputs
            .iter()
            .find(|input| input.name == IMAGE_INPUT_NAME)
            .or_else(|| session.inputs.first())
            .map_or_else(|| IMAGE_INPUT_NAME.to_string(), |input| input.name.clone());
        let output_name = session
            .outputs
            .iter()
            .find(|output| output.name == IMAGE_OUTPUT_NAME)
            .or_else(|| session.outputs.first())
            .map_or_else(|| IMAGE_OUTPUT_NAME.to_string(), |output| output.name.clone());

        log::info!(
            "Loaded ONNX vision model '{}' (dim {}, crop {}, {})",
            spec.id,
            spec.dimension,
            preprocess.crop_size,
            if config.quantized { "quantized" } else { "fp32" }
        );

        Ok(Self {
            session: Mutex::new(session),
            preprocess,
            input_name,
            output_name,
            dimension: spec.dimension,
        })
    }

    fn encode_blocking(&self, image: &DynamicImage) -> Result<Vec<f32>> {
        let pixel_values = self.preprocess.pixel_values(image);
        let tensor = Tensor::from_array(pixel_values).map_err(|e| to_encoder_error(&e))?;

        let array = {
            let mut session = self.session.lock().map_err(|_| {
                VectorStoreError::EncoderError("Failed to lock ONNX session".into())
            })?;
            let outputs = session
                .run(ort::inputs![self.input_name.as_str() => tensor])
                .map_err(|e| {
                    VectorStoreError::EncoderError(format!("ONNX forward failed: {e}"))
                })?;
            let output = outputs.get(self.output_name.as_str()).ok_or_else(|| {
                VectorStoreError::EncoderError(format!(
                    "ONNX model produced no '{}' output",
                    self.output_name
                ))
            })?;
            let array = output
                .try_extract_array::<f32>()
                .map_err(|e| {
                    VectorStoreError::EncoderError(format!("Failed to decode ONNX output: {e}"))
                })?
                .to_owned();

            drop(outputs);
            drop(session);

            array
        };

        embedding_from_output(array, self.dimension)
    }
}

/// The first row of a `[batch, dim]` projection output.
fn embedding_from_output(
    array: ndarray::ArrayD<f32>,
    expected_dimension: usize,
) -> Result<Vec<f32>> {
    if array.ndim() != 2 {
        return Err(VectorStoreError::EncoderError(format!(
            "Unexpected ONNX output dims: {:?}",
            array.shape()
        )));
    }
    let embeddings = array
        .into_dimensionality::<Ix2>()
        .map_err(|e| VectorStoreError::EncoderError(format!("Bad output shape: {e}")))?;
    let row = embeddings.index_axis(Axis(0), 0).to_vec();
    if row.len() != expected_dimension {
        return Err(VectorStoreError::InvalidDimension {
            expected: expected_dimension,
            actual: row.len(),
        });
    }
    if row.iter().any(|v| !v.is_finite()) {
        return Err(VectorStoreError::EncoderError(
            "Vision embedding contains non-finite values".to_string(),
        ));
    }
    Ok(row)
}

fn default_intra_threads() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    // Leave headroom for the rest of the process.
    if cpus <= 4 {
        1
    } else if cpus <= 12 {
        2
    } else {
        4
    }
}

fn build_execution_providers(use_cuda: bool) -> Vec<ExecutionProviderDispatch> {
    if use_cuda {
        let cuda = CUDAExecutionProvider::default();
        match cuda.is_available() {
            Ok(true) => return vec![cuda.build(), CPUExecutionProvider::default().build()],
            Ok(false) => log::warn!("CUDA execution provider unavailable, using CPU"),
            Err(err) => log::warn!("CUDA execution provider check failed, using CPU: {err}"),
        }
    }
    vec![CPUExecutionProvider::default().build()]
}

fn to_encoder_error(error: &OrtError) -> VectorStoreError {
    VectorStoreError::EncoderError(format!("{error}"))
}

/// Deterministic stand-in for the vision model: hashes the decoded pixels into
/// a unit vector. Identical images map to identical vectors.
#[derive(Clone, Copy, Debug)]
struct StubBackend {
    dimension: usize,
}

impl StubBackend {
    fn encode(self, image: &DynamicImage) -> Vec<f32> {
        let rgb = image.to_rgb8();
        let (w, h) = rgb.dimensions();
        let mut hash = fnv1a_64(&w.to_le_bytes());
        hash = fnv1a_continue(hash, &h.to_le_bytes());
        hash = fnv1a_continue(hash, rgb.as_raw());
        stub_vector(hash, self.dimension)
    }
}

fn stub_vector(seed: u64, dimension: usize) -> Vec<f32> {
    let mut state = seed ^ (dimension as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    let mut vec = Vec::with_capacity(dimension);
    for _ in 0..dimension {
        let bits = splitmix64(&mut state);
        let high = (bits >> 32) as u32;
        let mantissa = high >> 9;
        let unit = f32::from_bits(0x3f80_0000 | mantissa) - 1.0;
        vec.push(unit.mul_add(2.0, -1.0));
    }
    normalize(&mut vec);
    vec
}

fn normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vec {
        *value /= norm;
    }
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;

fn fnv1a_64(bytes: &[u8]) -> u64 {
    fnv1a_continue(FNV_OFFSET, bytes)
}

fn fnv1a_continue(mut hash: u64, bytes: &[u8]) -> u64 {
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

const fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

enum EmbeddingBackend {
    Ort(Arc<OrtBackend>),
    Stub(StubBackend),
}

/// Image embedding model selected by an [`EncoderConfig`].
pub struct EmbeddingModel {
    backend: EmbeddingBackend,
    fingerprint: EncoderFingerprint,
}

impl EmbeddingModel {
    pub fn new(config: &EncoderConfig) -> Result<Self> {
        match config.mode {
            EmbeddingMode::Stub => {
                let dimension = match builtin_model_spec(&config.model_id) {
                    Some(spec) => spec.dimension,
                    None => resolve_model_spec(&config.model_dir, &config.model_id)?.dimension,
                };
                Ok(Self {
                    backend: EmbeddingBackend::Stub(StubBackend { dimension }),
                    fingerprint: EncoderFingerprint::new(
                        format!("stub:{}", config.model_id),
                        config.quantized,
                        dimension,
                    ),
                })
            }
            EmbeddingMode::Fast => {
                let spec = resolve_model_spec(&config.model_dir, &config.model_id)?;
                let backend = OrtBackend::new(&spec, config)?;
                Ok(Self {
                    fingerprint: EncoderFingerprint::new(
                        spec.id.to_string(),
                        config.quantized,
                        spec.dimension,
                    ),
                    backend: EmbeddingBackend::Ort(Arc::new(backend)),
                })
            }
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::new(&EncoderConfig::from_env()?)
    }
}

#[async_trait]
impl ImageEncoder for EmbeddingModel {
    fn fingerprint(&self) -> EncoderFingerprint {
        self.fingerprint.clone()
    }

    async fn encode(&self, image: DynamicImage) -> Result<Vec<f32>> {
        let vector = match &self.backend {
            EmbeddingBackend::Stub(stub) => {
                let stub = *stub;
                spawn_blocking(move || stub.encode(&image))
                    .await
                    .map_err(|e| VectorStoreError::EncoderError(format!("Join error: {e}")))?
            }
            EmbeddingBackend::Ort(backend) => {
                let backend = backend.clone();
                spawn_blocking(move || backend.encode_blocking(&image))
                    .await
                    .map_err(|e| VectorStoreError::EncoderError(format!("Join error: {e}")))??
            }
        };
        if is_zero_vector(&vector) {
            return Err(VectorStoreError::ZeroVector);
        }
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::cosine_similarity;
    use image::{Rgb, RgbImage};

    fn solid(w: u32, h: u32, rgb: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb(rgb)))
    }

    #[tokio::test]
    async fn stub_is_deterministic_and_unit_length() {
        let model = EmbeddingModel::new(&EncoderConfig::stub("clip-vit-base-patch16")).unwrap();
        assert_eq!(model.dimension(), 512);

        let a = model.encode(solid(8, 8, [1, 2, 3])).await.unwrap();
        let b = model.encode(solid(8, 8, [1, 2, 3])).await.unwrap();
        assert_eq!(a, b);
        let norm = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);

        let c = model.encode(solid(8, 8, [3, 2, 1])).await.unwrap();
        assert_ne!(a, c);
        let d = model.encode(solid(8, 9, [1, 2, 3])).await.unwrap();
        assert_ne!(a, d);
        assert!(cosine_similarity(&a, &c).unwrap() < 0.5);
    }

    #[test]
    fn stub_fingerprint_never_matches_real_model() {
        let model = EmbeddingModel::new(&EncoderConfig::stub("Xenova/clip-vit-large-patch14")).unwrap();
        let fp = model.fingerprint();
        assert_eq!(fp.model_id, "stub:clip-vit-large-patch14");
        assert_eq!(fp.dimension, 768);
        assert!(!fp.quantized);
    }

    #[test]
    fn fast_mode_without_assets_is_encoder_failure() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = EncoderConfig {
            mode: EmbeddingMode::Fast,
            model_dir: tmp.path().to_path_buf(),
            ..EncoderConfig::stub("clip-vit-base-patch16")
        };
        let Err(err) = EmbeddingModel::new(&config) else {
            panic!("expected missing model error");
        };
        assert_eq!(err.kind(), crate::error::ErrorKind::EncoderFailure);
        assert!(err.to_string().contains("vision_model.onnx"), "{err}");
    }

    #[test]
    fn output_rows_are_validated() {
        let ok = ndarray::Array::from_shape_vec((1, 3), vec![0.1, 0.2, 0.3])
            .unwrap()
            .into_dyn();
        assert_eq!(embedding_from_output(ok, 3).unwrap(), vec![0.1, 0.2, 0.3]);

        let wrong_dim = ndarray::Array::from_shape_vec((1, 2), vec![0.1, 0.2])
            .unwrap()
            .into_dyn();
        assert!(matches!(
            embedding_from_output(wrong_dim, 3),
            Err(VectorStoreError::InvalidDimension { .. })
        ));

        let hidden = ndarray::Array::<f32, _>::zeros((1, 4, 3)).into_dyn();
        assert!(embedding_from_output(hidden, 3).is_err());
    }

    #[tokio::test]
    #[ignore = "Requires CLIP ONNX assets under LOOKALIKE_MODEL_DIR"]
    async fn test_encode_with_onnx_model() {
        let model = EmbeddingModel::new(&EncoderConfig {
            mode: EmbeddingMode::Fast,
            ..EncoderConfig::from_env().unwrap()
        })
        .unwrap();
        let embedding = model.encode(solid(320, 240, [200, 40, 40])).await.unwrap();
        assert_eq!(embedding.len(), model.dimension());
    }
}
