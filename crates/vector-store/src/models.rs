use crate::error::{Result, VectorStoreError};
use crate::paths::{model_dir, MODELS_MANIFEST_NAME};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::fmt::{self, Display};
use std::path::{Component, Path, PathBuf};

pub const DEFAULT_MODEL_ID: &str = "clip-vit-base-patch16";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EmbeddingMode {
    /// ONNX Runtime inference over real model assets.
    Fast,
    /// Deterministic pixel hash; no model assets needed.
    Stub,
}

impl EmbeddingMode {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "fast" => Ok(Self::Fast),
            "stub" => Ok(Self::Stub),
            other => Err(VectorStoreError::EncoderError(format!(
                "Unsupported LOOKALIKE_EMBEDDING_MODE '{other}' (expected 'fast' or 'stub')"
            ))),
        }
    }

    fn from_env() -> Result<Self> {
        env::var("LOOKALIKE_EMBEDDING_MODE").map_or(Ok(Self::Fast), |raw| Self::parse(&raw))
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Stub => "stub",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ModelId(String);

impl ModelId {
    #[must_use]
    pub fn from_raw(raw: &str) -> Self {
        let lowered = raw.trim().to_ascii_lowercase();
        // Accept Hugging Face repo names such as `Xenova/clip-vit-base-patch16`.
        let name = lowered.rsplit('/').next().unwrap_or(lowered.as_str());
        Self(name.to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything needed to build an encoder. Both the build and the query side
/// must use equal configurations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncoderConfig {
    pub mode: EmbeddingMode,
    pub model_id: ModelId,
    pub quantized: bool,
    pub model_dir: PathBuf,
    pub use_cuda: bool,
}

impl EncoderConfig {
    /// Read `LOOKALIKE_EMBEDDING_MODE`, `LOOKALIKE_MODEL`, `LOOKALIKE_QUANTIZED`,
    /// `LOOKALIKE_MODEL_DIR` and `LOOKALIKE_USE_CUDA`.
    pub fn from_env() -> Result<Self> {
        let model = env::var("LOOKALIKE_MODEL").unwrap_or_else(|_| DEFAULT_MODEL_ID.to_string());
        Ok(Self {
            mode: EmbeddingMode::from_env()?,
            model_id: ModelId::from_raw(&model),
            quantized: env_flag("LOOKALIKE_QUANTIZED"),
            model_dir: model_dir(),
            use_cuda: env_flag("LOOKALIKE_USE_CUDA"),
        })
    }

    #[must_use]
    pub fn stub(model_id: &str) -> Self {
        Self {
            mode: EmbeddingMode::Stub,
            model_id: ModelId::from_raw(model_id),
            quantized: false,
            model_dir: PathBuf::new(),
            use_cuda: false,
        }
    }
}

fn env_flag(name: &str) -> bool {
    env::var(name)
        .map(|v| {
            let v = v.trim();
            v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes")
        })
        .unwrap_or(false)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelSpec {
    pub id: ModelId,
    pub dimension: usize,
    pub image_size: u32,
    vision_rel_path: PathBuf,
    quantized_rel_path: PathBuf,
    preprocessor_rel_path: PathBuf,
}

/// Resolved on-disk locations for one model.
#[derive(Clone, Debug)]
pub struct ModelAssets {
    pub model_path: PathBuf,
    pub preprocessor_path: PathBuf,
}

impl ModelSpec {
    fn builtin(id: &str, dimension: usize) -> Self {
        Self {
            id: ModelId(id.to_string()),
            dimension,
            image_size: 224,
            vision_rel_path: PathBuf::from("onnx/vision_model.onnx"),
            quantized_rel_path: PathBuf::from("onnx/vision_model_quantized.onnx"),
            preprocessor_rel_path: PathBuf::from("preprocessor_config.json"),
        }
    }

    #[must_use]
    pub fn assets_in(&self, model_dir: &Path, quantized: bool) -> ModelAssets {
        let root = model_dir.join(self.id.as_str());
        let rel = if quantized {
            &self.quantized_rel_path
        } else {
            &self.vision_rel_path
        };
        ModelAssets {
            model_path: root.join(rel),
            preprocessor_path: root.join(&self.preprocessor_rel_path),
        }
    }
}

fn builtin_specs() -> HashMap<ModelId, ModelSpec> {
    [
        ModelSpec::builtin("clip-vit-base-patch16", 512),
        ModelSpec::builtin("clip-vit-base-patch32", 512),
        ModelSpec::builtin("clip-vit-large-patch14", 768),
    ]
    .into_iter()
    .map(|spec| (spec.id.clone(), spec))
    .collect()
}

#[derive(Debug, Deserialize)]
struct ModelsManifest {
    schema_version: u32,
    models: Vec<ManifestModel>,
}

#[derive(Debug, Deserialize)]
struct ManifestModel {
    id: String,
    dimension: usize,
    #[serde(default)]
    image_size: Option<u32>,
    #[serde(default)]
    assets: Vec<ManifestAsset>,
}

#[derive(Debug, Deserialize)]
struct ManifestAsset {
    path: String,
}

/// Look up the spec for `id`: manifest entries in `model_dir` first, then the
/// built-in CLIP specs.
pub fn resolve_model_spec(model_dir: &Path, id: &ModelId) -> Result<ModelSpec> {
    let mut specs = builtin_specs();
    specs.extend(load_manifest_specs(model_dir)?);
    specs.remove(id).ok_or_else(|| {
        let mut available: Vec<String> = specs.keys().map(ToString::to_string).collect();
        available.sort();
        VectorStoreError::EncoderError(format!(
            "Unknown embedding model id '{id}'. Available: {}",
            available.join(", ")
        ))
    })
}

/// Built-in spec only, for backends that never touch the filesystem.
pub fn builtin_model_spec(id: &ModelId) -> Option<ModelSpec> {
    builtin_specs().remove(id)
}

fn load_manifest_specs(model_dir: &Path) -> Result<HashMap<ModelId, ModelSpec>> {
    let manifest_path = model_dir.join(MODELS_MANIFEST_NAME);
    if !manifest_path.exists() {
        return Ok(HashMap::new());
    }

    let raw = std::fs::read_to_string(&manifest_path).map_err(|e| {
        VectorStoreError::EncoderError(format!(
            "Failed to read models manifest {}: {e}",
            manifest_path.display()
        ))
    })?;
    let manifest: ModelsManifest = serde_json::from_str(&raw).map_err(|e| {
        VectorStoreError::EncoderError(format!(
            "Invalid models manifest {}: {e}",
            manifest_path.display()
        ))
    })?;
    if manifest.schema_version != 1 {
        return Err(VectorStoreError::EncoderError(format!(
            "Unsupported models manifest schema_version {} (expected 1)",
            manifest.schema_version
        )));
    }

    let mut specs = HashMap::new();
    for model in &manifest.models {
        let id = ModelId::from_raw(&model.id);
        let mut spec = ModelSpec::builtin(id.as_str(), model.dimension);
        if let Some(size) = model.image_size {
            spec.image_size = size;
        }

        let prefix = format!("{}/", model.id);
        let mut vision: Option<PathBuf> = None;
        let mut quantized: Option<PathBuf> = None;
        let mut preprocessor: Option<PathBuf> = None;
        for asset in &model.assets {
            let Some(rel) = asset.path.strip_prefix(&prefix) else {
                continue;
            };
            let asset_path = Path::new(rel);
            let file_name = asset_path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_ascii_lowercase();
            if file_name.ends_with(".onnx") {
                let slot = if file_name.contains("quantized") {
                    &mut quantized
                } else {
                    &mut vision
                };
                if slot.is_none() {
                    *slot = Some(safe_rel_path_from_manifest(&model.id, rel)?);
                }
            } else if file_name == "preprocessor_config.json" && preprocessor.is_none() {
                preprocessor = Some(safe_rel_path_from_manifest(&model.id, rel)?);
            }
        }
        if let Some(path) = vision {
            spec.vision_rel_path = path;
        }
        if let Some(path) = quantized {
            spec.quantized_rel_path = path;
        }
        if let Some(path) = preprocessor {
            spec.preprocessor_rel_path = path;
        }
        specs.insert(id, spec);
    }
    Ok(specs)
}

fn validate_relative_manifest_path(path: &Path) -> std::result::Result<(), &'static str> {
    let mut has_component = false;
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => return Err("path must be relative"),
            Component::ParentDir => return Err("path must not contain '..'"),
            Component::CurDir => {}
            Component::Normal(_) => has_component = true,
        }
    }
    if has_component {
        Ok(())
    } else {
        Err("path is empty")
    }
}

fn safe_rel_path_from_manifest(model_id: &str, rel: &str) -> Result<PathBuf> {
    let path = Path::new(rel);
    validate_relative_manifest_path(path).map_err(|reason| {
        VectorStoreError::EncoderError(format!(
            "Invalid models manifest asset path for model '{model_id}': '{rel}' ({reason})"
        ))
    })?;
    Ok(path.to_path_buf())
}
