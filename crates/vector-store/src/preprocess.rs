use crate::error::{Result, VectorStoreError};
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};
use ndarray::Array4;
use serde::Deserialize;
use std::path::Path;

const CLIP_IMAGE_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];
const CLIP_IMAGE_STD: [f32; 3] = [0.268_629_54, 0.261_302_58, 0.275_777_1];

/// Image → tensor preprocessing for CLIP-style vision towers.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessConfig {
    pub shortest_edge: u32,
    pub crop_size: u32,
    pub rescale_factor: f32,
    pub image_mean: [f32; 3],
    pub image_std: [f32; 3],
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self::clip(224)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SizeSpec {
    Scalar(u32),
    ShortestEdge { shortest_edge: u32 },
    Dims { height: u32, width: u32 },
}

impl SizeSpec {
    fn edge(&self) -> u32 {
        match self {
            Self::Scalar(v) | Self::ShortestEdge { shortest_edge: v } => *v,
            Self::Dims { height, width } => (*height).min(*width),
        }
    }
}

/// Subset of a Hugging Face `preprocessor_config.json`.
#[derive(Debug, Deserialize)]
struct RawPreprocessorConfig {
    size: Option<SizeSpec>,
    crop_size: Option<SizeSpec>,
    rescale_factor: Option<f32>,
    image_mean: Option<[f32; 3]>,
    image_std: Option<[f32; 3]>,
}

impl PreprocessConfig {
    #[must_use]
    pub const fn clip(image_size: u32) -> Self {
        Self {
            shortest_edge: image_size,
            crop_size: image_size,
            rescale_factor: 1.0 / 255.0,
            image_mean: CLIP_IMAGE_MEAN,
            image_std: CLIP_IMAGE_STD,
        }
    }

    /// Read `preprocessor_config.json`, falling back to `base` for any field
    /// the file leaves out.
    pub fn from_file(path: &Path, base: &Self) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            VectorStoreError::EncoderError(format!(
                "Failed to read preprocessor config {}: {e}",
                path.display()
            ))
        })?;
        Self::from_json(&raw, base).map_err(|e| {
            VectorStoreError::EncoderError(format!(
                "Invalid preprocessor config {}: {e}",
                path.display()
            ))
        })
    }

    fn from_json(raw: &str, base: &Self) -> std::result::Result<Self, String> {
        let parsed: RawPreprocessorConfig = serde_json::from_str(raw).map_err(|e| e.to_string())?;
        let config = Self {
            shortest_edge: parsed.size.map_or(base.shortest_edge, |s| s.edge()),
            crop_size: parsed.crop_size.map_or(base.crop_size, |s| s.edge()),
            rescale_factor: parsed.rescale_factor.unwrap_or(base.rescale_factor),
            image_mean: parsed.image_mean.unwrap_or(base.image_mean),
            image_std: parsed.image_std.unwrap_or(base.image_std),
        };
        if config.shortest_edge == 0 || config.crop_size == 0 {
            return Err("image size must be positive".to_string());
        }
        if config.image_std.iter().any(|s| *s == 0.0) {
            return Err("image_std must be non-zero".to_string());
        }
        Ok(config)
    }

    /// Resize the shortest edge, centre-crop, rescale and normalise into an
    /// NCHW tensor of shape `[1, 3, crop, crop]`.
    #[must_use]
    pub fn pixel_values(&self, image: &DynamicImage) -> Array4<f32> {
        let rgb = image.to_rgb8();
        let resized = resize_shortest_edge(&rgb, self.shortest_edge);

        let crop = self.crop_size;
        let (w, h) = resized.dimensions();
        // Negative offsets pad with black when the image is smaller than the crop.
        let left = (i64::from(w) - i64::from(crop)) / 2;
        let top = (i64::from(h) - i64::from(crop)) / 2;

        let size = crop as usize;
        let mut array = Array4::<f32>::zeros((1, 3, size, size));
        for y in 0..size {
            for x in 0..size {
                let sx = left + x as i64;
                let sy = top + y as i64;
                let pixel = if sx >= 0 && sy >= 0 && sx < i64::from(w) && sy < i64::from(h) {
                    resized.get_pixel(sx as u32, sy as u32).0
                } else {
                    [0, 0, 0]
                };
                for c in 0..3 {
                    let scaled = f32::from(pixel[c]) * self.rescale_factor;
                    array[[0, c, y, x]] = (scaled - self.image_mean[c]) / self.image_std[c];
                }
            }
        }
        array
    }
}

fn resize_shortest_edge(image: &RgbImage, edge: u32) -> RgbImage {
    let (w, h) = image.dimensions();
    let short = w.min(h).max(1);
    if short == edge {
        return image.clone();
    }
    let scale = edge as f32 / short as f32;
    let new_w = ((w as f32) * scale).round().max(1.0) as u32;
    let new_h = ((h as f32) * scale).round().max(1.0) as u32;
    imageops::resize(image, new_w, new_h, FilterType::CatmullRom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn output_shape_follows_crop_size() {
        let config = PreprocessConfig::clip(16);
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 20, Rgb([255, 0, 128])));
        let tensor = config.pixel_values(&image);
        assert_eq!(tensor.shape(), &[1, 3, 16, 16]);
    }

    #[test]
    fn uniform_image_normalises_per_channel() {
        let config = PreprocessConfig::clip(8);
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([255, 0, 255])));
        let tensor = config.pixel_values(&image);

        let red = (1.0 - CLIP_IMAGE_MEAN[0]) / CLIP_IMAGE_STD[0];
        let green = (0.0 - CLIP_IMAGE_MEAN[1]) / CLIP_IMAGE_STD[1];
        assert!((tensor[[0, 0, 3, 3]] - red).abs() < 1e-5);
        assert!((tensor[[0, 1, 0, 7]] - green).abs() < 1e-5);
    }

    #[test]
    fn parses_hf_preprocessor_config_shapes() {
        let base = PreprocessConfig::default();
        let dict_form = r#"{
            "crop_size": {"height": 256, "width": 256},
            "size": {"shortest_edge": 288},
            "image_mean": [0.5, 0.5, 0.5],
            "image_std": [0.5, 0.5, 0.5],
            "do_resize": true
        }"#;
        let config = PreprocessConfig::from_json(dict_form, &base).unwrap();
        assert_eq!(config.shortest_edge, 288);
        assert_eq!(config.crop_size, 256);
        assert_eq!(config.image_mean, [0.5; 3]);
        assert!((config.rescale_factor - 1.0 / 255.0).abs() < 1e-9);

        let scalar_form = r#"{"crop_size": 224, "size": 224}"#;
        let config = PreprocessConfig::from_json(scalar_form, &base).unwrap();
        assert_eq!(config, base);

        assert!(PreprocessConfig::from_json(r#"{"image_std": [0.0, 1.0, 1.0]}"#, &base).is_err());
    }
}
