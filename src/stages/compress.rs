//! Image compression for the output tree.
//!
//! | Format | Treatment |
//! |---|---|
//! | PNG | lossless re-encode at maximum compression (`optimize_png`) |
//! | JPEG | re-encode at `jpeg_quality`, only when configured |
//! | SVG | markup minification |
//! | GIF | left as-is |
//!
//! A result is only kept when it is smaller than the input. Every result is
//! stored in the content-addressed [cache](crate::cache), so an image that
//! has not changed since the last build is restored from the cache instead
//! of being re-encoded. Files are processed in parallel.

use super::minify;
use crate::cache::{self, CacheManifest, CacheStats};
use crate::config::ImagesConfig;
use crate::selector::SelectedFile;
use crate::stage::StageError;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{DynamicImage, ImageFormat};
use rayon::prelude::*;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressParams {
    pub optimize_png: bool,
    pub jpeg_quality: Option<u8>,
}

impl CompressParams {
    pub fn from_config(config: &ImagesConfig) -> Self {
        Self {
            optimize_png: config.optimize_png,
            jpeg_quality: config.jpeg_quality,
        }
    }

    fn hash(&self) -> String {
        cache::hash_compress_params(self.optimize_png, self.jpeg_quality)
    }
}

enum Outcome {
    Cached,
    Compressed { blob: String, source_hash: String },
}

/// Compress `files` in place, consulting and refreshing the cache in
/// `cache_dir`. With `use_cache` off the previous cache contents are ignored
/// (and replaced).
pub fn compress_images(
    files: &[SelectedFile],
    cache_dir: &Path,
    use_cache: bool,
    params: &CompressParams,
) -> Result<CacheStats, StageError> {
    let mut manifest = if use_cache {
        CacheManifest::load(cache_dir)
    } else {
        CacheManifest::empty()
    };
    fs::create_dir_all(cache_dir)?;
    let params_hash = params.hash();

    let outcomes: Vec<Result<Outcome, StageError>> = files
        .par_iter()
        .map(|file| compress_one(file, cache_dir, &manifest, params, &params_hash))
        .collect();

    let mut stats = CacheStats::default();
    for outcome in outcomes {
        match outcome? {
            Outcome::Cached => stats.hit(),
            Outcome::Compressed { blob, source_hash } => {
                stats.miss();
                manifest.insert(blob, source_hash, params_hash.clone());
            }
        }
    }
    manifest.save(cache_dir)?;
    Ok(stats)
}

fn compress_one(
    file: &SelectedFile,
    cache_dir: &Path,
    manifest: &CacheManifest,
    params: &CompressParams,
    params_hash: &str,
) -> Result<Outcome, StageError> {
    let original = fs::read(&file.path)?;
    let source_hash = cache::hash_bytes(&original);

    if let Some(blob) = manifest.find_cached(&source_hash, params_hash, cache_dir) {
        fs::copy(cache_dir.join(&blob), &file.path)?;
        tracing::trace!(file = %file.relative, %blob, "restored from cache");
        return Ok(Outcome::Cached);
    }

    let ext = extension(&file.path);
    let candidate = compress_bytes(&original, &ext, params).map_err(|source| StageError::Image {
        path: file.path.clone(),
        source,
    })?;
    let output = match candidate {
        Some(bytes) if bytes.len() < original.len() => {
            fs::write(&file.path, &bytes)?;
            tracing::debug!(
                file = %file.relative,
                before = original.len(),
                after = bytes.len(),
                "compressed"
            );
            bytes
        }
        _ => original,
    };

    let blob = cache::blob_name(&source_hash, params_hash, &ext);
    fs::write(cache_dir.join(&blob), &output)?;
    Ok(Outcome::Compressed { blob, source_hash })
}

fn extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

/// Re-encode one image. `None` means the format is passed through.
pub fn compress_bytes(
    bytes: &[u8],
    extension: &str,
    params: &CompressParams,
) -> Result<Option<Vec<u8>>, image::ImageError> {
    match extension {
        "png" if params.optimize_png => {
            let img = image::load_from_memory_with_format(bytes, ImageFormat::Png)?;
            let mut out = Vec::new();
            let encoder =
                PngEncoder::new_with_quality(&mut out, CompressionType::Best, FilterType::Adaptive);
            img.write_with_encoder(encoder)?;
            Ok(Some(out))
        }
        "jpg" | "jpeg" => match params.jpeg_quality {
            Some(quality) => {
                let img = image::load_from_memory_with_format(bytes, ImageFormat::Jpeg)?;
                let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
                let mut out = Vec::new();
                rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut out, quality))?;
                Ok(Some(out))
            }
            None => Ok(None),
        },
        "svg" => Ok(std::str::from_utf8(bytes)
            .ok()
            .map(|text| minify::minify_svg(text).into_bytes())),
        _ => Ok(None),
    }
}
