//! Raster and SVG image transforms.

use anyhow::Context;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{DynamicImage, ImageFormat};

use super::extension;
use crate::globs::SourceFile;
use crate::sink::OutputSink;
use crate::task::Action;

const JPEG_QUALITY: u8 = 80;

/// Recompress PNG, JPEG and SVG files, keeping whichever of the original
/// and the recompressed file is smaller. Other files are copied.
#[derive(Debug, Default)]
pub struct OptimizeImages;

fn optimize(path: &Path, original: &[u8]) -> anyhow::Result<Option<Vec<u8>>> {
    let encoded = match extension(path).as_str() {
        "png" => {
            let img = image::load_from_memory_with_format(original, ImageFormat::Png)?;
            let mut buf = Vec::new();
            img.write_with_encoder(PngEncoder::new_with_quality(
                &mut buf,
                CompressionType::Best,
                FilterType::Adaptive,
            ))?;
            buf
        }
        "jpg" | "jpeg" => {
            let img = image::load_from_memory_with_format(original, ImageFormat::Jpeg)?;
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            let mut buf = Vec::new();
            rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY))?;
            buf
        }
        "svg" => {
            let tree = usvg::Tree::from_data(original, &usvg::Options::default())
                .context("Failed to parse SVG")?;
            let write_options = usvg::WriteOptions {
                indent: usvg::Indent::None,
                ..Default::default()
            };
            tree.to_string(&write_options).into_bytes()
        }
        _ => return Ok(None),
    };
    Ok(Some(encoded))
}

impl Action for OptimizeImages {
    fn run(&self, files: &[SourceFile], out: &OutputSink) -> anyhow::Result<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(files.len());
        for file in files {
            let original = fs::read(&file.path)
                .with_context(|| format!("Failed to read {}", file.path.display()))?;
            let optimized = optimize(&file.path, &original)
                .with_context(|| format!("Failed to optimize {}", file.path.display()))?;

            let bytes = match optimized {
                Some(smaller) if smaller.len() < original.len() => smaller,
                _ => original,
            };
            written.push(out.write(file.relative(), bytes)?);
        }
        Ok(written)
    }

    fn describe(&self) -> &str {
        "optimize-images"
    }
}

/// Encode PNG and JPEG files as WebP next to their relative path.
#[derive(Debug, Default)]
pub struct ConvertWebp;

impl Action for ConvertWebp {
    fn run(&self, files: &[SourceFile], out: &OutputSink) -> anyhow::Result<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(files.len());
        for file in files {
            if !matches!(extension(&file.path).as_str(), "png" | "jpg" | "jpeg") {
                continue;
            }

            let img = image::open(&file.path)
                .with_context(|| format!("Failed to decode {}", file.path.display()))?;
            // The WebP encoder only accepts 8-bit RGB(A)
            let rgba = DynamicImage::ImageRgba8(img.to_rgba8());

            let mut buf = Cursor::new(Vec::new());
            rgba.write_to(&mut buf, ImageFormat::WebP)
                .with_context(|| format!("Failed to encode {}", file.path.display()))?;

            written.push(out.write(file.relative().with_extension("webp"), buf.into_inner())?);
        }
        Ok(written)
    }

    fn describe(&self) -> &str {
        "webp"
    }
}
