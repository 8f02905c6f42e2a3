//! Raster image compression for the upload tree.
//!
//! Every `.jpg`/`.jpeg`/`.png` below the source directory is downscaled to fit
//! the configured bounds and re-encoded into the mirror directory. A broken
//! image is reported and the rest of the batch continues.

use std::{
    fs,
    io::Cursor,
    path::{Path, PathBuf},
    time::SystemTime,
};

use anyhow::{Context, Result};
use image::{
    DynamicImage, ImageFormat,
    codecs::{
        jpeg::JpegEncoder,
        png::{CompressionType, FilterType as PngFilter, PngEncoder},
    },
    imageops::FilterType,
};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::infra::{config::ImagesConfig, utils::PathUtils, walk::FileWalker};

/// Summary of one compression pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompressionReport {
    pub processed: usize,
    /// Output already newer than its source
    pub skipped: usize,
    /// (relative path, reason)
    pub failed: Vec<(String, String)>,
}

impl CompressionReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

enum JobResult {
    Processed,
    Skipped,
    Failed(String, String),
}

/// Compress every supported image under `source` into `output`.
#[instrument(skip(cfg), fields(source = %source.display()))]
pub fn compress_dir(source: &Path, output: &Path, cfg: &ImagesConfig) -> Result<CompressionReport> {
    let walker = FileWalker::new(&[])?;
    let jobs: Vec<PathBuf> = walker
        .walk_relative(source)
        .into_iter()
        .filter(|rel| format_for(&PathUtils::to_slash(rel)).is_some())
        .collect();

    if jobs.is_empty() {
        debug!("no images to compress");
        return Ok(CompressionReport::default());
    }

    let results: Vec<JobResult> = jobs
        .par_iter()
        .map(|rel| {
            let src = source.join(rel);
            let dst = output.join(rel);
            match compress_one(&src, &dst, cfg) {
                Ok(true) => JobResult::Processed,
                Ok(false) => JobResult::Skipped,
                Err(e) => JobResult::Failed(PathUtils::to_slash(rel), format!("{e:#}")),
            }
        })
        .collect();

    let mut report = CompressionReport::default();
    for r in results {
        match r {
            JobResult::Processed => report.processed += 1,
            JobResult::Skipped => report.skipped += 1,
            JobResult::Failed(path, reason) => {
                warn!(%path, %reason, "image compression failed");
                report.failed.push((path, reason));
            }
        }
    }
    report.failed.sort();

    info!(
        processed = report.processed,
        skipped = report.skipped,
        failed = report.failed.len(),
        "images compressed"
    );
    Ok(report)
}

fn format_for(rel: &str) -> Option<ImageFormat> {
    match PathUtils::extension(rel).as_str() {
        "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
        "png" => Some(ImageFormat::Png),
        _ => None,
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Returns false when the output is already up to date.
fn compress_one(src: &Path, dst: &Path, cfg: &ImagesConfig) -> Result<bool> {
    if let (Some(s), Some(d)) = (modified(src), modified(dst))
        && d >= s
    {
        return Ok(false);
    }

    let format = format_for(&src.to_string_lossy())
        .with_context(|| format!("unsupported image: {}", src.display()))?;
    let img = image::open(src).with_context(|| format!("decode {}", src.display()))?;
    let img = fit_within(img, cfg.max_width, cfg.max_height);
    let bytes = encode(&img, format, cfg.quality)?;

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create image dir: {}", parent.display()))?;
    }
    fs::write(dst, bytes).with_context(|| format!("write {}", dst.display()))?;
    debug!(src = %src.display(), "compressed");
    Ok(true)
}

/// Downscale only; aspect ratio is kept
fn fit_within(img: DynamicImage, max_w: u32, max_h: u32) -> DynamicImage {
    if max_w == 0 || max_h == 0 || (img.width() <= max_w && img.height() <= max_h) {
        return img;
    }
    img.resize(max_w, max_h, FilterType::Lanczos3)
}

fn encode(img: &DynamicImage, format: ImageFormat, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    match format {
        ImageFormat::Jpeg => {
            // JPEG has no alpha channel
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            let enc = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
            rgb.write_with_encoder(enc).context("encode jpeg")?;
        }
        _ => {
            let enc =
                PngEncoder::new_with_quality(&mut buf, CompressionType::Best, PngFilter::Adaptive);
            img.write_with_encoder(enc).context("encode png")?;
        }
    }
    Ok(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};
    use tempfile::TempDir;

    fn cfg(max_w: u32, max_h: u32) -> ImagesConfig {
        ImagesConfig {
            max_width: max_w,
            max_height: max_h,
            ..ImagesConfig::default()
        }
    }

    fn write_png(path: &Path, w: u32, h: u32) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        RgbaImage::from_pixel(w, h, Rgba([10, 20, 30, 255])).save(path).unwrap();
    }

    #[test]
    fn large_images_are_downscaled_with_aspect() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("raw");
        let out = tmp.path().join("out");
        write_png(&src.join("hero.png"), 400, 200);

        let report = compress_dir(&src, &out, &cfg(100, 100)).unwrap();

        assert_eq!(report.processed, 1);
        let (w, h) = image::image_dimensions(out.join("hero.png")).unwrap();
        assert_eq!((w, h), (100, 50));
    }

    #[test]
    fn small_images_keep_their_size() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("raw");
        let out = tmp.path().join("out");
        fs::create_dir_all(src.join("sub")).unwrap();
        RgbImage::from_pixel(40, 30, Rgb([200, 100, 0]))
            .save(src.join("sub/photo.jpg"))
            .unwrap();

        let report = compress_dir(&src, &out, &cfg(1920, 1080)).unwrap();

        assert_eq!(report.processed, 1);
        assert_eq!(image::image_dimensions(out.join("sub/photo.jpg")).unwrap(), (40, 30));
    }

    #[test]
    fn corrupt_file_is_reported_and_batch_continues() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("raw");
        let out = tmp.path().join("out");
        write_png(&src.join("a.png"), 8, 8);
        fs::write(src.join("broken.png"), b"not a png").unwrap();
        fs::write(src.join("notes.txt"), b"ignored").unwrap();

        let report = compress_dir(&src, &out, &cfg(100, 100)).unwrap();

        assert_eq!(report.processed, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "broken.png");
        assert!(!report.is_clean());
        assert!(!out.join("notes.txt").exists());
    }

    #[test]
    fn up_to_date_outputs_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("raw");
        let out = tmp.path().join("out");
        write_png(&src.join("a.png"), 8, 8);

        let first = compress_dir(&src, &out, &cfg(100, 100)).unwrap();
        let second = compress_dir(&src, &out, &cfg(100, 100)).unwrap();

        assert_eq!(first.processed, 1);
        assert_eq!(second.processed, 0);
        assert_eq!(second.skipped, 1);
    }

    #[test]
    fn missing_source_dir_is_empty_report() {
        let tmp = TempDir::new().unwrap();
        let report =
            compress_dir(&tmp.path().join("nope"), &tmp.path().join("out"), &cfg(1, 1)).unwrap();
        assert_eq!(report, CompressionReport::default());
    }
}
