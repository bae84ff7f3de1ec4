//! Derivative engine: rendition generation from archived artifacts.
//!
//! All renditions are normalized to baseline JPEG regardless of the source
//! format. Alpha and palette images are composited onto opaque white before
//! encoding, since JPEG has no transparency. Resizing fits the bounding box
//! preserving aspect ratio and never upscales beyond the source dimensions.

use crate::error::{PipelineError, PipelineResult};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use shoebox_core::{ArchivePath, RenditionClass, DEFAULT_JPEG_QUALITY};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};
use uuid::Uuid;

/// Options for rendition generation.
#[derive(Clone, Copy, Debug)]
pub struct DeriveOptions {
    /// Regenerate even when the target already exists.
    pub regenerate: bool,
    /// JPEG quality (1-100).
    pub quality: u8,
}

impl Default for DeriveOptions {
    fn default() -> Self {
        Self {
            regenerate: false,
            quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// How a single rendition request ended.
#[derive(Debug)]
pub enum DeriveStatus {
    /// A new rendition was written at the path.
    Generated(PathBuf),
    /// The target already existed and regeneration was not forced.
    Skipped(PathBuf),
}

impl DeriveStatus {
    pub fn path(&self) -> &Path {
        match self {
            DeriveStatus::Generated(p) | DeriveStatus::Skipped(p) => p,
        }
    }

    pub fn generated(&self) -> bool {
        matches!(self, DeriveStatus::Generated(_))
    }
}

/// Outcome of one class in a catalog-wide pass.
#[derive(Debug)]
pub struct RenditionOutcome {
    pub class: &'static RenditionClass,
    pub result: PipelineResult<DeriveStatus>,
}

/// Generate a single rendition of `source` into the archive.
///
/// The target path is derived from `archive_path` and the class code, never
/// from the source filename, so a rendition can be rebuilt from another
/// rendition without renaming games.
#[instrument(skip(source, root, archive_path, opts), fields(class = class.code))]
pub async fn derive_rendition(
    source: &Path,
    root: &Path,
    archive_path: &ArchivePath,
    class: &'static RenditionClass,
    opts: &DeriveOptions,
) -> PipelineResult<DeriveStatus> {
    let target = archive_path.local_rendition(root, class.code);

    if !opts.regenerate
        && tokio::fs::try_exists(&target)
            .await
            .map_err(|e| PipelineError::SourceUnreadable {
                path: target.clone(),
                message: e.to_string(),
            })?
    {
        debug!(target = %target.display(), "rendition exists, skipping");
        return Ok(DeriveStatus::Skipped(target));
    }

    tokio::fs::create_dir_all(archive_path.shard_dir(root))
        .await
        .map_err(|e| PipelineError::EncodeFailed {
            class: class.code,
            message: format!("cannot create shard dir: {e}"),
        })?;

    // Decode, resize, and encode are CPU-bound; keep them off the runtime.
    let source_owned = source.to_path_buf();
    let target_owned = target.clone();
    let quality = opts.quality;
    tokio::task::spawn_blocking(move || {
        render_to_file(&source_owned, &target_owned, class, quality)
    })
    .await
    .map_err(|e| PipelineError::EncodeFailed {
        class: class.code,
        message: format!("render task failed: {e}"),
    })??;

    debug!(target = %target.display(), "generated rendition");
    Ok(DeriveStatus::Generated(target))
}

/// Generate renditions for every class in `classes` from one source.
///
/// Each class is attempted independently; one class's failure is recorded in
/// its outcome and never aborts the remaining classes.
pub async fn derive_all(
    source: &Path,
    root: &Path,
    archive_path: &ArchivePath,
    classes: &[&'static RenditionClass],
    opts: &DeriveOptions,
) -> Vec<RenditionOutcome> {
    let mut outcomes = Vec::with_capacity(classes.len());
    for class in classes {
        let result = derive_rendition(source, root, archive_path, class, opts).await;
        outcomes.push(RenditionOutcome { class, result });
    }
    outcomes
}

fn render_to_file(
    source: &Path,
    target: &Path,
    class: &'static RenditionClass,
    quality: u8,
) -> PipelineResult<()> {
    let img = image::open(source).map_err(|e| PipelineError::SourceUnreadable {
        path: source.to_path_buf(),
        message: e.to_string(),
    })?;

    let rgb = flatten_onto_white(img);
    let resized = fit_within(DynamicImage::ImageRgb8(rgb), class.max_width, class.max_height);

    let mut encoded = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut encoded, quality);
    resized
        .write_with_encoder(encoder)
        .map_err(|e| PipelineError::EncodeFailed {
            class: class.code,
            message: e.to_string(),
        })?;

    // Temp-file + rename so a crash mid-encode never leaves a truncated
    // rendition at the canonical path.
    let temp = target.with_extension(format!("tmp.{}", Uuid::new_v4()));
    let write_result = (|| -> std::io::Result<()> {
        let mut file = std::fs::File::create(&temp)?;
        file.write_all(&encoded)?;
        file.sync_all()?;
        drop(file);
        std::fs::rename(&temp, target)
    })();

    if let Err(e) = write_result {
        let _ = std::fs::remove_file(&temp);
        return Err(PipelineError::EncodeFailed {
            class: class.code,
            message: format!("write failed: {e}"),
        });
    }

    Ok(())
}

/// Composite alpha or palette images onto opaque white; passthrough for
/// already-opaque images.
fn flatten_onto_white(img: DynamicImage) -> image::RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }

    let rgba = img.to_rgba8();
    let mut out = image::RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let a = u16::from(a);
        let blend = |c: u8| ((u16::from(c) * a + 255 * (255 - a)) / 255) as u8;
        out.put_pixel(x, y, image::Rgb([blend(r), blend(g), blend(b)]));
    }
    out
}

/// Downscale to fit the bounding box, preserving aspect ratio. Sources
/// already within the box are returned unchanged (never upscaled).
fn fit_within(img: DynamicImage, max_width: u32, max_height: u32) -> DynamicImage {
    let (w, h) = (img.width(), img.height());
    let ratio = f64::min(
        f64::from(max_width) / f64::from(w),
        f64::from(max_height) / f64::from(h),
    );
    if ratio >= 1.0 {
        return img;
    }

    let new_w = ((f64::from(w) * ratio).round() as u32).max(1);
    let new_h = ((f64::from(h) * ratio).round() as u32).max(1);
    img.resize(new_w, new_h, FilterType::Lanczos3)
}
