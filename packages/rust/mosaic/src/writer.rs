//! PNG output of mosaics and thumbnails.

use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use ndarray::{Array2, Array3};
use tracing::{info, instrument, warn};
use xnatkit_shared::{Result, XnatKitError};

use crate::tile::build_mosaic;

/// Thumbnails are this many times smaller than the full mosaic.
const THUMBNAIL_RATIO: u32 = 3;

#[derive(Debug, Clone, Copy, Default)]
pub struct MosaicOptions {
    /// Tiles per row; `None` picks a square-ish grid.
    pub columns: Option<usize>,
    /// Also write `<stem>_thumb.png`.
    pub thumbnail: bool,
}

/// Files written by [`write_mosaic`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MosaicFiles {
    pub original: PathBuf,
    pub thumbnail: Option<PathBuf>,
}

/// Render `volume` as a grayscale PNG mosaic at `out`.
///
/// `.png` is appended when `out` has another extension. Existing outputs
/// are never replaced.
#[instrument(skip_all, fields(out = %out.display()))]
pub fn write_mosaic(volume: &Array3<f32>, out: &Path, opts: &MosaicOptions) -> Result<MosaicFiles> {
    let original = png_path(out);

    let parent = original
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    if !parent.is_dir() {
        return Err(XnatKitError::validation(format!(
            "output directory not found: {}",
            parent.display()
        )));
    }
    ensure_absent(&original)?;

    let thumbnail = if opts.thumbnail {
        let stem = original
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let path = parent.join(format!("{stem}_thumb.png"));
        ensure_absent(&path)?;
        Some(path)
    } else {
        None
    };

    let image = to_gray(&build_mosaic(volume, opts.columns));
    save(&image, &original)?;
    info!(path = %original.display(), width = image.width(), height = image.height(), "mosaic written");

    if let Some(path) = &thumbnail {
        let small = imageops::resize(
            &image,
            (image.width() / THUMBNAIL_RATIO).max(1),
            (image.height() / THUMBNAIL_RATIO).max(1),
            FilterType::Triangle,
        );
        save(&small, path)?;
        info!(path = %path.display(), "thumbnail written");
    }

    Ok(MosaicFiles {
        original,
        thumbnail,
    })
}

fn png_path(out: &Path) -> PathBuf {
    let is_png = out
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("png"));
    if is_png {
        return out.to_path_buf();
    }
    let mut name = out.as_os_str().to_owned();
    name.push(".png");
    let path = PathBuf::from(name);
    warn!(path = %path.display(), "output name changed to carry the .png extension");
    path
}

fn ensure_absent(path: &Path) -> Result<()> {
    if path.exists() {
        return Err(XnatKitError::validation(format!(
            "output file already exists: {}",
            path.display()
        )));
    }
    Ok(())
}

/// Min/max normalise to 8-bit; a constant image is black.
fn to_gray(mosaic: &Array2<f32>) -> GrayImage {
    let (min, max) = mosaic
        .iter()
        .filter(|v| v.is_finite())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = max - min;

    let (height, width) = mosaic.dim();
    GrayImage::from_fn(width as u32, height as u32, |x, y| {
        let v = mosaic[[y as usize, x as usize]];
        let level = if range > 0.0 && v.is_finite() {
            ((v - min) / range * 255.0).round() as u8
        } else {
            0
        };
        Luma([level])
    })
}

fn save(image: &GrayImage, path: &Path) -> Result<()> {
    image
        .save(path)
        .map_err(|e| XnatKitError::Image(format!("writing {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volume() -> Array3<f32> {
        // 3 slices along axis 1: 2 x 2 grid of 3 x 4 tiles
        Array3::from_shape_fn((4, 3, 3), |(x, y, z)| (x + 4 * y + 12 * z) as f32)
    }

    #[test]
    fn writes_mosaic_and_thumbnail() {
        let dir = tempfile::tempdir().unwrap();
        let opts = MosaicOptions {
            columns: None,
            thumbnail: true,
        };

        let files = write_mosaic(&volume(), &dir.path().join("snap"), &opts).unwrap();
        assert_eq!(files.original, dir.path().join("snap.png"));
        assert_eq!(files.thumbnail, Some(dir.path().join("snap_thumb.png")));

        let full = image::open(&files.original).unwrap();
        assert_eq!((full.width(), full.height()), (8, 6));
        let thumb = image::open(files.thumbnail.unwrap()).unwrap();
        assert_eq!((thumb.width(), thumb.height()), (2, 2));
    }

    #[test]
    fn normalises_to_full_range() {
        let image = to_gray(&Array2::from_shape_vec((1, 3), vec![-1.0, 0.0, 1.0]).unwrap());
        assert_eq!(image.get_pixel(0, 0), &Luma([0]));
        assert_eq!(image.get_pixel(1, 0), &Luma([128]));
        assert_eq!(image.get_pixel(2, 0), &Luma([255]));

        let flat = to_gray(&Array2::from_elem((2, 2), 5.0));
        assert_eq!(flat.get_pixel(1, 1), &Luma([0]));
    }

    #[test]
    fn refuses_existing_output_and_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("snap.png"), b"").unwrap();
        let opts = MosaicOptions::default();

        assert!(write_mosaic(&volume(), &dir.path().join("snap.png"), &opts).is_err());
        assert!(write_mosaic(&volume(), &dir.path().join("missing/snap.png"), &opts).is_err());
    }

    #[test]
    fn existing_thumbnail_blocks_before_anything_is_written() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("snap_thumb.png"), b"").unwrap();
        let opts = MosaicOptions {
            columns: Some(3),
            thumbnail: true,
        };

        assert!(write_mosaic(&volume(), &dir.path().join("snap.png"), &opts).is_err());
        assert!(!dir.path().join("snap.png").exists());
    }
}
