use image::GenericImageView;
use std::path::Path;
use tracing::debug;

use argus_core::{Error, Result};

/// The exact formatted value meaning "no visual difference". Comparison is
/// string-exact, so every caller must format through [`format_percentage`].
pub const ZERO_DIFF: &str = "0.00";

pub fn format_percentage(percentage: f64) -> String {
    format!("{:.2}", percentage)
}

/// Computes a difference percentage between two stored images.
pub trait ImageDiffer: Send + Sync {
    fn diff(&self, left: &Path, right: &Path) -> Result<f64>;
}

/// Per-pixel channel comparison: the percentage of pixels whose RGB channels
/// differ at all. Images of different dimensions count as fully different.
pub struct PixelDiffer;

impl ImageDiffer for PixelDiffer {
    fn diff(&self, left: &Path, right: &Path) -> Result<f64> {
        let left_img = image::open(left)
            .map_err(|e| Error::Diff(format!("open {}: {}", left.display(), e)))?;
        let right_img = image::open(right)
            .map_err(|e| Error::Diff(format!("open {}: {}", right.display(), e)))?;

        if left_img.dimensions() != right_img.dimensions() {
            debug!(left = %left.display(), right = %right.display(), "Dimension mismatch");
            return Ok(100.0);
        }

        let left_rgba = left_img.to_rgba8();
        let right_rgba = right_img.to_rgba8();
        let (width, height) = left_rgba.dimensions();
        let total = (width as u64) * (height as u64);
        if total == 0 {
            return Ok(0.0);
        }

        let mut changed: u64 = 0;
        for (a, b) in left_rgba.pixels().zip(right_rgba.pixels()) {
            if a.0[0] != b.0[0] || a.0[1] != b.0[1] || a.0[2] != b.0[2] {
                changed += 1;
            }
        }

        Ok((changed as f64 / total as f64) * 100.0)
    }
}
