//! Bright-pixel extraction and frame annotation.
//!
//! The clustering pipeline only needs two things from an image: the set of
//! foreground pixels inside a region of interest, and (for annotation) a way
//! to write colored points back. This module provides both on top of the
//! `image` crate:
//!
//! 1. Scan a clamped region of interest row by row
//! 2. Keep every pixel with any channel strictly above its per-channel
//!    threshold
//! 3. Hand the `(row, col)` set to the pipeline via [`ImagePointSource`]
//! 4. After tracking, paint per-blade colors (and optional axis lines) into
//!    a copy of the frame
//!
//! Requires the `image` feature to be enabled.

use std::path::Path;

use anyhow::{Context, Result};
use image::RgbImage;

use crate::pipeline::PointSource;

/// Rectangular region of an image, in pixel coordinates.
///
/// Row and column ranges are half-open (`min..max`); maxima beyond the
/// actual image dimensions are clamped at scan time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionOfInterest {
    pub min_row: u32,
    pub max_row: u32,
    pub min_col: u32,
    pub max_col: u32,
}

impl RegionOfInterest {
    /// A region covering any image: maxima clamp down to the real
    /// dimensions when scanning.
    pub fn unbounded() -> Self {
        Self {
            min_row: 0,
            max_row: u32::MAX,
            min_col: 0,
            max_col: u32::MAX,
        }
    }

    fn clamped(&self, width: u32, height: u32) -> (u32, u32, u32, u32) {
        (
            self.min_row,
            self.max_row.min(height),
            self.min_col,
            self.max_col.min(width),
        )
    }
}

/// Per-channel foreground threshold.
///
/// A pixel counts as foreground when **any** of its channels strictly
/// exceeds the corresponding threshold value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RgbThreshold(pub [u8; 3]);

/// Load an image and convert it to 8-bit RGB.
pub fn load_image(path: impl AsRef<Path>) -> Result<RgbImage> {
    let path = path.as_ref();
    let img = image::open(path)
        .with_context(|| format!("failed to open image: {}", path.display()))?;
    Ok(img.to_rgb8())
}

/// Save an image, inferring the format from the file extension.
pub fn save_image(img: &RgbImage, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    img.save(path)
        .with_context(|| format!("failed to save image: {}", path.display()))
}

/// Collect every foreground pixel inside `roi`, in row-major scan order,
/// as `(row, col)`.
pub fn extract_bright_points(
    img: &RgbImage,
    roi: &RegionOfInterest,
    threshold: RgbThreshold,
) -> Vec<(u32, u32)> {
    let (width, height) = img.dimensions();
    let (min_row, max_row, min_col, max_col) = roi.clamped(width, height);

    let mut points = Vec::new();
    for row in min_row..max_row {
        for col in min_col..max_col {
            let pixel = img.get_pixel(col, row);
            let above = pixel
                .0
                .iter()
                .zip(threshold.0.iter())
                .any(|(&value, &limit)| value > limit);
            if above {
                points.push((row, col));
            }
        }
    }
    points
}

/// Set the given `(row, col)` pixels to `color`. Out-of-bound points are
/// ignored.
pub fn paint_points(img: &mut RgbImage, points: &[(u32, u32)], color: [u8; 3]) {
    let (width, height) = img.dimensions();
    for &(row, col) in points {
        if row < height && col < width {
            img.put_pixel(col, row, image::Rgb(color));
        }
    }
}

/// Draw a straight line from `from` to `to` (inclusive, `(row, col)`
/// coordinates) using Bresenham's algorithm. Works in all octants;
/// out-of-bound pixels are skipped.
pub fn draw_line(img: &mut RgbImage, from: (u32, u32), to: (u32, u32), color: [u8; 3]) {
    let (width, height) = img.dimensions();
    let (mut row, mut col) = (from.0 as i64, from.1 as i64);
    let (end_row, end_col) = (to.0 as i64, to.1 as i64);

    let d_col = (end_col - col).abs();
    let col_step = if col < end_col { 1 } else { -1 };
    let d_row = -(end_row - row).abs();
    let row_step = if row < end_row { 1 } else { -1 };
    let mut error = d_col + d_row;

    loop {
        if row >= 0 && col >= 0 && (row as u32) < height && (col as u32) < width {
            img.put_pixel(col as u32, row as u32, image::Rgb(color));
        }
        if row == end_row && col == end_col {
            break;
        }
        let doubled = 2 * error;
        if doubled >= d_row {
            error += d_row;
            col += col_step;
        }
        if doubled <= d_col {
            error += d_col;
            row += row_step;
        }
    }
}

/// [`PointSource`] backed by image files on disk.
///
/// Each call loads one frame, scans the configured region of interest and
/// returns the pixels above the threshold. Workers never share a decoded
/// image buffer.
#[derive(Debug, Clone)]
pub struct ImagePointSource {
    pub roi: RegionOfInterest,
    pub threshold: RgbThreshold,
}

impl PointSource for ImagePointSource {
    fn points(&self, path: &Path) -> Result<Vec<(u32, u32)>> {
        let img = load_image(path)?;
        Ok(extract_bright_points(&img, &self.roi, self.threshold))
    }
}
