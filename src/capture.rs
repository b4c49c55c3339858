//! Screen capture seam.
//!
//! OS capture lives outside this crate; the pipeline only needs PNG bytes
//! for a region. [`ImageFileCapture`] serves the same contract from an
//! image on disk.

use std::io::Cursor;
use std::path::PathBuf;

use anyhow::{Context, Result};
use image::{GenericImageView, ImageFormat};

/// Source of region screenshots. Corners may arrive in any order.
pub trait ScreenCapture: Send + Sync {
    fn capture_to_bytes(&self, left: i32, top: i32, right: i32, bottom: i32) -> Result<Vec<u8>>;
}

/// Capture backend for sessions without a screen, such as text-only use.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCapture;

impl ScreenCapture for NoCapture {
    fn capture_to_bytes(&self, _left: i32, _top: i32, _right: i32, _bottom: i32) -> Result<Vec<u8>> {
        anyhow::bail!("screen capture is not available")
    }
}

/// MIME type of encoded image bytes, `image/png` when unknown.
pub fn sniff_mime_type(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Jpeg) => "image/jpeg",
        Ok(ImageFormat::WebP) => "image/webp",
        Ok(ImageFormat::Gif) => "image/gif",
        Ok(ImageFormat::Bmp) => "image/bmp",
        Ok(ImageFormat::Tiff) => "image/tiff",
        _ => "image/png",
    }
}

/// Crops regions out of an image file.
#[derive(Clone, Debug)]
pub struct ImageFileCapture {
    path: PathBuf,
}

impl ImageFileCapture {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Full image extent as (left, top, right, bottom).
    pub fn full_region(&self) -> Result<(i32, i32, i32, i32)> {
        let (w, h) = image::image_dimensions(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        Ok((0, 0, w as i32, h as i32))
    }
}

impl ScreenCapture for ImageFileCapture {
    fn capture_to_bytes(&self, left: i32, top: i32, right: i32, bottom: i32) -> Result<Vec<u8>> {
        let img = image::open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        let (w, h) = img.dimensions();

        let clamp = |v: i32, max: u32| v.clamp(0, max as i32) as u32;
        let (x0, x1) = (clamp(left.min(right), w), clamp(left.max(right), w));
        let (y0, y1) = (clamp(top.min(bottom), h), clamp(top.max(bottom), h));

        if x1 <= x0 || y1 <= y0 {
            anyhow::bail!(
                "region ({}, {}) - ({}, {}) lies outside the {}x{} image",
                left,
                top,
                right,
                bottom,
                w,
                h
            );
        }

        let cropped = img.crop_imm(x0, y0, x1 - x0, y1 - y0);
        let mut png_data = Vec::new();
        cropped.write_to(&mut Cursor::new(&mut png_data), ImageFormat::Png)?;
        Ok(png_data)
    }
}
