//! RGB raster frames.
//!
//! A `Frame` is one camera frame: height x width x 3 channels, 8 bits per
//! channel, row-major. Frames are owned transiently by the pipeline call,
//! annotated in place and passed onward; they are never retained beyond one
//! processing cycle except when copied into a saved snapshot.

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, RgbImage};
use std::path::Path;

/// Mutable RGB8 frame.
#[derive(Clone, Debug)]
pub struct Frame {
    image: RgbImage,
}

impl Frame {
    /// Blank (black) frame.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbImage::new(width, height),
        }
    }

    /// Wrap raw RGB8 bytes. Length must be exactly `width * height * 3`.
    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                data.len()
            ));
        }
        let image = RgbImage::from_raw(width, height, data)
            .ok_or_else(|| anyhow!("frame buffer construction failed"))?;
        Ok(Self { image })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Raw RGB8 bytes, row-major.
    pub fn as_raw(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut RgbImage {
        &mut self.image
    }

    /// Copy of a sub-region, clamped to the frame bounds.
    pub fn crop(&self, x: u32, y: u32, w: u32, h: u32) -> Frame {
        let x = x.min(self.width().saturating_sub(1));
        let y = y.min(self.height().saturating_sub(1));
        let w = w.min(self.width() - x).max(1);
        let h = h.min(self.height() - y).max(1);
        let sub = image::imageops::crop_imm(&self.image, x, y, w, h).to_image();
        Frame { image: sub }
    }

    /// Encode as JPEG for transmission.
    ///
    /// An encode failure is a recoverable encoding error; it never touches
    /// detector state.
    pub fn encode_jpeg(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        JpegEncoder::new(&mut out)
            .encode(
                self.image.as_raw(),
                self.width(),
                self.height(),
                ExtendedColorType::Rgb8,
            )
            .context("jpeg encoding failed")?;
        Ok(out)
    }

    /// Write a JPEG snapshot to `path`.
    pub fn save_jpeg<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.encode_jpeg()?;
        std::fs::write(path, bytes)
            .with_context(|| format!("failed to write snapshot {}", path.display()))?;
        Ok(())
    }
}
