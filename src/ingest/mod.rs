//! Frame ingestion sources.
//!
//! Sources for raster frames:
//! - Synthetic stub source (`stub://`, deterministic test pattern)
//! - HTTP MJPEG/JPEG streams (feature: ingest-http)
//!
//! All sources produce `Frame` instances pulled one at a time by the
//! processing loop. `next_frame` returns `Ok(None)` when the stream is
//! exhausted; an upstream read failure ends the stream rather than raising
//! an alert condition.

use anyhow::{anyhow, Result};

use crate::frame::Frame;

#[cfg(feature = "ingest-http")]
pub mod http;

#[cfg(feature = "ingest-http")]
pub use http::HttpSource;

/// Configuration for a camera source.
#[derive(Clone, Debug)]
pub struct SourceConfig {
    /// Stream URL. Supported schemes: stub:// (synthetic), http(s)://
    /// (MJPEG/JPEG, feature-gated).
    pub url: String,
    /// Target frame rate (frames per second). Sources may decimate to this.
    pub target_fps: u32,
    /// Frame dimensions for sources that generate rather than decode.
    pub width: u32,
    pub height: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: "stub://camera0".to_string(),
            target_fps: 10,
            width: 640,
            height: 480,
        }
    }
}

/// A camera frame source.
pub struct CameraSource {
    backend: SourceBackend,
}

enum SourceBackend {
    Synthetic(SyntheticSource),
    #[cfg(feature = "ingest-http")]
    Http(HttpSource),
}

impl CameraSource {
    pub fn new(config: SourceConfig) -> Result<Self> {
        if config.url.starts_with("stub://") {
            return Ok(Self {
                backend: SourceBackend::Synthetic(SyntheticSource::new(config)),
            });
        }
        if config.url.starts_with("http://") || config.url.starts_with("https://") {
            #[cfg(feature = "ingest-http")]
            {
                return Ok(Self {
                    backend: SourceBackend::Http(HttpSource::new(config)?),
                });
            }
            #[cfg(not(feature = "ingest-http"))]
            {
                return Err(anyhow!("http ingestion requires the ingest-http feature"));
            }
        }
        Err(anyhow!(
            "unsupported source url '{}'; expected stub:// or http(s)://",
            config.url
        ))
    }

    /// Connect to the source.
    pub fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            SourceBackend::Synthetic(source) => source.connect(),
            #[cfg(feature = "ingest-http")]
            SourceBackend::Http(source) => source.connect(),
        }
    }

    /// Capture the next frame. `None` means end of stream.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            SourceBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-http")]
            SourceBackend::Http(source) => source.next_frame(),
        }
    }

    /// Check if the source is healthy.
    pub fn is_healthy(&self) -> bool {
        match &self.backend {
            SourceBackend::Synthetic(source) => source.is_healthy(),
            #[cfg(feature = "ingest-http")]
            SourceBackend::Http(source) => source.is_healthy(),
        }
    }

    /// Get frame statistics.
    pub fn stats(&self) -> SourceStats {
        match &self.backend {
            SourceBackend::Synthetic(source) => source.stats(),
            #[cfg(feature = "ingest-http")]
            SourceBackend::Http(source) => source.stats(),
        }
    }
}

/// Statistics for a camera source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub source: String,
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://)
// ----------------------------------------------------------------------------

struct SyntheticSource {
    config: SourceConfig,
    frame_count: u64,
    scene_state: u8,
}

impl SyntheticSource {
    fn new(config: SourceConfig) -> Self {
        Self {
            config,
            frame_count: 0,
            scene_state: 0,
        }
    }

    fn connect(&mut self) -> Result<()> {
        log::info!("CameraSource: connected to {} (synthetic)", self.config.url);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        self.frame_count += 1;
        let pixels = self.generate_synthetic_pixels();
        let frame = Frame::from_rgb(pixels, self.config.width, self.config.height)?;
        Ok(Some(frame))
    }

    fn generate_synthetic_pixels(&mut self) -> Vec<u8> {
        let pixel_count = (self.config.width * self.config.height * 3) as usize;
        // Shift the whole scene every 50 frames so the pattern is not static.
        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count + self.scene_state as u64) % 256) as u8;
        }
        pixels
    }

    fn is_healthy(&self) -> bool {
        true
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.config.url.clone(),
        }
    }
}
