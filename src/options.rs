//! Session configuration.
//!
//! [`DemuxOptions`] is a builder that carries the frame rates, batch sizing
//! and timing constants of a demux session, together with the
//! [`FrameOutputOptions`] that shape every captured frame.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use framesweep::{DemuxOptions, PixelFormat};
//!
//! let options = DemuxOptions::new()
//!     .with_target_frame_rate(24.0)
//!     .with_low_res_frame_rate(8.0)
//!     .with_upgrade_cooldown(Duration::from_millis(250))
//!     .with_pixel_format(PixelFormat::Rgba8);
//! assert!(options.validate().is_ok());
//! ```

use std::time::Duration;

#[cfg(feature = "ffmpeg")]
use ffmpeg_next::format::Pixel;

use crate::error::FramesweepError;

/// Output pixel format for captured frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFormat {
    /// 8-bit RGB (24 bpp). This is the default.
    #[default]
    Rgb8,
    /// 8-bit RGBA with alpha pre-set to 255 (32 bpp).
    Rgba8,
    /// 8-bit grayscale (8 bpp).
    Gray8,
}

impl PixelFormat {
    /// Number of bytes one pixel occupies in a packed buffer.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 => 4,
            PixelFormat::Gray8 => 1,
        }
    }

    #[cfg(feature = "ffmpeg")]
    pub(crate) fn to_ffmpeg_pixel(self) -> Pixel {
        match self {
            PixelFormat::Rgb8 => Pixel::RGB24,
            PixelFormat::Rgba8 => Pixel::RGBA,
            PixelFormat::Gray8 => Pixel::GRAY8,
        }
    }
}

/// Shape of captured frames.
///
/// When no dimensions are set the source resolution is used. Setting one
/// dimension with [`maintain_aspect_ratio`](FrameOutputOptions::maintain_aspect_ratio)
/// derives the other from the source.
#[derive(Debug, Clone)]
pub struct FrameOutputOptions {
    /// Output pixel format.
    pub pixel_format: PixelFormat,
    /// Target width. `None` keeps the source width.
    pub width: Option<u32>,
    /// Target height. `None` keeps the source height.
    pub height: Option<u32>,
    /// Derive the missing dimension from the source aspect ratio.
    pub maintain_aspect_ratio: bool,
}

impl Default for FrameOutputOptions {
    fn default() -> Self {
        Self {
            pixel_format: PixelFormat::Rgb8,
            width: None,
            height: None,
            maintain_aspect_ratio: true,
        }
    }
}

impl FrameOutputOptions {
    /// Resolve the final `(width, height)` for a source of the given size.
    pub fn resolve_dimensions(&self, source_width: u32, source_height: u32) -> (u32, u32) {
        match (self.width, self.height) {
            (Some(w), Some(h)) => (w, h),
            (Some(w), None) if self.maintain_aspect_ratio && source_width > 0 => {
                let h = (source_height as f64 * w as f64 / source_width as f64).round() as u32;
                (w, h.max(1))
            }
            (Some(w), None) => (w, source_height),
            (None, Some(h)) if self.maintain_aspect_ratio && source_height > 0 => {
                let w = (source_width as f64 * h as f64 / source_height as f64).round() as u32;
                (w.max(1), h)
            }
            (None, Some(h)) => (source_width, h),
            (None, None) => (source_width, source_height),
        }
    }
}

/// Configuration for one demux session.
///
/// Defaults: 30 fps target, 12 fps first pass, 30 samples per batch,
/// 2 s per capture, 3 s readiness wait, 10 ms yield between batches and a
/// 1 s cooldown before the background upgrade.
#[derive(Debug, Clone)]
pub struct DemuxOptions {
    pub(crate) target_frame_rate: f64,
    pub(crate) low_res_frame_rate: f64,
    pub(crate) batch_size: usize,
    pub(crate) capture_timeout: Duration,
    pub(crate) readiness_timeout: Duration,
    pub(crate) batch_yield: Duration,
    pub(crate) upgrade_cooldown: Duration,
    pub(crate) background_upgrade: bool,
    pub(crate) frame_output: FrameOutputOptions,
}

impl Default for DemuxOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl DemuxOptions {
    /// Create options with the default settings.
    pub fn new() -> Self {
        Self {
            target_frame_rate: 30.0,
            low_res_frame_rate: 12.0,
            batch_size: 30,
            capture_timeout: Duration::from_millis(2000),
            readiness_timeout: Duration::from_millis(3000),
            batch_yield: Duration::from_millis(10),
            upgrade_cooldown: Duration::from_millis(1000),
            background_upgrade: true,
            frame_output: FrameOutputOptions::default(),
        }
    }

    /// Frame rate of the final, time-indexed frame array.
    #[must_use]
    pub fn with_target_frame_rate(mut self, fps: f64) -> Self {
        self.target_frame_rate = fps;
        self
    }

    /// Reduced sampling rate of the first pass. Must stay below the target.
    #[must_use]
    pub fn with_low_res_frame_rate(mut self, fps: f64) -> Self {
        self.low_res_frame_rate = fps;
        self
    }

    /// Captures per batch between cooperative yields. Clamped to a minimum of 1.
    #[must_use]
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Upper bound on a single capture.
    #[must_use]
    pub fn with_capture_timeout(mut self, timeout: Duration) -> Self {
        self.capture_timeout = timeout;
        self
    }

    /// How long to wait for the source before the first capture.
    #[must_use]
    pub fn with_readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout = timeout;
        self
    }

    /// Pause inserted between batches.
    #[must_use]
    pub fn with_batch_yield(mut self, delay: Duration) -> Self {
        self.batch_yield = delay;
        self
    }

    /// Delay between the best-effort result and the upgrade sweep.
    #[must_use]
    pub fn with_upgrade_cooldown(mut self, delay: Duration) -> Self {
        self.upgrade_cooldown = delay;
        self
    }

    /// Enable or disable the second, full-resolution pass.
    #[must_use]
    pub fn with_background_upgrade(mut self, enabled: bool) -> Self {
        self.background_upgrade = enabled;
        self
    }

    /// Set the output pixel format for captured frames.
    #[must_use]
    pub fn with_pixel_format(mut self, format: PixelFormat) -> Self {
        self.frame_output.pixel_format = format;
        self
    }

    /// Set a custom output resolution. `None` keeps the source value.
    #[must_use]
    pub fn with_resolution(mut self, width: Option<u32>, height: Option<u32>) -> Self {
        self.frame_output.width = width;
        self.frame_output.height = height;
        self
    }

    /// Set the complete frame output configuration.
    #[must_use]
    pub fn with_frame_output(mut self, output: FrameOutputOptions) -> Self {
        self.frame_output = output;
        self
    }

    pub fn target_frame_rate(&self) -> f64 {
        self.target_frame_rate
    }

    pub fn low_res_frame_rate(&self) -> f64 {
        self.low_res_frame_rate
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn capture_timeout(&self) -> Duration {
        self.capture_timeout
    }

    pub fn frame_output(&self) -> &FrameOutputOptions {
        &self.frame_output
    }

    /// Check that the rates are usable.
    ///
    /// # Errors
    ///
    /// [`FramesweepError::InvalidOptions`] when either rate is not a positive
    /// finite number, or the first-pass rate is not below the target.
    pub fn validate(&self) -> Result<(), FramesweepError> {
        let positive = |fps: f64| fps.is_finite() && fps > 0.0;
        if !positive(self.target_frame_rate) {
            return Err(FramesweepError::InvalidOptions(format!(
                "target frame rate must be positive, got {}",
                self.target_frame_rate
            )));
        }
        if !positive(self.low_res_frame_rate) {
            return Err(FramesweepError::InvalidOptions(format!(
                "low-res frame rate must be positive, got {}",
                self.low_res_frame_rate
            )));
        }
        if self.low_res_frame_rate >= self.target_frame_rate {
            return Err(FramesweepError::InvalidOptions(format!(
                "low-res frame rate ({}) must be below the target ({})",
                self.low_res_frame_rate, self.target_frame_rate
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let options = DemuxOptions::new();
        assert!(options.validate().is_ok());
        assert_eq!(options.batch_size(), 30);
        assert_eq!(options.capture_timeout(), Duration::from_millis(2000));
        assert!(options.background_upgrade);
    }

    #[test]
    fn batch_size_clamps_zero() {
        assert_eq!(DemuxOptions::new().with_batch_size(0).batch_size(), 1);
    }

    #[test]
    fn low_rate_must_stay_below_target() {
        let options = DemuxOptions::new()
            .with_target_frame_rate(12.0)
            .with_low_res_frame_rate(12.0);
        assert!(matches!(
            options.validate(),
            Err(FramesweepError::InvalidOptions(_))
        ));
    }

    #[test]
    fn non_finite_rate_rejected() {
        let options = DemuxOptions::new().with_target_frame_rate(f64::NAN);
        assert!(options.validate().is_err());
    }

    #[test]
    fn resolve_keeps_aspect_ratio() {
        let output = FrameOutputOptions {
            width: Some(640),
            ..FrameOutputOptions::default()
        };
        assert_eq!(output.resolve_dimensions(1920, 1080), (640, 360));

        let output = FrameOutputOptions {
            height: Some(540),
            ..FrameOutputOptions::default()
        };
        assert_eq!(output.resolve_dimensions(1920, 1080), (960, 540));
    }

    #[test]
    fn resolve_without_aspect_keeps_source_dimension() {
        let output = FrameOutputOptions {
            width: Some(100),
            maintain_aspect_ratio: false,
            ..FrameOutputOptions::default()
        };
        assert_eq!(output.resolve_dimensions(1920, 1080), (100, 1080));
    }

    #[test]
    fn bytes_per_pixel_matches_format() {
        assert_eq!(PixelFormat::Rgb8.bytes_per_pixel(), 3);
        assert_eq!(PixelFormat::Rgba8.bytes_per_pixel(), 4);
        assert_eq!(PixelFormat::Gray8.bytes_per_pixel(), 1);
    }
}
