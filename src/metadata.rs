//! Source metadata.
//!
//! [`SourceMetadata`] is what a [`DecodeHandle`](crate::DecodeHandle) reports
//! once the source resolves, and is the payload of the `on_metadata`
//! callback. Its duration decides the length of the frame store.

use std::time::Duration;

/// Dimensions and duration of a video source.
///
/// # Example
///
/// ```
/// use framesweep::SourceMetadata;
///
/// let metadata = SourceMetadata::new(1920, 1080, 2.5);
/// assert_eq!(metadata.total_time_ms(), 2500.0);
/// assert_eq!(metadata.slot_count(30.0), 75);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct SourceMetadata {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Total duration in seconds.
    pub duration_seconds: f64,
}

impl SourceMetadata {
    pub fn new(width: u32, height: u32, duration_seconds: f64) -> Self {
        Self {
            width,
            height,
            duration_seconds,
        }
    }

    /// Total duration in milliseconds.
    pub fn total_time_ms(&self) -> f64 {
        self.duration_seconds * 1000.0
    }

    /// Total duration as a [`Duration`]. Negative or non-finite values map to zero.
    pub fn duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.duration_seconds).unwrap_or(Duration::ZERO)
    }

    /// Number of slots a store sampled at `frames_per_second` needs:
    /// `floor(duration × fps)`.
    pub fn slot_count(&self, frames_per_second: f64) -> usize {
        crate::store::sample_index(self.duration_seconds, frames_per_second)
    }
}
