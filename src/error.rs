//! Error types for the `framesweep` crate.
//!
//! [`FramesweepError`] is the single error type returned by every fallible
//! operation. Most pipeline failures never reach the caller: a per-capture
//! [`SeekTimeout`](FramesweepError::SeekTimeout) is caught inside the
//! extraction and upgrade passes and turned into "no data for this slot".
//! What does surface are setup problems (the source cannot be opened, the
//! options are inconsistent) and misuse of the frame store.

use std::{io::Error as IoError, path::PathBuf, time::Duration};

#[cfg(feature = "ffmpeg")]
use ffmpeg_next::Error as FfmpegError;
use image::ImageError;
use thiserror::Error;

use crate::store::Tier;

/// The unified error type for all `framesweep` operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FramesweepError {
    /// No seek-completed signal arrived within the capture timeout.
    #[error("Seek to {seconds:.3}s did not complete within {timeout:?}")]
    SeekTimeout {
        /// Requested capture time in seconds.
        seconds: f64,
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The decode handle has been released and can no longer capture.
    #[error("Decode handle has been released")]
    HandleReleased,

    /// The media source could not be opened.
    #[error("Failed to open media source at {path}: {reason}")]
    FileOpen {
        /// Source that was passed to the decode handle.
        path: PathBuf,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// The source does not contain a video stream.
    #[error("No video stream found in source")]
    NoVideoStream,

    /// A video frame could not be decoded.
    #[error("Failed to decode video frame: {0}")]
    VideoDecodeError(String),

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    FfmpegError(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),

    /// An error from the `image` crate during frame conversion.
    #[error("Image processing error: {0}")]
    ImageError(#[from] ImageError),

    /// The session was cleaned up before the operation finished.
    #[error("Operation cancelled")]
    Cancelled,

    /// The [`DemuxOptions`](crate::DemuxOptions) are inconsistent.
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// The source reported a duration that cannot size a frame store.
    #[error("Invalid source duration: {0}s")]
    InvalidDuration(f64),

    /// A store index past the end of the store was addressed.
    #[error("Frame index {index} is out of range (store has {len} slots)")]
    FrameIndexOutOfRange {
        /// The index that was requested.
        index: usize,
        /// The fixed length of the store.
        len: usize,
    },

    /// A write would downgrade a slot or leave the terminal tier.
    #[error("Slot {index} cannot move from {from:?} to {to:?}")]
    InvalidTierTransition {
        /// Slot being written.
        index: usize,
        /// Tier currently held by the slot.
        from: Tier,
        /// Tier the write asked for.
        to: Tier,
    },

    /// A captured tier was written without pixel data.
    #[error("Slot {index} was marked captured without frame data")]
    MissingFrameData {
        /// Slot being written.
        index: usize,
    },

    /// An interpolated slot must point at a slot holding real pixel data.
    #[error("Slot {index} cannot reference slot {source_index}, which holds no captured frame")]
    InvalidInterpolationSource {
        /// Slot being interpolated.
        index: usize,
        /// Referenced slot.
        source_index: usize,
    },

    /// [`FrameDemuxer::initialize`](crate::FrameDemuxer::initialize) was called twice.
    #[error("Session is already initialized")]
    AlreadyInitialized,

    /// The session was joined before it was initialized.
    #[error("Session has not been initialized")]
    NotInitialized,
}

#[cfg(feature = "ffmpeg")]
impl From<FfmpegError> for FramesweepError {
    fn from(error: FfmpegError) -> Self {
        FramesweepError::FfmpegError(error.to_string())
    }
}

impl FramesweepError {
    /// Returns `true` for errors that only cost a single slot its data.
    ///
    /// The extraction and upgrade passes log these and keep going.
    pub fn is_capture_miss(&self) -> bool {
        matches!(
            self,
            FramesweepError::SeekTimeout { .. }
                | FramesweepError::VideoDecodeError(_)
                | FramesweepError::FfmpegError(_)
                | FramesweepError::ImageError(_)
        )
    }
}
