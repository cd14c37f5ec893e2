//! # framesweep
//!
//! Progressive, quality-tiered frame extraction for interactive video
//! scrubbing.
//!
//! `framesweep` turns an opaque video source into a time-indexed array of
//! displayable frames in two passes. The first pass samples the source at a
//! reduced rate and fills the holes by borrowing from the nearest earlier
//! capture, so a host can start scrubbing within moments. After a short
//! cooldown a second pass re-captures every imperfect slot at its exact
//! timestamp, and the host receives the refined array.
//!
//! ## Quick Start
//!
//! ```no_run
//! use framesweep::{
//!     DemuxCallbacks, DemuxOptions, DemuxSession, FfmpegDecodeHandle, FrameDemuxer,
//! };
//!
//! # async fn example() -> Result<(), framesweep::FramesweepError> {
//! let options = DemuxOptions::new().with_target_frame_rate(30.0);
//! let handle = FfmpegDecodeHandle::new(options.frame_output().clone());
//!
//! let mut session = DemuxSession::new(handle, options);
//! session.set_callbacks(
//!     DemuxCallbacks::new()
//!         .on_metadata(|metadata| println!("{:.1}s", metadata.duration_seconds))
//!         .on_complete(|frames| println!("{} frame(s)", frames.len())),
//! );
//! session.initialize("input.mp4")?;
//! session.join().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Custom decoders
//!
//! The schedulers only talk to the [`DecodeHandle`] trait. Any decoder that
//! can report metadata and capture a frame at a time can drive the same
//! pipeline through [`run_pipeline`] or [`DemuxSession`].
//!
//! ### Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `ffmpeg` | `FfmpegDecodeHandle`, FFmpeg log control and the `framesweep` CLI (default) |

pub mod callbacks;
pub mod decode;
pub mod error;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;
pub mod extraction;
pub mod frame;
pub mod interpolate;
pub mod metadata;
pub mod options;
pub mod progress;
pub mod session;
pub mod store;
pub mod upgrade;

pub use callbacks::{CallbackEmitter, DemuxCallbacks, SharedCallbacks};
#[cfg(feature = "ffmpeg")]
pub use decode::ffmpeg::FfmpegDecodeHandle;
pub use decode::{CaptureGate, DecodeHandle, bounded_capture, capture_in_order};
pub use error::FramesweepError;
pub use extraction::{ExtractionReport, extract_low_res};
#[cfg(feature = "ffmpeg")]
pub use ffmpeg::{FfmpegLogLevel, get_ffmpeg_log_level, set_ffmpeg_log_level};
pub use frame::{PixelBuffer, pixel_buffer_from_packed};
pub use interpolate::{fill_gaps, is_gap_free};
pub use metadata::SourceMetadata;
pub use options::{DemuxOptions, FrameOutputOptions, PixelFormat};
pub use progress::{CancellationToken, ProgressTracker};
pub use session::{DemuxSession, FrameDemuxer, run_pipeline};
pub use store::{FrameQualityStore, FrameRecord, Tier, TierSummary, sample_index};
pub use upgrade::{UpgradeReport, upgrade_store};
