//! The reduced-rate first pass.
//!
//! [`extract_low_res`] samples the source at the options' low-res rate,
//! writing each capture into the full-rate slot `floor(t × target_fps)`.
//! Samples are processed in fixed-size batches with a short sleep between
//! batches, so a long source does not monopolise the runtime thread the host
//! renders on. Within a batch the handle decides how many captures overlap;
//! results are still written in sample order. A capture that misses is logged and its slot stays empty.

use std::pin::pin;

use futures_util::StreamExt;

use crate::{
    callbacks::CallbackEmitter,
    decode::{DecodeHandle, capture_in_order},
    error::FramesweepError,
    options::DemuxOptions,
    progress::{CancellationToken, ProgressTracker},
    store::{FrameQualityStore, Tier, sample_index},
};

/// Outcome of the first pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExtractionReport {
    /// Samples requested from the handle.
    pub attempted: usize,
    /// Samples written into the store.
    pub captured: usize,
    /// Samples lost to [`FramesweepError::SeekTimeout`].
    pub timed_out: usize,
    /// `true` if the pass stopped early because the session was cleaned up.
    pub cancelled: bool,
}

/// Fill `store` at the reduced rate.
///
/// `duration_seconds` is the source duration; the pass takes
/// `floor(duration × low_fps)` samples at `i / low_fps`. Progress goes to
/// `emitter` after every sample and ends at 100. The pass never fails: every
/// per-capture error is logged and skipped, and cancellation ends it early.
pub async fn extract_low_res<H: DecodeHandle>(
    handle: &H,
    store: &mut FrameQualityStore,
    duration_seconds: f64,
    options: &DemuxOptions,
    emitter: &CallbackEmitter,
    cancel: &CancellationToken,
) -> ExtractionReport {
    let low_fps = options.low_res_frame_rate;
    let target_fps = store.frames_per_second();
    let total_samples = sample_index(duration_seconds, low_fps);
    let batch_size = options.batch_size.max(1);

    log::debug!(
        "Extracting {total_samples} low-res sample(s) at {low_fps} fps into {} slot(s)",
        store.len()
    );

    let mut report = ExtractionReport::default();
    let mut tracker = ProgressTracker::new(total_samples as u64);

    'batches: for batch_start in (0..total_samples).step_by(batch_size) {
        if batch_start > 0 && !options.batch_yield.is_zero() {
            tokio::time::sleep(options.batch_yield).await;
        }
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }

        let batch_end = (batch_start + batch_size).min(total_samples);
        let targets = (batch_start..batch_end)
            .map(|sample| (sample, sample as f64 / low_fps))
            .collect();
        let mut captures = pin!(capture_in_order(handle, targets, options.capture_timeout));

        while let Some((sample, seconds, result)) = captures.next().await {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break 'batches;
            }

            report.attempted += 1;
            match result {
                Ok(frame) => {
                    let index = sample_index(seconds, target_fps);
                    match store.set(index, Tier::LowRes, Some(frame), seconds) {
                        Ok(()) => report.captured += 1,
                        Err(error) => log::debug!("Dropped low-res sample {sample}: {error}"),
                    }
                }
                Err(error @ FramesweepError::SeekTimeout { .. }) => {
                    report.timed_out += 1;
                    log::warn!("Low-res sample {sample} skipped: {error}");
                }
                Err(FramesweepError::HandleReleased) => {
                    report.cancelled = true;
                    log::debug!("Decode handle released during extraction");
                    break 'batches;
                }
                Err(error) if error.is_capture_miss() => {
                    log::warn!("Low-res sample {sample} skipped: {error}");
                }
                Err(error) => log::error!("Low-res sample {sample} skipped: {error}"),
            }

            let percent = tracker.advance();
            log::trace!("Extraction progress {percent:.1}%");
            emitter.progress(percent);
        }
    }

    if !report.cancelled && tracker.current() < tracker.total().max(1) {
        emitter.progress(tracker.finish());
    }

    log::debug!(
        "Low-res pass: {}/{} captured, {} timed out in {:?}",
        report.captured,
        report.attempted,
        report.timed_out,
        tracker.elapsed()
    );
    report
}
