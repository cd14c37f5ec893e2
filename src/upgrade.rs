//! The full-resolution second pass.
//!
//! [`upgrade_store`] revisits every `LowRes` and `Interpolated` slot and
//! captures it again at its own exact timestamp `index / target_fps`. A
//! failed capture leaves the slot as it was. Failed slots are not queued
//! for another attempt, so a timestamp the decoder can never reach costs
//! one timeout per session instead of an endless retry loop.

use std::pin::pin;

use futures_util::StreamExt;

use crate::{
    decode::{DecodeHandle, capture_in_order},
    error::FramesweepError,
    options::DemuxOptions,
    progress::CancellationToken,
    store::{FrameQualityStore, Tier},
};

/// Outcome of the upgrade pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpgradeReport {
    /// Slots that needed an upgrade when the pass started.
    pub candidates: usize,
    /// Slots now holding a high-res capture.
    pub upgraded: usize,
    /// Slots whose capture failed and kept their previous tier.
    pub failed: usize,
    /// `true` if the pass stopped early because the session was cleaned up.
    pub cancelled: bool,
}

/// Upgrade every imperfect slot of `store` to [`Tier::HighRes`].
///
/// Uses the same batching and inter-batch yield as the first pass. Never
/// fails; cancellation ends the pass early.
pub async fn upgrade_store<H: DecodeHandle>(
    handle: &H,
    store: &mut FrameQualityStore,
    options: &DemuxOptions,
    cancel: &CancellationToken,
) -> UpgradeReport {
    let candidates = store.indices_needing_upgrade();
    let batch_size = options.batch_size.max(1);
    let mut report = UpgradeReport {
        candidates: candidates.len(),
        ..UpgradeReport::default()
    };

    log::debug!("Upgrading {} slot(s) to full resolution", candidates.len());

    'batches: for (batch_number, batch) in candidates.chunks(batch_size).enumerate() {
        if batch_number > 0 && !options.batch_yield.is_zero() {
            tokio::time::sleep(options.batch_yield).await;
        }
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }

        let targets = batch
            .iter()
            .map(|&index| (index, store.ideal_timestamp(index)))
            .collect();
        let mut captures = pin!(capture_in_order(handle, targets, options.capture_timeout));

        while let Some((index, seconds, result)) = captures.next().await {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break 'batches;
            }

            match result {
                Ok(frame) => match store.set(index, Tier::HighRes, Some(frame), seconds) {
                    Ok(()) => report.upgraded += 1,
                    Err(error) => {
                        report.failed += 1;
                        log::debug!("Upgrade of slot {index} rejected: {error}");
                    }
                },
                Err(FramesweepError::HandleReleased) => {
                    report.cancelled = true;
                    log::debug!("Decode handle released during upgrade");
                    break 'batches;
                }
                Err(error) if error.is_capture_miss() => {
                    report.failed += 1;
                    log::warn!("Upgrade of slot {index} failed: {error}");
                }
                Err(error) => {
                    report.failed += 1;
                    log::error!("Upgrade of slot {index} failed: {error}");
                }
            }
        }
    }

    log::debug!(
        "Upgrade pass: {}/{} upgraded, {} failed",
        report.upgraded,
        report.candidates,
        report.failed
    );
    report
}
