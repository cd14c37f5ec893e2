//! Gap filling after the reduced-rate pass.
//!
//! The first pass only captures every few slots. [`fill_gaps`] makes every
//! other slot displayable by pointing it at the nearest earlier capture.
//! Slots before the first capture have nothing to borrow from and stay
//! [`Tier::Empty`]; there is no backward fill.

use crate::store::{FrameQualityStore, Tier};

/// Mark every pixel-less slot after the first capture as
/// [`Tier::Interpolated`], pointing at the closest earlier captured slot.
///
/// Runs in a single forward scan and is idempotent. Returns the number of
/// slots that now reference another slot.
pub fn fill_gaps(store: &mut FrameQualityStore) -> usize {
    let mut last_real: Option<usize> = None;
    let mut interpolated = 0;

    for index in 0..store.len() {
        let tier = store.get(index).map(|record| record.tier).unwrap_or_default();
        if tier.is_real() {
            last_real = Some(index);
            continue;
        }

        let Some(source_index) = last_real else {
            continue;
        };

        match store.set_interpolated(index, source_index) {
            Ok(()) => interpolated += 1,
            Err(error) => log::warn!("Could not interpolate slot {index}: {error}"),
        }
    }

    log::debug!(
        "Filled {interpolated} gap(s); {} leading slot(s) left empty",
        store
            .first_real_index()
            .unwrap_or(store.len())
    );
    interpolated
}

/// Returns `true` when every slot is either captured, interpolated from the
/// nearest earlier capture, or lies before the first capture.
pub fn is_gap_free(store: &FrameQualityStore) -> bool {
    let mut last_real: Option<usize> = None;
    store.records().enumerate().all(|(index, record)| match record.tier {
        Tier::LowRes | Tier::HighRes => {
            last_real = Some(index);
            true
        }
        Tier::Interpolated => last_real.is_some() && record.source_index == last_real,
        Tier::Empty => last_real.is_none(),
    })
}
