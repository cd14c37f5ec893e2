//! The time-indexed frame array.
//!
//! A [`FrameQualityStore`] holds exactly `floor(duration × fps)` slots; slot
//! `i` stands for the ideal timestamp `i / fps`. Each slot carries a [`Tier`]
//! describing where its pixels came from. Tiers only ever move forward:
//!
//! ```text
//! Empty ──capture──▶ LowRes ──upgrade──▶ HighRes
//!   └──interpolate──▶ Interpolated ──upgrade──┘
//! ```
//!
//! An `Interpolated` slot owns no pixels. It points at an earlier slot that
//! holds a real capture, and [`FrameQualityStore::resolve_display`] follows
//! that pointer exactly once.

use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::{error::FramesweepError, frame::PixelBuffer};

/// How a slot's pixel data was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Tier {
    /// Nothing captured and nothing to borrow from.
    #[default]
    Empty,
    /// Captured during the reduced-rate first pass.
    LowRes,
    /// Borrowed from the nearest earlier captured slot.
    Interpolated,
    /// Captured at the slot's own exact timestamp. Terminal.
    HighRes,
}

impl Tier {
    /// Position in the quality order. `LowRes` and `Interpolated` share a rank.
    pub fn rank(self) -> u8 {
        match self {
            Tier::Empty => 0,
            Tier::LowRes | Tier::Interpolated => 1,
            Tier::HighRes => 2,
        }
    }

    /// Returns `true` when the slot holds its own captured pixels.
    pub fn is_real(self) -> bool {
        matches!(self, Tier::LowRes | Tier::HighRes)
    }

    /// Returns `true` for tiers the background upgrade pass revisits.
    pub fn needs_upgrade(self) -> bool {
        matches!(self, Tier::LowRes | Tier::Interpolated)
    }
}

/// One slot of the store.
#[derive(Debug, Clone, Default)]
pub struct FrameRecord {
    /// Captured pixels. Always `None` for `Empty` and `Interpolated` slots.
    pub data: Option<PixelBuffer>,
    /// Quality tier of the slot.
    pub tier: Tier,
    /// Time in seconds the pixels were captured at, or the slot's ideal time.
    pub timestamp: f64,
    /// Slot whose pixels an `Interpolated` record displays.
    pub source_index: Option<usize>,
}

/// Map a time to a slot index with the store's fixed rounding rule,
/// `floor(seconds × fps)`.
///
/// Negative and non-finite products map to `0`.
pub fn sample_index(seconds: f64, frames_per_second: f64) -> usize {
    let position = seconds * frames_per_second;
    if position.is_finite() && position > 0.0 {
        position.floor() as usize
    } else {
        0
    }
}

/// Count of slots per tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TierSummary {
    pub empty: usize,
    pub low_res: usize,
    pub interpolated: usize,
    pub high_res: usize,
}

impl TierSummary {
    pub fn total(&self) -> usize {
        self.empty + self.low_res + self.interpolated + self.high_res
    }
}

impl Display for TierSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "{} high-res, {} low-res, {} interpolated, {} empty",
            self.high_res, self.low_res, self.interpolated, self.empty
        )
    }
}

/// Fixed-length, time-indexed array of [`FrameRecord`]s.
///
/// The store is sized once from the source duration and never resized. It
/// has a single writer at any time, so it needs no interior locking.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use framesweep::{FrameQualityStore, Tier};
/// use image::DynamicImage;
///
/// let mut store = FrameQualityStore::with_rate(2.0, 30.0);
/// assert_eq!(store.len(), 60);
///
/// let frame = Arc::new(DynamicImage::new_rgb8(4, 4));
/// store.set(0, Tier::LowRes, Some(frame), 0.0)?;
/// store.set_interpolated(1, 0)?;
/// assert!(store.resolve_display(1).is_some());
/// # Ok::<(), framesweep::FramesweepError>(())
/// ```
#[derive(Debug, Clone)]
pub struct FrameQualityStore {
    records: Vec<FrameRecord>,
    frames_per_second: f64,
}

impl FrameQualityStore {
    /// Create `length` empty slots sampled at `frames_per_second`.
    pub fn initialize(length: usize, frames_per_second: f64) -> Self {
        let records = (0..length)
            .map(|index| FrameRecord {
                timestamp: index as f64 / frames_per_second,
                ..FrameRecord::default()
            })
            .collect();
        Self {
            records,
            frames_per_second,
        }
    }

    /// Create a store covering `duration_seconds` at `frames_per_second`.
    pub fn with_rate(duration_seconds: f64, frames_per_second: f64) -> Self {
        Self::initialize(
            sample_index(duration_seconds, frames_per_second),
            frames_per_second,
        )
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn frames_per_second(&self) -> f64 {
        self.frames_per_second
    }

    /// Ideal timestamp of a slot, `index / fps`.
    pub fn ideal_timestamp(&self, index: usize) -> f64 {
        index as f64 / self.frames_per_second
    }

    pub fn get(&self, index: usize) -> Option<&FrameRecord> {
        self.records.get(index)
    }

    pub fn records(&self) -> impl Iterator<Item = &FrameRecord> {
        self.records.iter()
    }

    /// Write captured (or cleared) data into a slot.
    ///
    /// Accepts `Empty`, `LowRes` and `HighRes`. Interpolation goes through
    /// [`set_interpolated`](Self::set_interpolated) because it needs a
    /// source slot rather than pixels. Writing `HighRes` drops any source
    /// reference the slot carried.
    ///
    /// # Errors
    ///
    /// - [`FramesweepError::FrameIndexOutOfRange`] for an index past the end.
    /// - [`FramesweepError::InvalidTierTransition`] for a downgrade, any
    ///   write to a `HighRes` slot, or `tier == Interpolated`.
    /// - [`FramesweepError::MissingFrameData`] for a captured tier with no data.
    pub fn set(
        &mut self,
        index: usize,
        tier: Tier,
        data: Option<PixelBuffer>,
        timestamp: f64,
    ) -> Result<(), FramesweepError> {
        let len = self.records.len();
        let record = self
            .records
            .get_mut(index)
            .ok_or(FramesweepError::FrameIndexOutOfRange { index, len })?;

        let from = record.tier;
        let allowed = from != Tier::HighRes
            && tier != Tier::Interpolated
            && tier.rank() >= from.rank();
        if !allowed {
            return Err(FramesweepError::InvalidTierTransition {
                index,
                from,
                to: tier,
            });
        }

        if tier == Tier::Empty {
            return Ok(());
        }

        let data = data.ok_or(FramesweepError::MissingFrameData { index })?;
        *record = FrameRecord {
            data: Some(data),
            tier,
            timestamp,
            source_index: None,
        };
        Ok(())
    }

    /// Point a pixel-less slot at an earlier captured slot.
    ///
    /// # Errors
    ///
    /// - [`FramesweepError::FrameIndexOutOfRange`] if either index is past the end.
    /// - [`FramesweepError::InvalidInterpolationSource`] if `source_index`
    ///   holds no captured pixels.
    /// - [`FramesweepError::InvalidTierTransition`] if the slot already
    ///   holds its own pixels.
    pub fn set_interpolated(
        &mut self,
        index: usize,
        source_index: usize,
    ) -> Result<(), FramesweepError> {
        let len = self.records.len();
        let source_tier = self
            .records
            .get(source_index)
            .ok_or(FramesweepError::FrameIndexOutOfRange {
                index: source_index,
                len,
            })?
            .tier;
        if !source_tier.is_real() {
            return Err(FramesweepError::InvalidInterpolationSource {
                index,
                source_index,
            });
        }

        let record = self
            .records
            .get_mut(index)
            .ok_or(FramesweepError::FrameIndexOutOfRange { index, len })?;
        if record.tier.is_real() {
            return Err(FramesweepError::InvalidTierTransition {
                index,
                from: record.tier,
                to: Tier::Interpolated,
            });
        }

        record.data = None;
        record.tier = Tier::Interpolated;
        record.source_index = Some(source_index);
        Ok(())
    }

    /// Pixels to show for a slot, following an interpolation pointer once.
    pub fn resolve_display(&self, index: usize) -> Option<PixelBuffer> {
        let record = self.records.get(index)?;
        match record.tier {
            Tier::LowRes | Tier::HighRes => record.data.clone(),
            Tier::Interpolated => {
                let source = self.records.get(record.source_index?)?;
                if source.tier.is_real() {
                    source.data.clone()
                } else {
                    None
                }
            }
            Tier::Empty => None,
        }
    }

    /// Displayable frames in slot order. Slots that resolve to nothing are dropped.
    pub fn snapshot_displayable(&self) -> Vec<PixelBuffer> {
        (0..self.records.len())
            .filter_map(|index| self.resolve_display(index))
            .collect()
    }

    /// Slots the background upgrade pass should revisit, in order.
    pub fn indices_needing_upgrade(&self) -> Vec<usize> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, record)| record.tier.needs_upgrade())
            .map(|(index, _)| index)
            .collect()
    }

    /// First slot holding captured pixels.
    pub fn first_real_index(&self) -> Option<usize> {
        self.records.iter().position(|record| record.tier.is_real())
    }

    pub fn summary(&self) -> TierSummary {
        let mut summary = TierSummary::default();
        for record in &self.records {
            match record.tier {
                Tier::Empty => summary.empty += 1,
                Tier::LowRes => summary.low_res += 1,
                Tier::Interpolated => summary.interpolated += 1,
                Tier::HighRes => summary.high_res += 1,
            }
        }
        summary
    }
}
