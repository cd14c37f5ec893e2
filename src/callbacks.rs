//! The callback surface consumed by the host.
//!
//! A session talks to its host through three optional channels:
//!
//! - `on_metadata` fires once, as soon as the source resolves.
//! - `on_progress` fires during the first pass with a percentage in `0..=100`.
//! - `on_complete` fires after the first pass with a best-effort frame list
//!   and again after the upgrade pass with the refined list. The second call
//!   is authoritative; hosts should replace whatever they kept from the first.
//!
//! # Example
//!
//! ```
//! use framesweep::DemuxCallbacks;
//!
//! let callbacks = DemuxCallbacks::new()
//!     .on_metadata(|metadata| println!("{}x{}", metadata.width, metadata.height))
//!     .on_progress(|percent| println!("{percent:.0}%"))
//!     .on_complete(|frames| println!("{} frame(s)", frames.len()));
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::{Arc, PoisonError, RwLock};

use crate::{frame::PixelBuffer, metadata::SourceMetadata, progress::CancellationToken};

type MetadataFn = dyn Fn(&SourceMetadata) + Send + Sync;
type ProgressFn = dyn Fn(f32) + Send + Sync;
type CompleteFn = dyn Fn(Vec<PixelBuffer>) + Send + Sync;

/// Registered host callbacks. Every channel is optional.
#[derive(Clone, Default)]
pub struct DemuxCallbacks {
    metadata: Option<Arc<MetadataFn>>,
    progress: Option<Arc<ProgressFn>>,
    complete: Option<Arc<CompleteFn>>,
}

impl Debug for DemuxCallbacks {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("DemuxCallbacks")
            .field("has_metadata", &self.metadata.is_some())
            .field("has_progress", &self.progress.is_some())
            .field("has_complete", &self.complete.is_some())
            .finish()
    }
}

impl DemuxCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on_metadata<F>(mut self, callback: F) -> Self
    where
        F: Fn(&SourceMetadata) + Send + Sync + 'static,
    {
        self.metadata = Some(Arc::new(callback));
        self
    }

    #[must_use]
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(f32) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(callback));
        self
    }

    #[must_use]
    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: Fn(Vec<PixelBuffer>) + Send + Sync + 'static,
    {
        self.complete = Some(Arc::new(callback));
        self
    }
}

/// Callbacks shared between a session and its running pipeline.
///
/// Replacing the contents takes effect at the next emission.
pub type SharedCallbacks = Arc<RwLock<DemuxCallbacks>>;

/// Delivers callbacks until the session is cancelled, then drops them.
#[derive(Debug, Clone)]
pub struct CallbackEmitter {
    callbacks: SharedCallbacks,
    cancel: CancellationToken,
}

impl CallbackEmitter {
    pub fn new(callbacks: DemuxCallbacks, cancel: CancellationToken) -> Self {
        Self::shared(Arc::new(RwLock::new(callbacks)), cancel)
    }

    /// An emitter that reads `callbacks` afresh for every emission.
    pub fn shared(callbacks: SharedCallbacks, cancel: CancellationToken) -> Self {
        Self { callbacks, cancel }
    }

    /// An emitter with nothing registered.
    pub fn silent() -> Self {
        Self::new(DemuxCallbacks::default(), CancellationToken::new())
    }

    pub fn metadata(&self, metadata: &SourceMetadata) {
        if let Some(callback) = self.live(|callbacks| callbacks.metadata.clone()) {
            callback(metadata);
        }
    }

    pub fn progress(&self, percent: f32) {
        if let Some(callback) = self.live(|callbacks| callbacks.progress.clone()) {
            callback(percent);
        }
    }

    pub fn complete(&self, frames: Vec<PixelBuffer>) {
        if let Some(callback) = self.live(|callbacks| callbacks.complete.clone()) {
            callback(frames);
        }
    }

    // The lock is released before the callback runs.
    fn live<T: ?Sized>(
        &self,
        select: impl FnOnce(&DemuxCallbacks) -> Option<Arc<T>>,
    ) -> Option<Arc<T>> {
        if self.cancel.is_cancelled() {
            return None;
        }
        let callbacks = self.callbacks.read().unwrap_or_else(PoisonError::into_inner);
        select(&callbacks)
    }
}
