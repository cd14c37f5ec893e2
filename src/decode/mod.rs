//! The decode primitive behind a demux session.
//!
//! A [`DecodeHandle`] resolves source metadata and captures single frames at
//! arbitrary times. The schedulers keep up to
//! [`max_concurrent_captures`](DecodeHandle::max_concurrent_captures)
//! captures in flight through [`capture_in_order`]; a handle enforces its own
//! limit, usually through a [`CaptureGate`]. The FFmpeg-backed handle services
//! exactly one capture at a time.

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Stream, StreamExt, stream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, SemaphorePermit};

use crate::{error::FramesweepError, frame::PixelBuffer, metadata::SourceMetadata};

/// One sequential decode/seek resource.
///
/// Captures that fail with [`FramesweepError::SeekTimeout`] cost their slot
/// its data and nothing else. Once [`release`](DecodeHandle::release) has
/// been called, every further capture must fail fast with
/// [`FramesweepError::HandleReleased`] rather than wait for its timeout.
pub trait DecodeHandle: Send + Sync + 'static {
    /// Open `source` and report its dimensions and duration.
    fn load_metadata(
        &self,
        source: &str,
    ) -> impl Future<Output = Result<SourceMetadata, FramesweepError>> + Send;

    /// Wait until the source can service captures. Returns `false` if
    /// `timeout` elapsed first; callers proceed either way.
    fn wait_ready(&self, timeout: Duration) -> impl Future<Output = bool> + Send;

    /// Seek to `seconds` and copy out the frame shown there.
    fn capture_at(
        &self,
        seconds: f64,
        timeout: Duration,
    ) -> impl Future<Output = Result<PixelBuffer, FramesweepError>> + Send;

    /// Release the underlying media resource. Idempotent.
    fn release(&self);

    /// How many captures may be outstanding at once.
    fn max_concurrent_captures(&self) -> usize {
        1
    }
}

impl<T: DecodeHandle> DecodeHandle for Arc<T> {
    fn load_metadata(
        &self,
        source: &str,
    ) -> impl Future<Output = Result<SourceMetadata, FramesweepError>> + Send {
        (**self).load_metadata(source)
    }

    fn wait_ready(&self, timeout: Duration) -> impl Future<Output = bool> + Send {
        (**self).wait_ready(timeout)
    }

    fn capture_at(
        &self,
        seconds: f64,
        timeout: Duration,
    ) -> impl Future<Output = Result<PixelBuffer, FramesweepError>> + Send {
        (**self).capture_at(seconds, timeout)
    }

    fn release(&self) {
        (**self).release();
    }

    fn max_concurrent_captures(&self) -> usize {
        (**self).max_concurrent_captures()
    }
}

/// Admission ticket limiting how many captures a handle runs at once.
///
/// Closing the gate makes every waiting and future [`acquire`](Self::acquire)
/// fail immediately. A handle whose captures outlive the caller's future
/// takes an [owned permit](Self::acquire_owned) and hands it to whatever
/// finishes the capture.
#[derive(Debug)]
pub struct CaptureGate {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl CaptureGate {
    /// A gate admitting one capture at a time.
    pub fn exclusive() -> Self {
        Self::with_capacity(1)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Wait for a free capture slot.
    ///
    /// # Errors
    ///
    /// [`FramesweepError::HandleReleased`] once the gate is closed.
    pub async fn acquire(&self) -> Result<SemaphorePermit<'_>, FramesweepError> {
        self.permits
            .acquire()
            .await
            .map_err(|_| FramesweepError::HandleReleased)
    }

    /// Like [`acquire`](Self::acquire), but the permit is not tied to the gate's
    /// lifetime and can be moved to another thread.
    ///
    /// # Errors
    ///
    /// [`FramesweepError::HandleReleased`] once the gate is closed.
    pub async fn acquire_owned(&self) -> Result<OwnedSemaphorePermit, FramesweepError> {
        Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| FramesweepError::HandleReleased)
    }

    /// Captures that could be admitted right now.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn close(&self) {
        self.permits.close();
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }
}

/// Await a capture, converting an elapsed `timeout` into
/// [`FramesweepError::SeekTimeout`].
pub async fn bounded_capture<F>(
    seconds: f64,
    timeout: Duration,
    capture: F,
) -> Result<PixelBuffer, FramesweepError>
where
    F: Future<Output = Result<PixelBuffer, FramesweepError>>,
{
    tokio::time::timeout(timeout, capture)
        .await
        .unwrap_or(Err(FramesweepError::SeekTimeout { seconds, timeout }))
}

/// Capture every `(key, seconds)` target, keeping up to
/// [`max_concurrent_captures`](DecodeHandle::max_concurrent_captures)
/// captures in flight.
///
/// Results arrive in target order whatever order the captures finish in.
/// With a limit of one, the next capture starts only after the previous
/// result has been taken from the stream.
pub fn capture_in_order<'a, H, K>(
    handle: &'a H,
    targets: Vec<(K, f64)>,
    timeout: Duration,
) -> impl Stream<Item = (K, f64, Result<PixelBuffer, FramesweepError>)> + Send + 'a
where
    H: DecodeHandle,
    K: Send + 'a,
{
    let in_flight = handle.max_concurrent_captures().max(1);
    stream::iter(targets)
        .map(move |(key, seconds)| async move {
            let result = handle.capture_at(seconds, timeout).await;
            (key, seconds, result)
        })
        .buffered(in_flight)
}
