//! Demux sessions.
//!
//! A session owns one [`DecodeHandle`] and one [`FrameQualityStore`] and runs
//! the whole pipeline over them:
//!
//! 1. load metadata, report it, size the store;
//! 2. wait (best effort) for the source to become ready;
//! 3. first pass at the reduced rate, then gap filling;
//! 4. first `on_complete` with the best-effort frames;
//! 5. cooldown, then the full-resolution upgrade pass;
//! 6. second `on_complete` with the refined frames, then release the handle.
//!
//! The two passes never overlap and the handle admits one capture at a time,
//! so the store has a single writer throughout.
//!
//! # Example
//!
//! ```no_run
//! use framesweep::{
//!     DemuxCallbacks, DemuxOptions, DemuxSession, FfmpegDecodeHandle, FrameDemuxer,
//!     FramesweepError,
//! };
//!
//! # async fn example() -> Result<(), FramesweepError> {
//! let options = DemuxOptions::new();
//! let handle = FfmpegDecodeHandle::new(options.frame_output().clone());
//! let mut session = DemuxSession::new(handle, options);
//! session.set_callbacks(
//!     DemuxCallbacks::new()
//!         .on_progress(|percent| println!("{percent:.0}%"))
//!         .on_complete(|frames| println!("{} frame(s) ready", frames.len())),
//! );
//! session.initialize("input.mp4")?;
//! let store = session.join().await?;
//! println!("{}", store.summary());
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, PoisonError, RwLock};

use tokio::task::JoinHandle;

use crate::{
    callbacks::{CallbackEmitter, DemuxCallbacks, SharedCallbacks},
    decode::DecodeHandle,
    error::FramesweepError,
    extraction::extract_low_res,
    interpolate::fill_gaps,
    options::DemuxOptions,
    progress::CancellationToken,
    store::FrameQualityStore,
    upgrade::upgrade_store,
};

/// The capability every frame demux strategy exposes to the host.
pub trait FrameDemuxer {
    /// Start demuxing `source`.
    fn initialize(&mut self, source: &str) -> Result<(), FramesweepError>;

    /// Register the host callbacks, replacing any set registered before.
    /// A running session delivers its next callback to the new set.
    fn set_callbacks(&mut self, callbacks: DemuxCallbacks);

    /// Stop delivering callbacks and release the decode resource now.
    fn cleanup(&mut self);
}

/// Background demux session over a [`DecodeHandle`].
///
/// [`initialize`](FrameDemuxer::initialize) spawns the pipeline on the
/// current Tokio runtime and must be called from within one.
pub struct DemuxSession<H: DecodeHandle> {
    handle: Arc<H>,
    options: DemuxOptions,
    callbacks: SharedCallbacks,
    cancel: CancellationToken,
    task: Option<JoinHandle<Result<FrameQualityStore, FramesweepError>>>,
    initialized: bool,
}

impl<H: DecodeHandle> DemuxSession<H> {
    pub fn new(handle: H, options: DemuxOptions) -> Self {
        Self {
            handle: Arc::new(handle),
            options,
            callbacks: Arc::new(RwLock::new(DemuxCallbacks::default())),
            cancel: CancellationToken::new(),
            task: None,
            initialized: false,
        }
    }

    pub fn options(&self) -> &DemuxOptions {
        &self.options
    }

    /// Token that [`cleanup`](FrameDemuxer::cleanup) cancels.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Returns `true` once the pipeline task has ended.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_some_and(JoinHandle::is_finished)
    }

    /// Wait for the pipeline and take the final store.
    ///
    /// # Errors
    ///
    /// - [`FramesweepError::NotInitialized`] if the session never started
    ///   or was already joined.
    /// - [`FramesweepError::Cancelled`] if the session was cleaned up.
    /// - Whatever stopped the pipeline before the store could be sized.
    ///
    /// # Panics
    ///
    /// Resumes the panic of a host callback that panicked inside the pipeline.
    pub async fn join(&mut self) -> Result<FrameQualityStore, FramesweepError> {
        let task = self.task.take().ok_or(FramesweepError::NotInitialized)?;
        match task.await {
            Ok(result) => result,
            Err(error) if error.is_panic() => std::panic::resume_unwind(error.into_panic()),
            Err(_) => Err(FramesweepError::Cancelled),
        }
    }
}

impl<H: DecodeHandle> FrameDemuxer for DemuxSession<H> {
    fn initialize(&mut self, source: &str) -> Result<(), FramesweepError> {
        if self.initialized {
            return Err(FramesweepError::AlreadyInitialized);
        }
        self.options.validate()?;
        self.initialized = true;

        let handle = Arc::clone(&self.handle);
        let source = source.to_string();
        let options = self.options.clone();
        let emitter = CallbackEmitter::shared(Arc::clone(&self.callbacks), self.cancel.clone());
        let cancel = self.cancel.clone();

        self.task = Some(tokio::spawn(async move {
            run_with_emitter(handle.as_ref(), &source, &options, &emitter, &cancel).await
        }));
        Ok(())
    }

    fn set_callbacks(&mut self, callbacks: DemuxCallbacks) {
        if self.initialized {
            log::debug!("Replacing callbacks of a running session");
        }
        *self.callbacks.write().unwrap_or_else(PoisonError::into_inner) = callbacks;
    }

    fn cleanup(&mut self) {
        if !self.cancel.is_cancelled() {
            log::debug!("Cleaning up demux session");
        }
        self.cancel.cancel();
        self.handle.release();
    }
}

impl<H: DecodeHandle> Drop for DemuxSession<H> {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Run the full two-pass pipeline over `handle` and return the final store.
///
/// The handle is released on every exit path. Callbacks stop as soon as
/// `cancel` fires.
///
/// # Errors
///
/// - [`FramesweepError::InvalidOptions`] for inconsistent options.
/// - Any error from [`DecodeHandle::load_metadata`].
/// - [`FramesweepError::InvalidDuration`] for a negative or non-finite duration.
/// - [`FramesweepError::Cancelled`] if `cancel` fired before the pipeline finished.
pub async fn run_pipeline<H: DecodeHandle>(
    handle: &H,
    source: &str,
    options: &DemuxOptions,
    callbacks: DemuxCallbacks,
    cancel: &CancellationToken,
) -> Result<FrameQualityStore, FramesweepError> {
    let emitter = CallbackEmitter::new(callbacks, cancel.clone());
    run_with_emitter(handle, source, options, &emitter, cancel).await
}

async fn run_with_emitter<H: DecodeHandle>(
    handle: &H,
    source: &str,
    options: &DemuxOptions,
    emitter: &CallbackEmitter,
    cancel: &CancellationToken,
) -> Result<FrameQualityStore, FramesweepError> {
    let result = drive(handle, source, options, emitter, cancel).await;
    handle.release();
    result
}

async fn drive<H: DecodeHandle>(
    handle: &H,
    source: &str,
    options: &DemuxOptions,
    emitter: &CallbackEmitter,
    cancel: &CancellationToken,
) -> Result<FrameQualityStore, FramesweepError> {
    options.validate()?;

    let metadata = handle.load_metadata(source).await?;
    if !metadata.duration_seconds.is_finite() || metadata.duration_seconds < 0.0 {
        return Err(FramesweepError::InvalidDuration(metadata.duration_seconds));
    }
    emitter.metadata(&metadata);

    let mut store =
        FrameQualityStore::with_rate(metadata.duration_seconds, options.target_frame_rate);
    log::debug!(
        "Demuxing {source}: {}x{}, {:.3}s, {} slot(s) at {} fps",
        metadata.width,
        metadata.height,
        metadata.duration_seconds,
        store.len(),
        options.target_frame_rate
    );

    if !handle.wait_ready(options.readiness_timeout).await {
        log::warn!(
            "Source not ready after {:?}; extracting anyway",
            options.readiness_timeout
        );
    }

    let extraction = extract_low_res(
        handle,
        &mut store,
        metadata.duration_seconds,
        options,
        emitter,
        cancel,
    )
    .await;
    if extraction.cancelled || cancel.is_cancelled() {
        return Err(FramesweepError::Cancelled);
    }

    fill_gaps(&mut store);
    log::debug!("Best-effort frames ready: {}", store.summary());
    emitter.complete(store.snapshot_displayable());

    if !options.background_upgrade {
        return Ok(store);
    }

    if !options.upgrade_cooldown.is_zero() {
        tokio::time::sleep(options.upgrade_cooldown).await;
    }
    if cancel.is_cancelled() {
        return Err(FramesweepError::Cancelled);
    }

    let upgrade = upgrade_store(handle, &mut store, options, cancel).await;
    if upgrade.cancelled || cancel.is_cancelled() {
        return Err(FramesweepError::Cancelled);
    }

    log::debug!("Refined frames ready: {}", store.summary());
    emitter.complete(store.snapshot_displayable());
    Ok(store)
}
