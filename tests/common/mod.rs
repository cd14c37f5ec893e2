//! Scripted decode handles and callback recorders shared by the
//! integration tests.

#![allow(dead_code)]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use std::time::Duration;

use image::{DynamicImage, Rgb, RgbImage};
use tokio::sync::Notify;

use framesweep::{
    CaptureGate, DecodeHandle, DemuxCallbacks, FramesweepError, PixelBuffer, SourceMetadata,
    bounded_capture,
};

/// What a scripted capture does at a given time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Frame,
    /// Never completes; the caller's timeout fires.
    Hang,
    /// Fails immediately with a decode error.
    Fail,
}

type Script = dyn Fn(f64) -> Outcome + Send + Sync;

/// In-memory [`DecodeHandle`] whose captures follow a script.
pub struct ScriptedHandle {
    metadata: Result<SourceMetadata, String>,
    ready: bool,
    latency: Duration,
    script: Box<Script>,
    gate: CaptureGate,
    captures: Mutex<Vec<f64>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    released: AtomicBool,
    notify_after: Option<(usize, Arc<Notify>)>,
}

impl ScriptedHandle {
    /// A 64×36 source of `duration_seconds` where every capture succeeds.
    pub fn new(duration_seconds: f64) -> Self {
        Self {
            metadata: Ok(SourceMetadata::new(64, 36, duration_seconds)),
            ready: true,
            latency: Duration::ZERO,
            script: Box::new(|_| Outcome::Frame),
            gate: CaptureGate::exclusive(),
            captures: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            released: AtomicBool::new(false),
            notify_after: None,
        }
    }

    pub fn with_script<F>(mut self, script: F) -> Self
    where
        F: Fn(f64) -> Outcome + Send + Sync + 'static,
    {
        self.script = Box::new(script);
        self
    }

    /// Virtual time every successful capture takes.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Admit up to `captures` overlapping captures.
    pub fn with_parallelism(mut self, captures: usize) -> Self {
        self.gate = CaptureGate::with_capacity(captures);
        self
    }

    pub fn never_ready(mut self) -> Self {
        self.ready = false;
        self
    }

    pub fn failing_metadata(mut self, reason: &str) -> Self {
        self.metadata = Err(reason.to_string());
        self
    }

    /// Signal `notify` when capture number `count + 1` starts.
    pub fn notify_after(mut self, count: usize, notify: Arc<Notify>) -> Self {
        self.notify_after = Some((count, notify));
        self
    }

    /// Times of every admitted capture, in order.
    pub fn captures(&self) -> Vec<f64> {
        self.captures.lock().unwrap().clone()
    }

    pub fn capture_count(&self) -> usize {
        self.captures.lock().unwrap().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl DecodeHandle for ScriptedHandle {
    async fn load_metadata(&self, source: &str) -> Result<SourceMetadata, FramesweepError> {
        self.metadata
            .clone()
            .map_err(|reason| FramesweepError::FileOpen {
                path: source.into(),
                reason,
            })
    }

    async fn wait_ready(&self, timeout: Duration) -> bool {
        if !self.ready {
            tokio::time::sleep(timeout).await;
        }
        self.ready
    }

    async fn capture_at(
        &self,
        seconds: f64,
        timeout: Duration,
    ) -> Result<PixelBuffer, FramesweepError> {
        let _permit = self.gate.acquire().await?;

        let count = {
            let mut captures = self.captures.lock().unwrap();
            captures.push(seconds);
            captures.len()
        };
        if let Some((after, notify)) = &self.notify_after {
            if count == after + 1 {
                notify.notify_one();
            }
        }

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        let outcome = (self.script)(seconds);
        let latency = self.latency;
        let result = bounded_capture(seconds, timeout, async move {
            match outcome {
                Outcome::Frame => {
                    if !latency.is_zero() {
                        tokio::time::sleep(latency).await;
                    }
                    Ok(frame_at(seconds))
                }
                Outcome::Hang => std::future::pending().await,
                Outcome::Fail => Err(FramesweepError::VideoDecodeError(format!(
                    "scripted failure at {seconds}s"
                ))),
            }
        })
        .await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
        self.gate.close();
    }

    fn max_concurrent_captures(&self) -> usize {
        self.gate.capacity()
    }
}

/// A 2×2 frame whose red channel encodes the capture time in centiseconds.
pub fn frame_at(seconds: f64) -> PixelBuffer {
    let shade = ((seconds * 100.0) as u32 % 256) as u8;
    Arc::new(DynamicImage::ImageRgb8(RgbImage::from_pixel(
        2,
        2,
        Rgb([shade, 0, 0]),
    )))
}

/// Captures every callback a session delivers.
#[derive(Clone, Default)]
pub struct Recorder {
    metadata: Arc<Mutex<Vec<SourceMetadata>>>,
    progress: Arc<Mutex<Vec<f32>>>,
    completes: Arc<Mutex<Vec<Vec<PixelBuffer>>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn callbacks(&self) -> DemuxCallbacks {
        let metadata = Arc::clone(&self.metadata);
        let progress = Arc::clone(&self.progress);
        let completes = Arc::clone(&self.completes);
        DemuxCallbacks::new()
            .on_metadata(move |value| metadata.lock().unwrap().push(value.clone()))
            .on_progress(move |percent| progress.lock().unwrap().push(percent))
            .on_complete(move |frames| completes.lock().unwrap().push(frames))
    }

    pub fn metadata(&self) -> Vec<SourceMetadata> {
        self.metadata.lock().unwrap().clone()
    }

    pub fn progress(&self) -> Vec<f32> {
        self.progress.lock().unwrap().clone()
    }

    pub fn completes(&self) -> Vec<Vec<PixelBuffer>> {
        self.completes.lock().unwrap().clone()
    }
}

pub fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}
