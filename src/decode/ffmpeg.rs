//! FFmpeg-backed [`DecodeHandle`].
//!
//! FFmpeg contexts stay on one blocking worker thread for the lifetime of
//! the handle. A capture is a command sent to that worker carrying a
//! oneshot reply; the reply is the seek-completed signal the async side
//! waits on, bounded by the capture timeout. If the timeout wins, the
//! worker's late reply is simply dropped.
//!
//! The command also carries the handle's gate permit, which the worker
//! returns only when it has finished seeking. A capture abandoned by its
//! caller therefore still blocks the next one, and waiting for it counts
//! against the next caller's timeout.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use ffmpeg_next::{
    Rational,
    codec::context::Context as CodecContext,
    decoder::Video as VideoDecoder,
    format::context::Input,
    frame::Video as VideoFrame,
    media::Type,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
};
use tokio::sync::{OwnedSemaphorePermit, mpsc, oneshot, watch};

use crate::{
    decode::{CaptureGate, DecodeHandle, bounded_capture},
    error::FramesweepError,
    frame::{PixelBuffer, pixel_buffer_from_packed},
    metadata::SourceMetadata,
    options::{FrameOutputOptions, PixelFormat},
};

/// Container-level seeks and durations are expressed in AV_TIME_BASE.
const MICROS_PER_SECOND: f64 = 1_000_000.0;

enum Command {
    Capture {
        seconds: f64,
        reply: oneshot::Sender<Result<PixelBuffer, FramesweepError>>,
        permit: OwnedSemaphorePermit,
    },
}

/// Decode handle that seeks and decodes with FFmpeg.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
///
/// use framesweep::{DecodeHandle, FfmpegDecodeHandle, FrameOutputOptions};
///
/// # async fn example() -> Result<(), framesweep::FramesweepError> {
/// let handle = FfmpegDecodeHandle::new(FrameOutputOptions::default());
/// let metadata = handle.load_metadata("input.mp4").await?;
/// let frame = handle.capture_at(metadata.duration_seconds / 2.0, Duration::from_secs(2)).await?;
/// frame.save("middle.png")?;
/// handle.release();
/// # Ok(())
/// # }
/// ```
pub struct FfmpegDecodeHandle {
    output: FrameOutputOptions,
    gate: CaptureGate,
    commands: Mutex<Option<mpsc::UnboundedSender<Command>>>,
    ready: watch::Sender<bool>,
}

impl FfmpegDecodeHandle {
    pub fn new(output: FrameOutputOptions) -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            output,
            gate: CaptureGate::exclusive(),
            commands: Mutex::new(None),
            ready,
        }
    }

    fn commands(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<Command>>> {
        self.commands.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DecodeHandle for FfmpegDecodeHandle {
    async fn load_metadata(&self, source: &str) -> Result<SourceMetadata, FramesweepError> {
        if self.gate.is_closed() {
            return Err(FramesweepError::HandleReleased);
        }
        if self.commands().is_some() {
            return Err(FramesweepError::AlreadyInitialized);
        }

        log::debug!("Opening decode worker for {source}");
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (opened_tx, opened_rx) = oneshot::channel();
        let ready = self.ready.clone();
        let worker_source = source.to_string();
        let output = self.output.clone();

        tokio::task::spawn_blocking(move || {
            run_worker(worker_source, output, opened_tx, ready, command_rx);
        });

        let metadata = opened_rx.await.map_err(|_| FramesweepError::FileOpen {
            path: PathBuf::from(source),
            reason: "decode worker exited before opening the source".to_string(),
        })??;

        *self.commands() = Some(command_tx);
        Ok(metadata)
    }

    async fn wait_ready(&self, timeout: Duration) -> bool {
        let mut ready = self.ready.subscribe();
        matches!(
            tokio::time::timeout(timeout, ready.wait_for(|is_ready| *is_ready)).await,
            Ok(Ok(_))
        )
    }

    async fn capture_at(
        &self,
        seconds: f64,
        timeout: Duration,
    ) -> Result<PixelBuffer, FramesweepError> {
        bounded_capture(seconds, timeout, async {
            let permit = self.gate.acquire_owned().await?;
            let sender = self
                .commands()
                .clone()
                .ok_or(FramesweepError::HandleReleased)?;

            let (reply, signal) = oneshot::channel();
            sender
                .send(Command::Capture {
                    seconds,
                    reply,
                    permit,
                })
                .map_err(|_| FramesweepError::HandleReleased)?;
            signal.await.unwrap_or(Err(FramesweepError::HandleReleased))
        })
        .await
    }

    fn release(&self) {
        self.gate.close();
        if self.commands().take().is_some() {
            log::debug!("Released FFmpeg decode handle");
        }
    }
}

impl Drop for FfmpegDecodeHandle {
    fn drop(&mut self) {
        self.release();
    }
}

fn run_worker(
    source: String,
    output: FrameOutputOptions,
    opened: oneshot::Sender<Result<SourceMetadata, FramesweepError>>,
    ready: watch::Sender<bool>,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let mut decoder = match SeekingDecoder::open(&source, &output) {
        Ok(decoder) => decoder,
        Err(error) => {
            let _ = opened.send(Err(error));
            return;
        }
    };

    if opened.send(Ok(decoder.metadata.clone())).is_err() {
        return;
    }
    ready.send_replace(true);

    serve_captures(&mut commands, |seconds| decoder.capture(seconds));
    log::debug!("Decode worker for {source} stopped");
}

/// Run capture commands until every sender is gone. The gate permit of each
/// command is returned before its reply is sent.
fn serve_captures<F>(commands: &mut mpsc::UnboundedReceiver<Command>, mut capture: F)
where
    F: FnMut(f64) -> Result<PixelBuffer, FramesweepError>,
{
    while let Some(command) = commands.blocking_recv() {
        match command {
            Command::Capture {
                seconds,
                reply,
                permit,
            } => {
                if reply.is_closed() {
                    log::trace!("Skipping abandoned capture at {seconds:.3}s");
                    continue;
                }
                let result = capture(seconds);
                drop(permit);
                let _ = reply.send(result);
            }
        }
    }
}

/// Demuxer, decoder and scaler for one video stream.
struct SeekingDecoder {
    input: Input,
    decoder: VideoDecoder,
    scaler: ScalingContext,
    stream_index: usize,
    time_base: Rational,
    output_width: u32,
    output_height: u32,
    pixel_format: PixelFormat,
    metadata: SourceMetadata,
}

impl SeekingDecoder {
    fn open(source: &str, output: &FrameOutputOptions) -> Result<Self, FramesweepError> {
        let open_error = |reason: String| FramesweepError::FileOpen {
            path: PathBuf::from(source),
            reason,
        };

        ffmpeg_next::init()
            .map_err(|error| open_error(format!("FFmpeg initialisation failed: {error}")))?;
        let input = ffmpeg_next::format::input(&source)
            .map_err(|error| open_error(error.to_string()))?;

        let stream = input
            .streams()
            .best(Type::Video)
            .ok_or(FramesweepError::NoVideoStream)?;
        let stream_index = stream.index();
        let time_base = stream.time_base();

        let container_micros = input.duration();
        let duration_seconds = if container_micros > 0 {
            container_micros as f64 / MICROS_PER_SECOND
        } else if stream.duration() > 0 {
            pts_to_seconds(stream.duration(), time_base)
        } else {
            0.0
        };

        let decoder = CodecContext::from_parameters(stream.parameters())?
            .decoder()
            .video()?;

        let (output_width, output_height) =
            output.resolve_dimensions(decoder.width(), decoder.height());
        let scaler = ScalingContext::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            output.pixel_format.to_ffmpeg_pixel(),
            output_width,
            output_height,
            ScalingFlags::BILINEAR,
        )?;

        let metadata = SourceMetadata::new(decoder.width(), decoder.height(), duration_seconds);
        log::debug!(
            "Opened {source}: {}x{}, {:.3}s, stream {stream_index}",
            metadata.width,
            metadata.height,
            metadata.duration_seconds
        );

        Ok(Self {
            input,
            decoder,
            scaler,
            stream_index,
            time_base,
            output_width,
            output_height,
            pixel_format: output.pixel_format,
            metadata,
        })
    }

    /// Seek to the keyframe at or before `seconds`, then decode forward to
    /// the first frame at or past it. Past the last frame, the last frame
    /// decoded is returned.
    fn capture(&mut self, seconds: f64) -> Result<PixelBuffer, FramesweepError> {
        let seek_target = (seconds.max(0.0) * MICROS_PER_SECOND) as i64;
        self.input.seek(seek_target, ..seek_target)?;
        self.decoder.flush();

        let target_pts = seconds_to_pts(seconds, self.time_base);
        let mut decoded = VideoFrame::empty();
        let mut previous = VideoFrame::empty();
        let mut have_previous = false;

        for (stream, packet) in self.input.packets() {
            if stream.index() != self.stream_index {
                continue;
            }
            self.decoder.send_packet(&packet)?;

            while self.decoder.receive_frame(&mut decoded).is_ok() {
                let pts = decoded.timestamp().or(decoded.pts()).unwrap_or(0);
                if pts >= target_pts {
                    return convert_frame(
                        &mut self.scaler,
                        &decoded,
                        self.output_width,
                        self.output_height,
                        self.pixel_format,
                    );
                }
                std::mem::swap(&mut decoded, &mut previous);
                have_previous = true;
            }
        }

        self.decoder.send_eof()?;
        while self.decoder.receive_frame(&mut decoded).is_ok() {
            let pts = decoded.timestamp().or(decoded.pts()).unwrap_or(0);
            if pts >= target_pts {
                return self.convert(&decoded);
            }
            std::mem::swap(&mut decoded, &mut previous);
            have_previous = true;
        }

        if have_previous {
            return self.convert(&previous);
        }
        Err(FramesweepError::VideoDecodeError(format!(
            "No frame decoded at or before {seconds:.3}s"
        )))
    }

    fn convert(&mut self, decoded: &VideoFrame) -> Result<PixelBuffer, FramesweepError> {
        convert_frame(
            &mut self.scaler,
            decoded,
            self.output_width,
            self.output_height,
            self.pixel_format,
        )
    }
}

fn convert_frame(
    scaler: &mut ScalingContext,
    decoded: &VideoFrame,
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
) -> Result<PixelBuffer, FramesweepError> {
    let mut scaled = VideoFrame::empty();
    scaler.run(decoded, &mut scaled)?;
    let data = packed_rows(&scaled, width, height, pixel_format.bytes_per_pixel());
    pixel_buffer_from_packed(width, height, pixel_format, data)
}

/// Copy the first plane of `frame` into tightly-packed rows, dropping
/// any stride padding.
fn packed_rows(frame: &VideoFrame, width: u32, height: u32, bytes_per_pixel: usize) -> Vec<u8> {
    let stride = frame.stride(0);
    let row_bytes = width as usize * bytes_per_pixel;
    let rows = height as usize;
    let data = frame.data(0);

    if stride == row_bytes {
        return data[..row_bytes * rows].to_vec();
    }
    let mut buffer = Vec::with_capacity(row_bytes * rows);
    for row in 0..rows {
        let start = row * stride;
        buffer.extend_from_slice(&data[start..start + row_bytes]);
    }
    buffer
}

fn seconds_to_pts(seconds: f64, time_base: Rational) -> i64 {
    let numerator = f64::from(time_base.numerator());
    let denominator = f64::from(time_base.denominator());
    if numerator == 0.0 {
        return 0;
    }
    (seconds * denominator / numerator) as i64
}

fn pts_to_seconds(pts: i64, time_base: Rational) -> f64 {
    pts as f64 * f64::from(time_base.numerator()) / f64::from(time_base.denominator())
}
