//! FFmpeg decode handle tests.
//!
//! Tests require fixture files from `tests/fixtures/generate_fixtures.sh`
//! and are skipped when the fixture is missing.

#![cfg(feature = "ffmpeg")]

use std::path::Path;
use std::time::Duration;

use framesweep::{
    CancellationToken, DecodeHandle, DemuxCallbacks, DemuxOptions, FfmpegDecodeHandle,
    FfmpegLogLevel, FrameOutputOptions, FramesweepError, PixelFormat, Tier, run_pipeline,
};

const SAMPLE_VIDEO: &str = "tests/fixtures/sample_video.mp4";

fn fixture() -> Option<&'static str> {
    framesweep::set_ffmpeg_log_level(FfmpegLogLevel::Error);
    Path::new(SAMPLE_VIDEO).exists().then_some(SAMPLE_VIDEO)
}

#[tokio::test]
async fn metadata_matches_fixture() {
    let Some(path) = fixture() else { return };

    let handle = FfmpegDecodeHandle::new(FrameOutputOptions::default());
    let metadata = handle.load_metadata(path).await.unwrap();
    assert_eq!((metadata.width, metadata.height), (640, 480));
    assert!((metadata.duration_seconds - 5.0).abs() < 0.1);
    assert!(handle.wait_ready(Duration::from_secs(3)).await);
    handle.release();
}

#[tokio::test]
async fn capture_respects_output_options() {
    let Some(path) = fixture() else { return };

    let output = FrameOutputOptions {
        pixel_format: PixelFormat::Gray8,
        width: Some(160),
        ..FrameOutputOptions::default()
    };
    let handle = FfmpegDecodeHandle::new(output);
    handle.load_metadata(path).await.unwrap();

    let frame = handle
        .capture_at(1.0, Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!((frame.width(), frame.height()), (160, 120));
    assert!(frame.as_luma8().is_some());
    handle.release();
}

#[tokio::test]
async fn capture_past_the_end_returns_last_frame() {
    let Some(path) = fixture() else { return };

    let handle = FfmpegDecodeHandle::new(FrameOutputOptions::default());
    handle.load_metadata(path).await.unwrap();
    let result = handle.capture_at(60.0, Duration::from_secs(2)).await;
    assert!(result.is_ok());
    handle.release();
}

#[tokio::test]
async fn released_handle_rejects_captures() {
    let Some(path) = fixture() else { return };

    let handle = FfmpegDecodeHandle::new(FrameOutputOptions::default());
    handle.load_metadata(path).await.unwrap();
    handle.release();
    assert!(matches!(
        handle.capture_at(0.0, Duration::from_secs(2)).await,
        Err(FramesweepError::HandleReleased)
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn pipeline_over_fixture_reaches_high_res() {
    let Some(path) = fixture() else { return };

    let options = DemuxOptions::new()
        .with_target_frame_rate(10.0)
        .with_low_res_frame_rate(4.0)
        .with_upgrade_cooldown(Duration::from_millis(50))
        .with_resolution(Some(64), None);
    let handle = FfmpegDecodeHandle::new(options.frame_output().clone());

    let store = run_pipeline(
        &handle,
        path,
        &options,
        DemuxCallbacks::new(),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(store.len(), 50);
    assert!(store.summary().high_res > 0);
    assert_eq!(store.get(0).map(|record| record.tier), Some(Tier::HighRes));
}
