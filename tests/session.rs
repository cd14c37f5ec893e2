//! Demux session lifecycle tests.

mod common;

use std::sync::Arc;

use common::{Recorder, ScriptedHandle, ms};
use framesweep::{
    DecodeHandle, DemuxCallbacks, DemuxOptions, DemuxSession, FrameDemuxer, FramesweepError,
};
use tokio::sync::Notify;

#[tokio::test(start_paused = true)]
async fn session_runs_both_passes() {
    let handle = Arc::new(ScriptedHandle::new(2.0));
    let recorder = Recorder::new();

    let mut session = DemuxSession::new(Arc::clone(&handle), DemuxOptions::new());
    session.set_callbacks(recorder.callbacks());
    session.initialize("clip.mp4").unwrap();

    let store = session.join().await.unwrap();
    assert_eq!(store.len(), 60);
    assert_eq!(store.summary().high_res, 60);
    assert_eq!(recorder.metadata().len(), 1);
    assert_eq!(recorder.completes().len(), 2);
    assert!(handle.is_released());
}

#[tokio::test(start_paused = true)]
async fn cleanup_during_upgrade_silences_session() {
    let upgrade_started = Arc::new(Notify::new());
    // 24 first-pass captures on a two second source; the 25th is the upgrade.
    let handle = Arc::new(
        ScriptedHandle::new(2.0)
            .with_latency(ms(5))
            .notify_after(24, Arc::clone(&upgrade_started)),
    );
    let recorder = Recorder::new();

    let mut session = DemuxSession::new(Arc::clone(&handle), DemuxOptions::new());
    session.set_callbacks(recorder.callbacks());
    session.initialize("clip.mp4").unwrap();

    upgrade_started.notified().await;
    assert_eq!(recorder.completes().len(), 1);
    session.cleanup();
    let progress_seen = recorder.progress().len();

    let result = session.join().await;
    assert!(matches!(result, Err(FramesweepError::Cancelled)));
    assert_eq!(recorder.completes().len(), 1);
    assert_eq!(recorder.progress().len(), progress_seen);
    assert!(handle.capture_count() < 24 + 60);
    assert!(handle.is_released());

    // A capture after release fails at once instead of waiting out its timeout.
    let late = tokio::time::timeout(ms(1), handle.capture_at(0.5, ms(2000))).await;
    assert!(matches!(late, Ok(Err(FramesweepError::HandleReleased))));
}

#[tokio::test(start_paused = true)]
async fn cleanup_before_first_pass_ends_suppresses_completion() {
    let halfway = Arc::new(Notify::new());
    let handle = Arc::new(
        ScriptedHandle::new(4.0)
            .with_latency(ms(5))
            .notify_after(10, Arc::clone(&halfway)),
    );
    let recorder = Recorder::new();

    let mut session = DemuxSession::new(Arc::clone(&handle), DemuxOptions::new());
    session.set_callbacks(recorder.callbacks());
    session.initialize("clip.mp4").unwrap();

    halfway.notified().await;
    session.cleanup();

    assert!(matches!(session.join().await, Err(FramesweepError::Cancelled)));
    assert!(recorder.completes().is_empty());
    assert!(recorder.progress().iter().all(|p| *p < 100.0));
    assert!(handle.capture_count() <= 11);
}

#[tokio::test(start_paused = true)]
async fn dropping_session_releases_handle() {
    let handle = Arc::new(ScriptedHandle::new(2.0).with_latency(ms(5)));

    {
        let mut session = DemuxSession::new(Arc::clone(&handle), DemuxOptions::new());
        session.initialize("clip.mp4").unwrap();
    }

    assert!(handle.is_released());
}

#[tokio::test(start_paused = true)]
async fn initialize_twice_is_rejected() {
    let mut session = DemuxSession::new(ScriptedHandle::new(1.0), DemuxOptions::new());
    session.initialize("clip.mp4").unwrap();

    assert!(matches!(
        session.initialize("clip.mp4"),
        Err(FramesweepError::AlreadyInitialized)
    ));
    session.join().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn join_without_initialize_is_rejected() {
    let mut session = DemuxSession::new(ScriptedHandle::new(1.0), DemuxOptions::new());
    assert!(matches!(
        session.join().await,
        Err(FramesweepError::NotInitialized)
    ));
}

#[tokio::test(start_paused = true)]
async fn invalid_options_are_rejected_on_initialize() {
    let options = DemuxOptions::new().with_low_res_frame_rate(0.0);
    let mut session = DemuxSession::new(ScriptedHandle::new(1.0), options);

    assert!(matches!(
        session.initialize("clip.mp4"),
        Err(FramesweepError::InvalidOptions(_))
    ));
    assert!(matches!(
        session.join().await,
        Err(FramesweepError::NotInitialized)
    ));
}

#[tokio::test(start_paused = true)]
async fn disabled_upgrade_completes_once() {
    let handle = Arc::new(ScriptedHandle::new(2.0));
    let recorder = Recorder::new();
    let options = DemuxOptions::new().with_background_upgrade(false);

    let mut session = DemuxSession::new(Arc::clone(&handle), options);
    session.set_callbacks(recorder.callbacks());
    session.initialize("clip.mp4").unwrap();

    let store = session.join().await.unwrap();
    assert_eq!(recorder.completes().len(), 1);
    assert_eq!(store.summary().high_res, 0);
    assert_eq!(handle.capture_count(), 24);
}

#[tokio::test(start_paused = true)]
async fn cleanup_is_idempotent() {
    let handle = Arc::new(ScriptedHandle::new(1.0));
    let mut session = DemuxSession::new(Arc::clone(&handle), DemuxOptions::new());

    session.cleanup();
    session.cleanup();
    assert!(session.cancellation_token().is_cancelled());
    assert!(handle.is_released());
}

#[tokio::test(start_paused = true)]
async fn callbacks_registered_after_initialize_reach_running_session() {
    let recorder = Recorder::new();
    let mut session = DemuxSession::new(ScriptedHandle::new(2.0), DemuxOptions::new());

    session.initialize("clip.mp4").unwrap();
    session.set_callbacks(recorder.callbacks());
    session.join().await.unwrap();

    assert_eq!(recorder.metadata().len(), 1);
    assert_eq!(recorder.progress().last().copied(), Some(100.0));
    assert_eq!(recorder.completes().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn replaced_callbacks_receive_the_rest_of_the_run() {
    let first_pass_done = Arc::new(Notify::new());
    let handle = ScriptedHandle::new(2.0)
        .with_latency(ms(5))
        .notify_after(24, Arc::clone(&first_pass_done));
    let early = Recorder::new();
    let late = Recorder::new();

    let mut session = DemuxSession::new(handle, DemuxOptions::new());
    session.set_callbacks(early.callbacks());
    session.initialize("clip.mp4").unwrap();

    first_pass_done.notified().await;
    session.set_callbacks(late.callbacks());
    session.join().await.unwrap();

    assert_eq!(early.metadata().len(), 1);
    assert_eq!(early.completes().len(), 1);
    assert!(late.metadata().is_empty());
    assert_eq!(late.completes().len(), 1);
}

#[tokio::test(start_paused = true)]
#[should_panic(expected = "host rejected frames")]
async fn panicking_callback_propagates_through_join() {
    let mut session = DemuxSession::new(ScriptedHandle::new(1.0), DemuxOptions::new());
    session.set_callbacks(DemuxCallbacks::new().on_complete(|_| panic!("host rejected frames")));
    session.initialize("clip.mp4").unwrap();

    let _ = session.join().await;
}
