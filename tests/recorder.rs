mod common;

use std::{
    fs,
    time::{Duration, Instant},
};

use common::*;
use signlang::{
    AnimationRenderer, CaptureEvent, CaptureRequest, CaptureState,
    assets::read_landmarks,
    config::RenderConfig,
    types::NUM_LANDMARKS,
};

fn states(events: &crossbeam_channel::Receiver<CaptureEvent>) -> Vec<CaptureState> {
    events
        .try_iter()
        .filter_map(|event| match event {
            CaptureEvent::State(state) => Some(state),
            CaptureEvent::Frame { .. } => None,
        })
        .collect()
}

#[test]
fn record_persists_video_landmarks_and_index() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        dir.path(),
        FakeCamera::with_frames(6),
        DetectorScript::GapEveryThird,
        TextSink::default(),
        capture_config(2_000),
    );

    let task = h
        .recorder
        .start(CaptureRequest::new("  Hello ").owner("ana"))
        .unwrap();
    assert_eq!(task.word(), "hello");
    let events = task.events().clone();
    let record = task.wait().unwrap();

    assert_eq!(record.word, "hello");
    assert_eq!(record.owner.as_deref(), Some("ana"));
    assert_eq!(record.video, h.layout.video_path("hello"));
    assert_eq!(record.landmarks, h.layout.landmark_path("hello"));
    assert!(record.video.exists());

    // Six frames read, frames 0 and 3 had no hands.
    let sequence = read_landmarks(&record.landmarks).unwrap();
    assert_eq!(sequence.len(), 4);
    assert_eq!(
        fs::read_to_string(&record.video).unwrap(),
        format!("run 0 {WIDTH}x{HEIGHT} @100 frames 6")
    );

    assert_eq!(
        states(&events),
        vec![
            CaptureState::Idle,
            CaptureState::OpeningDevice,
            CaptureState::Countdown,
            CaptureState::Capturing,
            CaptureState::Finalizing,
            CaptureState::Persisted,
        ]
    );

    assert_eq!(h.index.get("hello").unwrap(), Some(record));
    let mapping = fs::read_to_string(dir.path().join("words.json")).unwrap();
    assert!(mapping.contains("\"hello\""));
    assert_eq!(h.counters.opened(), 1);
    assert_eq!(h.counters.released(), 1);
}

#[test]
fn every_stored_hand_has_21_finite_landmarks() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        dir.path(),
        FakeCamera::with_frames(9),
        DetectorScript::GapEveryThird,
        TextSink::default(),
        capture_config(2_000),
    );

    let record = h.recorder.record(CaptureRequest::new("wave")).unwrap();
    let sequence = read_landmarks(&record.landmarks).unwrap();

    assert!(!sequence.is_empty());
    for frame in &sequence.frames {
        assert!(!frame.hands.is_empty());
        assert!(frame.hands.len() <= 2);
        for hand in &frame.hands {
            assert_eq!(hand.landmarks.len(), NUM_LANDMARKS);
            assert!(hand.landmarks.iter().all(|lm| lm.is_finite()));
        }
    }

    let raw: serde_json::Value =
        serde_json::from_slice(&fs::read(&record.landmarks).unwrap()).unwrap();
    let first_hand = &raw[0][0];
    assert_eq!(first_hand.as_array().unwrap().len(), NUM_LANDMARKS);
    assert!(first_hand[0].get("x").is_some());
}

#[test]
fn existing_word_conflicts_unless_overwritten() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        dir.path(),
        FakeCamera::with_frames(3),
        DetectorScript::AlwaysHand,
        TextSink::default(),
        capture_config(2_000),
    );

    let first = h.recorder.record(CaptureRequest::new("hello")).unwrap();
    let video_before = fs::read(&first.video).unwrap();
    let landmarks_before = fs::read(&first.landmarks).unwrap();

    let err = h.recorder.record(CaptureRequest::new("HELLO")).unwrap_err();
    assert_eq!(err.kind(), "ConflictError");
    assert_eq!(fs::read(&first.video).unwrap(), video_before);
    assert_eq!(fs::read(&first.landmarks).unwrap(), landmarks_before);
    assert_eq!(h.counters.opened(), 1, "conflict must not touch the camera");

    let second = h
        .recorder
        .record(CaptureRequest::new("hello").overwrite(true))
        .unwrap();
    assert_eq!(second.video, first.video);
    assert_eq!(second.landmarks, first.landmarks);
    assert_ne!(fs::read(&second.video).unwrap(), video_before);
    assert_eq!(h.index.len(), 1);
}

#[test]
fn read_failure_truncates_capture() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        dir.path(),
        FakeCamera::with_frames(2),
        DetectorScript::AlwaysHand,
        TextSink::default(),
        capture_config(10_000),
    );

    let started = Instant::now();
    let record = h.recorder.record(CaptureRequest::new("short")).unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(read_landmarks(&record.landmarks).unwrap().len(), 2);
    assert_eq!(h.sink.finished.lock().unwrap()[0].1, 2);
}

#[test]
fn undecodable_frame_is_skipped_without_ending_capture() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        dir.path(),
        FakeCamera::with_frames(6).undecodable_at(&[2]),
        DetectorScript::AlwaysHand,
        TextSink::default(),
        capture_config(10_000),
    );

    let record = h.recorder.record(CaptureRequest::new("hello")).unwrap();

    // Every good frame after the bad one still made it in.
    assert_eq!(read_landmarks(&record.landmarks).unwrap().len(), 6);
    assert_eq!(h.sink.finished.lock().unwrap()[0].1, 6);
    assert_eq!(h.counters.opened(), 1);
}

#[test]
fn detector_errors_count_as_empty_frames() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        dir.path(),
        FakeCamera::with_frames(4),
        DetectorScript::Failing,
        TextSink::default(),
        capture_config(2_000),
    );

    let record = h.recorder.record(CaptureRequest::new("blank")).unwrap();

    assert!(read_landmarks(&record.landmarks).unwrap().is_empty());
    assert_eq!(h.sink.finished.lock().unwrap()[0].1, 4);
}

#[test]
fn camera_open_failure_is_device_error() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        dir.path(),
        FakeCamera::broken(),
        DetectorScript::AlwaysHand,
        TextSink::default(),
        capture_config(2_000),
    );

    let task = h.recorder.start(CaptureRequest::new("hello")).unwrap();
    let events = task.events().clone();
    let err = task.wait().unwrap_err();

    assert_eq!(err.kind(), "DeviceError");
    assert!(err.to_string().contains("no camera attached"));
    assert_eq!(states(&events).last(), Some(&CaptureState::DeviceError));
    assert!(!h.layout.video_path("hello").exists());
    assert!(h.index.is_empty());

    // The device lock was released: the next attempt fails the same way, not as busy.
    let err = h.recorder.record(CaptureRequest::new("hello")).unwrap_err();
    assert!(!err.to_string().contains("busy"));
}

#[test]
fn writer_open_failure_releases_camera() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        dir.path(),
        FakeCamera::with_frames(3),
        DetectorScript::AlwaysHand,
        TextSink::failing(),
        capture_config(2_000),
    );

    let err = h.recorder.record(CaptureRequest::new("hello")).unwrap_err();

    assert_eq!(err.kind(), "DeviceError");
    assert_eq!(h.counters.opened(), 1);
    assert_eq!(h.counters.released(), 1);
    assert!(!h.layout.landmark_path("hello").exists());
}

#[test]
fn second_capture_while_busy_is_rejected_and_first_can_be_cancelled() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        dir.path(),
        FakeCamera::endless(),
        DetectorScript::AlwaysHand,
        TextSink::default(),
        capture_config(30_000),
    );

    let running = h.recorder.start(CaptureRequest::new("long")).unwrap();
    let err = h.recorder.start(CaptureRequest::new("other")).unwrap_err();
    assert_eq!(err.kind(), "DeviceError");
    assert!(err.to_string().contains("busy"));

    // Let it reach the capture loop before cancelling.
    let deadline = Instant::now() + Duration::from_secs(5);
    while !running
        .events()
        .try_iter()
        .any(|event| matches!(event, CaptureEvent::Frame { .. }))
    {
        assert!(Instant::now() < deadline, "capture never produced a frame");
        std::thread::sleep(Duration::from_millis(5));
    }

    running.cancel();
    let err = running.wait().unwrap_err();
    assert_eq!(err.kind(), "CancelledError");

    assert!(!h.layout.video_path("long").exists());
    assert!(!h.layout.landmark_path("long").exists());
    assert!(h.index.get("long").unwrap().is_none());
    assert_eq!(h.counters.released(), h.counters.opened());

    // Device free again.
    let next = h.recorder.start(CaptureRequest::new("other")).unwrap();
    next.cancel();
    assert_eq!(next.wait().unwrap_err().kind(), "CancelledError");
}

#[test]
fn cancel_during_countdown() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = capture_config(2_000);
    settings.countdown_ms = 60_000;
    let h = harness(
        dir.path(),
        FakeCamera::with_frames(3),
        DetectorScript::AlwaysHand,
        TextSink::default(),
        settings,
    );

    let started = Instant::now();
    let task = h.recorder.start(CaptureRequest::new("hello")).unwrap();
    task.cancel();
    let events = task.events().clone();
    let err = task.wait().unwrap_err();

    assert_eq!(err.kind(), "CancelledError");
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(states(&events).last(), Some(&CaptureState::Cancelled));
    assert!(h.sink.finished.lock().unwrap().is_empty());
}

#[test]
fn cancelled_overwrite_drops_stale_entry() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = capture_config(2_000);
    settings.countdown_ms = 60_000;
    let h = harness(
        dir.path(),
        FakeCamera::with_frames(3),
        DetectorScript::AlwaysHand,
        TextSink::default(),
        capture_config(2_000),
    );
    let first = h.recorder.record(CaptureRequest::new("hello")).unwrap();

    let slow = harness(
        dir.path(),
        FakeCamera::with_frames(3),
        DetectorScript::AlwaysHand,
        TextSink::default(),
        settings,
    );
    let task = slow
        .recorder
        .start(CaptureRequest::new("hello").overwrite(true))
        .unwrap();
    task.cancel();
    assert_eq!(task.wait().unwrap_err().kind(), "CancelledError");

    assert!(!first.video.exists());
    assert!(!first.landmarks.exists());
    assert!(slow.index.get("hello").unwrap().is_none());
}

/// Turns the landmark asset into a non-empty directory so removing it fails.
fn make_landmarks_unremovable(path: &std::path::Path) {
    fs::remove_file(path).unwrap();
    fs::create_dir(path).unwrap();
    fs::write(path.join("keep"), b"x").unwrap();
}

#[test]
fn failed_overwrite_cleanup_drops_stale_entry() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        dir.path(),
        FakeCamera::with_frames(3),
        DetectorScript::AlwaysHand,
        TextSink::default(),
        capture_config(2_000),
    );
    let first = h.recorder.record(CaptureRequest::new("hello")).unwrap();
    make_landmarks_unremovable(&first.landmarks);

    let err = h
        .recorder
        .start(CaptureRequest::new("hello").overwrite(true))
        .unwrap_err();

    assert_eq!(err.kind(), "IntegrityError");
    assert!(!first.video.exists());
    assert!(h.index.get("hello").unwrap().is_none());
    let mapping = fs::read_to_string(dir.path().join("words.json")).unwrap();
    assert!(!mapping.contains("\"hello\""));
    assert_eq!(h.counters.opened(), 1);

    // The lock went with the failed start.
    fs::remove_dir_all(&first.landmarks).unwrap();
    h.recorder.record(CaptureRequest::new("hello")).unwrap();
}

#[test]
fn failed_delete_cleanup_drops_stale_entry() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        dir.path(),
        FakeCamera::with_frames(3),
        DetectorScript::AlwaysHand,
        TextSink::default(),
        capture_config(2_000),
    );
    let record = h.recorder.record(CaptureRequest::new("hello")).unwrap();
    make_landmarks_unremovable(&record.landmarks);

    let err = h.recorder.delete("hello").unwrap_err();

    assert_eq!(err.kind(), "IntegrityError");
    assert!(!record.video.exists());
    assert!(h.recorder.lookup("hello").unwrap().is_none());
}

#[test]
fn same_word_started_during_capture_ends_in_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        dir.path(),
        FakeCamera::with_frames(5),
        DetectorScript::AlwaysHand,
        TextSink::default(),
        capture_config(2_000),
    );

    let first = h.recorder.start(CaptureRequest::new("hello")).unwrap();

    // Retry while the first capture holds the camera; once it lets go the
    // word is indexed and the second start must see it.
    let deadline = Instant::now() + Duration::from_secs(10);
    let err = loop {
        match h.recorder.start(CaptureRequest::new("hello")) {
            Ok(_) => panic!("two captures started for the same word"),
            Err(err) if err.kind() == "DeviceError" => {
                assert!(err.to_string().contains("busy"));
                assert!(Instant::now() < deadline, "device never released");
                std::thread::sleep(Duration::from_millis(1));
            }
            Err(err) => break err,
        }
    };

    assert_eq!(err.kind(), "ConflictError");
    let record = first.wait().unwrap();
    assert_eq!(h.index.get("hello").unwrap(), Some(record));
    assert_eq!(h.counters.opened(), 1);
}

#[test]
fn delete_removes_assets_and_entry() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        dir.path(),
        FakeCamera::with_frames(3),
        DetectorScript::AlwaysHand,
        TextSink::default(),
        capture_config(2_000),
    );

    assert_eq!(
        h.recorder.delete("ghost").unwrap_err().kind(),
        "NotFoundError"
    );

    let record = h.recorder.record(CaptureRequest::new("hello")).unwrap();
    let removed = h.recorder.delete("Hello").unwrap();

    assert_eq!(removed.word, "hello");
    assert!(!record.video.exists());
    assert!(!record.landmarks.exists());
    assert!(h.recorder.lookup("hello").unwrap().is_none());
    assert_eq!(
        h.recorder.delete("hello").unwrap_err().kind(),
        "NotFoundError"
    );
}

#[test]
fn empty_word_is_rejected_before_capture() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        dir.path(),
        FakeCamera::with_frames(3),
        DetectorScript::AlwaysHand,
        TextSink::default(),
        capture_config(2_000),
    );

    for word in ["   ", "../etc", "a/b"] {
        let err = h.recorder.start(CaptureRequest::new(word)).err().unwrap();
        assert_eq!(err.kind(), "ValidationError", "{word:?}");
    }
    assert_eq!(h.counters.opened(), 0);
}

#[test]
fn recordings_survive_reopening_the_index() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        dir.path(),
        FakeCamera::with_frames(3),
        DetectorScript::AlwaysHand,
        TextSink::default(),
        capture_config(2_000),
    );
    let record = h.recorder.record(CaptureRequest::new("hello")).unwrap();

    let reopened = open_index(dir.path());
    let loaded = reopened.get("hello").unwrap().unwrap();
    assert_eq!(loaded.video, record.video);
    assert_eq!(loaded.landmarks, record.landmarks);
}

#[test]
fn recorded_word_renders_to_playback_video() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        dir.path(),
        FakeCamera::with_frames(6),
        DetectorScript::GapEveryThird,
        TextSink::default(),
        capture_config(2_000),
    );
    h.recorder.record(CaptureRequest::new("hello")).unwrap();

    let render = RenderConfig {
        width: WIDTH,
        height: HEIGHT,
        fps: 20,
    };
    let renderer = AnimationRenderer::new(
        std::sync::Arc::new(h.sink.clone()),
        h.layout.clone(),
        render,
    );
    let output = renderer.render_word("hello", &h.index).unwrap();

    assert_eq!(output, h.layout.animation_path("hello"));
    assert!(fs::read_to_string(&output).unwrap().ends_with("@20 frames 4"));
    assert_eq!(
        renderer.render_word("ghost", &h.index).unwrap_err().kind(),
        "NotFoundError"
    );

    // Deleting the word also removes its playback video.
    h.recorder.delete("hello").unwrap();
    assert!(!output.exists());
}
