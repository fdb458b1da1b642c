use super::*;
use crate::config::RecordingConfig;
use crate::error::CaptureError;
use crate::frame_channel::FrameChannel;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

#[test]
fn test_live_source_ends_and_closes_channel() {
    let mut source = SyntheticSource::new(4, 4, Some(30), 5, false);
    let channel = FrameChannel::new();

    let report = run_capture_loop(&mut source, &channel, &CancellationToken::new());

    assert!(matches!(report.outcome, CaptureOutcome::EndOfStream));
    assert_eq!(report.frames_captured, 5);
    assert_eq!(report.loops, 0);
    assert!(channel.is_closed());
    // Only the newest frame survives in the slot
    assert_eq!(channel.try_pop().unwrap().index, 4);
}

#[test]
fn test_read_failure_terminates_capture() {
    let mut source = SyntheticSource::new(4, 4, Some(30), 100, false).failing_at(3);
    let channel = FrameChannel::new();

    let report = run_capture_loop(&mut source, &channel, &CancellationToken::new());

    assert!(matches!(
        report.outcome,
        CaptureOutcome::Failed(CaptureError::Read { .. })
    ));
    assert_eq!(report.frames_captured, 3);
    assert!(channel.is_closed());
}

#[tokio::test]
async fn test_looping_source_restarts_at_first_frame() {
    let mut source =
        SyntheticSource::new(2, 2, Some(30), 3, true).paced(Duration::from_millis(20));
    let channel = Arc::new(FrameChannel::new());
    let stop = CancellationToken::new();

    let producer_channel = Arc::clone(&channel);
    let producer_stop = stop.clone();
    let capture = std::thread::spawn(move || {
        run_capture_loop(&mut source, &producer_channel, &producer_stop)
    });

    // Consumer keeps up with the paced source, so every frame is observed
    let mut indices = Vec::new();
    while indices.len() < 7 {
        if let Some(frame) = channel.pop(Duration::from_secs(2)).await {
            indices.push(frame.index);
        }
    }
    stop.cancel();

    let report = capture.join().unwrap();
    assert!(matches!(report.outcome, CaptureOutcome::Stopped));
    assert!(report.loops >= 2);
    assert_eq!(indices, vec![0, 1, 2, 0, 1, 2, 0]);
}

#[test]
fn test_stop_before_first_read() {
    let mut source = SyntheticSource::new(2, 2, None, 10, true);
    let channel = FrameChannel::new();
    let stop = CancellationToken::new();
    stop.cancel();

    let report = run_capture_loop(&mut source, &channel, &stop);
    assert!(matches!(report.outcome, CaptureOutcome::Stopped));
    assert_eq!(report.frames_captured, 0);
    assert!(channel.is_closed());
}

#[test]
fn test_recording_disabled_uses_null_recorder() {
    let temp_dir = TempDir::new().unwrap();
    let config = RecordingConfig {
        enabled: false,
        path: temp_dir.path().join("rec").to_string_lossy().to_string(),
        font_path: String::new(),
        font_size: 16.0,
        bitrate_kbps: 1000,
    };

    let mut recorder = open_recorder(&config, "CAM_01", 4, 4, 30).unwrap();
    let frame = crate::frame::Frame::new(0, std::time::SystemTime::now(), vec![0; 48], 4, 4);
    recorder.write(&frame).unwrap();
    recorder.finish().unwrap();

    assert_eq!(recorder.frames_written(), 1);
    assert!(!temp_dir.path().join("rec").exists());
}

#[test]
fn test_recording_path() {
    let config = crate::config::PosewatchConfig::default().recording;
    assert_eq!(
        recording_path(&config, "CAM_03"),
        std::path::PathBuf::from("./recordings").join("recording_CAM_03.mp4")
    );
}
