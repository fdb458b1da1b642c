use super::*;
use crate::classifier::{ArmSide, MotionStatus};
use crate::config::{TelemetryConfig, TelemetrySinkKind};
use crate::error::TelemetryError;
use crate::perception::BoundingBox;
use async_trait::async_trait;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;

fn telemetry_frame(frame: u64) -> TelemetryFrame {
    TelemetryFrame {
        frame,
        timestamp: format!("2024-03-01T14:05:{:02}.000000", frame % 60),
        detections: vec![TelemetryRecord {
            track_id: Some(4),
            status: MotionStatus::Normal,
            angle: 92.5,
            arm: ArmSide::Right,
            bbox: BoundingBox::new(1.0, 2.0, 3.0, 4.0),
        }],
    }
}

struct FailingSink;

#[async_trait]
impl TelemetrySink for FailingSink {
    fn name(&self) -> &str {
        "failing"
    }

    async fn emit(&self, name: &str, _document: &[u8]) -> Result<(), TelemetryError> {
        Err(TelemetryError::Write {
            name: name.to_string(),
            details: "bucket unreachable".to_string(),
        })
    }
}

#[test]
fn test_batch_name_replaces_colons() {
    assert_eq!(
        batch_name("2024-03-01T14:05:09.123456"),
        "telemetry_2024-03-01T14-05-09.123456.json"
    );
}

#[test]
fn test_one_flush_per_fps_frames() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut batcher = TelemetryBatcher::new(30, tx);

    for frame in 1..=90 {
        let flushed = batcher.append(telemetry_frame(frame));
        assert_eq!(flushed.is_some(), frame % 30 == 0, "frame {}", frame);
    }

    let mut batches = Vec::new();
    while let Ok(batch) = rx.try_recv() {
        batches.push(batch);
    }

    assert_eq!(batches.len(), 3);
    assert_eq!(batcher.batches_flushed(), 3);
    for (i, batch) in batches.iter().enumerate() {
        assert_eq!(batch.frames.len(), 30);
        assert_eq!(batch.frames[0].frame, i as u64 * 30 + 1);
    }
}

#[test]
fn test_pending_empty_after_flush() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let mut batcher = TelemetryBatcher::new(3, tx);

    batcher.append(telemetry_frame(1));
    batcher.append(telemetry_frame(2));
    assert_eq!(batcher.pending().len(), 2);

    let name = batcher.append(telemetry_frame(3)).unwrap();
    assert!(batcher.pending().is_empty());
    // Named after the frame that triggered the flush
    assert_eq!(name, batch_name(&telemetry_frame(3).timestamp));
}

#[test]
fn test_partial_flush() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut batcher = TelemetryBatcher::new(30, tx);

    assert!(batcher.flush().is_none());

    for frame in 1..=7 {
        batcher.append(telemetry_frame(frame));
    }
    assert!(batcher.flush().is_some());
    assert_eq!(rx.try_recv().unwrap().frames.len(), 7);

    // The flush window restarts after a partial flush
    for frame in 8..=36 {
        assert!(batcher.append(telemetry_frame(frame)).is_none());
    }
    assert!(batcher.append(telemetry_frame(37)).is_some());
}

#[test]
fn test_closed_worker_drops_batch() {
    let (tx, rx) = mpsc::unbounded_channel();
    drop(rx);
    let mut batcher = TelemetryBatcher::new(1, tx);

    assert!(batcher.append(telemetry_frame(1)).is_none());
    assert_eq!(batcher.batches_flushed(), 0);
    assert!(batcher.pending().is_empty());
}

#[test]
fn test_document_shape() {
    let batch = TelemetryBatch {
        name: "telemetry_x.json".to_string(),
        frames: vec![telemetry_frame(1)],
    };
    let value: serde_json::Value = serde_json::from_slice(&batch.to_document().unwrap()).unwrap();

    let record = &value[0]["detections"][0];
    assert_eq!(value[0]["frame"], 1);
    assert_eq!(record["track_id"], 4);
    assert_eq!(record["status"], "NORMAL");
    assert_eq!(record["arm"], "R");
    assert_eq!(record["angle"], 92.5);
    assert_eq!(record["bbox"], serde_json::json!([1.0, 2.0, 3.0, 4.0]));
}

#[tokio::test]
async fn test_directory_sink_writes_documents() {
    let temp_dir = TempDir::new().unwrap();
    let config = TelemetryConfig {
        sink: TelemetrySinkKind::Directory,
        path: temp_dir.path().to_string_lossy().to_string(),
        flush_on_shutdown: true,
    };
    let sink = build_sink(&config, "CAM_01");

    let (tx, rx) = mpsc::unbounded_channel();
    let worker = tokio::spawn(emission_worker(rx, sink));

    let mut batcher = TelemetryBatcher::new(2, tx);
    for frame in 1..=4 {
        batcher.append(telemetry_frame(frame));
    }
    drop(batcher);

    let stats = worker.await.unwrap();
    assert_eq!(stats, EmissionStats { emitted: 2, failed: 0 });

    let written = temp_dir
        .path()
        .join("CAM_01")
        .join(batch_name(&telemetry_frame(4).timestamp));
    let frames: Vec<TelemetryFrame> =
        serde_json::from_slice(&std::fs::read(written).unwrap()).unwrap();
    assert_eq!(frames, vec![telemetry_frame(3), telemetry_frame(4)]);
}

#[tokio::test]
async fn test_failed_emission_is_not_retried() {
    let (tx, rx) = mpsc::unbounded_channel();
    let worker = tokio::spawn(emission_worker(rx, Arc::new(FailingSink)));

    let mut batcher = TelemetryBatcher::new(1, tx);
    batcher.append(telemetry_frame(1));
    batcher.append(telemetry_frame(2));
    drop(batcher);

    let stats = worker.await.unwrap();
    assert_eq!(stats, EmissionStats { emitted: 0, failed: 2 });
}

#[tokio::test]
async fn test_memory_sink_collects_documents() {
    let sink = Arc::new(MemorySink::new());
    let (tx, rx) = mpsc::unbounded_channel();
    let worker = tokio::spawn(emission_worker(rx, sink.clone()));

    let mut batcher = TelemetryBatcher::new(5, tx);
    for frame in 1..=12 {
        batcher.append(telemetry_frame(frame));
    }
    batcher.flush();
    drop(batcher);
    worker.await.unwrap();

    let documents = sink.documents();
    let sizes: Vec<usize> = documents
        .iter()
        .map(|(_, doc)| serde_json::from_slice::<Vec<TelemetryFrame>>(doc).unwrap().len())
        .collect();
    assert_eq!(sizes, vec![5, 5, 2]);
}
