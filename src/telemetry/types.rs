use crate::classifier::{ArmSide, MotionStatus};
use crate::perception::BoundingBox;
use serde::{Deserialize, Serialize};

/// Per-object entry of one telemetry frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub track_id: Option<u32>,
    pub status: MotionStatus,
    /// Elbow angle in degrees, 0 when no arm qualified
    pub angle: f32,
    pub arm: ArmSide,
    pub bbox: BoundingBox,
}

/// Everything reported for one processed frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryFrame {
    /// Processed-frame counter, starting at 1
    pub frame: u64,
    pub timestamp: String,
    pub detections: Vec<TelemetryRecord>,
}

/// Completed batch handed to the emission worker
#[derive(Debug, Clone)]
pub struct TelemetryBatch {
    pub name: String,
    pub frames: Vec<TelemetryFrame>,
}

impl TelemetryBatch {
    /// Serialized document: a JSON array of frames
    pub fn to_document(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(&self.frames)
    }
}

/// Deterministic emission name derived from the flush timestamp
pub fn batch_name(timestamp: &str) -> String {
    format!("telemetry_{}.json", timestamp.replace(':', "-"))
}
