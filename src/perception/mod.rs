mod command;
mod detection;

pub use command::CommandDetector;
pub use detection::{BoundingBox, Detection, Point};

use crate::config::{DetectorBackend, DetectorConfig};
use crate::error::{DetectionError, Result};
use crate::frame::Frame;
use async_trait::async_trait;
use tracing::info;

/// Boundary to the external detector.
///
/// Each pipeline owns its own instance; an error returned from `detect` is
/// fatal to that pipeline only.
#[async_trait]
pub trait Detector: Send {
    fn name(&self) -> &str;

    /// Run detection on one frame, returning possibly no detections
    async fn detect(&mut self, frame: &Frame) -> std::result::Result<Vec<Detection>, DetectionError>;

    /// Release backend resources
    async fn shutdown(&mut self) {}
}

/// Detector that never reports anything
#[derive(Debug, Default)]
pub struct NullDetector;

#[async_trait]
impl Detector for NullDetector {
    fn name(&self) -> &str {
        "null"
    }

    async fn detect(&mut self, _frame: &Frame) -> std::result::Result<Vec<Detection>, DetectionError> {
        Ok(Vec::new())
    }
}

/// Construct the configured detector for one source
pub async fn build_detector(config: &DetectorConfig, source_id: &str) -> Result<Box<dyn Detector>> {
    match config.backend {
        DetectorBackend::Command => {
            let detector = CommandDetector::spawn(config, source_id).await?;
            Ok(Box::new(detector))
        }
        DetectorBackend::Null => {
            info!("Source {} uses the null detector", source_id);
            Ok(Box::new(NullDetector))
        }
    }
}
