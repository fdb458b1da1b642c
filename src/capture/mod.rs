mod detection_log;
#[cfg(all(target_os = "linux", feature = "camera"))]
mod gst;
mod overlay;
mod record;
mod source;
#[cfg(test)]
mod tests;

pub use detection_log::{detection_log_path, DetectionLog};
#[cfg(all(target_os = "linux", feature = "camera"))]
pub use gst::GstSource;
pub use overlay::{Annotator, Overlay, ACTIVE_COLOR, IDLE_COLOR};
#[cfg(all(target_os = "linux", feature = "video_encoding"))]
pub use record::GstRecorder;
pub use record::{open_recorder, recording_path, FrameSink, NullRecorder};
pub use source::{run_capture_loop, CaptureOutcome, CaptureReport, FrameSource, SyntheticSource};

use crate::config::CameraSourceConfig;
use crate::error::CaptureError;

/// Open the platform capture backend for one configured source
pub fn open_source(camera: &CameraSourceConfig) -> Result<Box<dyn FrameSource>, CaptureError> {
    #[cfg(all(target_os = "linux", feature = "camera"))]
    {
        let source = GstSource::open(&camera.id, &camera.source)?;
        Ok(Box::new(source))
    }

    #[cfg(not(all(target_os = "linux", feature = "camera")))]
    {
        tracing::warn!(
            "Capture backend not available, cannot open {} ({})",
            camera.id,
            camera.source.describe()
        );
        Err(CaptureError::NotAvailable)
    }
}
