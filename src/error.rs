use thiserror::Error;

#[derive(Error, Debug)]
pub enum PosewatchError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Detection error: {0}")]
    Detection(#[from] DetectionError),

    #[error("Recording error: {0}")]
    Recording(#[from] RecordingError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl PosewatchError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<C: Into<String>, M: Into<String>>(component: C, message: M) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Failures opening or reading a video source
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Source {source_id} unavailable: {details}")]
    SourceUnavailable { source_id: String, details: String },

    #[error("Frame read failed: {details}")]
    Read { details: String },

    #[error("Rewind failed: {details}")]
    Rewind { details: String },

    #[error("Capture backend not available on this platform")]
    NotAvailable,
}

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("Detector failed to start: {details}")]
    Spawn { details: String },

    #[error("Detector I/O failed: {details}")]
    Io { details: String },

    #[error("Detector closed its output")]
    Closed,

    #[error("Detector did not answer within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Malformed detector reply: {details}")]
    Protocol { details: String },

    #[error("Detector reported an error: {message}")]
    Remote { message: String },
}

#[derive(Error, Debug)]
pub enum RecordingError {
    #[error("Failed to open recording {path}: {details}")]
    Open { path: String, details: String },

    #[error("Failed to write frame {frame}: {details}")]
    Write { frame: u64, details: String },

    #[error("Failed to finalize recording: {details}")]
    Finalize { details: String },

    #[error("Video encoding not available on this platform")]
    NotAvailable,
}

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to serialize telemetry batch: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to write telemetry {name}: {details}")]
    Write { name: String, details: String },
}

pub type Result<T> = std::result::Result<T, PosewatchError>;
