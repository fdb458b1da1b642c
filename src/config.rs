use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PosewatchConfig {
    /// Monitored sources, one execution unit each
    #[serde(default)]
    pub cameras: Vec<CameraSourceConfig>,
    pub detector: DetectorConfig,
    pub classifier: ClassifierConfig,
    pub telemetry: TelemetryConfig,
    pub recording: RecordingConfig,
    pub system: SystemConfig,
}

/// One monitored source
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CameraSourceConfig {
    pub id: String,
    pub source: SourceSpec,
}

/// Either a live capture device index or a video file that loops forever
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum SourceSpec {
    Device(u32),
    File(PathBuf),
}

impl SourceSpec {
    /// File sources rewind on end-of-stream instead of terminating
    pub fn is_looping(&self) -> bool {
        matches!(self, SourceSpec::File(_))
    }

    pub fn describe(&self) -> String {
        match self {
            SourceSpec::Device(index) => format!("/dev/video{}", index),
            SourceSpec::File(path) => path.display().to_string(),
        }
    }
}

impl CameraSourceConfig {
    pub fn device<S: Into<String>>(id: S, index: u32) -> Self {
        Self {
            id: id.into(),
            source: SourceSpec::Device(index),
        }
    }

    pub fn file<S: Into<String>, P: Into<PathBuf>>(id: S, path: P) -> Self {
        Self {
            id: id.into(),
            source: SourceSpec::File(path.into()),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DetectorBackend {
    /// External detector process speaking the JSON-lines frame protocol
    Command,
    /// No detections; record and log only
    Null,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DetectorConfig {
    #[serde(default = "default_detector_backend")]
    pub backend: DetectorBackend,

    /// Executable started once per pipeline
    #[serde(default)]
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Maximum time to wait for one reply
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ClassifierConfig {
    /// Window length in seconds of source video
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u32,

    /// Standard deviation above which a track is ACTIVE
    #[serde(default = "default_active_threshold")]
    pub active_threshold: f32,

    /// Standard deviation above which a track is NORMAL
    #[serde(default = "default_normal_threshold")]
    pub normal_threshold: f32,

    /// Per-joint confidence floor for the elbow angle
    #[serde(default = "default_keypoint_confidence")]
    pub keypoint_confidence: f32,

    /// Drop tracks unseen for this many frames (0 keeps them forever)
    #[serde(default)]
    pub stale_track_frames: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TelemetrySinkKind {
    Directory,
    Log,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default = "default_telemetry_sink")]
    pub sink: TelemetrySinkKind,

    /// Base directory for telemetry documents
    #[serde(default = "default_telemetry_path")]
    pub path: String,

    /// Emit the partial batch left over when a pipeline stops
    #[serde(default = "default_flush_on_shutdown")]
    pub flush_on_shutdown: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RecordingConfig {
    #[serde(default = "default_recording_enabled")]
    pub enabled: bool,

    /// Base directory for annotated recordings
    #[serde(default = "default_recording_path")]
    pub path: String,

    /// TrueType font used for box labels
    #[serde(default = "default_font_path")]
    pub font_path: String,

    #[serde(default = "default_font_size")]
    pub font_size: f32,

    #[serde(default = "default_bitrate_kbps")]
    pub bitrate_kbps: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Frame rate assumed when a source does not report one
    #[serde(default = "default_fallback_fps")]
    pub fallback_fps: u32,

    /// How long the consumer waits for a fresh frame per iteration
    #[serde(default = "default_frame_timeout_ms")]
    pub frame_timeout_ms: u64,

    /// Directory for per-source detection logs and worker logs
    #[serde(default = "default_log_path")]
    pub log_path: String,

    /// Timezone used for log lines and telemetry timestamps
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl PosewatchConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("posewatch.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("detector.backend", "null")?
            .set_default("detector.command", "")?
            .set_default(
                "detector.response_timeout_ms",
                default_response_timeout_ms() as i64,
            )?
            .set_default("classifier.window_seconds", default_window_seconds())?
            .set_default(
                "classifier.active_threshold",
                default_active_threshold() as f64,
            )?
            .set_default(
                "classifier.normal_threshold",
                default_normal_threshold() as f64,
            )?
            .set_default(
                "classifier.keypoint_confidence",
                default_keypoint_confidence() as f64,
            )?
            .set_default("classifier.stale_track_frames", 0i64)?
            .set_default("telemetry.sink", "directory")?
            .set_default("telemetry.path", default_telemetry_path())?
            .set_default("telemetry.flush_on_shutdown", default_flush_on_shutdown())?
            .set_default("recording.enabled", default_recording_enabled())?
            .set_default("recording.path", default_recording_path())?
            .set_default("recording.font_path", default_font_path())?
            .set_default("recording.font_size", default_font_size() as f64)?
            .set_default("recording.bitrate_kbps", default_bitrate_kbps())?
            .set_default("system.fallback_fps", default_fallback_fps())?
            .set_default(
                "system.frame_timeout_ms",
                default_frame_timeout_ms() as i64,
            )?
            .set_default("system.log_path", default_log_path())?
            .set_default("system.timezone", default_timezone())?
            .add_source(File::with_name(&path_str).required(false))
            // POSEWATCH_SYSTEM__LOG_PATH style overrides
            .add_source(
                Environment::with_prefix("POSEWATCH")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: PosewatchConfig = settings.try_deserialize()?;

        info!(
            "Configuration loaded successfully ({} camera(s))",
            config.cameras.len()
        );
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for camera in &self.cameras {
            if camera.id.trim().is_empty() {
                return Err(ConfigError::Message(
                    "Camera id must not be empty".to_string(),
                ));
            }
            if !seen.insert(camera.id.as_str()) {
                return Err(ConfigError::Message(format!(
                    "Duplicate camera id '{}'",
                    camera.id
                )));
            }
        }

        if self.detector.backend == DetectorBackend::Command && self.detector.command.is_empty() {
            return Err(ConfigError::Message(
                "Detector command must be set for the command backend".to_string(),
            ));
        }

        if self.detector.response_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Detector response_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.classifier.window_seconds == 0 {
            return Err(ConfigError::Message(
                "Classifier window_seconds must be greater than 0".to_string(),
            ));
        }

        if self.classifier.normal_threshold < 0.0
            || self.classifier.active_threshold < self.classifier.normal_threshold
        {
            return Err(ConfigError::Message(
                "Classifier thresholds must satisfy 0 <= normal <= active".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.classifier.keypoint_confidence) {
            return Err(ConfigError::Message(
                "Classifier keypoint_confidence must be within [0, 1]".to_string(),
            ));
        }

        if self.system.fallback_fps == 0 {
            return Err(ConfigError::Message(
                "System fallback_fps must be greater than 0".to_string(),
            ));
        }

        if self.system.frame_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "System frame_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.recording.font_size <= 0.0 {
            return Err(ConfigError::Message(
                "Recording font_size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Render as TOML in the layout `load_from_file` reads back
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Look up a camera by id
    pub fn camera(&self, id: &str) -> Option<&CameraSourceConfig> {
        self.cameras.iter().find(|c| c.id == id)
    }
}

impl Default for PosewatchConfig {
    fn default() -> Self {
        Self {
            cameras: Vec::new(),
            detector: DetectorConfig {
                backend: default_detector_backend(),
                command: String::new(),
                args: Vec::new(),
                response_timeout_ms: default_response_timeout_ms(),
            },
            classifier: ClassifierConfig {
                window_seconds: default_window_seconds(),
                active_threshold: default_active_threshold(),
                normal_threshold: default_normal_threshold(),
                keypoint_confidence: default_keypoint_confidence(),
                stale_track_frames: 0,
            },
            telemetry: TelemetryConfig {
                sink: default_telemetry_sink(),
                path: default_telemetry_path(),
                flush_on_shutdown: default_flush_on_shutdown(),
            },
            recording: RecordingConfig {
                enabled: default_recording_enabled(),
                path: default_recording_path(),
                font_path: default_font_path(),
                font_size: default_font_size(),
                bitrate_kbps: default_bitrate_kbps(),
            },
            system: SystemConfig {
                fallback_fps: default_fallback_fps(),
                frame_timeout_ms: default_frame_timeout_ms(),
                log_path: default_log_path(),
                timezone: default_timezone(),
            },
        }
    }
}

// Default value functions
fn default_detector_backend() -> DetectorBackend {
    DetectorBackend::Null
}
fn default_response_timeout_ms() -> u64 {
    5000
}

fn default_window_seconds() -> u32 {
    9
}
fn default_active_threshold() -> f32 {
    15.0
}
fn default_normal_threshold() -> f32 {
    5.0
}
fn default_keypoint_confidence() -> f32 {
    0.5
}

fn default_telemetry_sink() -> TelemetrySinkKind {
    TelemetrySinkKind::Directory
}
fn default_telemetry_path() -> String {
    "./telemetry".to_string()
}
fn default_flush_on_shutdown() -> bool {
    true
}

fn default_recording_enabled() -> bool {
    true
}
fn default_recording_path() -> String {
    "./recordings".to_string()
}
fn default_font_path() -> String {
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf".to_string()
}
fn default_font_size() -> f32 {
    16.0
}
fn default_bitrate_kbps() -> u32 {
    4000
}

fn default_fallback_fps() -> u32 {
    30
}
fn default_frame_timeout_ms() -> u64 {
    1000
}
fn default_log_path() -> String {
    "./logs".to_string()
}
fn default_timezone() -> String {
    "UTC".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    #[test]
    fn test_default_config() {
        let config = PosewatchConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.classifier.window_seconds, 9);
        assert_eq!(config.detector.backend, DetectorBackend::Null);
    }

    #[test]
    fn test_load_cameras_from_file() {
        let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[[cameras]]
id = "CAM_01"
source = 0

[[cameras]]
id = "CAM_02"
source = "entrance.mp4"

[classifier]
stale_track_frames = 300
"#
        )
        .unwrap();

        let config = PosewatchConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.cameras.len(), 2);
        assert_eq!(config.cameras[0], CameraSourceConfig::device("CAM_01", 0));
        assert_eq!(
            config.cameras[1],
            CameraSourceConfig::file("CAM_02", "entrance.mp4")
        );
        assert!(config.cameras[1].source.is_looping());
        assert!(!config.cameras[0].source.is_looping());
        assert_eq!(config.classifier.stale_track_frames, 300);
        assert_eq!(config.system.fallback_fps, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = PosewatchConfig::default();
        config.cameras = vec![
            CameraSourceConfig::device("CAM", 0),
            CameraSourceConfig::device("CAM", 1),
        ];

        // Should fail validation due to duplicate ids
        assert!(config.validate().is_err());

        config.cameras[1].id = "CAM_B".to_string();
        assert!(config.validate().is_ok());

        config.detector.backend = DetectorBackend::Command;
        assert!(config.validate().is_err());

        config.detector.command = "python3".to_string();
        assert!(config.validate().is_ok());

        config.classifier.active_threshold = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rendered_toml_loads_back() {
        let mut config = PosewatchConfig::default();
        config.cameras = vec![
            CameraSourceConfig::device("CAM_01", 0),
            CameraSourceConfig::file("CAM_02", "/srv/videos/entrance.mp4"),
        ];
        config.classifier.stale_track_frames = 120;
        config.system.timezone = "Europe/Madrid".to_string();

        let rendered = config.to_toml().unwrap();
        assert!(rendered.contains("[[cameras]]"));
        assert!(rendered.contains("[classifier]"));

        let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(rendered.as_bytes()).unwrap();

        let loaded = PosewatchConfig::load_from_file(file.path()).unwrap();
        assert_eq!(loaded.cameras, config.cameras);
        assert_eq!(loaded.classifier.stale_track_frames, 120);
        assert_eq!(loaded.classifier.active_threshold, 15.0);
        assert_eq!(loaded.classifier.keypoint_confidence, 0.5);
        assert_eq!(loaded.telemetry.sink, TelemetrySinkKind::Directory);
        assert_eq!(loaded.system.timezone, "Europe/Madrid");
        assert!(loaded.validate().is_ok());
    }

    #[test]
    fn test_default_toml_has_every_section() {
        let rendered = PosewatchConfig::default().to_toml().unwrap();
        for section in ["[detector]", "[classifier]", "[telemetry]", "[recording]", "[system]"] {
            assert!(rendered.contains(section), "missing {}", section);
        }
        assert!(rendered.contains("window_seconds = 9"));
    }

    #[test]
    fn test_camera_lookup() {
        let mut config = PosewatchConfig::default();
        config.cameras = vec![CameraSourceConfig::file("CAM_02", "/tmp/video.mp4")];

        assert!(config.camera("CAM_02").is_some());
        assert!(config.camera("CAM_99").is_none());
        assert_eq!(
            config.camera("CAM_02").unwrap().source.describe(),
            "/tmp/video.mp4"
        );
    }
}
