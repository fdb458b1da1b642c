use super::core::SourcePipeline;
use crate::capture::{open_recorder, open_source, Annotator, DetectionLog, FrameSink, FrameSource, NullRecorder};
use crate::clock::Clock;
use crate::config::{CameraSourceConfig, ClassifierConfig, PosewatchConfig};
use crate::error::{PosewatchError, Result};
use crate::perception::{build_detector, Detector};
use crate::telemetry::{build_sink, LogSink, TelemetrySink};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Builder for a single source pipeline
pub struct SourcePipelineBuilder {
    source_id: Option<String>,
    source: Option<Box<dyn FrameSource>>,
    detector: Option<Box<dyn Detector>>,
    recorder: Option<Box<dyn FrameSink>>,
    annotator: Option<Annotator>,
    detection_log: Option<DetectionLog>,
    sink: Option<Arc<dyn TelemetrySink>>,
    classifier: ClassifierConfig,
    flush_on_shutdown: bool,
    frame_timeout: Duration,
    fallback_fps: u32,
    clock: Clock,
}

impl SourcePipelineBuilder {
    pub fn new() -> Self {
        let defaults = PosewatchConfig::default();
        Self {
            source_id: None,
            source: None,
            detector: None,
            recorder: None,
            annotator: None,
            detection_log: None,
            sink: None,
            classifier: defaults.classifier,
            flush_on_shutdown: defaults.telemetry.flush_on_shutdown,
            frame_timeout: Duration::from_millis(defaults.system.frame_timeout_ms),
            fallback_fps: defaults.system.fallback_fps,
            clock: Clock::default(),
        }
    }

    pub fn source_id<S: Into<String>>(mut self, id: S) -> Self {
        self.source_id = Some(id.into());
        self
    }

    pub fn source(mut self, source: Box<dyn FrameSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn detector(mut self, detector: Box<dyn Detector>) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn recorder(mut self, recorder: Box<dyn FrameSink>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn annotator(mut self, annotator: Annotator) -> Self {
        self.annotator = Some(annotator);
        self
    }

    pub fn detection_log(mut self, log: DetectionLog) -> Self {
        self.detection_log = Some(log);
        self
    }

    pub fn telemetry_sink(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn classifier(mut self, config: ClassifierConfig) -> Self {
        self.classifier = config;
        self
    }

    pub fn flush_on_shutdown(mut self, flush: bool) -> Self {
        self.flush_on_shutdown = flush;
        self
    }

    pub fn frame_timeout(mut self, timeout: Duration) -> Self {
        self.frame_timeout = timeout;
        self
    }

    pub fn fallback_fps(mut self, fps: u32) -> Self {
        self.fallback_fps = fps;
        self
    }

    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> Result<SourcePipeline> {
        let source_id = self
            .source_id
            .ok_or_else(|| PosewatchError::system("Pipeline source id must be specified"))?;
        let source = self
            .source
            .ok_or_else(|| PosewatchError::system("Pipeline frame source must be specified"))?;
        let detector = self
            .detector
            .ok_or_else(|| PosewatchError::system("Pipeline detector must be specified"))?;

        if self.fallback_fps == 0 {
            return Err(PosewatchError::component(
                source_id,
                "Fallback fps must be greater than 0",
            ));
        }

        Ok(SourcePipeline {
            source_id,
            source: Some(source),
            detector,
            recorder: self
                .recorder
                .unwrap_or_else(|| Box::new(NullRecorder::default())),
            annotator: self.annotator.unwrap_or_else(Annotator::without_labels),
            detection_log: self.detection_log,
            sink: self.sink.unwrap_or_else(|| Arc::new(LogSink)),
            classifier: self.classifier,
            flush_on_shutdown: self.flush_on_shutdown,
            frame_timeout: self.frame_timeout,
            fallback_fps: self.fallback_fps,
            clock: self.clock,
        })
    }
}

impl Default for SourcePipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Constructs a fully wired pipeline for one configured camera
#[async_trait]
pub trait PipelineFactory: Send + Sync {
    async fn create(&self, camera: &CameraSourceConfig) -> Result<SourcePipeline>;
}

/// Factory wiring the platform capture backend and configured detector
pub struct DefaultPipelineFactory {
    config: Arc<PosewatchConfig>,
}

impl DefaultPipelineFactory {
    pub fn new(config: Arc<PosewatchConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PipelineFactory for DefaultPipelineFactory {
    async fn create(&self, camera: &CameraSourceConfig) -> Result<SourcePipeline> {
        let config = &self.config;
        let id = camera.id.clone();
        info!("Opening source {} ({})", id, camera.source.describe());

        // Opening blocks until the device or decoder has negotiated
        let source = {
            let camera = camera.clone();
            tokio::task::spawn_blocking(move || open_source(&camera))
                .await
                .map_err(|e| PosewatchError::component(&id, format!("open task failed: {}", e)))??
        };

        let detector = build_detector(&config.detector, &id).await?;

        let fps = source
            .fps()
            .filter(|&f| f > 0)
            .unwrap_or(config.system.fallback_fps);
        let (width, height) = source.resolution();

        // Bringing the encoder to PLAYING blocks on the state change
        let opened = {
            let recording = config.recording.clone();
            let task_id = id.clone();
            tokio::task::spawn_blocking(move || open_recorder(&recording, &task_id, width, height, fps))
                .await
                .map_err(|e| PosewatchError::component(&id, format!("recorder task failed: {}", e)))?
        };
        let recorder: Box<dyn FrameSink> = match opened {
            Ok(recorder) => recorder,
            Err(e) => {
                warn!("Recording unavailable for {}: {}", id, e);
                Box::new(NullRecorder::default())
            }
        };

        let annotator = if config.recording.enabled {
            Annotator::new(&config.recording)
        } else {
            Annotator::without_labels()
        };

        let clock = Clock::from_name(&config.system.timezone);
        let detection_log = DetectionLog::open(&config.system.log_path, &id, clock).await?;

        SourcePipelineBuilder::new()
            .source_id(id.clone())
            .source(source)
            .detector(detector)
            .recorder(recorder)
            .annotator(annotator)
            .detection_log(detection_log)
            .telemetry_sink(build_sink(&config.telemetry, &id))
            .classifier(config.classifier.clone())
            .flush_on_shutdown(config.telemetry.flush_on_shutdown)
            .frame_timeout(Duration::from_millis(config.system.frame_timeout_ms))
            .fallback_fps(config.system.fallback_fps)
            .clock(clock)
            .build()
    }
}
