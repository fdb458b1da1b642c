use crate::capture::{
    run_capture_loop, Annotator, CaptureOutcome, CaptureReport, DetectionLog, FrameSink,
    FrameSource, NullRecorder, Overlay,
};
use crate::classifier::{select_arm, MotionStatus, TrackStateClassifier};
use crate::clock::Clock;
use crate::config::ClassifierConfig;
use crate::error::{PosewatchError, RecordingError, Result};
use crate::frame::Frame;
use crate::frame_channel::FrameChannel;
use crate::perception::Detector;
use crate::telemetry::{
    emission_worker, EmissionStats, TelemetryBatcher, TelemetryFrame, TelemetryRecord,
    TelemetrySink,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Why a pipeline stopped consuming frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EndReason {
    StopRequested,
    SourceEnded,
}

/// Counters reported when a pipeline finishes
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSummary {
    pub source_id: String,
    pub frames_captured: u64,
    pub frames_processed: u64,
    /// Frames replaced in the channel before the consumer took them
    pub frames_dropped: u64,
    pub source_loops: u64,
    pub frames_recorded: u64,
    pub detection_lines: u64,
    pub batches_flushed: u64,
    pub batches_emitted: u64,
    pub batches_failed: u64,
    pub end_reason: EndReason,
}

/// State owned by the consumer loop
struct LoopState {
    classifier: TrackStateClassifier,
    batcher: TelemetryBatcher,
    processed: u64,
}

/// One camera's capture → detect → classify → record/telemetry chain.
///
/// Owns every resource of its source; nothing is shared with other pipelines.
pub struct SourcePipeline {
    pub(super) source_id: String,
    pub(super) source: Option<Box<dyn FrameSource>>,
    pub(super) detector: Box<dyn Detector>,
    pub(super) recorder: Box<dyn FrameSink>,
    pub(super) annotator: Annotator,
    pub(super) detection_log: Option<DetectionLog>,
    pub(super) sink: Arc<dyn TelemetrySink>,
    pub(super) classifier: ClassifierConfig,
    pub(super) flush_on_shutdown: bool,
    pub(super) frame_timeout: Duration,
    pub(super) fallback_fps: u32,
    pub(super) clock: Clock,
}

impl SourcePipeline {
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Frame rate the pipeline runs its windows at
    pub fn fps(&self) -> u32 {
        self.source
            .as_ref()
            .and_then(|s| s.fps())
            .filter(|&fps| fps > 0)
            .unwrap_or(self.fallback_fps)
            .max(1)
    }

    /// Run until the source ends, a stop is requested or a fatal error occurs.
    ///
    /// Capture, the detector, the recording and the telemetry worker are all
    /// released before this returns, including on error.
    pub async fn run(mut self, stop: CancellationToken) -> Result<PipelineSummary> {
        let mut source = self
            .source
            .take()
            .ok_or_else(|| PosewatchError::component(&self.source_id, "pipeline already ran"))?;

        let fps = source.fps().filter(|&f| f > 0).unwrap_or(self.fallback_fps).max(1);
        let (width, height) = source.resolution();
        info!(
            "Starting pipeline {} ({}x{} @ {} fps, detector {})",
            self.source_id,
            width,
            height,
            fps,
            self.detector.name()
        );

        let channel = Arc::new(FrameChannel::new());
        let capture_stop = stop.child_token();
        let capture = {
            let channel = Arc::clone(&channel);
            let capture_stop = capture_stop.clone();
            std::thread::Builder::new()
                .name(format!("capture-{}", self.source_id))
                .spawn(move || run_capture_loop(&mut *source, &channel, &capture_stop))?
        };

        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(emission_worker(queue_rx, Arc::clone(&self.sink)));

        let mut state = LoopState {
            classifier: TrackStateClassifier::new(fps, &self.classifier),
            batcher: TelemetryBatcher::new(fps, queue_tx),
            processed: 0,
        };

        let consumed = self.consume(&channel, &stop, &mut state).await;

        // Teardown runs whatever the loop outcome was
        capture_stop.cancel();
        let report = join_capture(capture).await;

        if self.flush_on_shutdown {
            if let Some(name) = state.batcher.flush() {
                debug!("Flushed final partial telemetry batch {}", name);
            }
        }
        let batches_flushed = state.batcher.batches_flushed();
        drop(state.batcher);
        let emission = worker.await.unwrap_or_else(|e| {
            error!("Telemetry worker for {} panicked: {}", self.source_id, e);
            EmissionStats::default()
        });

        self.detector.shutdown().await;
        let recorder = std::mem::replace(&mut self.recorder, Box::new(NullRecorder::default()));
        let (recorder, finished) = finish_recorder(recorder).await;
        self.recorder = recorder;
        if let Err(e) = finished {
            warn!("Failed to finalize recording for {}: {}", self.source_id, e);
        }
        if let Some(log) = self.detection_log.as_mut() {
            if let Err(e) = log.flush().await {
                warn!("Failed to flush detection log for {}: {}", self.source_id, e);
            }
        }

        let end_reason = consumed?;
        let report = report?;

        let summary = PipelineSummary {
            source_id: self.source_id.clone(),
            frames_captured: report.frames_captured,
            frames_processed: state.processed,
            frames_dropped: channel.stats().frames_dropped,
            source_loops: report.loops,
            frames_recorded: self.recorder.frames_written(),
            detection_lines: self
                .detection_log
                .as_ref()
                .map_or(0, |log| log.lines_written()),
            batches_flushed,
            batches_emitted: emission.emitted,
            batches_failed: emission.failed,
            end_reason,
        };

        if end_reason == EndReason::SourceEnded {
            if let CaptureOutcome::Failed(e) = report.outcome {
                error!("Pipeline {} capture failed: {}", self.source_id, e);
                return Err(e.into());
            }
        }

        info!(
            "Pipeline {} stopped ({:?}): {} processed, {} dropped, {} batches",
            summary.source_id,
            summary.end_reason,
            summary.frames_processed,
            summary.frames_dropped,
            summary.batches_flushed
        );
        Ok(summary)
    }

    async fn consume(
        &mut self,
        channel: &FrameChannel,
        stop: &CancellationToken,
        state: &mut LoopState,
    ) -> Result<EndReason> {
        loop {
            let popped = tokio::select! {
                _ = stop.cancelled() => return Ok(EndReason::StopRequested),
                frame = channel.pop(self.frame_timeout) => frame,
            };

            match popped {
                Some(frame) => self.process_frame(state, frame).await?,
                None if channel.is_closed() => return Ok(EndReason::SourceEnded),
                None => trace!("No frame from {} within {:?}", self.source_id, self.frame_timeout),
            }
        }
    }

    async fn process_frame(&mut self, state: &mut LoopState, frame: Frame) -> Result<()> {
        state.processed += 1;
        state.classifier.begin_frame();

        let detections = self.detector.detect(&frame).await.map_err(|e| {
            error!("Detector failed for {} on frame {}: {}", self.source_id, frame.index, e);
            e
        })?;

        let mut records = Vec::with_capacity(detections.len());
        let mut overlays = Vec::with_capacity(detections.len());
        for detection in &detections {
            let status = match detection.track_id {
                Some(id) => state.classifier.observe(id, detection),
                None => MotionStatus::Analyzing,
            };
            let (angle, arm) = select_arm(detection, self.classifier.keypoint_confidence);

            overlays.push(Overlay::for_track(
                detection.bbox,
                detection.track_id,
                status,
                arm,
                angle,
            ));
            records.push(TelemetryRecord {
                track_id: detection.track_id,
                status,
                angle,
                arm,
                bbox: detection.bbox,
            });
        }

        let annotated = self.annotator.annotate(&frame, &overlays);
        if let Err(e) = self.recorder.write(&annotated) {
            warn!(
                "Recording failed for {}, continuing without it: {}",
                self.source_id, e
            );
            let failed = std::mem::replace(&mut self.recorder, Box::new(NullRecorder::default()));
            if let (_, Err(e)) = finish_recorder(failed).await {
                debug!("Recorder finalize after failure: {}", e);
            }
        }

        if let Some(log) = self.detection_log.as_mut() {
            if let Err(e) = log.record(frame.timestamp, detections.len()).await {
                warn!("Failed to append detection log for {}: {}", self.source_id, e);
            }
        }

        state.batcher.append(TelemetryFrame {
            frame: state.processed,
            timestamp: self.clock.iso(frame.timestamp),
            detections: records,
        });

        trace!(
            "Processed frame {} of {} ({} detections)",
            frame.index,
            self.source_id,
            detections.len()
        );
        Ok(())
    }
}

/// Finalize off the runtime; encoders block on their bus until EOS
async fn finish_recorder(
    mut recorder: Box<dyn FrameSink>,
) -> (Box<dyn FrameSink>, std::result::Result<(), RecordingError>) {
    let finishing = tokio::task::spawn_blocking(move || {
        let result = recorder.finish();
        (recorder, result)
    });

    match finishing.await {
        Ok(finished) => finished,
        Err(e) => (
            Box::new(NullRecorder::default()),
            Err(RecordingError::Finalize {
                details: format!("finalize task failed: {}", e),
            }),
        ),
    }
}

async fn join_capture(handle: std::thread::JoinHandle<CaptureReport>) -> Result<CaptureReport> {
    tokio::task::spawn_blocking(move || handle.join())
        .await
        .map_err(|e| PosewatchError::component("capture", format!("join failed: {}", e)))?
        .map_err(|_| PosewatchError::component("capture", "capture thread panicked"))
}
