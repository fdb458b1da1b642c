use super::source::FrameSource;
use crate::config::SourceSpec;
use crate::error::CaptureError;
use crate::frame::RGB24_BYTES_PER_PIXEL;
use gstreamer::prelude::*;
use gstreamer::Pipeline;
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use tracing::{debug, info, warn};

/// How long to wait for a sample before treating the source as broken
const PULL_TIMEOUT_SECS: u64 = 5;
/// Initial negotiation can take a while on USB devices
const OPEN_TIMEOUT_SECS: u64 = 10;

/// GStreamer-backed capture from a V4L2 device or a decodable file
pub struct GstSource {
    source_id: String,
    pipeline: Pipeline,
    appsink: AppSink,
    looping: bool,
    width: u32,
    height: u32,
    stride: usize,
    fps: Option<u32>,
    first: Option<Vec<u8>>,
}

impl GstSource {
    /// Open the source and pull the first frame to learn its geometry
    pub fn open(source_id: &str, spec: &SourceSpec) -> Result<Self, CaptureError> {
        let unavailable = |details: String| CaptureError::SourceUnavailable {
            source_id: source_id.to_string(),
            details,
        };

        gstreamer::init().map_err(|e| unavailable(format!("Failed to initialize GStreamer: {}", e)))?;

        let pipeline_desc = build_pipeline_string(spec);
        info!("Creating capture pipeline for {}: {}", source_id, pipeline_desc);

        let pipeline = gstreamer::parse::launch(&pipeline_desc)
            .map_err(|e| unavailable(format!("Failed to create pipeline: {}", e)))?
            .downcast::<Pipeline>()
            .map_err(|_| unavailable("Failed to downcast to Pipeline".to_string()))?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| unavailable("Failed to get appsink element".to_string()))?
            .downcast::<AppSink>()
            .map_err(|_| unavailable("Failed to downcast to AppSink".to_string()))?;

        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| unavailable(format!("Failed to start pipeline: {}", e)))?;

        let mut source = Self {
            source_id: source_id.to_string(),
            pipeline,
            appsink,
            looping: spec.is_looping(),
            width: 0,
            height: 0,
            stride: 0,
            fps: None,
            first: None,
        };

        let sample = source
            .appsink
            .try_pull_sample(gstreamer::ClockTime::from_seconds(OPEN_TIMEOUT_SECS));
        let sample = match sample {
            Some(sample) => sample,
            None => {
                let details = source
                    .bus_error()
                    .unwrap_or_else(|| "no frame received".to_string());
                let _ = source.pipeline.set_state(gstreamer::State::Null);
                return Err(unavailable(details));
            }
        };

        let caps = sample
            .caps()
            .ok_or_else(|| unavailable("No caps in first sample".to_string()))?;
        let video_info = VideoInfo::from_caps(caps)
            .map_err(|e| unavailable(format!("Failed to get video info: {}", e)))?;

        source.width = video_info.width();
        source.height = video_info.height();
        source.stride = video_info.stride()[0] as usize;
        let rate = video_info.fps();
        if rate.numer() > 0 && rate.denom() > 0 {
            source.fps = Some((rate.numer() as f64 / rate.denom() as f64).round() as u32);
        }
        source.first = Some(source.unpack(&sample)?);

        info!(
            "Source {} opened: {}x{} @ {:?} fps",
            source.source_id, source.width, source.height, source.fps
        );
        Ok(source)
    }

    /// Copy a sample into a packed RGB24 buffer, dropping row padding
    fn unpack(&self, sample: &gstreamer::Sample) -> Result<Vec<u8>, CaptureError> {
        let buffer = sample.buffer().ok_or_else(|| CaptureError::Read {
            details: "No buffer in sample".to_string(),
        })?;
        let map = buffer.map_readable().map_err(|e| CaptureError::Read {
            details: format!("Failed to map buffer: {}", e),
        })?;

        let row = self.width as usize * RGB24_BYTES_PER_PIXEL;
        let rows = self.height as usize;
        if self.stride == row {
            return Ok(map.as_slice()[..row * rows].to_vec());
        }

        let mut packed = Vec::with_capacity(row * rows);
        for chunk in map.as_slice().chunks(self.stride).take(rows) {
            packed.extend_from_slice(&chunk[..row.min(chunk.len())]);
        }
        Ok(packed)
    }

    fn bus_error(&self) -> Option<String> {
        let bus = self.pipeline.bus()?;
        let msg = bus.pop_filtered(&[gstreamer::MessageType::Error])?;
        match msg.view() {
            gstreamer::MessageView::Error(err) => Some(format!(
                "{} ({})",
                err.error(),
                err.debug().unwrap_or_default()
            )),
            _ => None,
        }
    }
}

fn build_pipeline_string(spec: &SourceSpec) -> String {
    match spec {
        SourceSpec::Device(index) => format!(
            "v4l2src device=/dev/video{} do-timestamp=true ! \
             videoconvert ! video/x-raw,format=RGB ! \
             appsink name=sink sync=false max-buffers=2 drop=true enable-last-sample=false",
            index
        ),
        // sync=true paces file playback at its native rate
        SourceSpec::File(path) => format!(
            "filesrc location=\"{}\" ! decodebin ! \
             videoconvert ! video/x-raw,format=RGB ! \
             appsink name=sink sync=true max-buffers=2 drop=false enable-last-sample=false",
            path.to_string_lossy()
        ),
    }
}

impl FrameSource for GstSource {
    fn fps(&self) -> Option<u32> {
        self.fps
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn is_looping(&self) -> bool {
        self.looping
    }

    fn read(&mut self) -> Result<Option<Vec<u8>>, CaptureError> {
        if let Some(first) = self.first.take() {
            return Ok(Some(first));
        }

        if let Some(details) = self.bus_error() {
            return Err(CaptureError::Read { details });
        }

        match self
            .appsink
            .try_pull_sample(gstreamer::ClockTime::from_seconds(PULL_TIMEOUT_SECS))
        {
            Some(sample) => self.unpack(&sample).map(Some),
            None if self.appsink.is_eos() => Ok(None),
            None => Err(CaptureError::Read {
                details: format!("no frame within {}s", PULL_TIMEOUT_SECS),
            }),
        }
    }

    fn rewind(&mut self) -> Result<(), CaptureError> {
        debug!("Rewinding source {}", self.source_id);
        self.pipeline
            .seek_simple(
                gstreamer::SeekFlags::FLUSH | gstreamer::SeekFlags::KEY_UNIT,
                gstreamer::ClockTime::ZERO,
            )
            .map_err(|e| CaptureError::Rewind {
                details: e.to_string(),
            })
    }

    fn close(&mut self) {
        if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
            warn!("Failed to stop capture pipeline for {}: {}", self.source_id, e);
        }
    }
}

impl Drop for GstSource {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gstreamer::State::Null);
    }
}
