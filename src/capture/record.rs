use crate::config::RecordingConfig;
use crate::error::RecordingError;
use crate::frame::Frame;
use std::path::PathBuf;
use tracing::debug;

#[cfg(all(target_os = "linux", feature = "video_encoding"))]
use gstreamer::prelude::*;
#[cfg(all(target_os = "linux", feature = "video_encoding"))]
use gstreamer::Pipeline;
#[cfg(all(target_os = "linux", feature = "video_encoding"))]
use gstreamer_app::AppSrc;
#[cfg(all(target_os = "linux", feature = "video_encoding"))]
use tracing::{info, warn};

/// Consumer of annotated frames
pub trait FrameSink: Send {
    fn write(&mut self, frame: &Frame) -> Result<(), RecordingError>;

    /// Flush and close the output; called once when the pipeline stops
    fn finish(&mut self) -> Result<(), RecordingError>;

    fn frames_written(&self) -> u64;
}

/// Path of the recording for one source
pub fn recording_path(config: &RecordingConfig, source_id: &str) -> PathBuf {
    PathBuf::from(&config.path).join(format!("recording_{}.mp4", source_id))
}

/// Open the configured recorder at the source's geometry and rate
pub fn open_recorder(
    config: &RecordingConfig,
    source_id: &str,
    width: u32,
    height: u32,
    fps: u32,
) -> Result<Box<dyn FrameSink>, RecordingError> {
    if !config.enabled {
        debug!("Recording disabled for {}", source_id);
        return Ok(Box::new(NullRecorder::default()));
    }

    let path = recording_path(config, source_id);
    std::fs::create_dir_all(&config.path).map_err(|e| RecordingError::Open {
        path: config.path.clone(),
        details: e.to_string(),
    })?;

    #[cfg(all(target_os = "linux", feature = "video_encoding"))]
    {
        let recorder = GstRecorder::open(path, width, height, fps, config.bitrate_kbps)?;
        Ok(Box::new(recorder))
    }

    #[cfg(not(all(target_os = "linux", feature = "video_encoding")))]
    {
        let _ = (path, width, height, fps);
        Err(RecordingError::NotAvailable)
    }
}

/// Discards frames; used when recording is disabled
#[derive(Debug, Default)]
pub struct NullRecorder {
    frames: u64,
}

impl FrameSink for NullRecorder {
    fn write(&mut self, _frame: &Frame) -> Result<(), RecordingError> {
        self.frames += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), RecordingError> {
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames
    }
}

/// H.264/MP4 writer fed raw RGB frames through an appsrc
#[cfg(all(target_os = "linux", feature = "video_encoding"))]
pub struct GstRecorder {
    path: PathBuf,
    pipeline: Pipeline,
    appsrc: AppSrc,
    width: u32,
    height: u32,
    fps: u32,
    frames: u64,
    finished: bool,
}

#[cfg(all(target_os = "linux", feature = "video_encoding"))]
impl GstRecorder {
    pub fn open(
        path: PathBuf,
        width: u32,
        height: u32,
        fps: u32,
        bitrate_kbps: u32,
    ) -> Result<Self, RecordingError> {
        let open_err = |details: String| RecordingError::Open {
            path: path.display().to_string(),
            details,
        };

        gstreamer::init().map_err(|e| open_err(format!("Failed to initialize GStreamer: {}", e)))?;

        let pipeline_desc = format!(
            "appsrc name=src format=time is-live=false \
             caps=video/x-raw,format=RGB,width={w},height={h},framerate={fps}/1 ! \
             videoconvert ! video/x-raw,format=I420 ! \
             x264enc speed-preset=veryfast bitrate={bitrate} key-int-max={gop} ! \
             video/x-h264,stream-format=avc,alignment=au ! \
             h264parse ! \
             mp4mux faststart=true ! \
             filesink location=\"{path}\"",
            w = width,
            h = height,
            fps = fps,
            bitrate = bitrate_kbps,
            gop = fps * 2,
            path = path.to_string_lossy()
        );
        debug!("Recording pipeline: {}", pipeline_desc);

        let pipeline = gstreamer::parse::launch(&pipeline_desc)
            .map_err(|e| open_err(format!("Failed to create pipeline: {}", e)))?
            .downcast::<Pipeline>()
            .map_err(|_| open_err("Failed to downcast to Pipeline".to_string()))?;

        let appsrc = pipeline
            .by_name("src")
            .ok_or_else(|| open_err("Failed to get appsrc element".to_string()))?
            .downcast::<AppSrc>()
            .map_err(|_| open_err("Failed to downcast to AppSrc".to_string()))?;

        appsrc.set_property("format", gstreamer::Format::Time);
        appsrc.set_property("is-live", false);

        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| open_err(format!("Failed to start pipeline: {}", e)))?;

        info!(
            "Recording to {} ({}x{} @ {} fps)",
            path.display(),
            width,
            height,
            fps
        );

        Ok(Self {
            path,
            pipeline,
            appsrc,
            width,
            height,
            fps: fps.max(1),
            frames: 0,
            finished: false,
        })
    }

    /// Raw RGB caps expect rows padded to 4 bytes
    fn padded(&self, frame: &Frame) -> Vec<u8> {
        let row = self.width as usize * crate::frame::RGB24_BYTES_PER_PIXEL;
        let stride = (row + 3) & !3;
        if stride == row {
            return frame.data.as_ref().clone();
        }

        let mut out = vec![0u8; stride * self.height as usize];
        for (dst, src) in out.chunks_mut(stride).zip(frame.data.chunks(row)) {
            dst[..src.len()].copy_from_slice(src);
        }
        out
    }
}

#[cfg(all(target_os = "linux", feature = "video_encoding"))]
impl FrameSink for GstRecorder {
    fn write(&mut self, frame: &Frame) -> Result<(), RecordingError> {
        let write_err = |details: String| RecordingError::Write {
            frame: frame.index,
            details,
        };

        if frame.width != self.width || frame.height != self.height || !frame.validate_size() {
            return Err(write_err(format!(
                "frame is {}x{} ({} bytes), recording is {}x{}",
                frame.width,
                frame.height,
                frame.data.len(),
                self.width,
                self.height
            )));
        }

        let data = self.padded(frame);
        let mut buffer = gstreamer::Buffer::from_mut_slice(data);

        let frame_ns = 1_000_000_000 / self.fps as u64;
        {
            let buffer_ref = buffer
                .get_mut()
                .ok_or_else(|| write_err("Buffer not writable".to_string()))?;
            buffer_ref.set_pts(gstreamer::ClockTime::from_nseconds(self.frames * frame_ns));
            buffer_ref.set_duration(gstreamer::ClockTime::from_nseconds(frame_ns));
        }

        self.appsrc
            .push_buffer(buffer)
            .map_err(|e| write_err(format!("Failed to push buffer: {:?}", e)))?;

        self.frames += 1;
        if self.frames % (self.fps as u64 * 10) == 0 {
            debug!("Recorded {} frames to {}", self.frames, self.path.display());
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), RecordingError> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        self.appsrc
            .end_of_stream()
            .map_err(|e| RecordingError::Finalize {
                details: format!("Failed to signal EOS: {:?}", e),
            })?;

        if let Some(bus) = self.pipeline.bus() {
            for msg in bus.iter_timed(gstreamer::ClockTime::from_seconds(30)) {
                match msg.view() {
                    gstreamer::MessageView::Eos(..) => break,
                    gstreamer::MessageView::Error(err) => {
                        let details = format!(
                            "{} ({})",
                            err.error(),
                            err.debug().unwrap_or_default()
                        );
                        let _ = self.pipeline.set_state(gstreamer::State::Null);
                        return Err(RecordingError::Finalize { details });
                    }
                    _ => {}
                }
            }
        }

        self.pipeline
            .set_state(gstreamer::State::Null)
            .map_err(|e| RecordingError::Finalize {
                details: format!("Failed to stop pipeline: {}", e),
            })?;

        info!(
            "Recording {} finalized: {} frames",
            self.path.display(),
            self.frames
        );
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames
    }
}

#[cfg(all(target_os = "linux", feature = "video_encoding"))]
impl Drop for GstRecorder {
    fn drop(&mut self) {
        if !self.finished {
            warn!(
                "Recording {} dropped without finalizing",
                self.path.display()
            );
            let _ = self.pipeline.set_state(gstreamer::State::Null);
        }
    }
}
