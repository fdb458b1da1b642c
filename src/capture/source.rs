use crate::error::CaptureError;
use crate::frame::{Frame, RGB24_BYTES_PER_PIXEL};
use crate::frame_channel::FrameChannel;
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Blocking producer of RGB24 frames.
///
/// Implementations are driven from a dedicated capture thread, so `read` may
/// block for as long as the device or decoder needs.
pub trait FrameSource: Send {
    /// Native frame rate, when the source reports one
    fn fps(&self) -> Option<u32>;

    /// Frame size in pixels
    fn resolution(&self) -> (u32, u32);

    /// File sources rewind on end-of-stream; live devices stop
    fn is_looping(&self) -> bool;

    /// Next packed RGB24 frame, or `None` at end of stream
    fn read(&mut self) -> Result<Option<Vec<u8>>, CaptureError>;

    /// Seek back to the first frame
    fn rewind(&mut self) -> Result<(), CaptureError>;

    /// Release the underlying device or decoder
    fn close(&mut self) {}
}

/// Why the capture loop returned
#[derive(Debug)]
pub enum CaptureOutcome {
    /// Stop was requested
    Stopped,
    /// A live source ran out of frames
    EndOfStream,
    Failed(CaptureError),
}

/// Capture statistics reported when the loop exits
#[derive(Debug)]
pub struct CaptureReport {
    pub outcome: CaptureOutcome,
    pub frames_captured: u64,
    pub loops: u64,
}

/// Read frames at source pace and publish each one to `channel`.
///
/// Looping sources restart at index 0 after a rewind. Always closes the
/// channel before returning so the consumer can tell "finished" from
/// "starved".
pub fn run_capture_loop(
    source: &mut dyn FrameSource,
    channel: &FrameChannel,
    stop: &CancellationToken,
) -> CaptureReport {
    let (width, height) = source.resolution();
    let mut index: u64 = 0;
    let mut frames_captured: u64 = 0;
    let mut loops: u64 = 0;

    let outcome = loop {
        if stop.is_cancelled() {
            break CaptureOutcome::Stopped;
        }

        match source.read() {
            Ok(Some(data)) => {
                channel.push(Frame::new(index, SystemTime::now(), data, width, height));
                index += 1;
                frames_captured += 1;
            }
            Ok(None) if source.is_looping() => {
                debug!("End of file after {} frames, rewinding", index);
                if let Err(e) = source.rewind() {
                    break CaptureOutcome::Failed(e);
                }
                index = 0;
                loops += 1;
            }
            Ok(None) => {
                info!("Live source reached end of stream");
                break CaptureOutcome::EndOfStream;
            }
            Err(e) => {
                warn!("Capture read failed: {}", e);
                break CaptureOutcome::Failed(e);
            }
        }
    };

    source.close();
    channel.close();

    CaptureReport {
        outcome,
        frames_captured,
        loops,
    }
}

/// In-memory source producing solid frames, for tests and dry runs
pub struct SyntheticSource {
    width: u32,
    height: u32,
    fps: Option<u32>,
    frames: u64,
    looping: bool,
    position: u64,
    frame_interval: Option<Duration>,
    fail_at: Option<u64>,
}

impl SyntheticSource {
    /// `frames` frames of `width`x`height`, shade increasing with position
    pub fn new(width: u32, height: u32, fps: Option<u32>, frames: u64, looping: bool) -> Self {
        Self {
            width,
            height,
            fps,
            frames,
            looping,
            position: 0,
            frame_interval: None,
            fail_at: None,
        }
    }

    /// Sleep between reads to mimic a source-paced device
    pub fn paced(mut self, interval: Duration) -> Self {
        self.frame_interval = Some(interval);
        self
    }

    /// Return a read error once `position` frames have been produced
    pub fn failing_at(mut self, position: u64) -> Self {
        self.fail_at = Some(position);
        self
    }
}

impl FrameSource for SyntheticSource {
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
        if let Some(interval) = self.frame_interval {
            std::thread::sleep(interval);
        }

        if self.fail_at == Some(self.position) {
            return Err(CaptureError::Read {
                details: format!("synthetic failure at frame {}", self.position),
            });
        }

        if self.position >= self.frames {
            return Ok(None);
        }

        let shade = (self.position % 256) as u8;
        self.position += 1;
        let size = self.width as usize * self.height as usize * RGB24_BYTES_PER_PIXEL;
        Ok(Some(vec![shade; size]))
    }

    fn rewind(&mut self) -> Result<(), CaptureError> {
        self.position = 0;
        Ok(())
    }
}
