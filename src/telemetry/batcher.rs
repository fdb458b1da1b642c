use super::types::{batch_name, TelemetryBatch, TelemetryFrame};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Accumulates telemetry frames and hands off a batch every `fps` frames.
///
/// `append` never blocks; completed batches move to the emission worker over
/// an unbounded channel and are never touched here again.
pub struct TelemetryBatcher {
    fps: usize,
    pending: Vec<TelemetryFrame>,
    since_flush: usize,
    batches_flushed: u64,
    sender: mpsc::UnboundedSender<TelemetryBatch>,
}

impl TelemetryBatcher {
    pub fn new(fps: u32, sender: mpsc::UnboundedSender<TelemetryBatch>) -> Self {
        let fps = fps.max(1) as usize;
        Self {
            fps,
            pending: Vec::with_capacity(fps),
            since_flush: 0,
            batches_flushed: 0,
            sender,
        }
    }

    /// Add one frame; returns the emission name when this append triggered a flush
    pub fn append(&mut self, frame: TelemetryFrame) -> Option<String> {
        self.pending.push(frame);
        self.since_flush += 1;

        if self.since_flush >= self.fps {
            self.flush()
        } else {
            None
        }
    }

    /// Hand off whatever is pending, named after the newest frame
    pub fn flush(&mut self) -> Option<String> {
        self.since_flush = 0;
        let timestamp = self.pending.last()?.timestamp.clone();

        let frames = std::mem::replace(&mut self.pending, Vec::with_capacity(self.fps));
        let name = batch_name(&timestamp);
        debug!("Flushing telemetry batch {} ({} frames)", name, frames.len());

        let batch = TelemetryBatch {
            name: name.clone(),
            frames,
        };
        if self.sender.send(batch).is_err() {
            warn!("Emission worker is gone, dropping telemetry batch {}", name);
            return None;
        }

        self.batches_flushed += 1;
        Some(name)
    }

    pub fn pending(&self) -> &[TelemetryFrame] {
        &self.pending
    }

    pub fn batches_flushed(&self) -> u64 {
        self.batches_flushed
    }
}
