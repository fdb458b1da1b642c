use crate::frame::Frame;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Single-slot mailbox between a capture producer and a consumer loop.
///
/// `push` never blocks: a frame still sitting in the slot is discarded and
/// replaced, so the consumer always sees the most recent capture and never a
/// backlog. Exactly one producer and one consumer are expected.
pub struct FrameChannel {
    slot: Mutex<Option<Frame>>,
    notify: Notify,
    closed: AtomicBool,
    stats: FrameChannelStats,
}

/// Counters for channel monitoring
#[derive(Debug)]
pub struct FrameChannelStats {
    /// Total frames pushed by the producer
    pub frames_pushed: AtomicU64,
    /// Total frames handed to the consumer
    pub frames_popped: AtomicU64,
    /// Frames replaced before the consumer got to them
    pub frames_dropped: AtomicU64,
    /// Pops that returned nothing
    pub empty_pops: AtomicU64,
}

impl FrameChannelStats {
    fn new() -> Self {
        Self {
            frames_pushed: AtomicU64::new(0),
            frames_popped: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            empty_pops: AtomicU64::new(0),
        }
    }

    /// Get current statistics as a snapshot
    pub fn snapshot(&self) -> FrameChannelStatsSnapshot {
        FrameChannelStatsSnapshot {
            frames_pushed: self.frames_pushed.load(Ordering::Relaxed),
            frames_popped: self.frames_popped.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            empty_pops: self.empty_pops.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameChannelStatsSnapshot {
    pub frames_pushed: u64,
    pub frames_popped: u64,
    pub frames_dropped: u64,
    pub empty_pops: u64,
}

impl FrameChannel {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            stats: FrameChannelStats::new(),
        }
    }

    /// Store a frame, replacing any frame the consumer has not taken yet
    pub fn push(&self, frame: Frame) {
        let index = frame.index;
        let replaced = {
            let mut slot = self.slot.lock();
            slot.replace(frame)
        };

        if let Some(old) = replaced {
            self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
            trace!("Dropped stale frame {} in favour of frame {}", old.index, index);
        }

        self.stats.frames_pushed.fetch_add(1, Ordering::Relaxed);
        self.notify.notify_one();
    }

    /// Wait up to `timeout` for a frame.
    ///
    /// Returns `None` when nothing arrived in time or when the channel is
    /// closed and empty. A frame pushed before `close` is still delivered.
    pub async fn pop(&self, timeout: Duration) -> Option<Frame> {
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(frame) = self.try_pop() {
                return Some(frame);
            }

            if self.is_closed() {
                // A push may have landed between the take above and close
                return self.try_pop();
            }

            if tokio::time::timeout_at(deadline, self.notify.notified())
                .await
                .is_err()
            {
                self.stats.empty_pops.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        }
    }

    /// Take the pending frame without waiting
    pub fn try_pop(&self) -> Option<Frame> {
        let taken = self.slot.lock().take();
        if taken.is_some() {
            self.stats.frames_popped.fetch_add(1, Ordering::Relaxed);
        }
        taken
    }

    /// Mark the producer as finished and wake a waiting consumer
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("Frame channel closed");
        }
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of frames waiting (0 or 1)
    pub fn len(&self) -> usize {
        usize::from(self.slot.lock().is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> FrameChannelStatsSnapshot {
        self.stats.snapshot()
    }
}

impl Default for FrameChannel {
    fn default() -> Self {
        Self::new()
    }
}
