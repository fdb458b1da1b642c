use crate::config::ClassifierConfig;
use crate::perception::Detection;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use tracing::debug;

/// Motion state of one tracked object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MotionStatus {
    Analyzing,
    Static,
    Normal,
    Active,
}

impl MotionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MotionStatus::Analyzing => "ANALYZING",
            MotionStatus::Static => "STATIC",
            MotionStatus::Normal => "NORMAL",
            MotionStatus::Active => "ACTIVE",
        }
    }
}

impl fmt::Display for MotionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification thresholds, in pixels of vertical standard deviation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionThresholds {
    pub active: f32,
    pub normal: f32,
}

impl Default for MotionThresholds {
    fn default() -> Self {
        Self {
            active: 15.0,
            normal: 5.0,
        }
    }
}

/// Population standard deviation of the samples
pub fn population_std_dev<'a, I>(samples: I) -> f32
where
    I: IntoIterator<Item = &'a f32>,
    I::IntoIter: Clone,
{
    let iter = samples.into_iter();
    let (count, sum) = iter
        .clone()
        .fold((0usize, 0.0f64), |(n, s), &v| (n + 1, s + v as f64));
    if count == 0 {
        return 0.0;
    }

    let mean = sum / count as f64;
    let variance = iter
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / count as f64;

    variance.sqrt() as f32
}

/// Classify one window of samples collected at `fps`
pub fn classify_window(window: &VecDeque<f32>, fps: u32, thresholds: MotionThresholds) -> MotionStatus {
    if window.len() < fps as usize {
        return MotionStatus::Analyzing;
    }

    let std_dev = population_std_dev(window);
    if std_dev > thresholds.active {
        MotionStatus::Active
    } else if std_dev > thresholds.normal {
        MotionStatus::Normal
    } else {
        MotionStatus::Static
    }
}

/// Sliding window of one track's vertical positions
#[derive(Debug, Clone)]
pub struct TrackRecord {
    window: VecDeque<f32>,
    last_seen: u64,
}

impl TrackRecord {
    pub fn samples(&self) -> &VecDeque<f32> {
        &self.window
    }

    pub fn last_seen(&self) -> u64 {
        self.last_seen
    }
}

/// Per-track motion state machine.
///
/// Owns every `TrackRecord` of one pipeline. Records are created on first
/// sighting and, unless `stale_track_frames` is set, kept for the lifetime of
/// the classifier.
pub struct TrackStateClassifier {
    fps: u32,
    capacity: usize,
    thresholds: MotionThresholds,
    stale_track_frames: u64,
    tracks: HashMap<u32, TrackRecord>,
    frame: u64,
}

impl TrackStateClassifier {
    pub fn new(fps: u32, config: &ClassifierConfig) -> Self {
        let fps = fps.max(1);
        Self {
            fps,
            capacity: fps as usize * config.window_seconds.max(1) as usize,
            thresholds: MotionThresholds {
                active: config.active_threshold,
                normal: config.normal_threshold,
            },
            stale_track_frames: config.stale_track_frames,
            tracks: HashMap::new(),
            frame: 0,
        }
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Maximum samples kept per track
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Advance to the next frame; evicts stale tracks when enabled
    pub fn begin_frame(&mut self) {
        self.frame += 1;

        if self.stale_track_frames == 0 {
            return;
        }

        let now = self.frame;
        let horizon = self.stale_track_frames;
        let before = self.tracks.len();
        self.tracks
            .retain(|_, record| now.saturating_sub(record.last_seen) <= horizon);

        let evicted = before - self.tracks.len();
        if evicted > 0 {
            debug!("Evicted {} stale track(s) at frame {}", evicted, now);
        }
    }

    /// Record a sighting of `track_id` and return its current status
    pub fn observe(&mut self, track_id: u32, detection: &Detection) -> MotionStatus {
        let frame = self.frame;
        let capacity = self.capacity;
        let record = self.tracks.entry(track_id).or_insert_with(|| {
            debug!("New track {}", track_id);
            TrackRecord {
                window: VecDeque::with_capacity(capacity),
                last_seen: frame,
            }
        });
        record.last_seen = frame;

        if let Some(&(_, y)) = detection.keypoints.first() {
            if record.window.len() == capacity {
                record.window.pop_front();
            }
            record.window.push_back(y);
        }

        classify_window(&record.window, self.fps, self.thresholds)
    }

    pub fn track(&self, track_id: u32) -> Option<&TrackRecord> {
        self.tracks.get(&track_id)
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }
}
