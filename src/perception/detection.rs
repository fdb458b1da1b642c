use serde::{Deserialize, Serialize};

/// 2-D keypoint position in frame pixels
pub type Point = (f32, f32);

/// Axis-aligned box `(x1, y1)`-`(x2, y2)` in frame pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn as_array(&self) -> [f32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

impl From<[f32; 4]> for BoundingBox {
    fn from(v: [f32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BoundingBox> for [f32; 4] {
    fn from(b: BoundingBox) -> Self {
        b.as_array()
    }
}

/// One detected object as reported by the perception backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Identity persisted across frames, absent when the backend cannot track
    #[serde(default)]
    pub track_id: Option<u32>,
    pub bbox: BoundingBox,
    #[serde(default)]
    pub keypoints: Vec<Point>,
    /// Per-keypoint confidences, aligned with `keypoints`
    #[serde(default)]
    pub confidences: Vec<f32>,
}

impl Detection {
    pub fn new(track_id: Option<u32>, bbox: BoundingBox) -> Self {
        Self {
            track_id,
            bbox,
            keypoints: Vec::new(),
            confidences: Vec::new(),
        }
    }

    pub fn with_keypoints(mut self, keypoints: Vec<Point>, confidences: Vec<f32>) -> Self {
        self.keypoints = keypoints;
        self.confidences = confidences;
        self
    }

    /// Confidences are only usable when they line up with the keypoints
    pub fn has_confidences(&self) -> bool {
        !self.confidences.is_empty() && self.confidences.len() == self.keypoints.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection_wire_shape() {
        let json = r#"{"track_id":3,"bbox":[10,20,110,220],"keypoints":[[1.5,2.5]],"confidences":[0.9]}"#;
        let detection: Detection = serde_json::from_str(json).unwrap();

        assert_eq!(detection.track_id, Some(3));
        assert_eq!(detection.bbox, BoundingBox::new(10.0, 20.0, 110.0, 220.0));
        assert_eq!(detection.bbox.width(), 100.0);
        assert_eq!(detection.keypoints, vec![(1.5, 2.5)]);
        assert!(detection.has_confidences());
    }

    #[test]
    fn test_untracked_detection_defaults() {
        let detection: Detection = serde_json::from_str(r#"{"bbox":[0,0,1,1]}"#).unwrap();

        assert_eq!(detection.track_id, None);
        assert!(detection.keypoints.is_empty());
        assert!(!detection.has_confidences());
    }
}
