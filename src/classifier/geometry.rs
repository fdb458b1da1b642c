use crate::perception::{Detection, Point};
use serde::{Deserialize, Serialize};
use std::fmt;

/// COCO keypoint indices (shoulder, elbow, wrist)
pub const LEFT_ARM: [usize; 3] = [5, 7, 9];
pub const RIGHT_ARM: [usize; 3] = [6, 8, 10];

/// Which arm the reported elbow angle was measured on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArmSide {
    #[serde(rename = "L")]
    Left,
    #[serde(rename = "R")]
    Right,
    #[serde(rename = "none")]
    None,
}

impl ArmSide {
    pub fn label(&self) -> &'static str {
        match self {
            ArmSide::Left => "L",
            ArmSide::Right => "R",
            ArmSide::None => "none",
        }
    }
}

impl fmt::Display for ArmSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Interior angle at `b` formed by `a-b-c`, in degrees within [0, 180]
pub fn calculate_angle(a: Point, b: Point, c: Point) -> f32 {
    let radians = (c.1 - b.1).atan2(c.0 - b.0) - (a.1 - b.1).atan2(a.0 - b.0);
    let angle = radians.to_degrees().abs();

    if angle > 180.0 {
        360.0 - angle
    } else {
        angle
    }
}

/// Pick the arm with the stronger keypoints and measure its elbow angle.
///
/// A side is only usable when all three of its joints clear `confidence_floor`
/// and its confidence sum is strictly the higher one. Otherwise returns
/// `(0.0, ArmSide::None)`.
pub fn select_arm(detection: &Detection, confidence_floor: f32) -> (f32, ArmSide) {
    let needed = RIGHT_ARM[2] + 1;
    if !detection.has_confidences() || detection.keypoints.len() < needed {
        return (0.0, ArmSide::None);
    }

    let conf = &detection.confidences;
    let sum = |joints: &[usize; 3]| joints.iter().map(|&i| conf[i]).sum::<f32>();
    let usable = |joints: &[usize; 3]| joints.iter().all(|&i| conf[i] > confidence_floor);

    let (left_sum, right_sum) = (sum(&LEFT_ARM), sum(&RIGHT_ARM));

    let (joints, side) = if left_sum > right_sum && usable(&LEFT_ARM) {
        (LEFT_ARM, ArmSide::Left)
    } else if right_sum > left_sum && usable(&RIGHT_ARM) {
        (RIGHT_ARM, ArmSide::Right)
    } else {
        return (0.0, ArmSide::None);
    };

    let kp = &detection.keypoints;
    let angle = calculate_angle(kp[joints[0]], kp[joints[1]], kp[joints[2]]);
    (angle, side)
}
