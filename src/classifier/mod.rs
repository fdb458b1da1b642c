mod geometry;
mod motion;

pub use geometry::{calculate_angle, select_arm, ArmSide, LEFT_ARM, RIGHT_ARM};
pub use motion::{
    classify_window, population_std_dev, MotionStatus, MotionThresholds, TrackRecord,
    TrackStateClassifier,
};
