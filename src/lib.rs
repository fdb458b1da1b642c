pub mod capture;
pub mod classifier;
pub mod clock;
pub mod config;
pub mod error;
pub mod frame;
pub mod frame_channel;
pub mod perception;
pub mod pipeline;
pub mod supervisor;
pub mod telemetry;

pub use capture::{Annotator, FrameSink, FrameSource};
pub use classifier::{ArmSide, MotionStatus, TrackStateClassifier};
pub use clock::Clock;
pub use config::{CameraSourceConfig, PosewatchConfig, SourceSpec};
pub use error::{PosewatchError, Result};
pub use frame::Frame;
pub use frame_channel::FrameChannel;
pub use perception::{BoundingBox, Detection, Detector};
pub use pipeline::{
    DefaultPipelineFactory, EndReason, PipelineFactory, PipelineSummary, SourcePipeline,
    SourcePipelineBuilder,
};
pub use supervisor::{ProcessLauncher, Supervisor, ThreadLauncher, UnitLauncher, UnitState};
pub use telemetry::{TelemetryBatch, TelemetryBatcher, TelemetrySink};
