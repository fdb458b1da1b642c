mod builder;
mod core;

pub use builder::{DefaultPipelineFactory, PipelineFactory, SourcePipelineBuilder};
pub use core::{EndReason, PipelineSummary, SourcePipeline};
