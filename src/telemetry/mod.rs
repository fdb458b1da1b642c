mod batcher;
mod emit;
mod types;

pub use batcher::TelemetryBatcher;
pub use emit::{
    build_sink, emission_worker, DirectorySink, EmissionStats, LogSink, MemorySink, TelemetrySink,
};
pub use types::{batch_name, TelemetryBatch, TelemetryFrame, TelemetryRecord};

#[cfg(test)]
mod tests;
