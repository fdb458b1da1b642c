mod launcher;
mod orchestrator;
mod runtime;
mod types;

pub use launcher::{run_unit, ProcessLauncher, ThreadLauncher, UnitHandle, UnitLauncher};
pub use orchestrator::Supervisor;
pub use runtime::{setup_signal_handlers, signal_token};
pub use types::{ShutdownReason, UnitExit, UnitState};

#[cfg(test)]
mod tests;
