use serde::Serialize;

/// Lifecycle state of one execution unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnitState {
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl UnitState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UnitState::Stopped | UnitState::Failed)
    }
}

/// How a unit finished
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitExit {
    Completed,
    Failed(String),
}

/// Why the supervisor started shutting down
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    Signal(String),
    AllUnitsFinished,
    UserRequest,
}
