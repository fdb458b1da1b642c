use super::launcher::{UnitHandle, UnitLauncher};
use super::types::{UnitExit, UnitState};
use crate::config::{CameraSourceConfig, SourceSpec};
use crate::error::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

struct UnitEntry {
    id: String,
    monitor: JoinHandle<()>,
}

/// Launches one isolated unit per camera and tracks their lifecycle.
///
/// A unit's failure only changes its own state; the other units keep
/// running until they end or `shutdown` is called.
pub struct Supervisor {
    launcher: Arc<dyn UnitLauncher>,
    units: Vec<UnitEntry>,
    unit_states: Arc<Mutex<HashMap<String, UnitState>>>,
    stop: CancellationToken,
    running_tx: watch::Sender<usize>,
    running_rx: watch::Receiver<usize>,
}

impl Supervisor {
    pub fn new(launcher: Arc<dyn UnitLauncher>) -> Self {
        let (running_tx, running_rx) = watch::channel(0);
        Self {
            launcher,
            units: Vec::new(),
            unit_states: Arc::new(Mutex::new(HashMap::new())),
            stop: CancellationToken::new(),
            running_tx,
            running_rx,
        }
    }

    /// Launch a unit for every camera, returning how many were started.
    ///
    /// File sources whose path does not exist are skipped. A unit that
    /// fails to launch is marked `Failed` without affecting the rest.
    pub async fn launch(&mut self, cameras: &[CameraSourceConfig]) -> Result<usize> {
        info!(
            "Launching {} unit(s) with the {} launcher",
            cameras.len(),
            self.launcher.name()
        );

        let mut launched = 0;
        for camera in cameras {
            if let SourceSpec::File(path) = &camera.source {
                if !path.exists() {
                    warn!(
                        "Skipping {}: video file {} not found",
                        camera.id,
                        path.display()
                    );
                    continue;
                }
            }

            self.set_unit_state(&camera.id, UnitState::Starting).await;

            match self.launcher.launch(camera).await {
                Ok(handle) => {
                    self.spawn_monitor(camera.id.clone(), handle).await;
                    launched += 1;
                }
                Err(e) => {
                    error!("Failed to launch unit {}: {}", camera.id, e);
                    self.set_unit_state(&camera.id, UnitState::Failed).await;
                }
            }
        }

        info!("{} unit(s) running", launched);
        Ok(launched)
    }

    async fn spawn_monitor(&mut self, id: String, mut handle: Box<dyn UnitHandle>) {
        self.set_unit_state(&id, UnitState::Running).await;
        self.running_tx.send_modify(|running| *running += 1);

        let unit_stop = self.stop.child_token();
        let states = Arc::clone(&self.unit_states);
        let running_tx = self.running_tx.clone();
        let unit_id = id.clone();

        let monitor = tokio::spawn(async move {
            let exit = tokio::select! {
                exit = handle.wait() => exit,
                _ = unit_stop.cancelled() => {
                    set_state(&states, &unit_id, UnitState::Stopping).await;
                    handle.request_stop();
                    handle.wait().await
                }
            };

            let state = match exit {
                UnitExit::Completed => {
                    info!("Unit {} stopped", unit_id);
                    UnitState::Stopped
                }
                UnitExit::Failed(reason) => {
                    error!("Unit {} failed: {}", unit_id, reason);
                    UnitState::Failed
                }
            };
            set_state(&states, &unit_id, state).await;
            running_tx.send_modify(|running| *running = running.saturating_sub(1));
        });

        self.units.push(UnitEntry { id, monitor });
    }

    /// Resolve once no launched unit is running any more
    pub async fn wait_all_finished(&self) {
        let mut rx = self.running_rx.clone();
        let _ = rx.wait_for(|running| *running == 0).await;
    }

    /// Number of units still running
    pub fn running_units(&self) -> usize {
        *self.running_rx.borrow()
    }

    /// Stop every unit and wait for all of them to finish.
    ///
    /// Returns a process exit code: 0 when every unit stopped cleanly.
    pub async fn shutdown(&mut self) -> Result<i32> {
        info!("Stopping {} unit(s)", self.units.len());
        self.stop.cancel();

        for unit in self.units.drain(..) {
            if let Err(e) = unit.monitor.await {
                error!("Monitor for unit {} did not finish cleanly: {}", unit.id, e);
                set_state(&self.unit_states, &unit.id, UnitState::Failed).await;
            }
        }

        let states = self.unit_states().await;
        let failed: Vec<&String> = states
            .iter()
            .filter(|(_, state)| **state == UnitState::Failed)
            .map(|(id, _)| id)
            .collect();

        if failed.is_empty() {
            info!("All units stopped");
            Ok(0)
        } else {
            warn!("Units finished with failures: {:?}", failed);
            Ok(1)
        }
    }

    /// Snapshot of every unit's lifecycle state
    pub async fn unit_states(&self) -> HashMap<String, UnitState> {
        self.unit_states.lock().await.clone()
    }

    pub async fn unit_state(&self, id: &str) -> Option<UnitState> {
        self.unit_states.lock().await.get(id).copied()
    }

    async fn set_unit_state(&self, id: &str, state: UnitState) {
        set_state(&self.unit_states, id, state).await;
    }
}

async fn set_state(states: &Mutex<HashMap<String, UnitState>>, id: &str, state: UnitState) {
    let mut states = states.lock().await;
    states.insert(id.to_string(), state);
    debug!("Unit '{}' state changed to: {:?}", id, state);
}
