use super::types::UnitExit;
use crate::config::CameraSourceConfig;
use crate::error::{PosewatchError, Result};
use crate::pipeline::{PipelineFactory, PipelineSummary};
use async_trait::async_trait;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// A running execution unit as seen by the supervisor
#[async_trait]
pub trait UnitHandle: Send {
    /// Resolve once the unit has fully exited
    async fn wait(&mut self) -> UnitExit;

    /// Ask the unit to stop; it finishes its current iteration first
    fn request_stop(&mut self);
}

/// Starts one isolated execution unit per camera
#[async_trait]
pub trait UnitLauncher: Send + Sync {
    fn name(&self) -> &str;

    async fn launch(&self, camera: &CameraSourceConfig) -> Result<Box<dyn UnitHandle>>;
}

/// Build and run one camera's pipeline until it ends or `stop` fires
pub async fn run_unit(
    factory: &dyn PipelineFactory,
    camera: &CameraSourceConfig,
    stop: CancellationToken,
) -> Result<PipelineSummary> {
    let pipeline = factory.create(camera).await?;
    pipeline.run(stop).await
}

/// Runs every unit as a separate OS process re-executing this binary
pub struct ProcessLauncher {
    executable: PathBuf,
    args: Vec<String>,
}

impl ProcessLauncher {
    /// Use the current executable, forwarding `args` ahead of `--worker <id>`
    pub fn current_exe(args: Vec<String>) -> Result<Self> {
        let executable = std::env::current_exe()?;
        Ok(Self::new(executable, args))
    }

    pub fn new(executable: PathBuf, args: Vec<String>) -> Self {
        Self { executable, args }
    }
}

#[async_trait]
impl UnitLauncher for ProcessLauncher {
    fn name(&self) -> &str {
        "process"
    }

    async fn launch(&self, camera: &CameraSourceConfig) -> Result<Box<dyn UnitHandle>> {
        let child = Command::new(&self.executable)
            .args(&self.args)
            .arg("--worker")
            .arg(&camera.id)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                PosewatchError::component(
                    &camera.id,
                    format!("Failed to spawn worker process: {}", e),
                )
            })?;

        info!(
            "Launched worker process {:?} for {}",
            child.id(),
            camera.id
        );

        Ok(Box::new(ProcessUnit {
            id: camera.id.clone(),
            child,
            stop_sent: false,
        }))
    }
}

struct ProcessUnit {
    id: String,
    child: Child,
    stop_sent: bool,
}

#[async_trait]
impl UnitHandle for ProcessUnit {
    async fn wait(&mut self) -> UnitExit {
        match self.child.wait().await {
            Ok(status) if status.success() => UnitExit::Completed,
            Ok(status) => UnitExit::Failed(format!("worker exited with {}", status)),
            Err(e) => UnitExit::Failed(format!("failed to wait for worker: {}", e)),
        }
    }

    fn request_stop(&mut self) {
        if self.stop_sent {
            return;
        }
        self.stop_sent = true;

        #[cfg(unix)]
        {
            if let Some(pid) = self.child.id() {
                debug!("Sending SIGTERM to worker {} (pid {})", self.id, pid);
                // SAFETY: plain signal delivery to a child we spawned and still own
                let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
                if rc != 0 {
                    warn!(
                        "Failed to signal worker {}: {}",
                        self.id,
                        std::io::Error::last_os_error()
                    );
                }
            }
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = self.child.start_kill() {
                warn!("Failed to kill worker {}: {}", self.id, e);
            }
        }
    }
}

/// Runs every unit on a dedicated OS thread with its own runtime.
///
/// Panics inside a unit are contained and reported as a failed exit.
pub struct ThreadLauncher {
    factory: Arc<dyn PipelineFactory>,
}

impl ThreadLauncher {
    pub fn new(factory: Arc<dyn PipelineFactory>) -> Self {
        Self { factory }
    }
}

#[async_trait]
impl UnitLauncher for ThreadLauncher {
    fn name(&self) -> &str {
        "thread"
    }

    async fn launch(&self, camera: &CameraSourceConfig) -> Result<Box<dyn UnitHandle>> {
        let stop = CancellationToken::new();
        let (exit_tx, exit_rx) = oneshot::channel();

        let factory = Arc::clone(&self.factory);
        let camera = camera.clone();
        let unit_stop = stop.clone();
        let id = camera.id.clone();

        std::thread::Builder::new()
            .name(format!("unit-{}", id))
            .spawn(move || {
                let exit = run_contained(factory, camera, unit_stop);
                let _ = exit_tx.send(exit);
            })?;

        info!("Launched worker thread for {}", id);
        Ok(Box::new(ThreadUnit {
            stop,
            exit_rx: Some(exit_rx),
        }))
    }
}

fn run_contained(
    factory: Arc<dyn PipelineFactory>,
    camera: CameraSourceConfig,
    stop: CancellationToken,
) -> UnitExit {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => return UnitExit::Failed(format!("failed to build runtime: {}", e)),
    };

    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
        runtime.block_on(run_unit(factory.as_ref(), &camera, stop))
    }));

    match outcome {
        Ok(Ok(summary)) => {
            debug!(
                "Unit {} finished after {} frames",
                camera.id, summary.frames_processed
            );
            UnitExit::Completed
        }
        Ok(Err(e)) => {
            error!("Unit {} failed: {}", camera.id, e);
            UnitExit::Failed(e.to_string())
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!("Unit {} panicked: {}", camera.id, message);
            UnitExit::Failed(format!("panicked: {}", message))
        }
    }
}

struct ThreadUnit {
    stop: CancellationToken,
    exit_rx: Option<oneshot::Receiver<UnitExit>>,
}

#[async_trait]
impl UnitHandle for ThreadUnit {
    async fn wait(&mut self) -> UnitExit {
        let Some(rx) = self.exit_rx.as_mut() else {
            return UnitExit::Failed("unit already reaped".to_string());
        };

        let exit = rx
            .await
            .unwrap_or_else(|_| UnitExit::Failed("unit thread exited without a result".to_string()));
        self.exit_rx = None;
        exit
    }

    fn request_stop(&mut self) {
        self.stop.cancel();
    }
}
