use super::orchestrator::Supervisor;
use super::types::ShutdownReason;
use crate::error::Result;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

impl Supervisor {
    /// Run until SIGINT/SIGTERM or until every unit has finished, then shut down
    pub async fn run_until_signal(&mut self) -> Result<i32> {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        setup_signal_handlers(shutdown_tx);

        let reason = tokio::select! {
            reason = shutdown_rx => reason.unwrap_or(ShutdownReason::UserRequest),
            _ = self.wait_all_finished() => ShutdownReason::AllUnitsFinished,
        };

        info!("Shutdown initiated: {:?}", reason);
        self.shutdown().await
    }
}

/// Forward the first SIGTERM or SIGINT to `shutdown_sender`
pub fn setup_signal_handlers(shutdown_sender: oneshot::Sender<ShutdownReason>) {
    let shutdown_sender = Arc::new(Mutex::new(Some(shutdown_sender)));

    // Handle SIGTERM (supervisor stop, worker stop) - Unix only
    #[cfg(unix)]
    {
        let shutdown_sender_sigterm = Arc::clone(&shutdown_sender);
        tokio::spawn(async move {
            let mut sigterm =
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(signal) => signal,
                    Err(e) => {
                        warn!("Failed to register SIGTERM handler: {}", e);
                        return;
                    }
                };

            if sigterm.recv().await.is_some() {
                info!("Received SIGTERM signal");
                if let Some(sender) = shutdown_sender_sigterm.lock().await.take() {
                    let _ = sender.send(ShutdownReason::Signal("SIGTERM".to_string()));
                }
            }
        });
    }

    // Handle SIGINT (Ctrl+C) - Cross-platform
    let shutdown_sender_sigint = Arc::clone(&shutdown_sender);
    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            info!("Received SIGINT signal (Ctrl+C)");
            if let Some(sender) = shutdown_sender_sigint.lock().await.take() {
                let _ = sender.send(ShutdownReason::Signal("SIGINT".to_string()));
            }
        }
    });
}

/// Token cancelled on the first SIGTERM or SIGINT
pub fn signal_token() -> CancellationToken {
    let token = CancellationToken::new();
    let (tx, rx) = oneshot::channel();
    setup_signal_handlers(tx);

    let cancel = token.clone();
    tokio::spawn(async move {
        if let Ok(reason) = rx.await {
            info!("Stopping on {:?}", reason);
            cancel.cancel();
        }
    });
    token
}
