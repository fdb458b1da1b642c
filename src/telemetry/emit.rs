use super::types::TelemetryBatch;
use crate::config::{TelemetryConfig, TelemetrySinkKind};
use crate::error::TelemetryError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Destination for serialized telemetry documents
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    fn name(&self) -> &str;

    async fn emit(&self, name: &str, document: &[u8]) -> Result<(), TelemetryError>;
}

/// Writes each document as a file under one directory per source
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }
}

#[async_trait]
impl TelemetrySink for DirectorySink {
    fn name(&self) -> &str {
        "directory"
    }

    async fn emit(&self, name: &str, document: &[u8]) -> Result<(), TelemetryError> {
        let write_err = |e: std::io::Error| TelemetryError::Write {
            name: name.to_string(),
            details: e.to_string(),
        };

        fs::create_dir_all(&self.dir).await.map_err(write_err)?;
        let path = self.dir.join(name);
        fs::write(&path, document).await.map_err(write_err)?;

        debug!("Wrote telemetry to {}", path.display());
        Ok(())
    }
}

/// Simulated upload: only reports name and size
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl TelemetrySink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn emit(&self, name: &str, document: &[u8]) -> Result<(), TelemetryError> {
        info!(
            "Uploaded telemetry {} ({:.2} KB)",
            name,
            document.len() as f64 / 1024.0
        );
        Ok(())
    }
}

/// Keeps emitted documents in memory, for embedding and tests
#[derive(Debug, Default)]
pub struct MemorySink {
    documents: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn documents(&self) -> Vec<(String, Vec<u8>)> {
        self.documents.lock().clone()
    }
}

#[async_trait]
impl TelemetrySink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn emit(&self, name: &str, document: &[u8]) -> Result<(), TelemetryError> {
        self.documents
            .lock()
            .push((name.to_string(), document.to_vec()));
        Ok(())
    }
}

/// Build the configured sink for one source
pub fn build_sink(config: &TelemetryConfig, source_id: &str) -> Arc<dyn TelemetrySink> {
    match config.sink {
        TelemetrySinkKind::Directory => {
            Arc::new(DirectorySink::new(PathBuf::from(&config.path).join(source_id)))
        }
        TelemetrySinkKind::Log => Arc::new(LogSink),
    }
}

/// Outcome counters of one emission worker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmissionStats {
    pub emitted: u64,
    pub failed: u64,
}

/// Emit batches until every sender is dropped.
///
/// Failures are logged and the batch discarded; nothing is retried.
pub async fn emission_worker(
    mut queue_rx: mpsc::UnboundedReceiver<TelemetryBatch>,
    sink: Arc<dyn TelemetrySink>,
) -> EmissionStats {
    debug!("Telemetry emission worker started ({} sink)", sink.name());
    let mut stats = EmissionStats::default();

    while let Some(batch) = queue_rx.recv().await {
        match emit_batch(&batch, sink.as_ref()).await {
            Ok(size) => {
                stats.emitted += 1;
                info!(
                    "Telemetry {} emitted ({} frames, {} bytes)",
                    batch.name,
                    batch.frames.len(),
                    size
                );
            }
            Err(e) => {
                stats.failed += 1;
                error!("Failed to emit telemetry {}: {}", batch.name, e);
            }
        }
    }

    debug!(
        "Telemetry emission worker stopped ({} emitted, {} failed)",
        stats.emitted, stats.failed
    );
    stats
}

async fn emit_batch(batch: &TelemetryBatch, sink: &dyn TelemetrySink) -> Result<usize, TelemetryError> {
    let document = batch.to_document()?;
    sink.emit(&batch.name, &document).await?;
    Ok(document.len())
}
