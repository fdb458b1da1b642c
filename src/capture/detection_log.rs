use crate::clock::Clock;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Path of the per-source detection log
pub fn detection_log_path<P: AsRef<Path>>(log_dir: P, source_id: &str) -> PathBuf {
    log_dir.as_ref().join(format!("detections_{}.log", source_id))
}

/// Append-only log with one line per frame that had detections
pub struct DetectionLog {
    path: PathBuf,
    file: File,
    clock: Clock,
    lines: u64,
}

impl DetectionLog {
    pub async fn open<P: AsRef<Path>>(log_dir: P, source_id: &str, clock: Clock) -> std::io::Result<Self> {
        fs::create_dir_all(log_dir.as_ref()).await?;
        let path = detection_log_path(log_dir, source_id);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        debug!("Detection log at {}", path.display());
        Ok(Self {
            path,
            file,
            clock,
            lines: 0,
        })
    }

    /// Append `[YYYY-MM-DD HH:MM:SS] Detections: <count>`; no-op for zero detections
    pub async fn record(&mut self, at: SystemTime, count: usize) -> std::io::Result<()> {
        if count == 0 {
            return Ok(());
        }

        let line = format!("[{}] Detections: {}\n", self.clock.log_stamp(at), count);
        self.file.write_all(line.as_bytes()).await?;
        self.lines += 1;
        Ok(())
    }

    pub async fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush().await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lines_written(&self) -> u64 {
        self.lines
    }
}
