use super::{Detection, Detector};
use crate::config::DetectorConfig;
use crate::error::DetectionError;
use crate::frame::Frame;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

/// Header line written ahead of every frame's raw pixels
#[derive(Debug, Serialize)]
struct FrameHeader<'a> {
    frame: u64,
    width: u32,
    height: u32,
    format: &'a str,
    bytes: usize,
}

/// One reply line from the detector process
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Reply {
    Detections { detections: Vec<Detection> },
    Error { error: String },
}

/// Detector backed by a long-running child process.
///
/// Per frame, one JSON header line and the RGB24 payload go to the child's
/// stdin and one JSON reply line is read back from its stdout.
pub struct CommandDetector {
    name: String,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    response_timeout: Duration,
    line: String,
}

impl CommandDetector {
    pub async fn spawn(config: &DetectorConfig, source_id: &str) -> Result<Self, DetectionError> {
        info!(
            "Starting detector '{}' for source {}",
            config.command, source_id
        );

        let mut child = Command::new(&config.command)
            .args(&config.args)
            .env("POSEWATCH_SOURCE_ID", source_id)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DetectionError::Spawn {
                details: format!("{}: {}", config.command, e),
            })?;

        let stdin = child.stdin.take().ok_or_else(|| DetectionError::Spawn {
            details: "detector stdin not captured".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| DetectionError::Spawn {
            details: "detector stdout not captured".to_string(),
        })?;

        Ok(Self {
            name: format!("command:{}", config.command),
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
            response_timeout: Duration::from_millis(config.response_timeout_ms),
            line: String::new(),
        })
    }

    async fn send_frame(&mut self, frame: &Frame) -> Result<(), DetectionError> {
        let stdin = self.stdin.as_mut().ok_or(DetectionError::Closed)?;

        let header = FrameHeader {
            frame: frame.index,
            width: frame.width,
            height: frame.height,
            format: "rgb24",
            bytes: frame.data.len(),
        };
        let mut line = serde_json::to_vec(&header).map_err(|e| DetectionError::Protocol {
            details: e.to_string(),
        })?;
        line.push(b'\n');

        let io_err = |e: std::io::Error| DetectionError::Io {
            details: e.to_string(),
        };
        stdin.write_all(&line).await.map_err(io_err)?;
        stdin.write_all(&frame.data).await.map_err(io_err)?;
        stdin.flush().await.map_err(io_err)?;
        Ok(())
    }

    async fn read_reply(&mut self) -> Result<Vec<Detection>, DetectionError> {
        self.line.clear();
        let read = tokio::time::timeout(self.response_timeout, self.stdout.read_line(&mut self.line))
            .await
            .map_err(|_| DetectionError::Timeout {
                timeout_ms: self.response_timeout.as_millis() as u64,
            })?
            .map_err(|e| DetectionError::Io {
                details: e.to_string(),
            })?;

        if read == 0 {
            return Err(DetectionError::Closed);
        }

        parse_reply(self.line.trim_end())
    }
}

fn parse_reply(line: &str) -> Result<Vec<Detection>, DetectionError> {
    match serde_json::from_str::<Reply>(line) {
        Ok(Reply::Detections { detections }) => Ok(detections),
        Ok(Reply::Error { error }) => Err(DetectionError::Remote { message: error }),
        Err(e) => Err(DetectionError::Protocol {
            details: format!("{} in {:?}", e, line),
        }),
    }
}

#[async_trait]
impl Detector for CommandDetector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectionError> {
        self.send_frame(frame).await?;
        let detections = self.read_reply().await?;
        debug!(
            "Detector returned {} detection(s) for frame {}",
            detections.len(),
            frame.index
        );
        Ok(detections)
    }

    async fn shutdown(&mut self) {
        // Closing stdin is the detector's cue to exit
        drop(self.stdin.take());

        match tokio::time::timeout(Duration::from_secs(2), self.child.wait()).await {
            Ok(Ok(status)) => debug!("Detector exited with {}", status),
            Ok(Err(e)) => warn!("Failed to reap detector: {}", e),
            Err(_) => {
                warn!("Detector did not exit after stdin closed, killing it");
                if let Err(e) = self.child.kill().await {
                    warn!("Failed to kill detector: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectorBackend;
    use std::time::SystemTime;

    fn shell_detector(script: &str) -> DetectorConfig {
        DetectorConfig {
            backend: DetectorBackend::Command,
            command: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            response_timeout_ms: 2000,
        }
    }

    fn empty_frame(index: u64) -> Frame {
        Frame::new(index, SystemTime::now(), Vec::new(), 0, 0)
    }

    #[test]
    fn test_parse_reply_variants() {
        let detections =
            parse_reply(r#"{"detections":[{"track_id":1,"bbox":[0,0,10,10]}]}"#).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].track_id, Some(1));

        assert!(parse_reply(r#"{"detections":[]}"#).unwrap().is_empty());

        match parse_reply(r#"{"error":"model not loaded"}"#) {
            Err(DetectionError::Remote { message }) => assert_eq!(message, "model not loaded"),
            other => panic!("unexpected reply: {:?}", other),
        }

        assert!(matches!(
            parse_reply("not json"),
            Err(DetectionError::Protocol { .. })
        ));
    }

    #[tokio::test]
    async fn test_detector_round_trip() {
        let config = shell_detector(
            r#"while read header; do echo '{"detections":[{"track_id":7,"bbox":[1,2,3,4],"keypoints":[[5,6]],"confidences":[0.9]}]}'; done"#,
        );
        let mut detector = CommandDetector::spawn(&config, "CAM_TEST").await.unwrap();

        for index in 0..3 {
            let detections = detector.detect(&empty_frame(index)).await.unwrap();
            assert_eq!(detections.len(), 1);
            assert_eq!(detections[0].track_id, Some(7));
            assert_eq!(detections[0].keypoints, vec![(5.0, 6.0)]);
        }

        detector.shutdown().await;
    }

    #[tokio::test]
    async fn test_detector_exit_is_an_error() {
        let config = shell_detector("exit 0");
        let mut detector = CommandDetector::spawn(&config, "CAM_TEST").await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(detector.detect(&empty_frame(0)).await.is_err());
    }

    #[tokio::test]
    async fn test_detector_timeout() {
        let mut config = shell_detector("sleep 5");
        config.response_timeout_ms = 100;
        let mut detector = CommandDetector::spawn(&config, "CAM_TEST").await.unwrap();

        assert!(matches!(
            detector.detect(&empty_frame(0)).await,
            Err(DetectionError::Timeout { timeout_ms: 100 })
        ));
    }

    #[tokio::test]
    async fn test_missing_executable() {
        let config = DetectorConfig {
            backend: DetectorBackend::Command,
            command: "/nonexistent/posewatch-detector".to_string(),
            args: Vec::new(),
            response_timeout_ms: 1000,
        };

        assert!(matches!(
            CommandDetector::spawn(&config, "CAM_TEST").await,
            Err(DetectionError::Spawn { .. })
        ));
    }
}
