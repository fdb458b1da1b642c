use super::*;
use crate::capture::SyntheticSource;
use crate::config::CameraSourceConfig;
use crate::error::{PosewatchError, Result};
use crate::perception::NullDetector;
use crate::pipeline::{PipelineFactory, SourcePipeline, SourcePipelineBuilder};
use crate::telemetry::MemorySink;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Builds synthetic pipelines; ids select the behaviour
struct TestFactory;

#[async_trait]
impl PipelineFactory for TestFactory {
    async fn create(&self, camera: &CameraSourceConfig) -> Result<SourcePipeline> {
        let source = match camera.id.as_str() {
            "CAM_FAIL" => {
                return Err(PosewatchError::component(&camera.id, "source refused to open"))
            }
            "CAM_PANIC" => panic!("detector crashed"),
            "CAM_SHORT" => SyntheticSource::new(2, 2, Some(10), 4, false),
            _ => SyntheticSource::new(2, 2, Some(10), 5, true),
        };

        SourcePipelineBuilder::new()
            .source_id(camera.id.clone())
            .source(Box::new(source.paced(Duration::from_millis(10))))
            .detector(Box::new(NullDetector))
            .telemetry_sink(Arc::new(MemorySink::new()))
            .frame_timeout(Duration::from_millis(100))
            .build()
    }
}

fn thread_supervisor() -> Supervisor {
    Supervisor::new(Arc::new(ThreadLauncher::new(Arc::new(TestFactory))))
}

async fn wait_for_state(supervisor: &Supervisor, id: &str, state: UnitState) {
    for _ in 0..500 {
        if supervisor.unit_state(id).await == Some(state) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "unit {} never reached {:?} (now {:?})",
        id,
        state,
        supervisor.unit_state(id).await
    );
}

fn existing_video(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("entrance.mp4");
    std::fs::write(&path, b"not really a video").unwrap();
    path
}

#[tokio::test]
async fn test_missing_file_source_is_skipped() {
    let dir = TempDir::new().unwrap();
    let cameras = vec![
        CameraSourceConfig::device("CAM_01", 0),
        CameraSourceConfig::file("CAM_02", dir.path().join("missing.mp4")),
        CameraSourceConfig::file("CAM_03", existing_video(&dir)),
    ];

    let mut supervisor = thread_supervisor();
    let launched = supervisor.launch(&cameras).await.unwrap();

    assert_eq!(launched, 2);
    let states = supervisor.unit_states().await;
    assert_eq!(states.len(), 2);
    assert!(!states.contains_key("CAM_02"));
    assert_eq!(supervisor.running_units(), 2);

    let code = supervisor.shutdown().await.unwrap();
    assert_eq!(code, 0);
    assert_eq!(supervisor.unit_state("CAM_01").await, Some(UnitState::Stopped));
    assert_eq!(supervisor.unit_state("CAM_03").await, Some(UnitState::Stopped));
    assert_eq!(supervisor.running_units(), 0);
}

#[tokio::test]
async fn test_failing_unit_does_not_affect_others() {
    let cameras = vec![
        CameraSourceConfig::device("CAM_OK", 0),
        CameraSourceConfig::device("CAM_FAIL", 1),
    ];

    let mut supervisor = thread_supervisor();
    assert_eq!(supervisor.launch(&cameras).await.unwrap(), 2);

    wait_for_state(&supervisor, "CAM_FAIL", UnitState::Failed).await;
    assert_eq!(supervisor.unit_state("CAM_OK").await, Some(UnitState::Running));

    let code = supervisor.shutdown().await.unwrap();
    assert_eq!(code, 1);
    assert_eq!(supervisor.unit_state("CAM_OK").await, Some(UnitState::Stopped));
}

#[tokio::test]
async fn test_panicking_unit_is_contained() {
    let cameras = vec![
        CameraSourceConfig::device("CAM_PANIC", 0),
        CameraSourceConfig::device("CAM_OK", 1),
    ];

    let mut supervisor = thread_supervisor();
    supervisor.launch(&cameras).await.unwrap();

    wait_for_state(&supervisor, "CAM_PANIC", UnitState::Failed).await;
    assert_eq!(supervisor.unit_state("CAM_OK").await, Some(UnitState::Running));

    assert_eq!(supervisor.shutdown().await.unwrap(), 1);
}

#[tokio::test]
async fn test_wait_all_finished_after_live_sources_end() {
    let cameras = vec![
        CameraSourceConfig::device("CAM_SHORT", 0),
        CameraSourceConfig::device("CAM_FAIL", 1),
    ];

    let mut supervisor = thread_supervisor();
    supervisor.launch(&cameras).await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), supervisor.wait_all_finished())
        .await
        .expect("units should finish on their own");

    let states = supervisor.unit_states().await;
    assert!(states.values().all(|state| state.is_terminal()));
    assert_eq!(states["CAM_SHORT"], UnitState::Stopped);
    assert_eq!(supervisor.shutdown().await.unwrap(), 1);
}

#[tokio::test]
async fn test_nothing_launched_finishes_immediately() {
    let mut supervisor = thread_supervisor();
    assert_eq!(supervisor.launch(&[]).await.unwrap(), 0);

    tokio::time::timeout(Duration::from_millis(100), supervisor.wait_all_finished())
        .await
        .unwrap();
    assert_eq!(supervisor.shutdown().await.unwrap(), 0);
}

#[tokio::test]
async fn test_launch_failure_marks_unit_failed() {
    let launcher = ProcessLauncher::new(PathBuf::from("/nonexistent/posewatch"), Vec::new());
    let mut supervisor = Supervisor::new(Arc::new(launcher));

    let launched = supervisor
        .launch(&[CameraSourceConfig::device("CAM_01", 0)])
        .await
        .unwrap();

    assert_eq!(launched, 0);
    assert_eq!(supervisor.unit_state("CAM_01").await, Some(UnitState::Failed));
    assert_eq!(supervisor.shutdown().await.unwrap(), 1);
}

#[cfg(unix)]
#[tokio::test]
async fn test_process_unit_stops_on_sigterm() {
    // The worker flag and id arrive as positional parameters and are ignored
    let launcher = ProcessLauncher::new(
        PathBuf::from("sh"),
        vec![
            "-c".to_string(),
            "trap 'exit 0' TERM; while true; do sleep 0.05; done".to_string(),
            "worker".to_string(),
        ],
    );
    let mut supervisor = Supervisor::new(Arc::new(launcher));
    supervisor
        .launch(&[CameraSourceConfig::device("CAM_01", 0)])
        .await
        .unwrap();

    // Give the shell time to install its trap
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(supervisor.unit_state("CAM_01").await, Some(UnitState::Running));

    let code = tokio::time::timeout(Duration::from_secs(5), supervisor.shutdown())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(code, 0);
    assert_eq!(supervisor.unit_state("CAM_01").await, Some(UnitState::Stopped));
}

#[cfg(unix)]
#[tokio::test]
async fn test_process_unit_nonzero_exit_is_failure() {
    let launcher = ProcessLauncher::new(
        PathBuf::from("sh"),
        vec!["-c".to_string(), "exit 3".to_string(), "worker".to_string()],
    );
    let mut supervisor = Supervisor::new(Arc::new(launcher));
    supervisor
        .launch(&[CameraSourceConfig::device("CAM_01", 0)])
        .await
        .unwrap();

    wait_for_state(&supervisor, "CAM_01", UnitState::Failed).await;
    assert_eq!(supervisor.shutdown().await.unwrap(), 1);
}
