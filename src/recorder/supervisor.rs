//! Recording supervisor
//!
//! Owns the camera selection, starts one worker per selected camera and
//! stops them all together. The supervisor never touches frames: it only
//! signals workers, observes their state and drains their preview channels.

use super::clock::{Clock, SystemClock};
use super::preview::{PreviewChannel, PreviewFrame};
use super::state::{
    CameraStatus, RecordingSettings, SessionSummary, StartReport, StartedCamera, WorkerOutcome,
    WorkerReport, WorkerState,
};
use super::worker::{RecordingWorker, StartupResult, WorkerConfig, WorkerMonitor, WorkerResources};
use crate::capture::{self, CameraBackend, CameraHandle, FfmpegCameraBackend};
use crate::config::{AppConfig, CaptureBackendKind, PreviewSettings};
use crate::encoder::{FfmpegSegmentWriterFactory, SegmentWriterFactory};
use crate::utils::error::{CameraFailure, FailureKind, RecorderError, RecorderResult};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Supervisor-wide knobs that are not part of a session's settings
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    pub preview: PreviewSettings,
    pub settle_delay: Duration,
    pub fallback_fps: u32,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            preview: PreviewSettings::default(),
            settle_delay: Duration::from_secs(1),
            fallback_fps: 30,
        }
    }
}

impl From<&AppConfig> for SupervisorOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            preview: config.preview.clone(),
            settle_delay: config.settle_delay,
            fallback_fps: config.encoder.fallback_fps,
        }
    }
}

/// Supervisor's handle on one worker
struct WorkerSlot {
    camera: CameraHandle,
    preview: PreviewChannel,
    stop: Arc<AtomicBool>,
    monitor: Arc<WorkerMonitor>,
    thread: Option<JoinHandle<WorkerReport>>,
    startup: StartupResult,
}

impl WorkerSlot {
    fn status(&self) -> CameraStatus {
        if let Err(failure) = &self.startup {
            return CameraStatus::Failed(failure.kind);
        }
        if let Some(failure) = self.monitor.failure() {
            return CameraStatus::Failed(failure.kind);
        }
        // A session only exists once every worker has acknowledged startup
        match self.monitor.state() {
            WorkerState::Starting | WorkerState::Recording => CameraStatus::Recording,
            WorkerState::Stopping | WorkerState::Stopped => CameraStatus::Stopped,
        }
    }

    /// Block until the worker thread ends and collect its report
    fn join(mut self) -> WorkerReport {
        let camera = self.camera;
        match self.thread.take() {
            Some(handle) => handle.join().unwrap_or_else(|_| {
                tracing::error!("[{}] Worker thread panicked", camera);
                let mut report = WorkerReport::new(camera);
                report.outcome = WorkerOutcome::Failed(CameraFailure {
                    camera,
                    kind: FailureKind::Crashed,
                    message: "worker thread panicked".to_string(),
                });
                report
            }),
            None => {
                let mut report = WorkerReport::new(camera);
                if let Err(failure) = self.startup {
                    report.outcome = WorkerOutcome::Failed(failure);
                }
                report
            }
        }
    }
}

/// A running recording session
pub struct Session {
    id: Uuid,
    started_at: DateTime<Utc>,
    settings: RecordingSettings,
    slots: Vec<WorkerSlot>,
}

impl Session {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Settings snapshot taken at start
    pub fn settings(&self) -> &RecordingSettings {
        &self.settings
    }

    /// Every selected camera, including those that failed to start
    pub fn cameras(&self) -> Vec<CameraHandle> {
        self.slots.iter().map(|slot| slot.camera).collect()
    }
}

/// Starts, observes and stops per-camera recording workers
pub struct RecordingSupervisor {
    resources: WorkerResources,
    options: SupervisorOptions,
    session: Option<Session>,
}

impl RecordingSupervisor {
    pub fn new(resources: WorkerResources, options: SupervisorOptions) -> Self {
        Self {
            resources,
            options,
            session: None,
        }
    }

    /// Build a supervisor with the backends named in the configuration
    pub fn from_config(config: &AppConfig) -> RecorderResult<Self> {
        let cameras: Arc<dyn CameraBackend> = match config.backend {
            CaptureBackendKind::Ffmpeg => Arc::new(FfmpegCameraBackend::new(
                config.ffmpeg_path.clone(),
                config.ffprobe_path.clone(),
            )),
            #[cfg(feature = "native-camera")]
            CaptureBackendKind::Native => Arc::new(capture::NokhwaCameraBackend::new()),
            #[cfg(not(feature = "native-camera"))]
            CaptureBackendKind::Native => {
                return Err(RecorderError::Configuration(
                    "native capture requires the native-camera feature".to_string(),
                ))
            }
        };
        let writers: Arc<dyn SegmentWriterFactory> = Arc::new(FfmpegSegmentWriterFactory::new(
            config.ffmpeg_path.clone(),
            config.encoder.clone(),
        ));
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        tracing::info!("Using {} capture backend", cameras.name());
        Ok(Self::new(
            WorkerResources {
                cameras,
                writers,
                clock,
            },
            SupervisorOptions::from(config),
        ))
    }

    pub fn camera_backend(&self) -> Arc<dyn CameraBackend> {
        self.resources.cameras.clone()
    }

    /// Probe device indices below `max_probe`. Blocks while probing.
    pub fn discover_cameras(&self, max_probe: u32) -> Vec<CameraHandle> {
        capture::discover_cameras(self.resources.cameras.as_ref(), max_probe)
    }

    pub fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Start one worker per selected camera and wait for each to finish starting.
    ///
    /// Cameras that fail to start are reported in the returned [`StartReport`]
    /// while the rest keep recording. Only when every camera fails does start
    /// return [`RecorderError::SessionDegraded`] and leave no session behind.
    pub async fn start(
        &mut self,
        selected: &[CameraHandle],
        settings: &RecordingSettings,
    ) -> RecorderResult<StartReport> {
        if self.session.is_some() {
            return Err(RecorderError::AlreadyRecording);
        }

        let cameras: BTreeSet<CameraHandle> = selected.iter().copied().collect();
        if cameras.is_empty() {
            return Err(RecorderError::NoCameraSelected);
        }
        settings.validate()?;

        // Workers get their own copy; later edits by the caller never reach them
        let snapshot = settings.clone();
        tracing::info!(
            "Starting recording of {} camera(s) to {}",
            cameras.len(),
            snapshot.output_directory.display()
        );

        let mut pending = Vec::with_capacity(cameras.len());
        for camera in cameras {
            let preview = PreviewChannel::new(self.options.preview.capacity);
            let config = WorkerConfig {
                settings: snapshot.clone(),
                preview: self.options.preview.clone(),
                settle_delay: self.options.settle_delay,
                fallback_fps: self.options.fallback_fps,
            };
            let worker =
                RecordingWorker::new(camera, config, self.resources.clone(), preview.clone());
            let stop = worker.stop_signal();
            let monitor = worker.monitor();

            let (ready_tx, ready_rx) = oneshot::channel();
            let thread = match worker.spawn(ready_tx) {
                Ok(handle) => Some(handle),
                Err(e) => {
                    tracing::error!("[{}] Failed to spawn worker thread: {}", camera, e);
                    None
                }
            };
            pending.push((camera, preview, stop, monitor, thread, ready_rx));
        }

        let mut slots = Vec::with_capacity(pending.len());
        for (camera, preview, stop, monitor, thread, ready_rx) in pending {
            // A dropped sender means the worker died before acknowledging
            let startup = ready_rx.await.unwrap_or_else(|_| {
                Err(CameraFailure {
                    camera,
                    kind: FailureKind::Crashed,
                    message: "worker exited before reporting startup".to_string(),
                })
            });
            slots.push(WorkerSlot {
                camera,
                preview,
                stop,
                monitor,
                thread,
                startup,
            });
        }

        let started: Vec<StartedCamera> = slots
            .iter()
            .filter_map(|slot| slot.startup.as_ref().ok().cloned())
            .collect();
        let failed: Vec<CameraFailure> = slots
            .iter()
            .filter_map(|slot| slot.startup.as_ref().err().cloned())
            .collect();

        if started.is_empty() {
            tracing::error!("All {} selected camera(s) failed to start", failed.len());
            join_slots(slots).await?;
            return Err(RecorderError::SessionDegraded { failures: failed });
        }
        for failure in &failed {
            tracing::warn!("{} not recording: {}", failure.camera, failure.message);
        }

        let session = Session {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            settings: snapshot,
            slots,
        };
        tracing::info!(
            "Session {} recording {} camera(s)",
            session.id,
            started.len()
        );

        let report = StartReport {
            session_id: session.id,
            started,
            failed,
        };
        self.session = Some(session);
        Ok(report)
    }

    /// Signal every worker, wait for all of them to seal their segments and
    /// release their cameras, then drop the preview channels.
    pub async fn stop(&mut self) -> RecorderResult<SessionSummary> {
        let session = self.session.take().ok_or(RecorderError::NotRecording)?;
        tracing::info!("Stopping session {}", session.id);

        for slot in &session.slots {
            slot.stop.store(true, Ordering::SeqCst);
        }

        let Session {
            id,
            started_at,
            slots,
            ..
        } = session;
        let reports = join_slots(slots).await?;

        let summary = SessionSummary {
            session_id: id,
            started_at,
            stopped_at: Utc::now(),
            reports,
        };
        tracing::info!(
            "Session {} stopped: {} segment(s) across {} camera(s)",
            id,
            summary.total_segments(),
            summary.reports.len()
        );
        Ok(summary)
    }

    /// Take the freshest preview of every selected camera without waiting.
    ///
    /// Cameras with nothing new map to `None`. Empty when not recording.
    pub fn drain_preview(&self) -> BTreeMap<CameraHandle, Option<PreviewFrame>> {
        self.session
            .iter()
            .flat_map(|session| &session.slots)
            .map(|slot| (slot.camera, slot.preview.take_latest()))
            .collect()
    }

    /// Status of every selected camera in the running session
    pub fn statuses(&self) -> BTreeMap<CameraHandle, CameraStatus> {
        self.session
            .iter()
            .flat_map(|session| &session.slots)
            .map(|slot| (slot.camera, slot.status()))
            .collect()
    }
}

impl Drop for RecordingSupervisor {
    /// Workers never outlive their supervisor: signal them and wait until
    /// every segment is sealed and every camera released.
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            tracing::warn!(
                "Supervisor dropped while session {} was recording, stopping workers",
                session.id
            );
            for slot in &session.slots {
                slot.stop.store(true, Ordering::SeqCst);
            }
            for slot in session.slots {
                slot.join();
            }
        }
    }
}

/// Join worker threads off the async runtime
async fn join_slots(slots: Vec<WorkerSlot>) -> RecorderResult<Vec<WorkerReport>> {
    tokio::task::spawn_blocking(move || slots.into_iter().map(WorkerSlot::join).collect())
        .await
        .map_err(|e| RecorderError::Join(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::mock::MockCameraBackend;
    use crate::encoder::mock::MemoryWriterFactory;
    use crate::recorder::clock::ManualClock;
    use std::path::PathBuf;
    use std::time::Instant;
    use tempfile::TempDir;

    struct Fixture {
        backend: MockCameraBackend,
        writers: MemoryWriterFactory,
        clock: Arc<ManualClock>,
        dir: TempDir,
        supervisor: RecordingSupervisor,
    }

    impl Fixture {
        fn new(backend: MockCameraBackend) -> Self {
            Self::with_writers(backend, MemoryWriterFactory::new())
        }

        fn with_writers(backend: MockCameraBackend, writers: MemoryWriterFactory) -> Self {
            let clock = Arc::new(ManualClock::new());
            let resources = WorkerResources {
                cameras: Arc::new(backend.clone()),
                writers: Arc::new(writers.clone()),
                clock: clock.clone(),
            };
            let options = SupervisorOptions {
                preview: PreviewSettings {
                    min_interval: Duration::ZERO,
                    ..PreviewSettings::default()
                },
                ..SupervisorOptions::default()
            };
            Self {
                backend,
                writers,
                clock,
                dir: TempDir::new().unwrap(),
                supervisor: RecordingSupervisor::new(resources, options),
            }
        }

        fn output(&self) -> PathBuf {
            self.dir.path().join("out")
        }

        fn settings(&self, segment_secs: u64) -> RecordingSettings {
            RecordingSettings {
                target_fps: 0,
                target_width: 640,
                target_height: 480,
                output_directory: self.output(),
                segment_duration: Duration::from_secs(segment_secs),
            }
        }

        /// Advance time and let every listed camera run a few more iterations
        fn advance(&self, by: Duration, cameras: &[CameraHandle]) {
            let seen: Vec<u64> = cameras.iter().map(|c| self.backend.reads(*c)).collect();
            self.clock.advance(by);
            for (camera, reads) in cameras.iter().zip(seen) {
                self.backend.wait_for_reads(*camera, reads + 3);
            }
        }
    }

    fn cam(index: u32) -> CameraHandle {
        CameraHandle::new(index)
    }

    #[tokio::test]
    async fn test_start_without_cameras_fails_cleanly() {
        let mut f = Fixture::new(MockCameraBackend::new().with_cameras([0]));
        let settings = f.settings(60);

        let result = f.supervisor.start(&[], &settings).await;
        assert!(matches!(result, Err(RecorderError::NoCameraSelected)));
        assert!(!f.supervisor.is_recording());
        assert!(f.backend.open_requests().is_empty());
        assert!(!f.output().exists());
    }

    #[tokio::test]
    async fn test_invalid_settings_rejected_before_spawning() {
        let mut f = Fixture::new(MockCameraBackend::new().with_cameras([0]));
        let mut settings = f.settings(60);
        settings.segment_duration = Duration::ZERO;

        let result = f.supervisor.start(&[cam(0)], &settings).await;
        assert!(matches!(result, Err(RecorderError::InvalidSettings(_))));
        assert!(f.backend.open_requests().is_empty());
    }

    #[tokio::test]
    async fn test_two_cameras_rotate_independently() {
        let mut f = Fixture::new(MockCameraBackend::new().with_cameras([0, 2]));
        let cameras = [cam(0), cam(2)];
        let settings = f.settings(60);

        let report = f.supervisor.start(&cameras, &settings).await.unwrap();
        assert_eq!(report.started.len(), 2);
        assert!(!report.is_partial());
        for camera in cameras {
            f.backend.wait_for_reads(camera, 3);
        }

        // Two and a half segment lengths
        f.advance(Duration::from_secs(60), &cameras);
        f.advance(Duration::from_secs(60), &cameras);
        f.advance(Duration::from_secs(30), &cameras);

        let summary = f.supervisor.stop().await.unwrap();
        assert!(!f.supervisor.is_recording());
        assert_eq!(summary.session_id, report.session_id);
        assert_eq!(summary.total_segments(), 6);

        for camera in cameras {
            let report = summary.report(camera).unwrap();
            assert_eq!(report.outcome, WorkerOutcome::Completed);
            let sequences: Vec<u64> = report.segments.iter().map(|s| s.sequence).collect();
            assert_eq!(sequences, vec![0, 1, 2]);
            for segment in &report.segments[..2] {
                assert!(segment.duration >= settings.segment_duration);
            }

            let label = camera.label();
            let written = f.writers.segments_for(&label);
            assert_eq!(written.len(), 3);
            assert!(written.iter().all(|s| s.finalized));
            assert_eq!(f.writers.max_open(&label), 1);
            assert_eq!(f.backend.close_count(camera), 1);
        }
    }

    #[tokio::test]
    async fn test_partial_start_keeps_healthy_cameras_recording() {
        let mut f = Fixture::new(MockCameraBackend::new().with_cameras([0, 1]).failing_open(1));
        let settings = f.settings(60);

        let report = f.supervisor.start(&[cam(0), cam(1)], &settings).await.unwrap();
        assert!(report.is_partial());
        assert_eq!(report.started.len(), 1);
        assert_eq!(report.started[0].camera, cam(0));
        assert_eq!(report.failed[0].camera, cam(1));
        assert_eq!(report.failed[0].kind, FailureKind::CannotOpen);

        let statuses = f.supervisor.statuses();
        assert_eq!(statuses[&cam(0)], CameraStatus::Recording);
        assert_eq!(statuses[&cam(1)], CameraStatus::Failed(FailureKind::CannotOpen));

        f.backend.wait_for_reads(cam(0), 5);
        let summary = f.supervisor.stop().await.unwrap();

        assert_eq!(summary.reports.len(), 2);
        assert!(summary.report(cam(1)).unwrap().segments.is_empty());
        assert!(matches!(
            summary.report(cam(1)).unwrap().outcome,
            WorkerOutcome::Failed(ref failure) if failure.kind == FailureKind::CannotOpen
        ));

        assert!(f.writers.segments_for("camera_1").is_empty());
        let written = f.writers.segments_for("camera_0");
        assert!(!written.is_empty());
        assert!(written.iter().all(|s| s.finalized));
    }

    #[tokio::test]
    async fn test_all_cameras_failing_leaves_no_session() {
        let mut f = Fixture::new(MockCameraBackend::new().with_cameras([0]));
        let settings = f.settings(60);

        let result = f.supervisor.start(&[cam(5), cam(6)], &settings).await;
        match result {
            Err(RecorderError::SessionDegraded { failures }) => {
                assert_eq!(failures.len(), 2);
                assert!(failures.iter().all(|failure| failure.kind == FailureKind::CannotOpen));
            }
            other => panic!("expected SessionDegraded, got {other:?}"),
        }
        assert!(!f.supervisor.is_recording());

        // A later start with a working camera succeeds
        let report = f.supervisor.start(&[cam(0)], &settings).await.unwrap();
        assert_eq!(report.started.len(), 1);
        f.supervisor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_one_session_at_a_time() {
        let mut f = Fixture::new(MockCameraBackend::new().with_cameras([0]));
        let settings = f.settings(60);

        assert!(matches!(
            f.supervisor.stop().await,
            Err(RecorderError::NotRecording)
        ));

        f.supervisor.start(&[cam(0)], &settings).await.unwrap();
        assert!(matches!(
            f.supervisor.start(&[cam(0)], &settings).await,
            Err(RecorderError::AlreadyRecording)
        ));
        f.supervisor.stop().await.unwrap();
        assert!(f.supervisor.statuses().is_empty());
        assert!(f.supervisor.drain_preview().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_selection_starts_one_worker() {
        let mut f = Fixture::new(MockCameraBackend::new().with_cameras([3]));
        let settings = f.settings(60);

        let report = f
            .supervisor
            .start(&[cam(3), cam(3), cam(3)], &settings)
            .await
            .unwrap();
        assert_eq!(report.started.len(), 1);
        assert_eq!(f.backend.open_requests().len(), 1);
        assert_eq!(f.supervisor.session().unwrap().cameras(), vec![cam(3)]);
        f.supervisor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_drain_preview_returns_latest_per_camera() {
        let mut f = Fixture::new(MockCameraBackend::new().with_cameras([0]));
        let settings = f.settings(60);
        f.supervisor.start(&[cam(0), cam(1)], &settings).await.unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        let frame = loop {
            let drained = f.supervisor.drain_preview();
            assert_eq!(drained.len(), 2);
            assert!(drained[&cam(1)].is_none());
            if let Some(Some(frame)) = drained.get(&cam(0)) {
                break frame.clone();
            }
            assert!(Instant::now() < deadline, "no preview arrived");
            tokio::time::sleep(Duration::from_millis(1)).await;
        };
        assert_eq!(frame.camera, cam(0));
        assert_eq!(&frame.jpeg[..2], &[0xFF, 0xD8]);

        f.supervisor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_read_failure_ends_only_that_camera() {
        let mut f = Fixture::new(
            MockCameraBackend::new()
                .with_cameras([0, 1])
                .failing_read_after(1, 5),
        );
        let settings = f.settings(60);
        f.supervisor.start(&[cam(0), cam(1)], &settings).await.unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        while f.supervisor.statuses()[&cam(1)] != CameraStatus::Failed(FailureKind::ReadFailed) {
            assert!(Instant::now() < deadline, "camera 1 never failed");
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        // Camera 0 keeps going after its sibling died
        let reads = f.backend.reads(cam(0));
        f.backend.wait_for_reads(cam(0), reads + 5);
        assert_eq!(f.supervisor.statuses()[&cam(0)], CameraStatus::Recording);

        let summary = f.supervisor.stop().await.unwrap();
        let failed = summary.report(cam(1)).unwrap();
        assert_eq!(failed.frames_written, 5);
        assert_eq!(failed.segments.len(), 1);
        assert!(failed.segments[0].sealed);
        assert_eq!(summary.report(cam(0)).unwrap().outcome, WorkerOutcome::Completed);
    }

    #[tokio::test]
    async fn test_dropping_supervisor_stops_workers() {
        let mut f = Fixture::new(MockCameraBackend::new().with_cameras([0, 1]));
        let settings = f.settings(60);
        f.supervisor.start(&[cam(0), cam(1)], &settings).await.unwrap();
        f.backend.wait_for_reads(cam(0), 3);
        f.backend.wait_for_reads(cam(1), 3);

        drop(f.supervisor);

        // Both workers are already joined, so nothing reads any more
        let reads = [f.backend.reads(cam(0)), f.backend.reads(cam(1))];
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(reads, [f.backend.reads(cam(0)), f.backend.reads(cam(1))]);

        for camera in [cam(0), cam(1)] {
            let label = camera.label();
            let written = f.writers.segments_for(&label);
            assert_eq!(written.len(), 1);
            assert!(written[0].finalized);
            assert_eq!(f.writers.open_count(&label), 0);
            assert_eq!(f.backend.close_count(camera), 1);
        }
    }

    #[tokio::test]
    async fn test_settings_snapshot_taken_at_start() {
        let mut f = Fixture::new(MockCameraBackend::new().with_cameras([0]));
        let mut settings = f.settings(60);
        f.supervisor.start(&[cam(0)], &settings).await.unwrap();

        let original = settings.output_directory.clone();
        settings.output_directory = f.dir.path().join("elsewhere");
        f.backend.wait_for_reads(cam(0), 3);
        f.advance(Duration::from_secs(60), &[cam(0)]);

        assert_eq!(
            f.supervisor.session().unwrap().settings().output_directory,
            original
        );
        let summary = f.supervisor.stop().await.unwrap();
        let segments = &summary.report(cam(0)).unwrap().segments;
        assert_eq!(segments.len(), 2);
        assert!(segments.iter().all(|s| s.path.starts_with(&original)));
        assert!(!f.dir.path().join("elsewhere").exists());
    }

    #[tokio::test]
    async fn test_segment_create_failure_at_start() {
        let mut f = Fixture::with_writers(
            MockCameraBackend::new().with_cameras([0]),
            MemoryWriterFactory::new().failing_create("camera_0"),
        );
        let settings = f.settings(60);

        let result = f.supervisor.start(&[cam(0)], &settings).await;
        match result {
            Err(RecorderError::SessionDegraded { failures }) => {
                assert_eq!(failures[0].kind, FailureKind::CannotCreate);
            }
            other => panic!("expected SessionDegraded, got {other:?}"),
        }
        assert_eq!(f.backend.close_count(cam(0)), 1);
    }
}
