//! Per-camera recording worker
//!
//! A worker exclusively owns one frame source and one segment writer at a
//! time. It runs on its own thread and talks to the outside world only
//! through its preview channel (outbound), its stop flag (inbound) and the
//! monitor the supervisor reads.

use super::clock::Clock;
use super::preview::{PreviewChannel, PreviewFrame};
use super::segment::{segment_file_name, ActiveSegment, SegmentInfo};
use super::state::{RecordingSettings, StartedCamera, WorkerOutcome, WorkerReport, WorkerState};
use crate::capture::{CameraBackend, CameraHandle, Frame, FrameSource};
use crate::config::PreviewSettings;
use crate::encoder::{PreviewEncoder, SegmentSpec, SegmentWriterFactory};
use crate::utils::error::{CameraFailure, RecorderError, RecorderResult};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

/// Outcome of a worker's Starting phase, reported back to the supervisor
pub type StartupResult = Result<StartedCamera, CameraFailure>;

/// Services a worker uses but does not own
#[derive(Clone)]
pub struct WorkerResources {
    pub cameras: Arc<dyn CameraBackend>,
    pub writers: Arc<dyn SegmentWriterFactory>,
    pub clock: Arc<dyn Clock>,
}

/// The worker's private copy of everything that shapes its recording
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub settings: RecordingSettings,
    pub preview: PreviewSettings,
    pub settle_delay: Duration,
    pub fallback_fps: u32,
}

/// Worker state visible to the supervisor. Only the worker writes it.
#[derive(Debug, Default)]
pub struct WorkerMonitor {
    state: RwLock<WorkerState>,
    failure: RwLock<Option<CameraFailure>>,
}

impl WorkerMonitor {
    pub fn state(&self) -> WorkerState {
        *self.state.read()
    }

    /// The failure that ended the worker, if any
    pub fn failure(&self) -> Option<CameraFailure> {
        self.failure.read().clone()
    }

    fn transition(&self, camera: CameraHandle, next: WorkerState) {
        let mut state = self.state.write();
        debug_assert!(
            state.can_transition_to(next),
            "illegal worker transition {:?} -> {:?}",
            *state,
            next
        );
        tracing::debug!("[{}] {:?} -> {:?}", camera, *state, next);
        *state = next;
    }

    fn record_failure(&self, failure: CameraFailure) {
        *self.failure.write() = Some(failure);
    }
}

/// Drives capture, segment writing, rotation and preview for one camera
pub struct RecordingWorker {
    camera: CameraHandle,
    config: WorkerConfig,
    resources: WorkerResources,
    preview: PreviewChannel,
    encoder: PreviewEncoder,
    stop: Arc<AtomicBool>,
    monitor: Arc<WorkerMonitor>,
}

impl RecordingWorker {
    pub fn new(
        camera: CameraHandle,
        config: WorkerConfig,
        resources: WorkerResources,
        preview: PreviewChannel,
    ) -> Self {
        let encoder = PreviewEncoder::from_settings(&config.preview);
        Self {
            camera,
            config,
            resources,
            preview,
            encoder,
            stop: Arc::new(AtomicBool::new(false)),
            monitor: Arc::new(WorkerMonitor::default()),
        }
    }

    pub fn camera(&self) -> CameraHandle {
        self.camera
    }

    /// Flag that asks the worker to stop after its current iteration
    pub fn stop_signal(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn monitor(&self) -> Arc<WorkerMonitor> {
        self.monitor.clone()
    }

    /// Run the worker on a dedicated thread
    pub fn spawn(
        self,
        ready: oneshot::Sender<StartupResult>,
    ) -> std::io::Result<JoinHandle<WorkerReport>> {
        std::thread::Builder::new()
            .name(format!("{}-recorder", self.camera.label()))
            .spawn(move || self.run(Some(ready)))
    }

    /// Run the whole lifecycle on the current thread until stopped or failed
    pub fn run(self, ready: Option<oneshot::Sender<StartupResult>>) -> WorkerReport {
        let camera = self.camera;
        let mut report = WorkerReport::new(camera);
        tracing::info!("[{}] Worker starting", camera);

        let (mut source, segment, started) = match self.start_up() {
            Ok(parts) => parts,
            Err(err) => {
                tracing::error!("[{}] Failed to start: {}", camera, err);
                let failure = err.into_failure(camera);
                self.monitor.record_failure(failure.clone());
                report.outcome = WorkerOutcome::Failed(failure.clone());
                self.monitor.transition(camera, WorkerState::Stopped);
                if let Some(ready) = ready {
                    let _ = ready.send(Err(failure));
                }
                return report;
            }
        };

        self.monitor.transition(camera, WorkerState::Recording);
        if let Some(ready) = ready {
            if ready.send(Ok(started.clone())).is_err() {
                // Nobody owns this worker any more; seal what was opened and quit
                tracing::warn!("[{}] Supervisor went away during startup, stopping", camera);
                self.stop.store(true, Ordering::SeqCst);
            }
        }

        let mut segment = Some(segment);
        match self.record(source.as_mut(), &mut segment, &started, &mut report) {
            Ok(()) => {
                tracing::info!("[{}] Stop requested", camera);
                self.monitor.transition(camera, WorkerState::Stopping);
            }
            Err(err) => {
                tracing::error!("[{}] Recording ended: {}", camera, err);
                report.fail(err);
            }
        }

        if let Some(active) = segment.take() {
            if let Err(err) = self.seal(active, &mut report) {
                tracing::error!("[{}] Failed to finalize last segment: {}", camera, err);
                report.fail(err);
            }
        }
        source.close();

        if let WorkerOutcome::Failed(failure) = &report.outcome {
            self.monitor.record_failure(failure.clone());
        }
        self.monitor.transition(camera, WorkerState::Stopped);

        tracing::info!(
            "[{}] Stopped recording: {} segment(s), {} frames",
            camera,
            report.segment_count(),
            report.frames_written
        );
        report
    }

    /// Open the camera, let it settle and open the first segment
    fn start_up(&self) -> RecorderResult<(Box<dyn FrameSource>, ActiveSegment, StartedCamera)> {
        let settings = &self.config.settings;
        let mut source = self
            .resources
            .cameras
            .open(self.camera, &settings.capture_request())?;

        let format = source.format();
        let fps = settings.effective_fps(&format, self.config.fallback_fps);
        tracing::info!(
            "[{}] Camera opened: {}x{} @ {:?}fps (requested {}x{} @ {}fps), recording at {}fps",
            self.camera,
            format.width,
            format.height,
            format.fps,
            settings.target_width,
            settings.target_height,
            settings.target_fps,
            fps
        );

        // Let the camera adjust exposure and white balance
        self.resources.clock.sleep(self.config.settle_delay);

        let started = StartedCamera {
            camera: self.camera,
            format,
            fps,
        };
        let opened = std::fs::create_dir_all(&settings.output_directory)
            .map_err(|e| RecorderError::CannotCreate {
                path: settings.output_directory.clone(),
                reason: e.to_string(),
            })
            .and_then(|()| self.open_segment(0, &started));

        match opened {
            Ok(segment) => Ok((source, segment, started)),
            Err(err) => {
                source.close();
                Err(err)
            }
        }
    }

    fn open_segment(&self, sequence: u64, started: &StartedCamera) -> RecorderResult<ActiveSegment> {
        let created_at = self.resources.clock.wall_now();
        let file_name = segment_file_name(
            self.camera,
            sequence,
            &created_at,
            self.resources.writers.extension(),
        );
        let path = self.config.settings.output_directory.join(file_name);

        let spec = SegmentSpec {
            path: path.clone(),
            width: started.format.width,
            height: started.format.height,
            fps: started.fps,
        };
        let writer = self.resources.writers.create(&spec)?;

        tracing::info!(
            "[{}] Starting new segment: {} ({}x{}, {} FPS)",
            self.camera,
            path.display(),
            spec.width,
            spec.height,
            spec.fps
        );

        let info = SegmentInfo {
            camera: self.camera,
            sequence,
            path,
            created_at,
            width: spec.width,
            height: spec.height,
            fps: spec.fps,
            frames: 0,
            duration: Duration::ZERO,
            sealed: false,
        };
        Ok(ActiveSegment::new(info, writer, self.resources.clock.now()))
    }

    /// Capture loop. Returns `Ok` when stopped on request.
    fn record(
        &self,
        source: &mut dyn FrameSource,
        segment: &mut Option<ActiveSegment>,
        started: &StartedCamera,
        report: &mut WorkerReport,
    ) -> RecorderResult<()> {
        let clock = &self.resources.clock;
        let settings = &self.config.settings;
        let frame_period = (settings.target_fps > 0)
            .then(|| Duration::from_secs_f64(1.0 / settings.target_fps as f64));
        let mut last_preview: Option<Instant> = None;

        while !self.stop.load(Ordering::SeqCst) {
            let iteration_start = clock.now();
            let frame = source.read_frame()?;

            let active = segment.as_mut().ok_or_else(|| RecorderError::WriteFailed {
                path: settings.output_directory.clone(),
                reason: "no open segment".to_string(),
            })?;
            active.write(&frame)?;
            report.frames_written += 1;

            self.publish_preview(&frame, &mut last_preview, report);

            // The frame just written stays in the segment it was read into
            if active.elapsed(clock.now()) >= settings.segment_duration {
                self.rotate(segment, started, report)?;
            }

            if let Some(period) = frame_period {
                let spent = clock.now().saturating_duration_since(iteration_start);
                if let Some(remaining) = period.checked_sub(spent) {
                    clock.sleep(remaining);
                }
            }
        }
        Ok(())
    }

    /// Seal the current segment, then open the next one
    fn rotate(
        &self,
        segment: &mut Option<ActiveSegment>,
        started: &StartedCamera,
        report: &mut WorkerReport,
    ) -> RecorderResult<()> {
        let Some(current) = segment.take() else {
            return Ok(());
        };
        let next = current.sequence() + 1;
        self.seal(current, report)?;
        *segment = Some(self.open_segment(next, started)?);
        Ok(())
    }

    fn seal(&self, active: ActiveSegment, report: &mut WorkerReport) -> RecorderResult<()> {
        let (info, result) = active.seal(self.resources.clock.now());
        tracing::info!(
            "[{}] Sealed segment {}: {} frames over {:.1}s",
            self.camera,
            info.path.display(),
            info.frames,
            info.duration.as_secs_f64()
        );
        report.segments.push(info);
        result
    }

    /// Best effort: encoding failures and a full channel never stall capture
    fn publish_preview(
        &self,
        frame: &Frame,
        last_preview: &mut Option<Instant>,
        report: &mut WorkerReport,
    ) {
        let now = self.resources.clock.now();
        if let Some(previous) = *last_preview {
            if now.saturating_duration_since(previous) < self.config.preview.min_interval {
                return;
            }
        }

        match self.encoder.encode(frame) {
            Ok(encoded) => {
                let displaced = self.preview.publish(PreviewFrame {
                    camera: self.camera,
                    jpeg: encoded.jpeg,
                    width: encoded.width,
                    height: encoded.height,
                    sequence: frame.sequence,
                    captured_at: frame.captured_at,
                });
                report.previews_published += 1;
                if displaced {
                    report.previews_dropped += 1;
                }
                *last_preview = Some(now);
            }
            Err(err) => {
                tracing::debug!(
                    "[{}] Skipping preview for frame {}: {}",
                    self.camera,
                    frame.sequence,
                    err
                );
            }
        }
    }
}
