//! Recording commands
//!
//! The surface a presentation layer calls. Every command returns
//! `Result<_, ErrorResponse>` so failures serialize as `{code, message}`.

use crate::capture::{self, CameraHandle};
use crate::config::AppConfig;
use crate::recorder::{
    CameraStatus, PreviewFrame, RecordingSettings, RecordingSupervisor, SessionSummary, StartReport,
};
use crate::utils::error::{ErrorResponse, RecorderError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared recorder state handed to every command
pub struct RecorderState {
    pub supervisor: Arc<Mutex<RecordingSupervisor>>,
    pub config: AppConfig,
}

impl RecorderState {
    pub fn new(supervisor: RecordingSupervisor, config: AppConfig) -> Self {
        Self {
            supervisor: Arc::new(Mutex::new(supervisor)),
            config,
        }
    }

    pub fn from_config(config: AppConfig) -> Result<Self, ErrorResponse> {
        let supervisor = RecordingSupervisor::from_config(&config)?;
        Ok(Self::new(supervisor, config))
    }
}

/// Camera selection and settings for a new session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRecordingRequest {
    pub cameras: Vec<CameraHandle>,

    /// Falls back to the configured recording settings
    #[serde(default)]
    pub settings: Option<RecordingSettings>,
}

/// One camera's entry in a preview poll
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewSlot {
    pub camera: CameraHandle,
    pub status: CameraStatus,

    /// JPEG of the freshest frame, `None` if nothing new since the last poll
    #[serde(skip)]
    pub frame: Option<PreviewFrame>,

    pub width: Option<u32>,
    pub height: Option<u32>,
    pub sequence: Option<u64>,
}

/// Probe for attached cameras
pub async fn discover_cameras(
    state: &RecorderState,
    max_probe: Option<u32>,
) -> Result<Vec<CameraHandle>, ErrorResponse> {
    let backend = state.supervisor.lock().await.camera_backend();
    let max_probe = max_probe.unwrap_or(state.config.discovery_max_probe);

    // Probing opens devices, keep it off the async workers
    tokio::task::spawn_blocking(move || capture::discover_cameras(backend.as_ref(), max_probe))
        .await
        .map_err(|e| RecorderError::Join(e.to_string()).into())
}

/// Start recording the selected cameras
pub async fn start_recording(
    state: &RecorderState,
    request: StartRecordingRequest,
) -> Result<StartReport, ErrorResponse> {
    let settings = request
        .settings
        .unwrap_or_else(|| state.config.recording.clone());

    tracing::info!(
        "start_recording: {} camera(s), {}x{} @ {}fps, {}s segments",
        request.cameras.len(),
        settings.target_width,
        settings.target_height,
        settings.target_fps,
        settings.segment_duration.as_secs()
    );

    let mut supervisor = state.supervisor.lock().await;
    Ok(supervisor.start(&request.cameras, &settings).await?)
}

/// Stop the running session and wait for every segment to be sealed
pub async fn stop_recording(state: &RecorderState) -> Result<SessionSummary, ErrorResponse> {
    let mut supervisor = state.supervisor.lock().await;
    Ok(supervisor.stop().await?)
}

/// Latest preview and status of every selected camera
pub async fn drain_preview(state: &RecorderState) -> Result<Vec<PreviewSlot>, ErrorResponse> {
    let supervisor = state.supervisor.lock().await;
    if !supervisor.is_recording() {
        return Err(RecorderError::NotRecording.into());
    }

    let statuses = supervisor.statuses();
    let slots = supervisor
        .drain_preview()
        .into_iter()
        .map(|(camera, frame)| PreviewSlot {
            camera,
            status: statuses
                .get(&camera)
                .copied()
                .unwrap_or(CameraStatus::Stopped),
            width: frame.as_ref().map(|f| f.width),
            height: frame.as_ref().map(|f| f.height),
            sequence: frame.as_ref().map(|f| f.sequence),
            frame,
        })
        .collect();
    Ok(slots)
}

/// Status of every selected camera, empty when idle
pub async fn camera_statuses(
    state: &RecorderState,
) -> Result<Vec<(CameraHandle, CameraStatus)>, ErrorResponse> {
    let supervisor = state.supervisor.lock().await;
    Ok(supervisor.statuses().into_iter().collect())
}
