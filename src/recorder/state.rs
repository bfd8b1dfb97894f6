//! Recording state management
//!
//! Defines the worker state machine, the recording settings value and the
//! reports produced by a session.

use super::segment::SegmentInfo;
use crate::capture::{CameraHandle, CaptureRequest, NegotiatedFormat};
use crate::utils::error::{CameraFailure, FailureKind, RecorderError, RecorderResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// Lifecycle of one recording worker. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    /// Opening the camera and the first segment
    Starting,
    /// Capturing and writing frames
    Recording,
    /// Stop requested, sealing the last segment
    Stopping,
    /// All resources released
    Stopped,
}

impl Default for WorkerState {
    fn default() -> Self {
        Self::Starting
    }
}

impl WorkerState {
    /// Whether `next` is a legal successor of this state
    pub fn can_transition_to(self, next: WorkerState) -> bool {
        use WorkerState::*;
        matches!(
            (self, next),
            (Starting, Recording)
                | (Starting, Stopped)
                | (Recording, Stopping)
                | (Recording, Stopped)
                | (Stopping, Stopped)
        )
    }
}

/// Settings for one recording session
///
/// Copied into every worker at start; later changes never reach running workers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecordingSettings {
    /// Requested frame rate (0 = device default, no pacing)
    pub target_fps: u32,

    /// Requested width (0 = device default)
    pub target_width: u32,

    /// Requested height (0 = device default)
    pub target_height: u32,

    /// Directory segments are written to, created if missing
    pub output_directory: PathBuf,

    /// Minimum length of a segment before rotation
    #[serde(with = "crate::config::duration_secs")]
    pub segment_duration: Duration,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            target_fps: 5,
            target_width: 640,
            target_height: 480,
            output_directory: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            segment_duration: Duration::from_secs(10 * 60),
        }
    }
}

impl RecordingSettings {
    pub const MAX_FPS: u32 = 60;
    pub const MAX_WIDTH: u32 = 3840;
    pub const MAX_HEIGHT: u32 = 2160;
    pub const MAX_SEGMENT_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

    /// Capture parameters handed to the frame source
    pub fn capture_request(&self) -> CaptureRequest {
        CaptureRequest::new(self.target_width, self.target_height, self.target_fps)
    }

    /// Frame rate burned into segments: the request, else the device, else `fallback`
    pub fn effective_fps(&self, format: &NegotiatedFormat, fallback: u32) -> u32 {
        if self.target_fps > 0 {
            self.target_fps
        } else {
            format.fps.filter(|fps| *fps > 0).unwrap_or(fallback)
        }
    }

    pub fn validate(&self) -> RecorderResult<()> {
        if self.segment_duration.is_zero() {
            return Err(RecorderError::InvalidSettings(
                "segment duration must be positive".to_string(),
            ));
        }
        if self.segment_duration > Self::MAX_SEGMENT_DURATION {
            return Err(RecorderError::InvalidSettings(format!(
                "segment duration {:?} exceeds 24 hours",
                self.segment_duration
            )));
        }
        if self.target_fps > Self::MAX_FPS {
            return Err(RecorderError::InvalidSettings(format!(
                "frame rate {} exceeds {}",
                self.target_fps,
                Self::MAX_FPS
            )));
        }
        if self.target_width > Self::MAX_WIDTH || self.target_height > Self::MAX_HEIGHT {
            return Err(RecorderError::InvalidSettings(format!(
                "resolution {}x{} exceeds {}x{}",
                self.target_width,
                self.target_height,
                Self::MAX_WIDTH,
                Self::MAX_HEIGHT
            )));
        }
        if self.output_directory.as_os_str().is_empty() {
            return Err(RecorderError::InvalidSettings(
                "output directory is empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// What the presentation layer shows for one camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "camelCase")]
pub enum CameraStatus {
    Recording,
    Stopped,
    Failed(FailureKind),
}

/// A camera that completed its Starting phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedCamera {
    pub camera: CameraHandle,
    pub format: NegotiatedFormat,

    /// Frame rate written into this camera's segments
    pub fps: u32,
}

/// Result of starting a session: which cameras record and which failed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartReport {
    pub session_id: Uuid,
    pub started: Vec<StartedCamera>,
    pub failed: Vec<CameraFailure>,
}

impl StartReport {
    /// True when at least one selected camera failed to start
    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// How a worker's lifecycle ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum WorkerOutcome {
    /// Stopped on request with all segments sealed
    Completed,
    /// Ended by a per-camera failure
    Failed(CameraFailure),
}

/// Summary a worker returns when it reaches Stopped
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerReport {
    pub camera: CameraHandle,
    pub segments: Vec<SegmentInfo>,
    pub frames_written: u64,
    pub previews_published: u64,
    pub previews_dropped: u64,
    pub outcome: WorkerOutcome,
}

impl WorkerReport {
    pub fn new(camera: CameraHandle) -> Self {
        Self {
            camera,
            segments: Vec::new(),
            frames_written: 0,
            previews_published: 0,
            previews_dropped: 0,
            outcome: WorkerOutcome::Completed,
        }
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Record a failure unless an earlier one is already recorded
    pub(crate) fn fail(&mut self, error: RecorderError) {
        if self.outcome == WorkerOutcome::Completed {
            self.outcome = WorkerOutcome::Failed(error.into_failure(self.camera));
        }
    }
}

/// Result of stopping a session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
    pub reports: Vec<WorkerReport>,
}

impl SessionSummary {
    pub fn report(&self, camera: CameraHandle) -> Option<&WorkerReport> {
        self.reports.iter().find(|r| r.camera == camera)
    }

    pub fn total_segments(&self) -> usize {
        self.reports.iter().map(WorkerReport::segment_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_state_moves_forward_only() {
        use WorkerState::*;
        assert!(Starting.can_transition_to(Recording));
        assert!(Starting.can_transition_to(Stopped));
        assert!(Recording.can_transition_to(Stopping));
        assert!(Recording.can_transition_to(Stopped));
        assert!(Stopping.can_transition_to(Stopped));

        assert!(!Recording.can_transition_to(Starting));
        assert!(!Stopped.can_transition_to(Recording));
        assert!(!Starting.can_transition_to(Stopping));
        assert!(!Stopped.can_transition_to(Stopped));
    }

    #[test]
    fn test_effective_fps_prefers_request_then_device() {
        let format = NegotiatedFormat {
            width: 640,
            height: 480,
            fps: Some(25),
        };
        let mut settings = RecordingSettings::default();
        settings.target_fps = 10;
        assert_eq!(settings.effective_fps(&format, 30), 10);

        settings.target_fps = 0;
        assert_eq!(settings.effective_fps(&format, 30), 25);

        let silent = NegotiatedFormat { fps: None, ..format };
        assert_eq!(settings.effective_fps(&silent, 30), 30);
    }

    #[test]
    fn test_validate_rejects_out_of_range_settings() {
        let mut settings = RecordingSettings::default();
        assert!(settings.validate().is_ok());

        settings.segment_duration = Duration::ZERO;
        assert!(matches!(
            settings.validate(),
            Err(RecorderError::InvalidSettings(_))
        ));

        settings.segment_duration = Duration::from_secs(60);
        settings.target_fps = 61;
        assert!(settings.validate().is_err());

        settings.target_fps = 0;
        settings.target_width = 4000;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_settings_serialize_camel_case_seconds() {
        let settings = RecordingSettings {
            target_fps: 5,
            target_width: 0,
            target_height: 0,
            output_directory: PathBuf::from("/tmp/out"),
            segment_duration: Duration::from_secs(90),
        };
        let json = serde_json::to_value(&settings).unwrap();
        assert_eq!(json["segmentDuration"], 90);
        assert_eq!(json["targetFps"], 5);
        assert_eq!(json["outputDirectory"], "/tmp/out");
    }

    #[test]
    fn test_camera_status_serialization() {
        let json = serde_json::to_string(&CameraStatus::Failed(FailureKind::CannotOpen)).unwrap();
        assert_eq!(json, r#"{"status":"failed","reason":"cannotOpen"}"#);
        let json = serde_json::to_string(&CameraStatus::Recording).unwrap();
        assert_eq!(json, r#"{"status":"recording"}"#);
    }
}
