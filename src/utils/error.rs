//! Error types and handling
//!
//! Common error types used across the recorder.

use crate::capture::CameraHandle;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Recorder-wide error type
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("No camera selected")]
    NoCameraSelected,

    #[error("Cannot open {camera}: {reason}")]
    CannotOpen { camera: CameraHandle, reason: String },

    #[error("Failed to read frame from {camera}: {reason}")]
    ReadFailed { camera: CameraHandle, reason: String },

    #[error("Cannot create {}: {reason}", path.display())]
    CannotCreate { path: PathBuf, reason: String },

    #[error("Failed to write {}: {reason}", path.display())]
    WriteFailed { path: PathBuf, reason: String },

    #[error("Already recording")]
    AlreadyRecording,

    #[error("Not recording")]
    NotRecording,

    #[error("All selected cameras failed to start ({} failures)", failures.len())]
    SessionDegraded { failures: Vec<CameraFailure> },

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Preview encoding error: {0}")]
    Preview(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Failed to join recording workers: {0}")]
    Join(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Per-camera failure classes. These end a single worker, never the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    CannotOpen,
    ReadFailed,
    CannotCreate,
    WriteFailed,
    /// The worker died or hit an error outside the camera and storage paths
    Crashed,
}

/// A per-camera failure, detached from the error that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraFailure {
    pub camera: CameraHandle,
    pub kind: FailureKind,
    pub message: String,
}

impl RecorderError {
    /// Classify a per-camera failure. Returns `None` for caller and session errors.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            RecorderError::CannotOpen { .. } => Some(FailureKind::CannotOpen),
            RecorderError::ReadFailed { .. } => Some(FailureKind::ReadFailed),
            RecorderError::CannotCreate { .. } | RecorderError::Io(_) => {
                Some(FailureKind::CannotCreate)
            }
            RecorderError::WriteFailed { .. } => Some(FailureKind::WriteFailed),
            _ => None,
        }
    }

    /// Detach a worker-ending error. Errors without a per-camera kind
    /// are reported as `Crashed`.
    pub(crate) fn into_failure(self, camera: CameraHandle) -> CameraFailure {
        CameraFailure {
            camera,
            kind: self.failure_kind().unwrap_or(FailureKind::Crashed),
            message: self.to_string(),
        }
    }
}

/// Error response for the presentation layer
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<RecorderError> for ErrorResponse {
    fn from(error: RecorderError) -> Self {
        let code = match &error {
            RecorderError::NoCameraSelected => "NO_CAMERA_SELECTED",
            RecorderError::CannotOpen { .. } => "CANNOT_OPEN",
            RecorderError::ReadFailed { .. } => "READ_FAILED",
            RecorderError::CannotCreate { .. } => "CANNOT_CREATE",
            RecorderError::WriteFailed { .. } => "WRITE_FAILED",
            RecorderError::AlreadyRecording => "ALREADY_RECORDING",
            RecorderError::NotRecording => "NOT_RECORDING",
            RecorderError::SessionDegraded { .. } => "SESSION_DEGRADED",
            RecorderError::InvalidSettings(_) => "INVALID_SETTINGS",
            RecorderError::Preview(_) => "PREVIEW_ERROR",
            RecorderError::Configuration(_) => "CONFIGURATION_ERROR",
            RecorderError::Join(_) => "WORKER_JOIN_FAILED",
            RecorderError::Io(_) => "IO_ERROR",
            RecorderError::Serialization(_) => "SERIALIZATION_ERROR",
        };

        ErrorResponse {
            code: code.to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using RecorderError
pub type RecorderResult<T> = Result<T, RecorderError>;
