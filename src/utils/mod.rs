//! Shared utilities

pub mod error;

pub use error::{CameraFailure, ErrorResponse, FailureKind, RecorderError, RecorderResult};
