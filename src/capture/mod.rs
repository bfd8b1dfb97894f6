//! Camera capture
//!
//! This module provides camera frame sources and best-effort discovery.

pub mod discovery;
pub mod ffmpeg;
pub mod traits;

#[cfg(feature = "native-camera")]
pub mod webcam;

#[cfg(test)]
pub(crate) mod mock;

pub use discovery::discover_cameras;
pub use ffmpeg::FfmpegCameraBackend;
pub use traits::{CameraBackend, CameraHandle, CaptureRequest, Frame, FrameSource, NegotiatedFormat};

#[cfg(feature = "native-camera")]
pub use webcam::NokhwaCameraBackend;
