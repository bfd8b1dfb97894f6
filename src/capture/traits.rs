//! Capture trait definitions
//!
//! Platform-agnostic traits for camera frame sources.

use crate::utils::error::RecorderResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Opaque identity of one physical camera (a device index)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CameraHandle(u32);

impl CameraHandle {
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Device index this handle refers to
    pub fn index(&self) -> u32 {
        self.0
    }

    /// Stable identifier used in file names, e.g. `camera_2`
    pub fn label(&self) -> String {
        format!("camera_{}", self.0)
    }
}

impl fmt::Display for CameraHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "camera {}", self.0)
    }
}

/// Requested capture parameters. Zero means "use the device default".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CaptureRequest {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl CaptureRequest {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self { width, height, fps }
    }

    /// Request that leaves every parameter to the device
    pub fn device_default() -> Self {
        Self::default()
    }
}

/// Format the device actually settled on after opening.
///
/// Devices may clamp or ignore a request, so this (not the request) is what
/// the segment writer gets configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiatedFormat {
    pub width: u32,
    pub height: u32,

    /// Frame rate reported by the device, if it reports one
    pub fps: Option<u32>,
}

/// One raw captured frame, packed RGB24
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw pixel data (RGB, 3 bytes per pixel, no row padding)
    pub data: Vec<u8>,

    /// Frame width in pixels
    pub width: u32,

    /// Frame height in pixels
    pub height: u32,

    /// Capture order within one source, starting at 0
    pub sequence: u64,

    /// When the frame was handed to the worker
    pub captured_at: Instant,
}

impl Frame {
    /// Byte length of an RGB24 frame of the given size
    pub fn expected_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 3
    }
}

/// A live, exclusively owned camera stream.
///
/// Sources are opened on the worker thread that drives them and never leave it.
pub trait FrameSource {
    /// Negotiated format, valid from the moment the source is opened
    fn format(&self) -> NegotiatedFormat;

    /// Block until the next frame is available.
    ///
    /// An error means the device is gone; callers must not retry.
    fn read_frame(&mut self) -> RecorderResult<Frame>;

    /// Release the device. Calling it more than once is harmless.
    fn close(&mut self);
}

/// Opens frame sources for camera handles
pub trait CameraBackend: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &str;

    /// Open a camera with the requested parameters
    fn open(
        &self,
        camera: CameraHandle,
        request: &CaptureRequest,
    ) -> RecorderResult<Box<dyn FrameSource>>;

    /// Check whether a camera can currently be opened
    fn probe(&self, camera: CameraHandle) -> bool {
        match self.open(camera, &CaptureRequest::device_default()) {
            Ok(mut source) => {
                source.close();
                true
            }
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_handle_label_and_display() {
        let camera = CameraHandle::new(2);
        assert_eq!(camera.label(), "camera_2");
        assert_eq!(camera.to_string(), "camera 2");
        assert_eq!(camera.index(), 2);
    }

    #[test]
    fn test_camera_handle_serializes_as_index() {
        let json = serde_json::to_string(&CameraHandle::new(7)).unwrap();
        assert_eq!(json, "7");
    }

    #[test]
    fn test_expected_len() {
        assert_eq!(Frame::expected_len(640, 480), 640 * 480 * 3);
        assert_eq!(Frame::expected_len(0, 480), 0);
    }
}
