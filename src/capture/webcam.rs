//! Native webcam capture using nokhwa
//!
//! Frames are decoded to RGB24 on the worker thread that owns the camera.

use super::traits::{CameraBackend, CameraHandle, CaptureRequest, Frame, FrameSource, NegotiatedFormat};
use crate::utils::error::{RecorderError, RecorderResult};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;
use std::time::Instant;

/// Frame rate asked for when only a resolution was requested
const DEFAULT_REQUEST_FPS: u32 = 30;

/// Camera backend over the platform's native capture API
#[derive(Debug, Default, Clone)]
pub struct NokhwaCameraBackend;

impl NokhwaCameraBackend {
    pub fn new() -> Self {
        Self
    }
}

fn requested_format(request: &CaptureRequest) -> RequestedFormat<'static> {
    let format_type = if request.width > 0 && request.height > 0 {
        let fps = if request.fps > 0 {
            request.fps
        } else {
            DEFAULT_REQUEST_FPS
        };
        RequestedFormatType::Closest(CameraFormat::new_from(
            request.width,
            request.height,
            FrameFormat::MJPEG,
            fps,
        ))
    } else {
        RequestedFormatType::None
    };
    RequestedFormat::new::<RgbFormat>(format_type)
}

impl CameraBackend for NokhwaCameraBackend {
    fn name(&self) -> &str {
        "nokhwa"
    }

    fn open(
        &self,
        camera: CameraHandle,
        request: &CaptureRequest,
    ) -> RecorderResult<Box<dyn FrameSource>> {
        let index = CameraIndex::Index(camera.index());
        let mut device =
            Camera::new(index, requested_format(request)).map_err(|e| RecorderError::CannotOpen {
                camera,
                reason: format!("{e:?}"),
            })?;

        device
            .open_stream()
            .map_err(|e| RecorderError::CannotOpen {
                camera,
                reason: format!("failed to open stream: {e:?}"),
            })?;

        let camera_format = device.camera_format();
        let format = NegotiatedFormat {
            width: camera_format.resolution().width(),
            height: camera_format.resolution().height(),
            fps: Some(camera_format.frame_rate()).filter(|fps| *fps > 0),
        };

        tracing::info!(
            "Webcam {} opened: {}x{} @ {:?}fps, format={:?} (requested {}x{} @ {}fps)",
            camera,
            format.width,
            format.height,
            format.fps,
            camera_format.format(),
            request.width,
            request.height,
            request.fps
        );

        Ok(Box::new(NokhwaFrameSource {
            camera,
            device,
            format,
            sequence: 0,
            open: true,
        }))
    }
}

struct NokhwaFrameSource {
    camera: CameraHandle,
    device: Camera,
    format: NegotiatedFormat,
    sequence: u64,
    open: bool,
}

impl FrameSource for NokhwaFrameSource {
    fn format(&self) -> NegotiatedFormat {
        self.format
    }

    fn read_frame(&mut self) -> RecorderResult<Frame> {
        if !self.open {
            return Err(RecorderError::ReadFailed {
                camera: self.camera,
                reason: "source is closed".to_string(),
            });
        }

        let buffer = self.device.frame().map_err(|e| RecorderError::ReadFailed {
            camera: self.camera,
            reason: format!("{e:?}"),
        })?;
        let image = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| RecorderError::ReadFailed {
                camera: self.camera,
                reason: format!("failed to decode frame: {e:?}"),
            })?;

        let width = image.width();
        let height = image.height();
        let frame = Frame {
            data: image.into_raw(),
            width,
            height,
            sequence: self.sequence,
            captured_at: Instant::now(),
        };
        self.sequence += 1;
        Ok(frame)
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            if let Err(e) = self.device.stop_stream() {
                tracing::warn!("Error stopping camera stream for {}: {:?}", self.camera, e);
            }
        }
    }
}

impl Drop for NokhwaFrameSource {
    fn drop(&mut self) {
        self.close();
    }
}
