//! Camera capture through an FFmpeg subprocess
//!
//! The device is probed with ffprobe to learn the negotiated format, then
//! ffmpeg decodes the camera stream to raw RGB24 frames on stdout.

use super::traits::{CameraBackend, CameraHandle, CaptureRequest, Frame, FrameSource, NegotiatedFormat};
use crate::utils::error::{RecorderError, RecorderResult};
use std::io::{BufReader, Read};
use std::path::PathBuf;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::time::Instant;

/// Camera backend that shells out to ffmpeg/ffprobe
#[derive(Debug, Clone)]
pub struct FfmpegCameraBackend {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FfmpegCameraBackend {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Query the format the device settles on for this request
    fn probe_format(
        &self,
        camera: CameraHandle,
        request: &CaptureRequest,
    ) -> RecorderResult<NegotiatedFormat> {
        let mut args = vec!["-v".to_string(), "error".to_string()];
        args.extend(input_args(camera, request)?);
        args.extend([
            "-select_streams".to_string(),
            "v:0".to_string(),
            "-show_entries".to_string(),
            "stream=width,height,r_frame_rate".to_string(),
            "-of".to_string(),
            "csv=p=0".to_string(),
        ]);

        let output = Command::new(&self.ffprobe)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| RecorderError::CannotOpen {
                camera,
                reason: format!("failed to run ffprobe: {e}"),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RecorderError::CannotOpen {
                camera,
                reason: format!("ffprobe failed: {}", stderr.trim()),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_probe_output(&stdout).ok_or_else(|| RecorderError::CannotOpen {
            camera,
            reason: format!("unexpected ffprobe output: {}", stdout.trim()),
        })
    }
}

impl Default for FfmpegCameraBackend {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

impl CameraBackend for FfmpegCameraBackend {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn open(
        &self,
        camera: CameraHandle,
        request: &CaptureRequest,
    ) -> RecorderResult<Box<dyn FrameSource>> {
        let format = self.probe_format(camera, request)?;
        if format.width == 0 || format.height == 0 {
            return Err(RecorderError::CannotOpen {
                camera,
                reason: "device reported an empty frame size".to_string(),
            });
        }

        // Pin the stream to the negotiated size so frame boundaries are exact
        let pinned = CaptureRequest::new(format.width, format.height, request.fps);
        let mut args = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
        ];
        args.extend(input_args(camera, &pinned)?);
        args.extend([
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pix_fmt".to_string(),
            "rgb24".to_string(),
            "-".to_string(),
        ]);

        tracing::debug!("Starting FFmpeg capture for {}: {:?}", camera, args);

        let mut process = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| RecorderError::CannotOpen {
                camera,
                reason: format!("failed to start ffmpeg: {e}"),
            })?;

        let stdout = match process.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = process.kill();
                let _ = process.wait();
                return Err(RecorderError::CannotOpen {
                    camera,
                    reason: "failed to capture ffmpeg stdout".to_string(),
                });
            }
        };

        let frame_size = Frame::expected_len(format.width, format.height);
        Ok(Box::new(FfmpegFrameSource {
            camera,
            process: Some(process),
            stdout: BufReader::with_capacity(frame_size * 2, stdout),
            format,
            frame_size,
            sequence: 0,
        }))
    }

    fn probe(&self, camera: CameraHandle) -> bool {
        #[cfg(target_os = "linux")]
        {
            if !device_path(camera).exists() {
                return false;
            }
        }
        self.probe_format(camera, &CaptureRequest::device_default())
            .is_ok()
    }
}

/// Frame source reading raw frames from an ffmpeg child
struct FfmpegFrameSource {
    camera: CameraHandle,
    process: Option<Child>,
    stdout: BufReader<ChildStdout>,
    format: NegotiatedFormat,
    frame_size: usize,
    sequence: u64,
}

impl FrameSource for FfmpegFrameSource {
    fn format(&self) -> NegotiatedFormat {
        self.format
    }

    fn read_frame(&mut self) -> RecorderResult<Frame> {
        if self.process.is_none() {
            return Err(RecorderError::ReadFailed {
                camera: self.camera,
                reason: "source is closed".to_string(),
            });
        }

        let mut data = vec![0u8; self.frame_size];
        match self.stdout.read_exact(&mut data) {
            Ok(()) => {
                let frame = Frame {
                    data,
                    width: self.format.width,
                    height: self.format.height,
                    sequence: self.sequence,
                    captured_at: Instant::now(),
                };
                self.sequence += 1;
                Ok(frame)
            }
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Err(RecorderError::ReadFailed {
                    camera: self.camera,
                    reason: "camera stream ended".to_string(),
                })
            }
            Err(e) => Err(RecorderError::ReadFailed {
                camera: self.camera,
                reason: e.to_string(),
            }),
        }
    }

    fn close(&mut self) {
        if let Some(mut process) = self.process.take() {
            let _ = process.kill();
            let _ = process.wait();
            tracing::debug!("FFmpeg capture for {} closed", self.camera);
        }
    }
}

impl Drop for FfmpegFrameSource {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(target_os = "linux")]
fn device_path(camera: CameraHandle) -> PathBuf {
    PathBuf::from(format!("/dev/video{}", camera.index()))
}

/// FFmpeg input arguments for a camera on this platform
fn input_args(camera: CameraHandle, request: &CaptureRequest) -> RecorderResult<Vec<String>> {
    let mut args = Vec::new();

    #[cfg(target_os = "linux")]
    {
        args.extend(["-f".to_string(), "v4l2".to_string()]);
        push_request_args(&mut args, request);
        args.extend([
            "-i".to_string(),
            device_path(camera).to_string_lossy().to_string(),
        ]);
        Ok(args)
    }

    #[cfg(target_os = "macos")]
    {
        args.extend(["-f".to_string(), "avfoundation".to_string()]);
        push_request_args(&mut args, request);
        args.extend(["-i".to_string(), format!("{}:none", camera.index())]);
        Ok(args)
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        let _ = (&mut args, request);
        Err(RecorderError::CannotOpen {
            camera,
            reason: "ffmpeg camera capture is not supported on this platform".to_string(),
        })
    }
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
fn push_request_args(args: &mut Vec<String>, request: &CaptureRequest) {
    if request.width > 0 && request.height > 0 {
        args.extend([
            "-video_size".to_string(),
            format!("{}x{}", request.width, request.height),
        ]);
    }
    if request.fps > 0 {
        args.extend(["-framerate".to_string(), request.fps.to_string()]);
    }
}

/// Parse `width,height,rate` as printed by `ffprobe -of csv=p=0`
fn parse_probe_output(output: &str) -> Option<NegotiatedFormat> {
    let line = output.lines().find(|l| !l.trim().is_empty())?;
    let parts: Vec<&str> = line.trim().split(',').collect();
    if parts.len() < 2 {
        return None;
    }

    let width: u32 = parts[0].trim().parse().ok()?;
    let height: u32 = parts[1].trim().parse().ok()?;
    let fps = parts.get(2).and_then(|rate| parse_frame_rate(rate));

    Some(NegotiatedFormat { width, height, fps })
}

/// Parse a rational frame rate ("30/1", "30000/1001") rounded to whole frames
fn parse_frame_rate(rate: &str) -> Option<u32> {
    let rate = rate.trim();
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.parse().ok()?,
    };

    if value.is_finite() && value >= 1.0 {
        Some(value.round() as u32)
    } else {
        None
    }
}
