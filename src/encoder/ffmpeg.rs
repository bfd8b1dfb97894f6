//! FFmpeg segment writer
//!
//! Raw RGB24 frames are piped to an ffmpeg child on stdin; closing stdin and
//! waiting for the child finalizes the file.

use super::traits::{SegmentSpec, SegmentWriter, SegmentWriterFactory};
use crate::capture::Frame;
use crate::config::EncoderSettings;
use crate::utils::error::{RecorderError, RecorderResult};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

/// Creates one ffmpeg encoder process per segment
#[derive(Debug, Clone)]
pub struct FfmpegSegmentWriterFactory {
    ffmpeg: PathBuf,
    settings: EncoderSettings,
}

impl FfmpegSegmentWriterFactory {
    pub fn new(ffmpeg: impl Into<PathBuf>, settings: EncoderSettings) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            settings,
        }
    }

    fn encoder_args(&self, spec: &SegmentSpec) -> Vec<String> {
        let fps = spec.fps.max(1);
        vec![
            "-y".to_string(), // Overwrite output
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pix_fmt".to_string(),
            "rgb24".to_string(),
            "-video_size".to_string(),
            format!("{}x{}", spec.width, spec.height),
            "-framerate".to_string(),
            fps.to_string(),
            "-i".to_string(),
            "-".to_string(), // Read from stdin
            "-c:v".to_string(),
            self.settings.codec.clone(),
            "-preset".to_string(),
            self.settings.preset.clone(),
            "-crf".to_string(),
            self.settings.crf.to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-g".to_string(),
            (fps * 2).to_string(), // GOP size = 2 seconds
            "-movflags".to_string(),
            "+faststart".to_string(),
            spec.path.to_string_lossy().to_string(),
        ]
    }
}

impl SegmentWriterFactory for FfmpegSegmentWriterFactory {
    fn extension(&self) -> &str {
        &self.settings.extension
    }

    fn create(&self, spec: &SegmentSpec) -> RecorderResult<Box<dyn SegmentWriter>> {
        if spec.width == 0 || spec.height == 0 {
            return Err(RecorderError::CannotCreate {
                path: spec.path.clone(),
                reason: format!("invalid frame size {}x{}", spec.width, spec.height),
            });
        }

        let mut process = Command::new(&self.ffmpeg)
            .args(self.encoder_args(spec))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| RecorderError::CannotCreate {
                path: spec.path.clone(),
                reason: format!("failed to start ffmpeg: {e}"),
            })?;

        let stdin = match process.stdin.take() {
            Some(stdin) => stdin,
            None => {
                let _ = process.kill();
                let _ = process.wait();
                return Err(RecorderError::CannotCreate {
                    path: spec.path.clone(),
                    reason: "failed to capture ffmpeg stdin".to_string(),
                });
            }
        };

        tracing::debug!(
            "Started FFmpeg segment encoder: {}x{} @ {}fps, output: {}",
            spec.width,
            spec.height,
            spec.fps,
            spec.path.display()
        );

        Ok(Box::new(FfmpegSegmentWriter {
            path: spec.path.clone(),
            frame_size: Frame::expected_len(spec.width, spec.height),
            process: Some(process),
            stdin: Some(stdin),
            frame_count: 0,
        }))
    }
}

/// One segment file being encoded by an ffmpeg child
pub struct FfmpegSegmentWriter {
    path: PathBuf,
    frame_size: usize,
    process: Option<Child>,
    stdin: Option<ChildStdin>,
    frame_count: u64,
}

impl FfmpegSegmentWriter {
    fn write_failed(&self, reason: impl Into<String>) -> RecorderError {
        RecorderError::WriteFailed {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }
}

impl SegmentWriter for FfmpegSegmentWriter {
    fn path(&self) -> &Path {
        &self.path
    }

    fn write_frame(&mut self, frame: &Frame) -> RecorderResult<()> {
        if frame.data.len() != self.frame_size {
            return Err(self.write_failed(format!(
                "frame of {} bytes does not match segment frame size {}",
                frame.data.len(),
                self.frame_size
            )));
        }

        let result = match self.stdin.as_mut() {
            Some(stdin) => stdin.write_all(&frame.data),
            None => return Err(self.write_failed("segment already finalized")),
        };
        result.map_err(|e| self.write_failed(e.to_string()))?;

        self.frame_count += 1;
        Ok(())
    }

    fn finalize(&mut self) -> RecorderResult<()> {
        // Close stdin to signal EOF
        drop(self.stdin.take());

        let Some(mut process) = self.process.take() else {
            return Ok(());
        };

        let status = process
            .wait()
            .map_err(|e| self.write_failed(e.to_string()))?;
        if !status.success() {
            tracing::warn!(
                "FFmpeg segment encoder for {} exited with status {}",
                self.path.display(),
                status
            );
            return Err(self.write_failed(format!("ffmpeg exited with {status}")));
        }

        tracing::debug!(
            "FFmpeg segment finished: {} frames, output: {}",
            self.frame_count,
            self.path.display()
        );
        Ok(())
    }

    fn is_finalized(&self) -> bool {
        self.process.is_none()
    }
}

impl Drop for FfmpegSegmentWriter {
    fn drop(&mut self) {
        if let Err(e) = self.finalize() {
            tracing::warn!("Failed to finalize {} on drop: {}", self.path.display(), e);
        }
    }
}
