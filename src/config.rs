//! Application configuration
//!
//! Configuration is a plain value loaded once (JSON file, defaults, then CLI
//! overrides) and copied into every worker at session start.

use crate::recorder::state::RecordingSettings;
use crate::utils::error::{RecorderError, RecorderResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Which implementation opens cameras
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CaptureBackendKind {
    /// ffmpeg/ffprobe subprocesses (v4l2 or avfoundation)
    #[default]
    Ffmpeg,
    /// nokhwa native capture, requires the `native-camera` feature
    Native,
}

/// Segment encoder settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EncoderSettings {
    /// FFmpeg video codec
    pub codec: String,

    /// FFmpeg preset for the codec
    pub preset: String,

    /// Constant rate factor. Lower values = higher quality, larger files
    pub crf: u8,

    /// Container extension for segment files
    pub extension: String,

    /// Frame rate written into segments when neither the request nor the
    /// device provide one
    pub fallback_fps: u32,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            codec: "libx264".to_string(),
            preset: "veryfast".to_string(),
            crf: 23,
            extension: "mp4".to_string(),
            fallback_fps: 30,
        }
    }
}

/// Live preview settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PreviewSettings {
    /// Frames queued per camera before the oldest is dropped
    pub capacity: usize,

    /// JPEG quality (1-100)
    pub jpeg_quality: u8,

    /// Previews wider than this are downscaled, keeping aspect ratio
    pub max_width: u32,

    /// Minimum time between two published previews of one camera
    #[serde(with = "duration_ms")]
    pub min_interval: Duration,
}

impl Default for PreviewSettings {
    fn default() -> Self {
        Self {
            capacity: 2,
            jpeg_quality: 80,
            max_width: 640,
            min_interval: Duration::from_millis(100),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub recording: RecordingSettings,
    pub encoder: EncoderSettings,
    pub preview: PreviewSettings,
    pub backend: CaptureBackendKind,

    /// Highest device index probed by discovery (exclusive)
    pub discovery_max_probe: u32,

    /// Pause after opening a camera so exposure and white balance settle
    #[serde(with = "duration_ms")]
    pub settle_delay: Duration,

    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            recording: RecordingSettings::default(),
            encoder: EncoderSettings::default(),
            preview: PreviewSettings::default(),
            backend: CaptureBackendKind::default(),
            discovery_max_probe: 10,
            settle_delay: Duration::from_secs(1),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file. Missing fields take defaults.
    pub fn load(path: &Path) -> RecorderResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RecorderError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: AppConfig = serde_json::from_str(&content)?;
        config.validate()?;

        tracing::debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub fn validate(&self) -> RecorderResult<()> {
        self.recording.validate()?;

        if self.preview.capacity == 0 {
            return Err(RecorderError::Configuration(
                "preview capacity must be at least 1".to_string(),
            ));
        }
        if !(1..=100).contains(&self.preview.jpeg_quality) {
            return Err(RecorderError::Configuration(format!(
                "JPEG quality {} outside 1-100",
                self.preview.jpeg_quality
            )));
        }
        if self.encoder.fallback_fps == 0 {
            return Err(RecorderError::Configuration(
                "encoder fallback fps must be positive".to_string(),
            ));
        }
        if self.encoder.extension.is_empty() {
            return Err(RecorderError::Configuration(
                "segment extension must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Serialize a `Duration` as whole milliseconds
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

/// Serialize a `Duration` as whole seconds
pub mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}
