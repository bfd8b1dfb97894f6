//! Segment naming and bookkeeping
//!
//! A segment is one output file covering a bounded stretch of a camera's
//! recording. Exactly one is open per recording worker.

use crate::capture::{CameraHandle, Frame};
use crate::encoder::SegmentWriter;
use crate::utils::error::RecorderResult;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Timestamp layout embedded in segment file names
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// `camera_{index}_segment{seq}_{YYYYMMDD_HHMMSS}.{ext}`
pub fn segment_file_name(
    camera: CameraHandle,
    sequence: u64,
    created_at: &DateTime<Local>,
    extension: &str,
) -> String {
    format!(
        "{}_segment{}_{}.{}",
        camera.label(),
        sequence,
        created_at.format(TIMESTAMP_FORMAT),
        extension
    )
}

/// Metadata of one segment, open or sealed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentInfo {
    pub camera: CameraHandle,

    /// Per-camera sequence index, starting at 0
    pub sequence: u64,

    pub path: PathBuf,
    pub created_at: DateTime<Local>,
    pub width: u32,
    pub height: u32,
    pub fps: u32,

    /// Frames written into this segment
    pub frames: u64,

    /// Time between opening and sealing
    #[serde(with = "crate::config::duration_ms")]
    pub duration: Duration,

    /// Whether the writer has been finalized
    pub sealed: bool,
}

/// The segment a worker is currently writing
pub(crate) struct ActiveSegment {
    info: SegmentInfo,
    writer: Box<dyn SegmentWriter>,
    opened_at: Instant,
}

impl ActiveSegment {
    pub(crate) fn new(info: SegmentInfo, writer: Box<dyn SegmentWriter>, opened_at: Instant) -> Self {
        Self {
            info,
            writer,
            opened_at,
        }
    }

    pub(crate) fn sequence(&self) -> u64 {
        self.info.sequence
    }

    /// Time the segment has been open as of `now`
    pub(crate) fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.opened_at)
    }

    pub(crate) fn write(&mut self, frame: &Frame) -> RecorderResult<()> {
        self.writer.write_frame(frame)?;
        self.info.frames += 1;
        Ok(())
    }

    /// Finalize the writer. The info is returned even if finalizing failed.
    pub(crate) fn seal(mut self, now: Instant) -> (SegmentInfo, RecorderResult<()>) {
        let result = self.writer.finalize();
        self.info.duration = self.elapsed(now);
        self.info.sealed = result.is_ok();
        (self.info, result)
    }
}
