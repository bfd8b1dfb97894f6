//! Segment writer trait definitions

use crate::capture::Frame;
use crate::utils::error::RecorderResult;
use std::path::{Path, PathBuf};

/// Parameters a segment file is created with.
///
/// Size and rate come from the negotiated camera format, not the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentSpec {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

/// Encoding sink for one segment file
pub trait SegmentWriter {
    fn path(&self) -> &Path;

    /// Append one frame. Frames must arrive in capture order.
    fn write_frame(&mut self, frame: &Frame) -> RecorderResult<()>;

    /// Flush and close the file.
    ///
    /// Finalizing an already finalized writer is a no-op and returns `Ok`.
    fn finalize(&mut self) -> RecorderResult<()>;

    fn is_finalized(&self) -> bool;
}

/// Creates segment writers
pub trait SegmentWriterFactory: Send + Sync {
    /// File extension of the produced segments, without the dot
    fn extension(&self) -> &str;

    fn create(&self, spec: &SegmentSpec) -> RecorderResult<Box<dyn SegmentWriter>>;
}
