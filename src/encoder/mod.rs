//! Segment encoding and preview compression
//!
//! - `SegmentWriter` / `SegmentWriterFactory` abstract the video sink
//! - `FfmpegSegmentWriterFactory` pipes raw frames into an ffmpeg child
//! - `PreviewEncoder` produces small JPEG snapshots for the live preview

pub mod ffmpeg;
pub mod jpeg;
pub mod traits;

#[cfg(test)]
pub(crate) mod mock;

pub use ffmpeg::FfmpegSegmentWriterFactory;
pub use jpeg::PreviewEncoder;
pub use traits::{SegmentSpec, SegmentWriter, SegmentWriterFactory};
