//! In-memory segment writer for tests

use super::traits::{SegmentSpec, SegmentWriter, SegmentWriterFactory};
use crate::capture::Frame;
use crate::utils::error::{RecorderError, RecorderResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Everything that happened to one segment
#[derive(Debug, Clone)]
pub struct WrittenSegment {
    pub spec: SegmentSpec,

    /// Sequence numbers of the frames written, in write order
    pub frames: Vec<u64>,
    pub finalize_calls: u32,
    pub finalized: bool,
}

#[derive(Default)]
struct Recorded {
    segments: Vec<WrittenSegment>,
    open_by_camera: HashMap<String, usize>,
    max_open_by_camera: HashMap<String, usize>,
}

#[derive(Clone, Default)]
pub struct MemoryWriterFactory {
    recorded: Arc<Mutex<Recorded>>,
    fail_create_for: Option<String>,
    fail_write_at: Option<u64>,
}

/// `camera_3_segment0_...` -> `camera_3`
fn camera_key(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    name.split("_segment").next().unwrap_or_default().to_string()
}

impl MemoryWriterFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse to create segments whose file name starts with `prefix`
    pub fn failing_create(mut self, prefix: &str) -> Self {
        self.fail_create_for = Some(prefix.to_string());
        self
    }

    /// Fail the write of the frame with this sequence number
    pub fn failing_write_at(mut self, sequence: u64) -> Self {
        self.fail_write_at = Some(sequence);
        self
    }

    pub fn segments(&self) -> Vec<WrittenSegment> {
        self.recorded.lock().segments.clone()
    }

    /// Segments of one camera, in creation order
    pub fn segments_for(&self, label: &str) -> Vec<WrittenSegment> {
        self.segments()
            .into_iter()
            .filter(|s| camera_key(&s.spec.path) == label)
            .collect()
    }

    pub fn open_count(&self, label: &str) -> usize {
        self.recorded
            .lock()
            .open_by_camera
            .get(label)
            .copied()
            .unwrap_or(0)
    }

    /// Most segments ever open at once for one camera
    pub fn max_open(&self, label: &str) -> usize {
        self.recorded
            .lock()
            .max_open_by_camera
            .get(label)
            .copied()
            .unwrap_or(0)
    }
}

impl SegmentWriterFactory for MemoryWriterFactory {
    fn extension(&self) -> &str {
        "mp4"
    }

    fn create(&self, spec: &SegmentSpec) -> RecorderResult<Box<dyn SegmentWriter>> {
        let key = camera_key(&spec.path);
        if self.fail_create_for.as_deref() == Some(key.as_str()) {
            return Err(RecorderError::CannotCreate {
                path: spec.path.clone(),
                reason: "disk full".to_string(),
            });
        }

        let mut recorded = self.recorded.lock();
        recorded.segments.push(WrittenSegment {
            spec: spec.clone(),
            frames: Vec::new(),
            finalize_calls: 0,
            finalized: false,
        });
        let index = recorded.segments.len() - 1;

        let open = {
            let open = recorded.open_by_camera.entry(key.clone()).or_insert(0);
            *open += 1;
            *open
        };
        let max = recorded.max_open_by_camera.entry(key.clone()).or_insert(0);
        *max = (*max).max(open);

        Ok(Box::new(MemoryWriter {
            recorded: self.recorded.clone(),
            index,
            key,
            path: spec.path.clone(),
            fail_write_at: self.fail_write_at,
            finalized: false,
        }))
    }
}

struct MemoryWriter {
    recorded: Arc<Mutex<Recorded>>,
    index: usize,
    key: String,
    path: PathBuf,
    fail_write_at: Option<u64>,
    finalized: bool,
}

impl SegmentWriter for MemoryWriter {
    fn path(&self) -> &Path {
        &self.path
    }

    fn write_frame(&mut self, frame: &Frame) -> RecorderResult<()> {
        if self.finalized || self.fail_write_at == Some(frame.sequence) {
            return Err(RecorderError::WriteFailed {
                path: self.path.clone(),
                reason: "write rejected".to_string(),
            });
        }
        self.recorded.lock().segments[self.index]
            .frames
            .push(frame.sequence);
        Ok(())
    }

    fn finalize(&mut self) -> RecorderResult<()> {
        let mut recorded = self.recorded.lock();
        recorded.segments[self.index].finalize_calls += 1;
        if !self.finalized {
            self.finalized = true;
            recorded.segments[self.index].finalized = true;
            if let Some(open) = recorded.open_by_camera.get_mut(&self.key) {
                *open -= 1;
            }
        }
        Ok(())
    }

    fn is_finalized(&self) -> bool {
        self.finalized
    }
}
