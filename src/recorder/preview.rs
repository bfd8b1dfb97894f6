//! Per-camera preview channel
//!
//! Bounded and lossy: publishing never blocks. When the channel is full the
//! oldest queued preview is dropped, so the consumer always sees the freshest
//! frame no matter how slowly it polls.

use crate::capture::CameraHandle;
use crossbeam_queue::ArrayQueue;
use std::sync::Arc;
use std::time::Instant;

/// JPEG snapshot of one captured frame
#[derive(Debug, Clone)]
pub struct PreviewFrame {
    pub camera: CameraHandle,

    /// JPEG-encoded image
    pub jpeg: Vec<u8>,

    /// Preview dimensions (after downscaling)
    pub width: u32,
    pub height: u32,

    /// Sequence number of the source frame
    pub sequence: u64,

    pub captured_at: Instant,
}

/// One-way preview conduit from a worker to the consumer.
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct PreviewChannel {
    queue: Arc<ArrayQueue<PreviewFrame>>,
}

impl PreviewChannel {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Arc::new(ArrayQueue::new(capacity.max(1))),
        }
    }

    /// Queue a preview without blocking.
    ///
    /// Returns `true` if an older preview was evicted to make room.
    pub fn publish(&self, frame: PreviewFrame) -> bool {
        match self.queue.force_push(frame) {
            Some(evicted) => {
                tracing::trace!(
                    "Preview channel for {} full, dropped frame {}",
                    evicted.camera,
                    evicted.sequence
                );
                true
            }
            None => false,
        }
    }

    /// Take the freshest queued preview, discarding older ones
    pub fn take_latest(&self) -> Option<PreviewFrame> {
        let mut latest = None;
        while let Some(frame) = self.queue.pop() {
            latest = Some(frame);
        }
        latest
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
