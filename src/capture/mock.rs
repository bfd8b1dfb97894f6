//! Scripted camera backend for tests

use super::traits::{CameraBackend, CameraHandle, CaptureRequest, Frame, FrameSource, NegotiatedFormat};
use crate::utils::error::{RecorderError, RecorderResult};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Default)]
struct MockState {
    cameras: BTreeSet<u32>,
    failing_open: BTreeSet<u32>,
    read_failures: HashMap<u32, u64>,
    reads: HashMap<u32, Arc<AtomicU64>>,
    open_requests: Vec<(CameraHandle, CaptureRequest)>,
    closes: HashMap<u32, u32>,
}

#[derive(Clone)]
pub struct MockCameraBackend {
    state: Arc<Mutex<MockState>>,
    format: NegotiatedFormat,
}

impl MockCameraBackend {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            format: NegotiatedFormat {
                width: 2,
                height: 2,
                fps: Some(30),
            },
        }
    }

    pub fn with_cameras(self, indices: impl IntoIterator<Item = u32>) -> Self {
        self.state.lock().cameras.extend(indices);
        self
    }

    /// Report this format regardless of what was requested
    pub fn with_format(mut self, format: NegotiatedFormat) -> Self {
        self.format = format;
        self
    }

    pub fn failing_open(self, index: u32) -> Self {
        self.state.lock().failing_open.insert(index);
        self
    }

    /// Camera `index` fails its read after delivering `frames` frames
    pub fn failing_read_after(self, index: u32, frames: u64) -> Self {
        self.state.lock().read_failures.insert(index, frames);
        self
    }

    /// Frames delivered by a camera so far
    pub fn reads(&self, camera: CameraHandle) -> u64 {
        self.state
            .lock()
            .reads
            .get(&camera.index())
            .map(|r| r.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    pub fn open_requests(&self) -> Vec<(CameraHandle, CaptureRequest)> {
        self.state.lock().open_requests.clone()
    }

    pub fn close_count(&self, camera: CameraHandle) -> u32 {
        self.state
            .lock()
            .closes
            .get(&camera.index())
            .copied()
            .unwrap_or(0)
    }

    /// Block until `camera` has delivered at least `frames` frames
    pub fn wait_for_reads(&self, camera: CameraHandle, frames: u64) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while self.reads(camera) < frames {
            assert!(
                Instant::now() < deadline,
                "{camera} delivered only {} of {frames} frames",
                self.reads(camera)
            );
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}

impl CameraBackend for MockCameraBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn open(
        &self,
        camera: CameraHandle,
        request: &CaptureRequest,
    ) -> RecorderResult<Box<dyn FrameSource>> {
        let mut state = self.state.lock();
        state.open_requests.push((camera, *request));

        let index = camera.index();
        if !state.cameras.contains(&index) || state.failing_open.contains(&index) {
            return Err(RecorderError::CannotOpen {
                camera,
                reason: "no such device".to_string(),
            });
        }

        let reads = state
            .reads
            .entry(index)
            .or_insert_with(|| Arc::new(AtomicU64::new(0)))
            .clone();

        Ok(Box::new(MockFrameSource {
            camera,
            format: self.format,
            reads,
            fail_after: state.read_failures.get(&index).copied(),
            state: self.state.clone(),
            sequence: 0,
            closed: false,
        }))
    }
}

struct MockFrameSource {
    camera: CameraHandle,
    format: NegotiatedFormat,
    reads: Arc<AtomicU64>,
    fail_after: Option<u64>,
    state: Arc<Mutex<MockState>>,
    sequence: u64,
    closed: bool,
}

impl FrameSource for MockFrameSource {
    fn format(&self) -> NegotiatedFormat {
        self.format
    }

    fn read_frame(&mut self) -> RecorderResult<Frame> {
        // Stand-in for the device's frame interval
        std::thread::sleep(Duration::from_micros(200));

        if self.closed || self.fail_after.is_some_and(|limit| self.sequence >= limit) {
            return Err(RecorderError::ReadFailed {
                camera: self.camera,
                reason: "device unplugged".to_string(),
            });
        }

        let frame = Frame {
            data: vec![self.sequence as u8; Frame::expected_len(self.format.width, self.format.height)],
            width: self.format.width,
            height: self.format.height,
            sequence: self.sequence,
            captured_at: Instant::now(),
        };
        self.sequence += 1;
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(frame)
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            *self.state.lock().closes.entry(self.camera.index()).or_insert(0) += 1;
        }
    }
}
