//! Recording system module
//!
//! This module implements the multi-camera recording architecture:
//! - RecordingSupervisor to start and stop one worker per camera
//! - RecordingWorker owning a camera and its rotating segments
//! - PreviewChannel carrying lossy JPEG previews to the consumer

pub mod clock;
pub mod preview;
pub mod segment;
pub mod state;
pub mod supervisor;
pub mod worker;

pub use clock::{Clock, SystemClock};
pub use preview::{PreviewChannel, PreviewFrame};
pub use segment::SegmentInfo;
pub use state::{
    CameraStatus, RecordingSettings, SessionSummary, StartReport, StartedCamera, WorkerOutcome,
    WorkerReport, WorkerState,
};
pub use supervisor::{RecordingSupervisor, Session, SupervisorOptions};
pub use worker::{RecordingWorker, WorkerConfig, WorkerResources};
