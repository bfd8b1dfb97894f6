//! Command handlers
//!
//! This module contains the handlers a presentation layer (the CLI, or any
//! UI embedding the library) calls to drive recording.

pub mod recording;

pub use recording::{PreviewSlot, RecorderState, StartRecordingRequest};
