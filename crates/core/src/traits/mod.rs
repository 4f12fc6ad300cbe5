//! Core traits for the voice gateway
//!
//! The voice pipeline itself lives outside this workspace. The gateway only
//! needs to open a bidirectional frame channel to it per call, which is what
//! `PipelineConnector` describes.

mod pipeline;

pub use pipeline::{CallInfo, PipelineConnector, PipelineLink};
