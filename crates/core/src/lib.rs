//! Core types for the voice gateway
//!
//! This crate provides the types shared between the telephony transport and
//! the voice pipeline it feeds:
//! - Audio chunks (16-bit PCM, host byte order)
//! - Pipeline frames (audio, DTMF, lifecycle)
//! - DTMF keypad entries
//! - The pipeline connector trait
//! - Error types

pub mod audio;
pub mod dtmf;
pub mod error;
pub mod frame;
pub mod traits;

pub use audio::AudioChunk;
pub use dtmf::KeypadEntry;
pub use error::{AudioError, Error, Result};
pub use frame::PipelineFrame;
pub use traits::{CallInfo, PipelineConnector, PipelineLink};
