//! Voice Gateway Transport Layer
//!
//! Bidirectional transcoding between the voice pipeline's raw PCM frames and
//! the telephony provider's JSON media-streaming protocol.
//!
//! Provides:
//! - Codec adapters for OPUS, L16, PCMU and PCMA
//! - A stateful streaming resampler per direction
//! - Fixed 20ms frame accumulation for OPUS
//! - The wire protocol translator (`TelnyxFrameSerializer`)
//! - Stream handshake parsing and codec negotiation
//! - The call-control REST side channel (hangup/transfer)

pub mod accumulator;
pub mod call_control;
pub mod codec;
pub mod g711;
pub mod handshake;
pub mod protocol;
pub mod resampler;
pub mod serializer;

pub use accumulator::FrameAccumulator;
pub use call_control::{
    CallControl, CallControlError, HangupOutcome, TelnyxCallControl, TransferRequest,
};
pub use codec::{AudioCodec, CodecConfig, OpusDecoder, OpusEncoder};
pub use handshake::{await_stream_start, negotiate_codecs, parse_start_message, NegotiationPolicy};
pub use protocol::{MediaFormat, OutboundMessage, StartMetadata, StreamStart, WireMessage};
pub use resampler::StreamResampler;
pub use serializer::{
    InboundLane, OutboundLane, SerializerParams, SessionHandle, SessionPhase,
    TelnyxFrameSerializer,
};

use thiserror::Error;

/// Transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    /// Unsupported codec, invalid rate or missing capability; fatal at setup
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Resampling error: {0}")]
    Resample(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Timeout: {0}")]
    Timeout(String),
}

impl TransportError {
    /// Whether the error must prevent the session from starting
    pub fn is_fatal(&self) -> bool {
        matches!(self, TransportError::Configuration(_))
    }
}
