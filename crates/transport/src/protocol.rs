//! Media-streaming wire messages
//!
//! Inbound text frames are parsed into [`WireMessage`]; outbound frames are
//! rendered from [`OutboundMessage`].

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::TransportError;

/// Parsed inbound message from the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    /// Socket connected, sent before `start`
    Connected,
    /// Stream started with call metadata and media format
    Start(StreamStart),
    /// Caller audio, base64-decoded
    Media { payload: Vec<u8> },
    /// Keypad press; not yet validated
    Dtmf { digit: String },
    /// Provider ended the stream
    Stop,
    /// Any other event, kept by name
    Other(String),
}

/// The `start` event
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StreamStart {
    #[serde(default)]
    pub stream_id: String,
    #[serde(default)]
    pub start: StartMetadata,
}

/// Call metadata carried by `start`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StartMetadata {
    #[serde(default)]
    pub call_control_id: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub media_format: Option<MediaFormat>,
}

/// Negotiated media format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaFormat {
    pub encoding: String,
    #[serde(default)]
    pub sample_rate: Option<u32>,
    #[serde(default)]
    pub channels: Option<u16>,
}

impl StreamStart {
    pub fn call_control_id(&self) -> Option<&str> {
        self.start.call_control_id.as_deref()
    }

    pub fn media_format(&self) -> Option<&MediaFormat> {
        self.start.media_format.as_ref()
    }
}

impl WireMessage {
    /// Parse one inbound text frame
    ///
    /// Malformed JSON, a missing `event`, and a media event without a
    /// decodable non-empty payload are protocol errors.
    pub fn parse(text: &str) -> Result<Self, TransportError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| TransportError::Protocol(format!("Invalid JSON: {}", e)))?;

        let event = value
            .get("event")
            .and_then(Value::as_str)
            .ok_or_else(|| TransportError::Protocol("Missing event field".to_string()))?;

        match event {
            "connected" => Ok(WireMessage::Connected),
            "start" => serde_json::from_value(value.clone())
                .map(WireMessage::Start)
                .map_err(|e| TransportError::Protocol(format!("Invalid start event: {}", e))),
            "media" => {
                let encoded = value
                    .pointer("/media/payload")
                    .and_then(Value::as_str)
                    .filter(|p| !p.is_empty())
                    .ok_or_else(|| {
                        TransportError::Protocol("Media event without payload".to_string())
                    })?;
                let payload = BASE64
                    .decode(encoded)
                    .map_err(|e| TransportError::Protocol(format!("Invalid base64: {}", e)))?;
                Ok(WireMessage::Media { payload })
            },
            "dtmf" => {
                let digit = value
                    .pointer("/dtmf/digit")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        TransportError::Protocol("DTMF event without digit".to_string())
                    })?;
                Ok(WireMessage::Dtmf {
                    digit: digit.to_string(),
                })
            },
            "stop" => Ok(WireMessage::Stop),
            other => Ok(WireMessage::Other(other.to_string())),
        }
    }

    pub fn event_name(&self) -> &str {
        match self {
            WireMessage::Connected => "connected",
            WireMessage::Start(_) => "start",
            WireMessage::Media { .. } => "media",
            WireMessage::Dtmf { .. } => "dtmf",
            WireMessage::Stop => "stop",
            WireMessage::Other(name) => name,
        }
    }
}

/// Outbound messages sent to the provider
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OutboundMessage {
    Media { media: MediaPayload },
    Clear,
}

#[derive(Debug, Serialize)]
pub struct MediaPayload {
    pub payload: String,
}

impl OutboundMessage {
    /// Media message carrying `encoded` audio as base64
    pub fn media(encoded: &[u8]) -> Self {
        OutboundMessage::Media {
            media: MediaPayload {
                payload: BASE64.encode(encoded),
            },
        }
    }

    pub fn to_json(&self) -> Result<String, TransportError> {
        serde_json::to_string(self)
            .map_err(|e| TransportError::Protocol(format!("Failed to serialize: {}", e)))
    }
}
