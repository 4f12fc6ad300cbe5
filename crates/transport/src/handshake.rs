//! Stream handshake and codec negotiation

use futures::{Stream, StreamExt};
use std::time::Duration;

use voice_gateway_config::constants::audio::NARROWBAND_SAMPLE_RATE;
use voice_gateway_config::TelephonyConfig;

use crate::codec::{AudioCodec, CodecConfig};
use crate::protocol::{StreamStart, WireMessage};
use crate::TransportError;

/// Parse one handshake frame
///
/// Returns `Ok(None)` for frames that precede `start` (such as `connected`).
pub fn parse_start_message(text: &str) -> Result<Option<StreamStart>, TransportError> {
    match WireMessage::parse(text)? {
        WireMessage::Start(start) => Ok(Some(start)),
        WireMessage::Stop => Err(TransportError::Protocol(
            "Stream stopped before start".to_string(),
        )),
        other => {
            tracing::debug!(event = other.event_name(), "Skipping pre-start message");
            Ok(None)
        },
    }
}

/// Read text frames until the `start` event arrives
pub async fn await_stream_start<S>(
    stream: &mut S,
    timeout: Duration,
) -> Result<StreamStart, TransportError>
where
    S: Stream<Item = String> + Unpin,
{
    let read = async {
        while let Some(text) = stream.next().await {
            match WireMessage::parse(&text) {
                Ok(WireMessage::Start(start)) => return Ok(start),
                Ok(WireMessage::Stop) => {
                    return Err(TransportError::Protocol(
                        "Stream stopped before start".to_string(),
                    ))
                },
                Ok(other) => {
                    tracing::debug!(event = other.event_name(), "Skipping pre-start message");
                },
                Err(e) => {
                    tracing::warn!(error = %e, "Ignoring malformed handshake message");
                },
            }
        }
        Err(TransportError::Protocol(
            "Stream closed before start event".to_string(),
        ))
    };

    tokio::time::timeout(timeout, read).await.map_err(|_| {
        TransportError::Timeout(format!("No start event within {}ms", timeout.as_millis()))
    })?
}

/// How negotiated encodings map onto the codecs the gateway runs
#[derive(Debug, Clone, Copy)]
pub struct NegotiationPolicy {
    /// Codecs used when the provider announces no media format
    pub configured: CodecConfig,
    /// Codec used when the provider announces an unsupported encoding
    pub fallback: AudioCodec,
}

impl NegotiationPolicy {
    pub fn from_settings(config: &TelephonyConfig) -> Result<Self, TransportError> {
        Ok(Self {
            configured: CodecConfig::from_settings(config)?,
            fallback: config.fallback_encoding.parse()?,
        })
    }
}

/// Pick the session codecs from the `start` event
///
/// A supported encoding is used in both directions at the announced rate
/// (or the configured wire rate if none). An unsupported encoding falls back
/// to the policy's fallback at 8kHz. No media format keeps the configured
/// codecs.
pub fn negotiate_codecs(start: &StreamStart, policy: &NegotiationPolicy) -> CodecConfig {
    let configured = policy.configured;

    let Some(format) = start.media_format() else {
        return configured;
    };

    let negotiated = match format.encoding.parse::<AudioCodec>() {
        Ok(codec) => CodecConfig {
            inbound_codec: codec,
            outbound_codec: codec,
            wire_sample_rate: format.sample_rate.unwrap_or(configured.wire_sample_rate),
            pipeline_sample_rate: configured.pipeline_sample_rate,
        },
        Err(_) => {
            tracing::warn!(
                encoding = %format.encoding,
                fallback = %policy.fallback,
                "Unsupported negotiated encoding, falling back"
            );
            return fallback_codecs(policy);
        },
    };

    if let Err(e) = negotiated.validate() {
        tracing::warn!(
            encoding = %format.encoding,
            sample_rate = ?format.sample_rate,
            error = %e,
            "Negotiated format unusable, falling back"
        );
        return fallback_codecs(policy);
    }

    negotiated
}

fn fallback_codecs(policy: &NegotiationPolicy) -> CodecConfig {
    CodecConfig {
        inbound_codec: policy.fallback,
        outbound_codec: policy.fallback,
        wire_sample_rate: NARROWBAND_SAMPLE_RATE,
        pipeline_sample_rate: policy.configured.pipeline_sample_rate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{MediaFormat, StartMetadata};

    fn policy() -> NegotiationPolicy {
        NegotiationPolicy {
            configured: CodecConfig {
                inbound_codec: AudioCodec::Opus,
                outbound_codec: AudioCodec::Opus,
                wire_sample_rate: 16000,
                pipeline_sample_rate: Some(24000),
            },
            fallback: AudioCodec::Pcmu,
        }
    }

    fn start_with(encoding: Option<&str>, sample_rate: Option<u32>) -> StreamStart {
        StreamStart {
            stream_id: "s1".to_string(),
            start: StartMetadata {
                call_control_id: Some("cc1".to_string()),
                media_format: encoding.map(|e| MediaFormat {
                    encoding: e.to_string(),
                    sample_rate,
                    channels: Some(1),
                }),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_supported_encoding_used_as_negotiated() {
        let codecs = negotiate_codecs(&start_with(Some("PCMA"), Some(8000)), &policy());
        assert_eq!(codecs.inbound_codec, AudioCodec::Pcma);
        assert_eq!(codecs.outbound_codec, AudioCodec::Pcma);
        assert_eq!(codecs.wire_sample_rate, 8000);
        assert_eq!(codecs.pipeline_sample_rate, Some(24000));
    }

    #[test]
    fn test_unsupported_encoding_falls_back() {
        let codecs = negotiate_codecs(&start_with(Some("G722"), Some(16000)), &policy());
        assert_eq!(codecs.inbound_codec, AudioCodec::Pcmu);
        assert_eq!(codecs.outbound_codec, AudioCodec::Pcmu);
        assert_eq!(codecs.wire_sample_rate, 8000);
    }

    #[test]
    fn test_opus_at_invalid_rate_falls_back() {
        let codecs = negotiate_codecs(&start_with(Some("OPUS"), Some(44100)), &policy());
        assert_eq!(codecs.outbound_codec, AudioCodec::Pcmu);
        assert_eq!(codecs.wire_sample_rate, 8000);
    }

    #[test]
    fn test_missing_format_keeps_configured() {
        let codecs = negotiate_codecs(&start_with(None, None), &policy());
        assert_eq!(codecs, policy().configured);
    }

    #[test]
    fn test_parse_start_message_skips_connected() {
        assert!(parse_start_message(r#"{"event":"connected"}"#).unwrap().is_none());
        assert!(parse_start_message(r#"{"event":"stop"}"#).is_err());
        let start = parse_start_message(r#"{"event":"start","stream_id":"abc"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(start.stream_id, "abc");
    }

    #[tokio::test]
    async fn test_await_stream_start() {
        let mut frames = futures::stream::iter(vec![
            r#"{"event":"connected"}"#.to_string(),
            "garbage".to_string(),
            r#"{"event":"start","stream_id":"xyz","start":{"call_control_id":"cc"}}"#.to_string(),
        ]);

        let start = await_stream_start(&mut frames, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(start.stream_id, "xyz");
        assert_eq!(start.call_control_id(), Some("cc"));
    }

    #[tokio::test]
    async fn test_await_stream_start_closed() {
        let mut frames = futures::stream::iter(vec![r#"{"event":"connected"}"#.to_string()]);
        let result = await_stream_start(&mut frames, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(TransportError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_await_stream_start_timeout() {
        let mut frames = futures::stream::pending::<String>();
        let result = await_stream_start(&mut frames, Duration::from_millis(20)).await;
        assert!(matches!(result, Err(TransportError::Timeout(_))));
    }
}
