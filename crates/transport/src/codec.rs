//! Audio Codec Support
//!
//! Codec selection plus the OPUS and L16 adapters. G.711 companding lives in
//! [`crate::g711`].

use audiopus::{
    coder::{Decoder, Encoder},
    packet::Packet,
    Application, Channels, MutSignals, SampleRate as OpusSampleRate,
};
use std::fmt;
use std::str::FromStr;

use voice_gateway_config::constants::audio::{
    FRAME_DURATION_MS, MAX_OPUS_PACKET_BYTES, OPUS_SAMPLE_RATES,
};
use voice_gateway_config::TelephonyConfig;
use voice_gateway_core::audio::{samples_per_20ms, BYTES_PER_SAMPLE};

use crate::TransportError;

/// Codecs carried on the media stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioCodec {
    /// Opus, fixed 20ms frames
    Opus,
    /// Linear 16-bit PCM, big-endian on the wire
    L16,
    /// G.711 mu-law
    Pcmu,
    /// G.711 A-law
    Pcma,
}

impl AudioCodec {
    /// Name used by the provider on the wire
    pub fn wire_name(&self) -> &'static str {
        match self {
            AudioCodec::Opus => "OPUS",
            AudioCodec::L16 => "L16",
            AudioCodec::Pcmu => "PCMU",
            AudioCodec::Pcma => "PCMA",
        }
    }
}

impl FromStr for AudioCodec {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OPUS" => Ok(AudioCodec::Opus),
            "L16" => Ok(AudioCodec::L16),
            "PCMU" => Ok(AudioCodec::Pcmu),
            "PCMA" => Ok(AudioCodec::Pcma),
            _ => Err(TransportError::Configuration(format!(
                "Unsupported encoding: {:?}. Supported: OPUS, L16, PCMU, PCMA",
                s
            ))),
        }
    }
}

impl fmt::Display for AudioCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Per-session codec configuration, fixed once the stream starts
///
/// `outbound_codec` encodes audio sent to the caller; `inbound_codec`
/// decodes audio received from the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecConfig {
    pub inbound_codec: AudioCodec,
    pub outbound_codec: AudioCodec,
    /// Sample rate of audio on the wire
    pub wire_sample_rate: u32,
    /// Pipeline rate override; `None` takes the rate announced at start
    pub pipeline_sample_rate: Option<u32>,
}

impl CodecConfig {
    /// Build from the telephony settings section
    pub fn from_settings(config: &TelephonyConfig) -> Result<Self, TransportError> {
        let codecs = Self {
            inbound_codec: config.inbound_encoding.parse()?,
            outbound_codec: config.outbound_encoding.parse()?,
            wire_sample_rate: config.wire_sample_rate,
            pipeline_sample_rate: config.pipeline_sample_rate,
        };
        codecs.validate()?;
        Ok(codecs)
    }

    /// Check the rate constraints of the chosen codecs
    pub fn validate(&self) -> Result<(), TransportError> {
        if self.wire_sample_rate == 0 {
            return Err(TransportError::Configuration(
                "Wire sample rate cannot be 0".to_string(),
            ));
        }
        if self.pipeline_sample_rate == Some(0) {
            return Err(TransportError::Configuration(
                "Pipeline sample rate cannot be 0".to_string(),
            ));
        }
        let uses_opus = self.inbound_codec == AudioCodec::Opus
            || self.outbound_codec == AudioCodec::Opus;
        if uses_opus && !OPUS_SAMPLE_RATES.contains(&self.wire_sample_rate) {
            return Err(TransportError::Configuration(format!(
                "Unsupported sample rate for OPUS: {}. Use 8000, 12000, 16000, 24000, or 48000",
                self.wire_sample_rate
            )));
        }
        Ok(())
    }

    /// Bytes of 16-bit PCM in one codec frame at the wire rate
    pub fn frame_size_bytes(&self) -> usize {
        (self.wire_sample_rate * FRAME_DURATION_MS / 1000) as usize * BYTES_PER_SAMPLE
    }
}

fn opus_sample_rate(sample_rate: u32) -> Result<OpusSampleRate, TransportError> {
    match sample_rate {
        8000 => Ok(OpusSampleRate::Hz8000),
        12000 => Ok(OpusSampleRate::Hz12000),
        16000 => Ok(OpusSampleRate::Hz16000),
        24000 => Ok(OpusSampleRate::Hz24000),
        48000 => Ok(OpusSampleRate::Hz48000),
        _ => Err(TransportError::Configuration(format!(
            "Unsupported sample rate: {}. Use 8000, 12000, 16000, 24000, or 48000",
            sample_rate
        ))),
    }
}

fn pcm_bytes_to_i16(pcm: &[u8]) -> Vec<i16> {
    pcm.chunks_exact(BYTES_PER_SAMPLE)
        .map(|pair| i16::from_ne_bytes([pair[0], pair[1]]))
        .collect()
}

fn i16_to_pcm_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_ne_bytes()).collect()
}

/// Opus encoder wrapper (mono, VoIP application)
pub struct OpusEncoder {
    encoder: Encoder,
    sample_rate: u32,
    frame_samples: usize,
}

impl OpusEncoder {
    /// Create a new Opus encoder
    ///
    /// # Arguments
    /// * `sample_rate` - Sample rate (8000, 12000, 16000, 24000, 48000)
    pub fn new(sample_rate: u32) -> Result<Self, TransportError> {
        let encoder = Encoder::new(opus_sample_rate(sample_rate)?, Channels::Mono, Application::Voip)
            .map_err(|e| {
                TransportError::Configuration(format!("Failed to create Opus encoder: {}", e))
            })?;

        tracing::debug!(sample_rate, "Opus encoder created: mono VoIP");

        Ok(Self {
            encoder,
            sample_rate,
            frame_samples: samples_per_20ms(sample_rate),
        })
    }

    /// Encode exactly one 20ms frame of host-order PCM16 bytes
    pub fn encode_frame(&mut self, pcm: &[u8]) -> Result<Vec<u8>, TransportError> {
        if pcm.len() != self.frame_bytes() {
            return Err(TransportError::Codec(format!(
                "Invalid frame size: expected {} bytes, got {}",
                self.frame_bytes(),
                pcm.len()
            )));
        }

        let samples = pcm_bytes_to_i16(pcm);
        let mut output = vec![0u8; MAX_OPUS_PACKET_BYTES];

        let encoded_len = self
            .encoder
            .encode(&samples, &mut output)
            .map_err(|e| TransportError::Codec(format!("Opus encode error: {}", e)))?;

        output.truncate(encoded_len);
        Ok(output)
    }

    /// Frame size in samples
    pub fn frame_samples(&self) -> usize {
        self.frame_samples
    }

    /// Frame size in PCM16 bytes
    pub fn frame_bytes(&self) -> usize {
        self.frame_samples * BYTES_PER_SAMPLE
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Opus decoder wrapper (mono)
pub struct OpusDecoder {
    decoder: Decoder,
    sample_rate: u32,
    frame_samples: usize,
}

impl OpusDecoder {
    /// Create a new Opus decoder
    pub fn new(sample_rate: u32) -> Result<Self, TransportError> {
        let decoder = Decoder::new(opus_sample_rate(sample_rate)?, Channels::Mono).map_err(|e| {
            TransportError::Configuration(format!("Failed to create Opus decoder: {}", e))
        })?;

        tracing::debug!(sample_rate, "Opus decoder created: mono");

        Ok(Self {
            decoder,
            sample_rate,
            frame_samples: samples_per_20ms(sample_rate),
        })
    }

    /// Decode one packet into host-order PCM16 bytes
    ///
    /// The output buffer is sized for a single 20ms frame at the wire rate.
    pub fn decode(&mut self, packet: &[u8]) -> Result<Vec<u8>, TransportError> {
        let mut output = vec![0i16; self.frame_samples];

        let packet = Packet::try_from(packet)
            .map_err(|e| TransportError::Codec(format!("Invalid Opus packet: {}", e)))?;
        let signals = MutSignals::try_from(&mut output[..])
            .map_err(|e| TransportError::Codec(format!("Signal buffer error: {}", e)))?;

        let decoded_len = self
            .decoder
            .decode(Some(packet), signals, false)
            .map_err(|e| TransportError::Codec(format!("Opus decode error: {}", e)))?;

        Ok(i16_to_pcm_bytes(&output[..decoded_len]))
    }

    pub fn frame_samples(&self) -> usize {
        self.frame_samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// L16 conversion between host-order pipeline PCM and big-endian wire PCM
pub mod l16 {
    use super::BYTES_PER_SAMPLE;

    /// Host order to network order; a trailing odd byte is dropped
    pub fn to_wire(pcm: &[u8]) -> Vec<u8> {
        pcm.chunks_exact(BYTES_PER_SAMPLE)
            .flat_map(|pair| i16::from_ne_bytes([pair[0], pair[1]]).to_be_bytes())
            .collect()
    }

    /// Network order to host order; a trailing odd byte is dropped
    pub fn from_wire(payload: &[u8]) -> Vec<u8> {
        payload
            .chunks_exact(BYTES_PER_SAMPLE)
            .flat_map(|pair| i16::from_be_bytes([pair[0], pair[1]]).to_ne_bytes())
            .collect()
    }
}
