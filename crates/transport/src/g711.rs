//! G.711 buffer framing (mu-law and A-law)
//!
//! Per-sample companding comes from `audio-codec-algorithms`; this module maps
//! host-order PCM16 byte buffers to one companded byte per sample and back.
//! A trailing odd byte in PCM input is dropped.

use audio_codec_algorithms as law;
use voice_gateway_core::audio::BYTES_PER_SAMPLE;

fn samples(pcm: &[u8]) -> impl Iterator<Item = i16> + '_ {
    pcm.chunks_exact(BYTES_PER_SAMPLE)
        .map(|pair| i16::from_ne_bytes([pair[0], pair[1]]))
}

/// PCM16 bytes to mu-law bytes
pub fn encode_ulaw(pcm: &[u8]) -> Vec<u8> {
    samples(pcm).map(law::encode_ulaw).collect()
}

/// Mu-law bytes to PCM16 bytes
pub fn decode_ulaw(encoded: &[u8]) -> Vec<u8> {
    encoded
        .iter()
        .flat_map(|&b| law::decode_ulaw(b).to_ne_bytes())
        .collect()
}

/// PCM16 bytes to A-law bytes
pub fn encode_alaw(pcm: &[u8]) -> Vec<u8> {
    samples(pcm).map(law::encode_alaw).collect()
}

/// A-law bytes to PCM16 bytes
pub fn decode_alaw(encoded: &[u8]) -> Vec<u8> {
    encoded
        .iter()
        .flat_map(|&b| law::decode_alaw(b).to_ne_bytes())
        .collect()
}
