//! Audio chunk types and utilities

/// Bytes per 16-bit PCM sample
pub const BYTES_PER_SAMPLE: usize = 2;

/// Channel count used throughout the gateway (telephony audio is mono)
pub const MONO: u16 = 1;

/// A block of raw PCM audio exchanged with the voice pipeline
///
/// Samples are 16-bit signed integers in host byte order. A chunk is built
/// once and then only read; there are no mutating accessors.
#[derive(Clone, PartialEq, Eq)]
pub struct AudioChunk {
    data: Vec<u8>,
    sample_rate: u32,
    channel_count: u16,
}

impl std::fmt::Debug for AudioChunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioChunk")
            .field("bytes", &self.data.len())
            .field("sample_rate", &self.sample_rate)
            .field("channel_count", &self.channel_count)
            .finish()
    }
}

impl AudioChunk {
    /// Create a mono chunk from raw PCM bytes
    pub fn new(data: Vec<u8>, sample_rate: u32) -> Self {
        Self {
            data,
            sample_rate,
            channel_count: MONO,
        }
    }

    /// Build a chunk from i16 samples
    pub fn from_samples(samples: &[i16], sample_rate: u32) -> Self {
        let data = samples.iter().flat_map(|s| s.to_ne_bytes()).collect();
        Self::new(data, sample_rate)
    }

    /// Raw PCM bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    /// Number of bytes in the chunk
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Decode the bytes into i16 samples; a trailing odd byte is ignored
    pub fn samples(&self) -> Vec<i16> {
        self.data
            .chunks_exact(BYTES_PER_SAMPLE)
            .map(|pair| i16::from_ne_bytes([pair[0], pair[1]]))
            .collect()
    }
}

/// Number of samples in a 20ms window at the given rate
pub fn samples_per_20ms(sample_rate: u32) -> usize {
    sample_rate as usize / 50
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_sizes() {
        assert_eq!(samples_per_20ms(16000), 320);
        assert_eq!(samples_per_20ms(8000), 160);
        assert_eq!(samples_per_20ms(48000), 960);
    }

    #[test]
    fn test_samples_round_trip() {
        let chunk = AudioChunk::from_samples(&[0x1234, -2, i16::MAX], 16000);
        assert_eq!(chunk.len(), 6);
        assert_eq!(chunk.samples(), vec![0x1234, -2, i16::MAX]);
        assert_eq!(chunk.channel_count(), MONO);
    }

    #[test]
    fn test_odd_trailing_byte_ignored() {
        let chunk = AudioChunk::new(vec![1, 0, 7], 8000);
        assert_eq!(chunk.samples().len(), 1);
    }
}
