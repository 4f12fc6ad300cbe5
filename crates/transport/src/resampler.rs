//! Streaming PCM16 resampler
//!
//! One instance per direction. Carries partial samples and unconsumed input
//! between calls so chunk boundaries do not introduce discontinuities.

use rubato::{FftFixedIn, Resampler as RubatoResampler};

use voice_gateway_core::audio::{samples_per_20ms, BYTES_PER_SAMPLE};

use crate::TransportError;

/// Stateful mono resampler over host-order PCM16 bytes
pub struct StreamResampler {
    from_rate: u32,
    to_rate: u32,
    inner: Option<FftFixedIn<f32>>,
    pending_input: Vec<f32>,
    pending_byte: Option<u8>,
}

impl Default for StreamResampler {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamResampler {
    pub fn new() -> Self {
        Self {
            from_rate: 0,
            to_rate: 0,
            inner: None,
            pending_input: Vec::new(),
            pending_byte: None,
        }
    }

    /// Resample a chunk of PCM16 bytes from `from_rate` to `to_rate`
    ///
    /// May return an empty buffer while input is still being accumulated.
    /// A change of rates rebuilds the inner resampler and drops carried input.
    pub fn resample(
        &mut self,
        data: &[u8],
        from_rate: u32,
        to_rate: u32,
    ) -> Result<Vec<u8>, TransportError> {
        if from_rate == 0 || to_rate == 0 {
            return Err(TransportError::Resample(format!(
                "Invalid sample rates: {} -> {}",
                from_rate, to_rate
            )));
        }

        if from_rate != self.from_rate || to_rate != self.to_rate {
            self.rebuild(from_rate, to_rate)?;
        }

        let samples = self.take_samples(data);

        if from_rate == to_rate {
            return Ok(samples
                .iter()
                .flat_map(|&s| (s as i16).to_ne_bytes())
                .collect());
        }

        let resampler = match self.inner.as_mut() {
            Some(r) => r,
            None => {
                return Err(TransportError::Resample(
                    "Resampler not initialized".to_string(),
                ))
            },
        };

        self.pending_input
            .extend(samples.iter().map(|&s| s / i16::MAX as f32));

        let mut output = Vec::new();
        loop {
            let needed = resampler.input_frames_next();
            if self.pending_input.len() < needed {
                break;
            }

            let chunk = vec![self.pending_input.drain(..needed).collect::<Vec<f32>>()];
            let processed = resampler
                .process(&chunk, None)
                .map_err(|e| TransportError::Resample(e.to_string()))?;

            if let Some(channel) = processed.first() {
                output.extend(channel.iter().flat_map(|&s| {
                    let clamped = (s * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32);
                    (clamped as i16).to_ne_bytes()
                }));
            }
        }

        Ok(output)
    }

    /// Discard carried input and partial samples
    pub fn reset(&mut self) {
        self.pending_input.clear();
        self.pending_byte = None;
        if let Some(inner) = self.inner.as_mut() {
            inner.reset();
        }
    }

    /// Samples waiting for a full resampler chunk
    pub fn pending_samples(&self) -> usize {
        self.pending_input.len()
    }

    fn rebuild(&mut self, from_rate: u32, to_rate: u32) -> Result<(), TransportError> {
        self.inner = if from_rate == to_rate {
            None
        } else {
            let chunk_size = samples_per_20ms(from_rate).max(1);
            let resampler =
                FftFixedIn::<f32>::new(from_rate as usize, to_rate as usize, chunk_size, 1, 1)
                    .map_err(|e| {
                        TransportError::Resample(format!(
                            "Failed to create resampler {} -> {}: {}",
                            from_rate, to_rate, e
                        ))
                    })?;
            Some(resampler)
        };

        tracing::debug!(from_rate, to_rate, "Resampler configured");

        self.from_rate = from_rate;
        self.to_rate = to_rate;
        self.pending_input.clear();
        self.pending_byte = None;
        Ok(())
    }

    /// Join a carried odd byte with new data and split into whole samples
    fn take_samples(&mut self, data: &[u8]) -> Vec<f32> {
        let mut bytes = Vec::with_capacity(data.len() + 1);
        if let Some(b) = self.pending_byte.take() {
            bytes.push(b);
        }
        bytes.extend_from_slice(data);

        if bytes.len() % BYTES_PER_SAMPLE != 0 {
            self.pending_byte = bytes.pop();
        }

        bytes
            .chunks_exact(BYTES_PER_SAMPLE)
            .map(|pair| i16::from_ne_bytes([pair[0], pair[1]]) as f32)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(samples: usize, rate: u32) -> Vec<u8> {
        (0..samples)
            .flat_map(|i| {
                let t = i as f32 / rate as f32;
                (((t * 440.0 * std::f32::consts::TAU).sin() * 8000.0) as i16).to_ne_bytes()
            })
            .collect()
    }

    #[test]
    fn test_equal_rates_passthrough() {
        let mut resampler = StreamResampler::new();
        let input = tone(160, 8000);
        let output = resampler.resample(&input, 8000, 8000).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn test_equal_rates_carry_odd_byte() {
        let mut resampler = StreamResampler::new();
        let input = tone(4, 8000);

        let first = resampler.resample(&input[..3], 8000, 8000).unwrap();
        assert_eq!(first, input[..2].to_vec());

        let second = resampler.resample(&input[3..], 8000, 8000).unwrap();
        assert_eq!(second, input[2..].to_vec());
    }

    #[test]
    fn test_small_input_accumulates() {
        let mut resampler = StreamResampler::new();
        let output = resampler.resample(&tone(10, 16000), 16000, 8000).unwrap();
        assert!(output.is_empty());
        assert_eq!(resampler.pending_samples(), 10);
    }

    #[test]
    fn test_downsample_one_second() {
        let mut resampler = StreamResampler::new();
        let input = tone(16000, 16000);

        let mut total = 0;
        for chunk in input.chunks(1000) {
            total += resampler.resample(chunk, 16000, 8000).unwrap().len();
        }

        let samples = total / BYTES_PER_SAMPLE;
        assert!((7840..=8000).contains(&samples), "got {} samples", samples);
    }

    #[test]
    fn test_upsample_produces_more_samples() {
        let mut resampler = StreamResampler::new();
        let input = tone(1600, 8000);
        let output = resampler.resample(&input, 8000, 24000).unwrap();
        assert_eq!(output.len() / BYTES_PER_SAMPLE, 4800);
    }

    #[test]
    fn test_reset_discards_pending() {
        let mut resampler = StreamResampler::new();
        resampler.resample(&tone(100, 16000), 16000, 8000).unwrap();
        assert!(resampler.pending_samples() > 0);

        resampler.reset();
        assert_eq!(resampler.pending_samples(), 0);
    }

    #[test]
    fn test_zero_rate_rejected() {
        let mut resampler = StreamResampler::new();
        assert!(matches!(
            resampler.resample(&[0, 0], 0, 8000),
            Err(TransportError::Resample(_))
        ));
    }
}
