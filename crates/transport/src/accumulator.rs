//! Fixed-size frame accumulation for frame-based codecs

/// Cuts an arbitrary byte stream into exact-size frames, carrying the tail
#[derive(Debug, Clone)]
pub struct FrameAccumulator {
    pending: Vec<u8>,
    frame_size_bytes: usize,
}

impl FrameAccumulator {
    pub fn new(frame_size_bytes: usize) -> Self {
        Self {
            pending: Vec::with_capacity(frame_size_bytes * 2),
            frame_size_bytes: frame_size_bytes.max(1),
        }
    }

    /// Append `data` and return every complete frame now available, in order
    pub fn push(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        self.pending.extend_from_slice(data);

        let mut frames = Vec::with_capacity(self.pending.len() / self.frame_size_bytes);
        let mut offset = 0;
        while offset + self.frame_size_bytes <= self.pending.len() {
            frames.push(self.pending[offset..offset + self.frame_size_bytes].to_vec());
            offset += self.frame_size_bytes;
        }
        self.pending.drain(..offset);

        frames
    }

    /// Drop any partial frame
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn frame_size_bytes(&self) -> usize {
        self.frame_size_bytes
    }
}
