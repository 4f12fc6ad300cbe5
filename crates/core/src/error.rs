//! Error types for the voice gateway

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the voice gateway
#[derive(Error, Debug)]
pub enum Error {
    // Audio errors
    #[error("Audio processing error: {0}")]
    Audio(#[from] AudioError),

    // Pipeline errors
    #[error("Pipeline error: {0}")]
    Pipeline(String),
}

/// Audio-specific errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    #[error("Unsupported sample rate: {0}")]
    UnsupportedSampleRate(u32),

    #[error("Invalid keypad entry: {0:?}")]
    InvalidKeypadEntry(String),
}
