//! Centralized constants for the voice gateway
//!
//! Defaults and protocol values shared by the config, transport and server
//! crates. Keep wire-level numbers here instead of scattering literals.

/// Audio framing constants
pub mod audio {
    /// Sample rates libopus accepts
    pub const OPUS_SAMPLE_RATES: [u32; 5] = [8000, 12000, 16000, 24000, 48000];

    /// Default wire sample rate for HD telephony (OPUS/L16)
    pub const DEFAULT_WIRE_SAMPLE_RATE: u32 = 16000;

    /// G.711 is always carried at narrowband rate
    pub const NARROWBAND_SAMPLE_RATE: u32 = 8000;

    /// Codec frame duration
    pub const FRAME_DURATION_MS: u32 = 20;

    /// Largest Opus packet we will emit
    pub const MAX_OPUS_PACKET_BYTES: usize = 4000;
}

/// Telephony provider constants
pub mod telephony {
    /// Wire names of the encodings the gateway speaks
    pub const SUPPORTED_ENCODINGS: [&str; 4] = ["OPUS", "L16", "PCMU", "PCMA"];

    /// Encoding used when the provider negotiates something unsupported
    pub const DEFAULT_FALLBACK_ENCODING: &str = "PCMU";

    /// How long to wait for the stream `start` event
    pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 5000;
}

/// Call-control REST API constants
pub mod call_control {
    /// Base URL of the call-control API
    pub const DEFAULT_API_BASE_URL: &str = "https://api.telnyx.com/v2";

    /// Environment variable holding the API key
    pub const API_KEY_ENV: &str = "TELNYX_API_KEY";

    /// Request timeout for hangup/transfer actions
    pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

    /// Error code reported when the call has already ended
    pub const ALREADY_TERMINATED_CODE: &str = "90018";
}

/// HTTP endpoint defaults
pub mod endpoints {
    pub const DEFAULT_HOST: &str = "0.0.0.0";
    pub const DEFAULT_PORT: u16 = 8080;
    pub const DEFAULT_WS_PATH: &str = "/ws";
}
