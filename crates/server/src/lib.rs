//! Voice Gateway Server
//!
//! Accepts the telephony provider's media-stream WebSocket, transcodes audio
//! through the transport layer and bridges it to a voice pipeline.

pub mod http;
pub mod loopback;
pub mod metrics;
pub mod state;
pub mod websocket;

pub use http::create_router;
pub use loopback::LoopbackPipeline;
pub use metrics::{init_metrics, metrics_handler};
pub use state::{AppState, SessionSlot};
pub use websocket::{run_media_session, EndReason, SessionSummary};

use thiserror::Error;
use voice_gateway_transport::TransportError;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("Too many active sessions")]
    Capacity,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<TransportError> for ServerError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Configuration(msg) => ServerError::Configuration(msg),
            TransportError::Protocol(msg) | TransportError::Timeout(msg) => {
                ServerError::Handshake(msg)
            },
            other => ServerError::Internal(other.to_string()),
        }
    }
}

impl From<ServerError> for axum::http::StatusCode {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::Handshake(_) => axum::http::StatusCode::BAD_REQUEST,
            ServerError::Configuration(_) => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Pipeline(_) => axum::http::StatusCode::BAD_GATEWAY,
            ServerError::Capacity => axum::http::StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Internal(_) => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(StatusCode::from(ServerError::Capacity), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            StatusCode::from(ServerError::Handshake("x".into())),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_transport_error_mapping() {
        assert!(matches!(
            ServerError::from(TransportError::Configuration("bad codec".into())),
            ServerError::Configuration(_)
        ));
        assert!(matches!(
            ServerError::from(TransportError::Timeout("no start".into())),
            ServerError::Handshake(_)
        ));
    }
}
