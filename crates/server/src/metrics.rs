//! Observability Metrics
//!
//! Prometheus metrics endpoint for monitoring.

use axum::{
    http::{header, StatusCode},
    response::IntoResponse,
};
use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

/// Global Prometheus handle
static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize metrics recorder
///
/// Call once at startup; later calls return the existing handle.
pub fn init_metrics() -> Option<PrometheusHandle> {
    if let Some(handle) = METRICS_HANDLE.get() {
        return Some(handle.clone());
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            register_default_metrics();
            Some(METRICS_HANDLE.get_or_init(|| handle).clone())
        },
        Err(e) => {
            tracing::error!(error = %e, "Failed to install Prometheus recorder");
            None
        },
    }
}

/// Get the global metrics handle
pub fn get_metrics_handle() -> Option<&'static PrometheusHandle> {
    METRICS_HANDLE.get()
}

fn register_default_metrics() {
    gauge!("voice_gateway_sessions_active").set(0.0);
    counter!("voice_gateway_sessions_started_total").absolute(0);

    counter!("voice_gateway_messages_total", "direction" => "inbound").absolute(0);
    counter!("voice_gateway_messages_total", "direction" => "outbound").absolute(0);

    counter!("voice_gateway_sessions_rejected_total", "reason" => "capacity").absolute(0);
    counter!("voice_gateway_sessions_rejected_total", "reason" => "handshake").absolute(0);
}

/// Record a session that reached media flow
pub fn record_session_started() {
    counter!("voice_gateway_sessions_started_total").increment(1);
}

pub fn record_active_sessions(count: usize) {
    gauge!("voice_gateway_sessions_active").set(count as f64);
}

/// Record a session refused before media began
pub fn record_session_rejected(reason: &'static str) {
    counter!("voice_gateway_sessions_rejected_total", "reason" => reason).increment(1);
}

/// Record wire messages received or sent
pub fn record_messages(direction: &'static str, count: usize) {
    counter!("voice_gateway_messages_total", "direction" => direction).increment(count as u64);
}

/// Metrics endpoint handler
///
/// Returns Prometheus-formatted metrics.
pub async fn metrics_handler() -> impl IntoResponse {
    match get_metrics_handle() {
        Some(handle) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                "text/plain; version=0.0.4; charset=utf-8",
            )],
            handle.render(),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain")],
            "Metrics not initialized".to_string(),
        ),
    }
}
