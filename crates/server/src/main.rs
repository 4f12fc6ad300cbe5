//! Voice Gateway Server Entry Point

use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use voice_gateway_config::{load_settings, Settings};
use voice_gateway_server::{create_router, init_metrics, AppState, LoopbackPipeline};
use voice_gateway_transport::{CallControl, TelnyxCallControl};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Priority: env vars > config/{env}.toml > config/default.toml > defaults
    let env = std::env::var("VOICE_GATEWAY_ENV").ok();
    let config = match load_settings(env.as_deref()) {
        Ok(settings) => {
            // Tracing not yet initialized, use eprintln for early logging
            eprintln!(
                "Loaded configuration from files (env: {})",
                env.as_deref().unwrap_or("default")
            );
            settings
        },
        Err(e) => {
            eprintln!("Warning: Failed to load config: {}. Using defaults.", e);
            Settings::default()
        },
    };

    init_tracing(&config);

    tracing::info!("Starting Voice Gateway v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        environment = ?config.environment,
        config_path = env.as_deref().unwrap_or("default"),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled && init_metrics().is_some() {
        tracing::info!("Initialized Prometheus metrics at /metrics");
    }

    let pipeline_rate = config
        .telephony
        .pipeline_sample_rate
        .unwrap_or(config.telephony.wire_sample_rate);
    let mut state = AppState::new(config.clone(), Arc::new(LoopbackPipeline::new(pipeline_rate)));

    match TelnyxCallControl::from_config(&config.call_control) {
        Ok(client) => {
            if config.call_control.api_key.is_none() {
                tracing::warn!("No call-control API key configured; hangup requests will be skipped");
            }
            let client: Arc<dyn CallControl> = Arc::new(client);
            state = state.with_call_control(client);
        },
        Err(e) => {
            tracing::error!(error = %e, "Failed to create call-control client; hangup disabled");
        },
    }

    let app = create_router(state);

    let host: std::net::IpAddr = config.server.host.parse()?;
    let addr = SocketAddr::new(host, config.server.port);
    tracing::info!(
        ws_path = %config.server.ws_path,
        max_connections = config.server.max_connections,
        "Listening on {}",
        addr
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

fn init_tracing(config: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.observability.log_level;
        format!("voice_gateway={},tower_http=info", level).into()
    });

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = if config.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    subscriber.with(fmt_layer).init();
}
