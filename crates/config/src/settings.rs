//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::constants::{audio, call_control, endpoints, telephony};
use crate::ConfigError;

/// Runtime environment enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    /// Development mode - relaxed validation, warnings only
    #[default]
    Development,
    /// Staging mode - stricter validation
    Staging,
    /// Production mode - all validations enforced
    Production,
}

impl RuntimeEnvironment {
    /// Check if this is a production environment
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Runtime environment (development, staging, production)
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Media stream and codec configuration
    #[serde(default)]
    pub telephony: TelephonyConfig,

    /// Call-control REST API configuration
    #[serde(default)]
    pub call_control: CallControlConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_telephony()?;
        self.validate_call_control()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        let server = &self.server;

        if server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                message: "Port cannot be 0".to_string(),
            });
        }

        if server.max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.max_connections".to_string(),
                message: "Max connections must be at least 1".to_string(),
            });
        }

        if !server.ws_path.starts_with('/') {
            return Err(ConfigError::InvalidValue {
                field: "server.ws_path".to_string(),
                message: format!("Must start with '/', got {:?}", server.ws_path),
            });
        }

        Ok(())
    }

    fn validate_telephony(&self) -> Result<(), ConfigError> {
        let tel = &self.telephony;

        for (field, value) in [
            ("telephony.inbound_encoding", &tel.inbound_encoding),
            ("telephony.outbound_encoding", &tel.outbound_encoding),
            ("telephony.fallback_encoding", &tel.fallback_encoding),
        ] {
            if !is_supported_encoding(value) {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: format!(
                        "Unsupported encoding {:?}. Supported: {:?}",
                        value,
                        telephony::SUPPORTED_ENCODINGS
                    ),
                });
            }
        }

        if tel.wire_sample_rate == 0 {
            return Err(ConfigError::InvalidValue {
                field: "telephony.wire_sample_rate".to_string(),
                message: "Sample rate cannot be 0".to_string(),
            });
        }

        let uses_opus = tel.inbound_encoding.eq_ignore_ascii_case("OPUS")
            || tel.outbound_encoding.eq_ignore_ascii_case("OPUS");
        if uses_opus && !audio::OPUS_SAMPLE_RATES.contains(&tel.wire_sample_rate) {
            return Err(ConfigError::InvalidValue {
                field: "telephony.wire_sample_rate".to_string(),
                message: format!(
                    "OPUS requires one of {:?}, got {}",
                    audio::OPUS_SAMPLE_RATES,
                    tel.wire_sample_rate
                ),
            });
        }

        if tel.pipeline_sample_rate == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "telephony.pipeline_sample_rate".to_string(),
                message: "Sample rate cannot be 0".to_string(),
            });
        }

        if tel.handshake_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "telephony.handshake_timeout_ms".to_string(),
                message: "Timeout must be at least 1ms".to_string(),
            });
        }

        Ok(())
    }

    fn validate_call_control(&self) -> Result<(), ConfigError> {
        let cc = &self.call_control;

        if cc.timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "call_control.timeout_ms".to_string(),
                message: "Timeout must be at least 1ms".to_string(),
            });
        }

        if cc.api_base_url.trim().is_empty() {
            return Err(ConfigError::MissingField("call_control.api_base_url".to_string()));
        }

        if self.telephony.auto_hang_up && cc.api_key.is_none() {
            if self.environment.is_production() {
                return Err(ConfigError::InvalidValue {
                    field: "call_control.api_key".to_string(),
                    message: "API key must be set when auto hang-up is enabled in production"
                        .to_string(),
                });
            }
            tracing::warn!(
                "Auto hang-up is enabled but no call-control API key is configured; \
                 hangups will be skipped"
            );
        }

        Ok(())
    }
}

fn is_supported_encoding(name: &str) -> bool {
    telephony::SUPPORTED_ENCODINGS
        .iter()
        .any(|supported| supported.eq_ignore_ascii_case(name))
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Media stream WebSocket path
    #[serde(default = "default_ws_path")]
    pub ws_path: String,

    /// Maximum concurrent calls
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_host() -> String {
    endpoints::DEFAULT_HOST.to_string()
}
fn default_port() -> u16 {
    endpoints::DEFAULT_PORT
}
fn default_ws_path() -> String {
    endpoints::DEFAULT_WS_PATH.to_string()
}
fn default_max_connections() -> usize {
    200
}
fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ws_path: default_ws_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Media stream configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelephonyConfig {
    /// Sample rate of audio on the wire
    #[serde(default = "default_wire_sample_rate")]
    pub wire_sample_rate: u32,

    /// Overrides the sample rate announced by the pipeline at start
    #[serde(default)]
    pub pipeline_sample_rate: Option<u32>,

    /// Encoding of audio received from the provider
    #[serde(default = "default_encoding")]
    pub inbound_encoding: String,

    /// Encoding of audio sent to the provider
    #[serde(default = "default_encoding")]
    pub outbound_encoding: String,

    /// Hang up the call when the pipeline ends
    #[serde(default = "default_true")]
    pub auto_hang_up: bool,

    /// Encoding used when the provider negotiates an unsupported one
    #[serde(default = "default_fallback_encoding")]
    pub fallback_encoding: String,

    /// How long to wait for the stream start event
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_ms: u64,
}

fn default_wire_sample_rate() -> u32 {
    audio::DEFAULT_WIRE_SAMPLE_RATE
}
fn default_encoding() -> String {
    "OPUS".to_string()
}
fn default_fallback_encoding() -> String {
    telephony::DEFAULT_FALLBACK_ENCODING.to_string()
}
fn default_handshake_timeout() -> u64 {
    telephony::DEFAULT_HANDSHAKE_TIMEOUT_MS
}

impl Default for TelephonyConfig {
    fn default() -> Self {
        Self {
            wire_sample_rate: default_wire_sample_rate(),
            pipeline_sample_rate: None,
            inbound_encoding: default_encoding(),
            outbound_encoding: default_encoding(),
            auto_hang_up: true,
            fallback_encoding: default_fallback_encoding(),
            handshake_timeout_ms: default_handshake_timeout(),
        }
    }
}

/// Call-control REST API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallControlConfig {
    /// API base URL (without trailing slash)
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Bearer token (falls back to TELNYX_API_KEY)
    #[serde(default = "default_api_key")]
    pub api_key: Option<String>,

    /// Request timeout in milliseconds
    #[serde(default = "default_call_control_timeout")]
    pub timeout_ms: u64,
}

fn default_api_base_url() -> String {
    call_control::DEFAULT_API_BASE_URL.to_string()
}

fn default_api_key() -> Option<String> {
    std::env::var(call_control::API_KEY_ENV)
        .ok()
        .filter(|key| !key.trim().is_empty())
}

fn default_call_control_timeout() -> u64 {
    call_control::DEFAULT_TIMEOUT_MS
}

impl Default for CallControlConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            api_key: default_api_key(),
            timeout_ms: default_call_control_timeout(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,

    /// Enable metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
        }
    }
}

/// Load settings from files and environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (VOICE_GATEWAY_ prefix)
/// 2. config/{env}.toml (if env specified)
/// 3. config/default.toml
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    load_settings_from(Path::new("config"), env)
}

/// Load settings using `dir` as the configuration directory
pub fn load_settings_from(dir: &Path, env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    let default_path = dir.join("default");
    builder = builder.add_source(File::with_name(&default_path.to_string_lossy()).required(false));

    if let Some(env_name) = env {
        let env_path = dir.join(env_name);
        builder = builder.add_source(File::with_name(&env_path.to_string_lossy()).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("VOICE_GATEWAY")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.server.ws_path, "/ws");
        assert_eq!(settings.telephony.wire_sample_rate, 16000);
        assert_eq!(settings.telephony.inbound_encoding, "OPUS");
        assert!(settings.telephony.auto_hang_up);
        assert_eq!(settings.call_control.timeout_ms, 10_000);
    }

    #[test]
    fn test_default_settings_validate() {
        let mut settings = Settings::default();
        settings.call_control.api_key = Some("key".to_string());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_unsupported_encoding_rejected() {
        let mut settings = Settings::default();
        settings.telephony.outbound_encoding = "G729".to_string();
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("telephony.outbound_encoding"));
    }

    #[test]
    fn test_encoding_case_insensitive() {
        let mut settings = Settings::default();
        settings.telephony.inbound_encoding = "pcmu".to_string();
        settings.telephony.outbound_encoding = "l16".to_string();
        settings.telephony.wire_sample_rate = 22050;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_opus_rate_validation() {
        let mut settings = Settings::default();
        settings.telephony.wire_sample_rate = 22050;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("OPUS requires"));
    }

    #[test]
    fn test_server_validation() {
        let mut settings = Settings::default();
        settings.server.port = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.server.ws_path = "ws".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_production_requires_api_key_for_hangup() {
        let mut settings = Settings::default();
        settings.environment = RuntimeEnvironment::Production;
        settings.call_control.api_key = None;
        assert!(settings.validate().is_err());

        settings.telephony.auto_hang_up = false;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        let mut settings = Settings::default();
        settings.call_control.timeout_ms = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.telephony.handshake_timeout_ms = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("default.toml")).unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9000

[telephony]
wire_sample_rate = 8000
inbound_encoding = "PCMU"
outbound_encoding = "PCMA"
auto_hang_up = false
"#
        )
        .unwrap();

        let settings = load_settings_from(dir.path(), None).unwrap();
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.telephony.wire_sample_rate, 8000);
        assert_eq!(settings.telephony.inbound_encoding, "PCMU");
        assert_eq!(settings.telephony.outbound_encoding, "PCMA");
        assert!(!settings.telephony.auto_hang_up);
        // untouched sections keep their defaults
        assert_eq!(settings.server.ws_path, "/ws");
    }

    #[test]
    fn test_env_file_overrides_default() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("default.toml"),
            "[telephony]\nauto_hang_up = false\nwire_sample_rate = 16000\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("staging.toml"),
            "[telephony]\nwire_sample_rate = 48000\n",
        )
        .unwrap();

        let settings = load_settings_from(dir.path(), Some("staging")).unwrap();
        assert_eq!(settings.telephony.wire_sample_rate, 48000);
    }

    #[test]
    fn test_round_trip_through_toml() {
        let settings = Settings::default();
        let text = toml::to_string(&settings).unwrap();
        let parsed: Settings = toml::from_str(&text).unwrap();
        assert_eq!(parsed.server.port, settings.server.port);
        assert_eq!(
            parsed.telephony.fallback_encoding,
            settings.telephony.fallback_encoding
        );
    }
}
