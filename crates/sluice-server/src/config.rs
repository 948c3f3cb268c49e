//! Configuration for the Sluice server
//!
//! All settings come from environment variables; every one has a default
//! except where noted.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{ServerError, ServerResult};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Host to bind to
    #[serde(default = "default_host")]
    pub bind_address: String,

    /// Name of the EventListener this sink serves
    #[serde(default = "default_listener_name")]
    pub listener_name: String,

    /// Namespace of the EventListener this sink serves
    #[serde(default = "default_listener_namespace")]
    pub listener_namespace: String,

    /// Externally reachable address of the listener, reported to interceptors
    #[serde(default)]
    pub listener_address: Option<String>,

    /// YAML file with listeners, triggers, bindings and templates
    #[serde(default = "default_config_path")]
    pub config_path: String,

    /// YAML file with secrets for webhook interceptors
    #[serde(default)]
    pub secrets_path: Option<String>,

    /// Interval between secret file reloads, in seconds
    #[serde(default = "default_secret_refresh_seconds")]
    pub secret_refresh_seconds: u64,

    /// Reject events whose body is not JSON
    #[serde(default = "default_payload_validation")]
    pub payload_validation: bool,

    /// Maximum number of trigger tasks running at once for one event
    #[serde(default = "default_max_concurrent_triggers")]
    pub max_concurrent_triggers: usize,

    /// Time allowed for one event, in milliseconds
    #[serde(default = "default_handler_timeout_ms")]
    pub handler_timeout_ms: u64,

    /// Time allowed for one webhook interceptor call, in milliseconds
    #[serde(default = "default_webhook_timeout_ms")]
    pub webhook_timeout_ms: u64,

    /// Where rendered resources are posted; logged only when unset
    #[serde(default)]
    pub resource_sink_url: Option<String>,

    /// Default results store for the `results` interceptor
    #[serde(default)]
    pub results_url: Option<String>,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format
    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_port() -> u16 {
    8080
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_listener_name() -> String {
    "sluice".to_string()
}

fn default_listener_namespace() -> String {
    "default".to_string()
}

fn default_config_path() -> String {
    "sluice.yaml".to_string()
}

fn default_secret_refresh_seconds() -> u64 {
    60
}

fn default_payload_validation() -> bool {
    true
}

fn default_max_concurrent_triggers() -> usize {
    32
}

fn default_handler_timeout_ms() -> u64 {
    30_000
}

fn default_webhook_timeout_ms() -> u64 {
    3_000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn load() -> ServerResult<Self> {
        Self::load_from(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns the value of a
    /// variable if it is set
    pub fn load_from<F>(lookup: F) -> ServerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(port) = lookup("SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                config.port = port;
            } else {
                warn!("Invalid SERVER_PORT value: {}", port);
            }
        }

        if let Some(host) = lookup("SERVER_HOST") {
            config.bind_address = host;
        }

        if let Some(name) = lookup("EL_NAME") {
            config.listener_name = name;
        }

        if let Some(namespace) = lookup("EL_NAMESPACE") {
            config.listener_namespace = namespace;
        }

        if let Some(address) = lookup("EL_ADDRESS") {
            config.listener_address = Some(address);
        }

        if let Some(path) = lookup("SLUICE_CONFIG") {
            config.config_path = path;
        }

        if let Some(path) = lookup("SECRETS_PATH") {
            config.secrets_path = Some(path);
        }

        if let Some(refresh) = lookup("SECRET_REFRESH_SECONDS") {
            if let Ok(seconds) = refresh.parse::<u64>() {
                config.secret_refresh_seconds = seconds;
            } else {
                warn!("Invalid SECRET_REFRESH_SECONDS value: {}", refresh);
            }
        }

        if let Some(validation) = lookup("PAYLOAD_VALIDATION") {
            if let Some(enabled) = parse_bool(&validation) {
                config.payload_validation = enabled;
            } else {
                warn!("Invalid PAYLOAD_VALIDATION value: {}", validation);
            }
        }

        if let Some(max) = lookup("MAX_CONCURRENT_TRIGGERS") {
            if let Ok(max) = max.parse::<usize>() {
                config.max_concurrent_triggers = max;
            } else {
                warn!("Invalid MAX_CONCURRENT_TRIGGERS value: {}", max);
            }
        }

        if let Some(timeout) = lookup("HANDLER_TIMEOUT_MS") {
            if let Ok(ms) = timeout.parse::<u64>() {
                config.handler_timeout_ms = ms;
            } else {
                warn!("Invalid HANDLER_TIMEOUT_MS value: {}", timeout);
            }
        }

        if let Some(timeout) = lookup("WEBHOOK_TIMEOUT_MS") {
            if let Ok(ms) = timeout.parse::<u64>() {
                config.webhook_timeout_ms = ms;
            } else {
                warn!("Invalid WEBHOOK_TIMEOUT_MS value: {}", timeout);
            }
        }

        if let Some(url) = lookup("RESOURCE_SINK_URL") {
            config.resource_sink_url = Some(url);
        }

        if let Some(url) = lookup("RESULTS_URL") {
            config.results_url = Some(url);
        }

        // RUST_LOG still wins when logging is initialized
        if let Some(log_level) = lookup("LOG_LEVEL") {
            config.log_level = log_level;
        }

        if let Some(format) = lookup("LOG_FORMAT") {
            config.log_format = match format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "text" | "" => LogFormat::Text,
                _ => {
                    warn!("Invalid LOG_FORMAT value: {}, using text", format);
                    LogFormat::Text
                }
            };
        }

        config.validate()?;
        info!("Loaded server configuration");
        Ok(config)
    }

    /// Check required fields and ranges
    pub fn validate(&self) -> ServerResult<()> {
        if self.listener_name.is_empty() || self.listener_namespace.is_empty() {
            return Err(ServerError::ConfigError(
                "EventListener name and namespace are required".to_string(),
            ));
        }

        if self.max_concurrent_triggers == 0 {
            return Err(ServerError::ConfigError(
                "MAX_CONCURRENT_TRIGGERS must be at least 1".to_string(),
            ));
        }

        if self.handler_timeout_ms == 0 {
            return Err(ServerError::ConfigError(
                "HANDLER_TIMEOUT_MS must be at least 1".to_string(),
            ));
        }

        if self.webhook_timeout_ms >= self.handler_timeout_ms {
            warn!(
                "WEBHOOK_TIMEOUT_MS ({}) is not below HANDLER_TIMEOUT_MS ({}); slow interceptors will be cut off by the handler timeout",
                self.webhook_timeout_ms, self.handler_timeout_ms
            );
        }

        if self.secrets_path.is_some() && self.secret_refresh_seconds == 0 {
            return Err(ServerError::ConfigError(
                "SECRET_REFRESH_SECONDS must be at least 1".to_string(),
            ));
        }

        if self.resource_sink_url.is_none() {
            warn!("No RESOURCE_SINK_URL provided - rendered resources will only be logged");
        }

        Ok(())
    }

    /// Handler timeout as a duration
    pub fn handler_timeout(&self) -> Duration {
        Duration::from_millis(self.handler_timeout_ms)
    }

    /// Webhook timeout as a duration
    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_millis(self.webhook_timeout_ms)
    }

    /// Secret refresh interval as a duration
    pub fn secret_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.secret_refresh_seconds)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_host(),
            listener_name: default_listener_name(),
            listener_namespace: default_listener_namespace(),
            listener_address: None,
            config_path: default_config_path(),
            secrets_path: None,
            secret_refresh_seconds: default_secret_refresh_seconds(),
            payload_validation: default_payload_validation(),
            max_concurrent_triggers: default_max_concurrent_triggers(),
            handler_timeout_ms: default_handler_timeout_ms(),
            webhook_timeout_ms: default_webhook_timeout_ms(),
            resource_sink_url: None,
            results_url: None,
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> ServerResult<ServerConfig> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        ServerConfig::load_from(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.port, 8080);
        assert!(config.payload_validation);
        assert_eq!(config.webhook_timeout(), Duration::from_millis(3000));
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("SERVER_PORT", "9000"),
            ("EL_NAME", "github"),
            ("EL_NAMESPACE", "ci"),
            ("PAYLOAD_VALIDATION", "false"),
            ("MAX_CONCURRENT_TRIGGERS", "4"),
            ("HANDLER_TIMEOUT_MS", "5000"),
            ("LOG_FORMAT", "JSON"),
            ("RESOURCE_SINK_URL", "http://sink"),
        ])
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.listener_name, "github");
        assert_eq!(config.listener_namespace, "ci");
        assert!(!config.payload_validation);
        assert_eq!(config.max_concurrent_triggers, 4);
        assert_eq!(config.handler_timeout(), Duration::from_secs(5));
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.resource_sink_url.as_deref(), Some("http://sink"));
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = load(&[("SERVER_PORT", "eighty"), ("PAYLOAD_VALIDATION", "maybe")]).unwrap();
        assert_eq!(config.port, 8080);
        assert!(config.payload_validation);
    }

    #[test]
    fn test_validation_errors() {
        assert!(matches!(
            load(&[("MAX_CONCURRENT_TRIGGERS", "0")]),
            Err(ServerError::ConfigError(_))
        ));
        assert!(matches!(load(&[("HANDLER_TIMEOUT_MS", "0")]), Err(ServerError::ConfigError(_))));
        assert!(matches!(load(&[("EL_NAME", "")]), Err(ServerError::ConfigError(_))));
    }
}
