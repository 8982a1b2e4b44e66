//! Transport selection from the environment.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `TESSERA_MCP_TRANSPORT` | `stdio` (or `http`) |
//! | `TESSERA_MCP_HOST` | `127.0.0.1` |
//! | `TESSERA_MCP_PORT` | `8080` |
//! | `TESSERA_MCP_ENDPOINT` | `/mcp` |
//! | `TESSERA_MCP_PING_INTERVAL_MS` | `5000` for http, off for stdio; `0` disables |

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_TRANSPORT: &str = "TESSERA_MCP_TRANSPORT";
pub const ENV_HOST: &str = "TESSERA_MCP_HOST";
pub const ENV_PORT: &str = "TESSERA_MCP_PORT";
pub const ENV_ENDPOINT: &str = "TESSERA_MCP_ENDPOINT";
pub const ENV_PING_INTERVAL_MS: &str = "TESSERA_MCP_PING_INTERVAL_MS";

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_ENDPOINT: &str = "/mcp";
pub const DEFAULT_HTTP_PING_INTERVAL_MS: u64 = 5000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{variable}: invalid value '{value}': {reason}")]
    InvalidValue {
        variable: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(variable: &'static str, value: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            variable,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportKind {
    /// One session over the process's stdin/stdout.
    #[default]
    Stdio,
    /// Many sessions over streamable HTTP.
    Http,
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdio" => Ok(TransportKind::Stdio),
            "http" => Ok(TransportKind::Http),
            other => Err(format!("expected 'stdio' or 'http', got '{other}'")),
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Stdio => f.write_str("stdio"),
            TransportKind::Http => f.write_str("http"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub kind: TransportKind,
    pub host: String,
    pub port: u16,
    pub endpoint: String,
    /// Explicit ping interval; `None` means the per-transport default.
    pub ping_interval_ms: Option<u64>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::default(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            ping_interval_ms: None,
        }
    }
}

impl TransportConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_TRANSPORT) {
            config.kind = value
                .parse()
                .map_err(|reason: String| ConfigError::invalid(ENV_TRANSPORT, &value, reason))?;
        }
        if let Some(value) = lookup(ENV_HOST) {
            if value.trim().is_empty() {
                return Err(ConfigError::invalid(ENV_HOST, &value, "host must not be empty"));
            }
            config.host = value;
        }
        if let Some(value) = lookup(ENV_PORT) {
            config.port = value
                .trim()
                .parse()
                .map_err(|e| ConfigError::invalid(ENV_PORT, &value, format!("{e}")))?;
        }
        if let Some(value) = lookup(ENV_ENDPOINT) {
            config.endpoint = normalize_endpoint(&value)?;
        }
        if let Some(value) = lookup(ENV_PING_INTERVAL_MS) {
            let ms: u64 = value
                .trim()
                .parse()
                .map_err(|e| ConfigError::invalid(ENV_PING_INTERVAL_MS, &value, format!("{e}")))?;
            config.ping_interval_ms = Some(ms);
        }
        Ok(config)
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Result<Self, ConfigError> {
        self.endpoint = normalize_endpoint(endpoint)?;
        Ok(self)
    }

    /// Ping interval after applying transport defaults. `0` disables.
    pub fn effective_ping_interval(&self) -> Option<Duration> {
        let ms = match (self.ping_interval_ms, self.kind) {
            (Some(ms), _) => ms,
            (None, TransportKind::Http) => DEFAULT_HTTP_PING_INTERVAL_MS,
            (None, TransportKind::Stdio) => 0,
        };
        (ms > 0).then(|| Duration::from_millis(ms))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn normalize_endpoint(value: &str) -> Result<String, ConfigError> {
    let trimmed = value.trim();
    if !trimmed.starts_with('/') {
        return Err(ConfigError::invalid(
            ENV_ENDPOINT,
            value,
            "endpoint path must start with '/'",
        ));
    }
    if trimmed.len() > 1 {
        Ok(trimmed.trim_end_matches('/').to_string())
    } else {
        Ok(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = TransportConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.kind, TransportKind::Stdio);
        assert_eq!(config.bind_address(), "127.0.0.1:8080");
        assert_eq!(config.endpoint, "/mcp");
        assert_eq!(config.effective_ping_interval(), None);
    }

    #[test]
    fn test_http_pings_by_default_and_zero_disables() {
        let config = TransportConfig::from_lookup(lookup(&[(ENV_TRANSPORT, "HTTP")])).unwrap();
        assert_eq!(config.kind, TransportKind::Http);
        assert_eq!(config.effective_ping_interval(), Some(Duration::from_millis(5000)));

        let config = TransportConfig::from_lookup(lookup(&[
            (ENV_TRANSPORT, "http"),
            (ENV_PING_INTERVAL_MS, "0"),
        ]))
        .unwrap();
        assert_eq!(config.effective_ping_interval(), None);
    }

    #[test]
    fn test_invalid_values_name_the_variable() {
        let error = TransportConfig::from_lookup(lookup(&[(ENV_PORT, "eighty")])).unwrap_err();
        assert!(error.to_string().contains(ENV_PORT));
        assert!(error.to_string().contains("eighty"));

        let error = TransportConfig::from_lookup(lookup(&[(ENV_TRANSPORT, "carrier-pigeon")]))
            .unwrap_err();
        assert!(error.to_string().contains(ENV_TRANSPORT));

        assert!(TransportConfig::from_lookup(lookup(&[(ENV_ENDPOINT, "mcp")])).is_err());
    }

    #[test]
    fn test_endpoint_trailing_slash_trimmed() {
        let config = TransportConfig::from_lookup(lookup(&[(ENV_ENDPOINT, "/rpc/")])).unwrap();
        assert_eq!(config.endpoint, "/rpc");
    }

    #[test]
    #[serial]
    fn test_from_env_reads_process_environment() {
        unsafe {
            std::env::set_var(ENV_TRANSPORT, "http");
            std::env::set_var(ENV_PORT, "9191");
            std::env::set_var(ENV_PING_INTERVAL_MS, "250");
        }
        let config = TransportConfig::from_env();
        unsafe {
            std::env::remove_var(ENV_TRANSPORT);
            std::env::remove_var(ENV_PORT);
            std::env::remove_var(ENV_PING_INTERVAL_MS);
        }
        let config = config.unwrap();
        assert_eq!(config.kind, TransportKind::Http);
        assert_eq!(config.port, 9191);
        assert_eq!(config.effective_ping_interval(), Some(Duration::from_millis(250)));
    }
}
