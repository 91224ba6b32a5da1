//! Relay configuration with validation.
//!
//! Every section has defaults; only `auth.api_key` must be supplied. Values
//! come from an optional JSON file and are then overridden from the
//! environment, see [`RelayConfig::from_env`].

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use super::token::{SignatureScheme, TokenCodec};

/// Path of an optional JSON configuration file.
pub const ENV_CONFIG_FILE: &str = "RELAY_CONFIG_FILE";
/// Shared secret used to sign tokens.
pub const ENV_API_KEY: &str = "API_KEY";
pub const ENV_PORT: &str = "PORT";
pub const ENV_HOST: &str = "HOST";
pub const ENV_SIGNATURE_SCHEME: &str = "RELAY_SIGNATURE_SCHEME";
pub const ENV_HANDSHAKE_TIMEOUT_MS: &str = "RELAY_HANDSHAKE_TIMEOUT_MS";
/// Comma separated CORS origins.
pub const ENV_CORS_ORIGINS: &str = "RELAY_CORS_ORIGINS";

/// Main relay configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// HTTP listener
    pub http: HttpConfig,
    /// Shared secret and token policy
    pub auth: AuthConfig,
    /// Subscription socket behaviour
    pub websocket: WebSocketConfig,
    /// Request limits
    pub limits: LimitsConfig,
    /// CORS configuration
    pub cors: CorsConfig,
}

impl RelayConfig {
    /// Load from `RELAY_CONFIG_FILE` (if set) and the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup(ENV_CONFIG_FILE) {
            Some(path) if !path.trim().is_empty() => Self::from_file(path.trim())?,
            _ => Self::default(),
        };
        config.apply_overrides(lookup)?;
        Ok(config)
    }

    /// Parse a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&raw)
            .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(ENV_API_KEY) {
            self.auth.api_key = key;
        }

        if let Some(port) = lookup(ENV_PORT) {
            self.http.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("{ENV_PORT}={port}")))?;
        }

        if let Some(host) = lookup(ENV_HOST) {
            self.http.host = host
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("{ENV_HOST}={host}")))?;
        }

        if let Some(scheme) = lookup(ENV_SIGNATURE_SCHEME) {
            self.auth.signature_scheme = scheme.parse().map_err(ConfigError::Invalid)?;
        }

        if let Some(ms) = lookup(ENV_HANDSHAKE_TIMEOUT_MS) {
            let ms: u64 = ms.trim().parse().map_err(|_| {
                ConfigError::InvalidTimeout(format!("{ENV_HANDSHAKE_TIMEOUT_MS}={ms}"))
            })?;
            self.websocket.handshake_timeout = Duration::from_millis(ms);
        }

        if let Some(origins) = lookup(ENV_CORS_ORIGINS) {
            self.cors.allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }

        if self.http.port == 0 {
            return Err(ConfigError::Invalid("http.port cannot be 0".into()));
        }

        if self.auth.token_max_skew.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "auth.token_max_skew cannot be 0".into(),
            ));
        }

        if self.websocket.handshake_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "websocket.handshake_timeout cannot be 0".into(),
            ));
        }

        if self.websocket.max_message_size == 0 {
            return Err(ConfigError::InvalidLimit(
                "websocket.max_message_size cannot be 0".into(),
            ));
        }

        if self.limits.max_request_size == 0 {
            return Err(ConfigError::InvalidLimit(
                "limits.max_request_size cannot be 0".into(),
            ));
        }

        Ok(())
    }

    /// Get HTTP server bind address
    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.http.host, self.http.port)
    }

    /// Token codec for the configured secret, scheme and window.
    pub fn token_codec(&self) -> TokenCodec {
        TokenCodec::new(self.auth.api_key.clone(), self.auth.signature_scheme)
            .with_max_skew(self.auth.token_max_skew.as_millis() as u64)
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Bind address
    pub host: IpAddr,
    /// Port (default: 8080)
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 8080,
        }
    }
}

/// Token authentication configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Shared secret. Required.
    pub api_key: String,
    /// Signature scheme (`sha1` or `hmac-sha256`)
    pub signature_scheme: SignatureScheme,
    /// Maximum distance between token timestamp and server clock
    #[serde(with = "humantime_serde")]
    pub token_max_skew: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            signature_scheme: SignatureScheme::Sha1,
            token_max_skew: Duration::from_secs(60),
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("api_key", &"<redacted>")
            .field("signature_scheme", &self.signature_scheme)
            .field("token_max_skew", &self.token_max_skew)
            .finish()
    }
}

/// WebSocket configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSocketConfig {
    /// Time a new connection has to send its subscribe request
    #[serde(with = "humantime_serde")]
    pub handshake_timeout: Duration,
    /// Largest inbound frame accepted, in bytes
    pub max_message_size: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_millis(2000),
            max_message_size: 1024 * 1024, // 1MB
        }
    }
}

/// Request limits configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Max publish body size in bytes (default: 1MB)
    pub max_request_size: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_request_size: 1024 * 1024, // 1MB
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Enable CORS
    pub enabled: bool,
    /// Allowed origins ("*" for all)
    pub allowed_origins: Vec<String>,
    /// Allowed methods
    pub allowed_methods: Vec<String>,
    /// Allowed headers
    pub allowed_headers: Vec<String>,
    /// Max age for preflight cache
    pub max_age: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_origins: vec![
                "http://localhost:5173".to_string(),
                "http://localhost:3000".to_string(),
                "https://neurosift.app".to_string(),
            ],
            allowed_methods: vec!["GET".to_string(), "POST".to_string(), "OPTIONS".to_string()],
            allowed_headers: vec!["Content-Type".to_string()],
            max_age: 86400, // 24 hours
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// No shared secret configured
    #[error("API_KEY is not set")]
    MissingApiKey,
    /// Invalid size limit
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// Configuration file could not be read
    #[error("cannot read config file {0}")]
    Io(String),
    /// Configuration file is not valid JSON for this schema
    #[error("cannot parse config file {0}")]
    Parse(String),
    /// General configuration error
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Duration (de)serialization: `"2s"`, `"2000ms"`, `"1m"` or plain seconds.
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Raw::deserialize(deserializer)? {
            Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
            Raw::Text(s) => parse_duration(&s).map_err(serde::de::Error::custom),
        }
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        // "ms" before "s" and "m"
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(|_| "invalid minutes")
        } else {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }
}
