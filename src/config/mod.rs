//! Configuration for the dispatcher and the bundled transport.
//!
//! Loaded from JSON (every field optional, falling back to its default) and
//! optionally overridden by `RESTLINE_*` environment variables.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid value {value:?} for {key}")]
    Env { key: String, value: String },
}

/// Top-level configuration.
///
/// # Examples
///
/// ```
/// use restline::config::Config;
///
/// let config = Config::from_json(r#"{ "server": { "max_concurrent_requests": 8 } }"#).unwrap();
/// assert_eq!(config.server.max_concurrent_requests, 8);
/// assert_eq!(config.dispatcher.format_parameter.as_deref(), Some("format"));
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

/// Knobs for the dispatch pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Query parameter that overrides `Accept`-based negotiation
    /// (`?format=json`). `None` disables the override.
    pub format_parameter: Option<String>,

    /// Include the cause chain of handler errors in error bodies.
    pub include_error_causes: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            format_parameter: Some("format".to_owned()),
            include_error_causes: false,
        }
    }
}

/// Knobs for the bundled HTTP/1.1 transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Requests processed concurrently before new ones are rejected with 429.
    pub max_concurrent_requests: usize,

    /// Largest request (headers and body) buffered before answering 413.
    pub max_request_size: usize,

    /// Initial read buffer capacity per connection.
    pub initial_buffer_size: usize,

    /// How long shutdown waits for in-flight requests before answering 503.
    pub drain_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 1024,
            max_request_size: 8 * 1024 * 1024,
            initial_buffer_size: 4096,
            drain_timeout_ms: 5_000,
        }
    }
}

impl ServerConfig {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

impl Config {
    /// Loads configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parses configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Applies `RESTLINE_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary key lookup.
    ///
    /// Recognised keys: `RESTLINE_FORMAT_PARAMETER` (empty disables the
    /// override), `RESTLINE_INCLUDE_ERROR_CAUSES`,
    /// `RESTLINE_MAX_CONCURRENT_REQUESTS`, `RESTLINE_MAX_REQUEST_SIZE`,
    /// `RESTLINE_INITIAL_BUFFER_SIZE` and `RESTLINE_DRAIN_TIMEOUT_MS`.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(name) = lookup("RESTLINE_FORMAT_PARAMETER") {
            let name = name.trim();
            self.dispatcher.format_parameter = (!name.is_empty()).then(|| name.to_owned());
        }
        override_parsed(
            &lookup,
            "RESTLINE_INCLUDE_ERROR_CAUSES",
            &mut self.dispatcher.include_error_causes,
        )?;
        override_parsed(
            &lookup,
            "RESTLINE_MAX_CONCURRENT_REQUESTS",
            &mut self.server.max_concurrent_requests,
        )?;
        override_parsed(
            &lookup,
            "RESTLINE_MAX_REQUEST_SIZE",
            &mut self.server.max_request_size,
        )?;
        override_parsed(
            &lookup,
            "RESTLINE_INITIAL_BUFFER_SIZE",
            &mut self.server.initial_buffer_size,
        )?;
        override_parsed(
            &lookup,
            "RESTLINE_DRAIN_TIMEOUT_MS",
            &mut self.server.drain_timeout_ms,
        )?;
        Ok(self)
    }
}

fn override_parsed<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) -> Result<(), ConfigError> {
    if let Some(raw) = lookup(key) {
        *target = raw.trim().parse().map_err(|_| ConfigError::Env {
            key: key.to_owned(),
            value: raw.clone(),
        })?;
    }
    Ok(())
}
