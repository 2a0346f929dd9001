use std::time::Duration;

use crate::errors::ConfigError;

/// Hedging strategy configuration.
///
/// Controls how long the initial attempt is given on its own, how many
/// backups follow it, and how the caller's budget is turned into a deadline.
#[derive(Debug, Clone)]
pub struct HedgeConfig {
    /// Time the initial attempt runs alone before backups are launched.
    ///
    /// Also caps the initial attempt's own timeout.
    pub first_request_timeout: Duration,

    /// Fraction of the caller's budget the race is allowed to consume.
    ///
    /// The remainder is left for response marshalling and transport outside
    /// the race. Must lie in `(0, 1]`.
    pub safety_coefficient: f64,

    /// Smallest budget, in milliseconds, a caller may ask for.
    pub minimal_safe_timeout_ms: u64,

    /// Budget, in milliseconds, used when the caller does not give one.
    pub default_request_timeout_ms: u64,

    /// Number of backup attempts fired together once the grace period ends.
    pub backup_attempts: usize,
}

impl Default for HedgeConfig {
    fn default() -> Self {
        Self {
            first_request_timeout: Duration::from_millis(300),
            safety_coefficient: 0.95,
            minimal_safe_timeout_ms: 300,
            default_request_timeout_ms: 1000,
            backup_attempts: 2,
        }
    }
}

impl HedgeConfig {
    /// Checks the invariants the normalizer and scheduler rely on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.safety_coefficient > 0.0 && self.safety_coefficient <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "safety coefficient must be in (0, 1], got {}",
                self.safety_coefficient
            )));
        }
        if self.minimal_safe_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "minimal safe timeout must be positive".to_string(),
            ));
        }
        if self.first_request_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "first request timeout must be positive".to_string(),
            ));
        }
        if self.default_request_timeout_ms < self.minimal_safe_timeout_ms {
            return Err(ConfigError::Invalid(format!(
                "default request timeout {}ms is below the minimum of {}ms",
                self.default_request_timeout_ms, self.minimal_safe_timeout_ms
            )));
        }
        if self.backup_attempts == 0 {
            return Err(ConfigError::Invalid(
                "at least one backup attempt is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for the upstream service every attempt talks to.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// URL fetched by each attempt.
    pub url: String,
    /// Maximum connections in flight across all concurrent races.
    pub max_connections: usize,
    /// Maximum idle keep-alive connections kept in the pool.
    pub max_keepalive: usize,
    /// Time allowed for establishing a connection.
    ///
    /// Shorter than an attempt's timeout, so a slow connect is reported as
    /// a connect timeout rather than a read timeout.
    pub connect_timeout: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: "https://exponea-engineering-assignment.appspot.com/api/work".to_string(),
            max_connections: 200,
            max_keepalive: 1,
            connect_timeout: Duration::from_millis(250),
        }
    }
}

impl UpstreamConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::Invalid("upstream url is empty".to_string()));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "max connections must be positive".to_string(),
            ));
        }
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "connect timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Address the HTTP server binds to.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Everything the process needs at startup.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub hedge: HedgeConfig,
    pub upstream: UpstreamConfig,
    pub server: ServerConfig,
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.hedge.validate()?;
        self.upstream.validate()
    }
}
