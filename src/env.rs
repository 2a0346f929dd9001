//! Loading [`Settings`] from environment variables.

use std::{env, str::FromStr, time::Duration};

use crate::{
    config::{HedgeConfig, ServerConfig, Settings, UpstreamConfig},
    errors::ConfigError,
};

impl Settings {
    /// Builds settings from the process environment.
    ///
    /// Recognised variables:
    /// - `HOST`, `PORT`
    /// - `UPSTREAM_URL`, `MAX_CONN`, `MAX_KEEP_ALIVE`, `CONNECT_TIMEOUT` (ms)
    /// - `FIRST_REQUEST_TIMEOUT` (seconds), `DEFAULT_REQUEST_TIMEOUT` (ms),
    ///   `TIMEOUT_SAFETY_PERCENT` (fraction), `MINIMAL_SAFE_TIMEOUT` (ms),
    ///   `BACKUP_ATTEMPTS`
    ///
    /// Unset variables keep their defaults. The result is validated.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`Settings::from_env`] with a custom variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let hedge_defaults = HedgeConfig::default();
        let upstream_defaults = UpstreamConfig::default();
        let server_defaults = ServerConfig::default();

        let first_request_secs = parse_or(
            &lookup,
            "FIRST_REQUEST_TIMEOUT",
            hedge_defaults.first_request_timeout.as_secs_f64(),
        )?;
        let first_request_timeout = Duration::try_from_secs_f64(first_request_secs).map_err(|_| {
            ConfigError::InvalidValue {
                key: "FIRST_REQUEST_TIMEOUT",
                value: first_request_secs.to_string(),
            }
        })?;

        let settings = Settings {
            hedge: HedgeConfig {
                first_request_timeout,
                safety_coefficient: parse_or(
                    &lookup,
                    "TIMEOUT_SAFETY_PERCENT",
                    hedge_defaults.safety_coefficient,
                )?,
                minimal_safe_timeout_ms: parse_or(
                    &lookup,
                    "MINIMAL_SAFE_TIMEOUT",
                    hedge_defaults.minimal_safe_timeout_ms,
                )?,
                default_request_timeout_ms: parse_or(
                    &lookup,
                    "DEFAULT_REQUEST_TIMEOUT",
                    hedge_defaults.default_request_timeout_ms,
                )?,
                backup_attempts: parse_or(
                    &lookup,
                    "BACKUP_ATTEMPTS",
                    hedge_defaults.backup_attempts,
                )?,
            },
            upstream: UpstreamConfig {
                url: lookup("UPSTREAM_URL").unwrap_or(upstream_defaults.url),
                max_connections: parse_or(
                    &lookup,
                    "MAX_CONN",
                    upstream_defaults.max_connections,
                )?,
                max_keepalive: parse_or(
                    &lookup,
                    "MAX_KEEP_ALIVE",
                    upstream_defaults.max_keepalive,
                )?,
                connect_timeout: Duration::from_millis(parse_or(
                    &lookup,
                    "CONNECT_TIMEOUT",
                    upstream_defaults.connect_timeout.as_millis() as u64,
                )?),
            },
            server: ServerConfig {
                host: lookup("HOST").unwrap_or(server_defaults.host),
                port: parse_or(&lookup, "PORT", server_defaults.port)?,
            },
        };

        settings.validate()?;
        Ok(settings)
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let settings = Settings::from_lookup(|_| None).unwrap();
        assert_eq!(settings.server.port, 8000);
        assert_eq!(settings.hedge.default_request_timeout_ms, 1000);
        assert_eq!(settings.upstream.max_connections, 200);
        assert_eq!(settings.upstream.max_keepalive, 1);
    }

    #[test]
    fn overrides_are_parsed() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("PORT", "9100"),
            ("UPSTREAM_URL", "http://127.0.0.1:1234/work"),
            ("FIRST_REQUEST_TIMEOUT", "0.25"),
            ("TIMEOUT_SAFETY_PERCENT", "0.9"),
            ("MINIMAL_SAFE_TIMEOUT", "400"),
            ("DEFAULT_REQUEST_TIMEOUT", " 1500 "),
            ("MAX_CONN", "50"),
            ("CONNECT_TIMEOUT", "120"),
        ]))
        .unwrap();

        assert_eq!(settings.server.port, 9100);
        assert_eq!(settings.upstream.url, "http://127.0.0.1:1234/work");
        assert_eq!(
            settings.hedge.first_request_timeout,
            Duration::from_millis(250)
        );
        assert_eq!(settings.hedge.safety_coefficient, 0.9);
        assert_eq!(settings.hedge.minimal_safe_timeout_ms, 400);
        assert_eq!(settings.hedge.default_request_timeout_ms, 1500);
        assert_eq!(settings.upstream.max_connections, 50);
        assert_eq!(settings.upstream.connect_timeout, Duration::from_millis(120));
    }

    #[test]
    fn unparsable_value_names_the_key() {
        let err = Settings::from_lookup(lookup_from(&[("MAX_CONN", "lots")])).unwrap_err();
        match err {
            ConfigError::InvalidValue { key, value } => {
                assert_eq!(key, "MAX_CONN");
                assert_eq!(value, "lots");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn negative_grace_period_is_rejected() {
        let err = Settings::from_lookup(lookup_from(&[("FIRST_REQUEST_TIMEOUT", "-1")]));
        assert!(matches!(err, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn invalid_combination_fails_validation() {
        let err = Settings::from_lookup(lookup_from(&[("DEFAULT_REQUEST_TIMEOUT", "100")]));
        assert!(matches!(err, Err(ConfigError::Invalid(_))));
    }
}
