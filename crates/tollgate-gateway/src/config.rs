//! Gateway configuration types.
//!
//! This module defines configuration structures for the HTTP/WebSocket
//! gateway and reads overrides from the environment.

use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use tollgate_auth::TokenConfig;
use tollgate_broker::ConsumerConfig;

use crate::hub::HubConfig;
use crate::rate_limit::RateLimitConfig;

/// Method names that never require a credential by default.
pub const DEFAULT_AUTH_EXEMPT_METHODS: [&str; 3] = [
    "/auth.AuthService/Register",
    "/auth.AuthService/Login",
    "/auth.AuthService/Refresh",
];

/// An environment variable held a value that could not be parsed.
#[derive(Debug, Error)]
#[error("invalid value for {var}: {value:?}")]
pub struct ConfigError {
    /// The variable name.
    pub var: &'static str,
    /// The rejected value.
    pub value: String,
}

/// Configuration for the gateway service.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Listen address (e.g., "0.0.0.0:8080").
    #[serde(default = "GatewayConfig::default_listen_addr")]
    pub listen_addr: String,

    /// Directory of the durable stream store.
    #[serde(default = "GatewayConfig::default_data_dir")]
    pub data_dir: String,

    /// Allowed CORS origins.
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    #[serde(default = "GatewayConfig::default_max_body")]
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    #[serde(default = "GatewayConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Credential signing.
    #[serde(default)]
    pub token: TokenConfig,

    /// Per-caller admission control.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Live connection registry.
    #[serde(default)]
    pub hub: HubConfig,

    /// Notification delivery consumer.
    #[serde(default)]
    pub consumer: ConsumerConfig,

    /// Methods that skip authentication.
    #[serde(default = "GatewayConfig::default_auth_exempt")]
    pub auth_exempt_methods: Vec<String>,
}

impl GatewayConfig {
    fn default_listen_addr() -> String {
        "0.0.0.0:8080".to_string()
    }

    fn default_data_dir() -> String {
        "/data/tollgate".to_string()
    }

    const fn default_max_body() -> usize {
        1024 * 1024 // 1 MB
    }

    const fn default_request_timeout() -> u64 {
        30
    }

    fn default_auth_exempt() -> Vec<String> {
        DEFAULT_AUTH_EXEMPT_METHODS
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    /// Get the request timeout as a `Duration`.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Defaults overridden by environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set to an unparsable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set to an unparsable value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let env = Env(lookup);

        env.set("LISTEN_ADDR", &mut config.listen_addr)?;
        env.set("DATA_DIR", &mut config.data_dir)?;
        env.set("MAX_BODY_BYTES", &mut config.max_body_bytes)?;
        env.set("REQUEST_TIMEOUT_SECONDS", &mut config.request_timeout_seconds)?;
        env.set_list("CORS_ORIGINS", &mut config.cors_origins);

        env.set("TOKEN_SECRET", &mut config.token.secret)?;
        env.set("ACCESS_TTL_SECONDS", &mut config.token.access_ttl_seconds)?;
        env.set("REFRESH_TTL_SECONDS", &mut config.token.refresh_ttl_seconds)?;
        env.set("ENFORCE_NOT_BEFORE", &mut config.token.enforce_not_before)?;

        env.set("RATE_LIMIT_RPS", &mut config.rate_limit.requests_per_second)?;
        env.set("RATE_LIMIT_BURST", &mut config.rate_limit.burst)?;
        env.set(
            "BUCKET_SWEEP_SECONDS",
            &mut config.rate_limit.sweep_interval_seconds,
        )?;

        env.set("NOTIFY_STREAM", &mut config.consumer.stream)?;
        env.set("NOTIFY_GROUP", &mut config.consumer.group)?;
        env.set("NOTIFY_CONSUMER", &mut config.consumer.consumer)?;
        env.set(
            "RECLAIM_IDLE_SECONDS",
            &mut config.consumer.reclaim_idle_seconds,
        )?;
        env.set(
            "RECLAIM_INTERVAL_SECONDS",
            &mut config.consumer.reclaim_interval_seconds,
        )?;
        env.set("MAX_DELIVERIES", &mut config.consumer.max_deliveries)?;

        env.set("CONNECTION_BUFFER", &mut config.hub.connection_buffer)?;
        env.set("MAX_FULL_SENDS", &mut config.hub.max_full_sends)?;

        env.set_list("AUTH_EXEMPT_METHODS", &mut config.auth_exempt_methods);

        Ok(config)
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn set<T: FromStr>(&self, var: &'static str, target: &mut T) -> Result<(), ConfigError> {
        if let Some(value) = (self.0)(var) {
            *target = value
                .trim()
                .parse()
                .map_err(|_| ConfigError { var, value })?;
        }
        Ok(())
    }

    fn set_list(&self, var: &'static str, target: &mut Vec<String>) {
        if let Some(value) = (self.0)(var) {
            *target = value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
                .collect();
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: Self::default_listen_addr(),
            data_dir: Self::default_data_dir(),
            cors_origins: vec!["*".to_string()],
            max_body_bytes: Self::default_max_body(),
            request_timeout_seconds: Self::default_request_timeout(),
            token: TokenConfig::default(),
            rate_limit: RateLimitConfig::default(),
            hub: HubConfig::default(),
            consumer: ConsumerConfig::default(),
            auth_exempt_methods: Self::default_auth_exempt(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |var| vars.get(var).cloned()
    }

    #[test]
    fn default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.max_body_bytes, 1024 * 1024);
        assert_eq!(config.consumer.stream, "notifications");
        assert_eq!(
            config.auth_exempt_methods,
            vec![
                "/auth.AuthService/Register",
                "/auth.AuthService/Login",
                "/auth.AuthService/Refresh",
            ]
        );
    }

    #[test]
    fn timeout_duration() {
        let config = GatewayConfig::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn env_overrides() {
        let config = GatewayConfig::from_lookup(lookup(&[
            ("LISTEN_ADDR", "127.0.0.1:9000"),
            ("TOKEN_SECRET", "s3cret"),
            ("ACCESS_TTL_SECONDS", "60"),
            ("ENFORCE_NOT_BEFORE", "true"),
            ("RATE_LIMIT_RPS", "2.5"),
            ("RATE_LIMIT_BURST", "7"),
            ("NOTIFY_GROUP", "g2"),
            ("MAX_DELIVERIES", "9"),
            ("CONNECTION_BUFFER", "16"),
            ("AUTH_EXEMPT_METHODS", "/a.A/One, /b.B/Two,"),
        ]))
        .unwrap();

        assert_eq!(config.listen_addr, "127.0.0.1:9000");
        assert_eq!(config.token.secret, "s3cret");
        assert_eq!(config.token.access_ttl_seconds, 60);
        assert!(config.token.enforce_not_before);
        assert!((config.rate_limit.requests_per_second - 2.5).abs() < f64::EPSILON);
        assert_eq!(config.rate_limit.burst, 7);
        assert_eq!(config.consumer.group, "g2");
        assert_eq!(config.consumer.max_deliveries, 9);
        assert_eq!(config.hub.connection_buffer, 16);
        assert_eq!(config.auth_exempt_methods, vec!["/a.A/One", "/b.B/Two"]);
    }

    #[test]
    fn env_rejects_garbage() {
        let err = GatewayConfig::from_lookup(lookup(&[("RATE_LIMIT_BURST", "lots")])).unwrap_err();
        assert_eq!(err.var, "RATE_LIMIT_BURST");
        assert_eq!(err.value, "lots");
    }
}
