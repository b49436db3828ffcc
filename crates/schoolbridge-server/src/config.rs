//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use schoolbridge_shared::constants::{DEFAULT_HTTP_PORT, SESSION_TTL_HOURS};

/// Development-only token secret. A warning is logged when it is in use.
pub const DEV_TOKEN_SECRET: &str = "schoolbridge-dev-secret-change-me";

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP API.
    /// Env: `HTTP_ADDR`, or `PORT` to keep the default host.
    /// Default: `0.0.0.0:4000`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: the platform data directory.
    pub database_path: Option<PathBuf>,

    /// Secret the session signing key is derived from.
    /// Env: `TOKEN_SECRET`
    pub token_secret: String,

    /// Session lifetime.
    /// Env: `TOKEN_TTL_HOURS`
    /// Default: 168 (7 days)
    pub token_ttl_hours: i64,

    /// Browser origin allowed by CORS, or `*`.
    /// Env: `CLIENT_URL`
    /// Default: `http://localhost:5173`
    pub client_url: String,

    /// Requests allowed per client IP within one window.
    /// Env: `RATE_LIMIT_PER_WINDOW`
    /// Default: 200
    pub rate_limit_per_window: u32,

    /// Length of the rate limit window.
    /// Env: `RATE_LIMIT_WINDOW_SECS`
    /// Default: 900 (15 minutes)
    pub rate_limit_window_secs: u64,

    /// Key rate limiting on `X-Forwarded-For` / `X-Real-IP`. Only enable
    /// behind a reverse proxy that overwrites those headers.
    /// Env: `TRUST_PROXY`
    /// Default: false
    pub trust_proxy: bool,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("http_addr", &self.http_addr)
            .field("database_path", &self.database_path)
            .field("token_secret", &"<redacted>")
            .field("token_ttl_hours", &self.token_ttl_hours)
            .field("client_url", &self.client_url)
            .field("rate_limit_per_window", &self.rate_limit_per_window)
            .field("rate_limit_window_secs", &self.rate_limit_window_secs)
            .field("trust_proxy", &self.trust_proxy)
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: None,
            token_secret: DEV_TOKEN_SECRET.to_string(),
            token_ttl_hours: SESSION_TTL_HOURS,
            client_url: "http://localhost:5173".to_string(),
            rate_limit_per_window: 200,
            rate_limit_window_secs: 15 * 60,
            trust_proxy: false,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from any key lookup. Invalid values are logged
    /// and replaced by their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(port) = lookup("PORT") {
            match port.parse::<u16>() {
                Ok(port) => config.http_addr.set_port(port),
                Err(_) => tracing::warn!(value = %port, "Invalid PORT, using default"),
            }
        }

        if let Some(addr) = lookup("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(path) = lookup("DATABASE_PATH") {
            if !path.is_empty() {
                config.database_path = Some(PathBuf::from(path));
            }
        }

        match lookup("TOKEN_SECRET") {
            Some(secret) if !secret.is_empty() => config.token_secret = secret,
            _ => tracing::warn!("TOKEN_SECRET not set, using the development secret"),
        }

        if let Some(val) = lookup("TOKEN_TTL_HOURS") {
            match val.parse::<i64>() {
                Ok(hours) if hours > 0 => config.token_ttl_hours = hours,
                _ => tracing::warn!(value = %val, "Invalid TOKEN_TTL_HOURS, using default"),
            }
        }

        if let Some(url) = lookup("CLIENT_URL") {
            if !url.is_empty() {
                config.client_url = url;
            }
        }

        if let Some(val) = lookup("RATE_LIMIT_PER_WINDOW") {
            match val.parse::<u32>() {
                Ok(n) if n > 0 => config.rate_limit_per_window = n,
                _ => tracing::warn!(value = %val, "Invalid RATE_LIMIT_PER_WINDOW, using default"),
            }
        }

        if let Some(val) = lookup("RATE_LIMIT_WINDOW_SECS") {
            match val.parse::<u64>() {
                Ok(n) if n > 0 => config.rate_limit_window_secs = n,
                _ => tracing::warn!(value = %val, "Invalid RATE_LIMIT_WINDOW_SECS, using default"),
            }
        }

        if let Some(val) = lookup("TRUST_PROXY") {
            match val.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => config.trust_proxy = true,
                "0" | "false" | "no" | "" => config.trust_proxy = false,
                _ => tracing::warn!(value = %val, "Invalid TRUST_PROXY, using default"),
            }
        }

        config
    }

    /// Rate limit parameters: (requests per window, window length).
    pub fn rate_limit(&self) -> (u32, Duration) {
        (
            self.rate_limit_per_window,
            Duration::from_secs(self.rate_limit_window_secs),
        )
    }
}
