//! Configuration management.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default path the token exchange endpoint is mounted at.
pub const DEFAULT_EXCHANGE_PATH: &str = "/api/auth/token-exchange";

/// Default pause between sign-out and sign-in during an account switch.
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 100;

/// Environment variable holding the DataBackend admin token. Never persisted.
pub const BACKEND_ADMIN_TOKEN_ENV: &str = "AUTHBRIDGE_BACKEND_ADMIN_TOKEN";

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8787";
const DEFAULT_IDP_URL: &str = "https://api.stack-auth.com";
const DEFAULT_IDP_SESSION_COOKIE: &str = "stack-access";
const DEFAULT_BACKEND_URL: &str = "https://api.instantdb.com";

/// Opt-in bounded retry for recoverable sign-in failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

/// Token exchange endpoint (server side) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address the endpoint listens on.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Route the exchange handler is mounted at.
    #[serde(default = "default_exchange_path")]
    pub exchange_path: String,
    /// IdP API base URL used to verify sessions.
    #[serde(default = "default_idp_url")]
    pub idp_url: String,
    /// Name of the cookie carrying the IdP session.
    #[serde(default = "default_idp_session_cookie")]
    pub idp_session_cookie: String,
    /// DataBackend API base URL used to mint tokens.
    #[serde(default = "default_backend_url")]
    pub backend_url: String,
    /// DataBackend application id, sent with admin calls when set.
    #[serde(default)]
    pub backend_app_id: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            exchange_path: default_exchange_path(),
            idp_url: default_idp_url(),
            idp_session_cookie: default_idp_session_cookie(),
            backend_url: default_backend_url(),
            backend_app_id: None,
        }
    }
}

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Full URL of the token exchange endpoint (client side).
    #[serde(default = "default_token_endpoint_url")]
    pub token_endpoint_url: String,
    /// Transport-level timeout for outbound HTTP calls.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Pause between sign-out and sign-in when switching accounts.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Bounded retry policy; absent means trigger-driven retries only.
    #[serde(default)]
    pub retry: Option<RetrySettings>,
    #[serde(default)]
    pub server: ServerConfig,
    /// DataBackend admin token, read from the environment only.
    #[serde(skip)]
    pub backend_admin_token: Option<String>,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_token_endpoint_url() -> String {
    format!("http://{}{}", DEFAULT_BIND_ADDR, DEFAULT_EXCHANGE_PATH)
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_settle_delay_ms() -> u64 {
    DEFAULT_SETTLE_DELAY_MS
}

fn default_bind_addr() -> String {
    DEFAULT_BIND_ADDR.to_string()
}

fn default_exchange_path() -> String {
    DEFAULT_EXCHANGE_PATH.to_string()
}

fn default_idp_url() -> String {
    DEFAULT_IDP_URL.to_string()
}

fn default_idp_session_cookie() -> String {
    DEFAULT_IDP_SESSION_COOKIE.to_string()
}

fn default_backend_url() -> String {
    DEFAULT_BACKEND_URL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            token_endpoint_url: default_token_endpoint_url(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            retry: None,
            server: ServerConfig::default(),
            backend_admin_token: None,
        }
    }
}

impl Config {
    /// Load configuration from `paths.config_file()` if present, then apply
    /// environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file. The admin token is never written.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Apply `AUTHBRIDGE_*` overrides using `lookup` to read variables.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).and_then(non_empty);

        if let Some(level) = read("AUTHBRIDGE_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(url) = read("AUTHBRIDGE_TOKEN_ENDPOINT_URL") {
            self.token_endpoint_url = url;
        }
        if let Some(url) = read("AUTHBRIDGE_IDP_URL") {
            self.server.idp_url = url;
        }
        if let Some(url) = read("AUTHBRIDGE_BACKEND_URL") {
            self.server.backend_url = url;
        }
        if let Some(addr) = read("AUTHBRIDGE_BIND_ADDR") {
            self.server.bind_addr = addr;
        }
        if let Some(token) = read(BACKEND_ADMIN_TOKEN_ENV) {
            self.backend_admin_token = Some(token);
        }
    }

    /// Reject configurations whose URLs or bind address cannot be parsed.
    pub fn validate(&self) -> CoreResult<()> {
        self.token_endpoint_url()?;
        Url::parse(&self.server.idp_url)?;
        Url::parse(&self.server.backend_url)?;

        if !self.server.exchange_path.starts_with('/') {
            return Err(CoreError::Config(format!(
                "exchange_path must start with '/': {}",
                self.server.exchange_path
            )));
        }

        self.server
            .bind_addr
            .parse::<std::net::SocketAddr>()
            .map_err(|e| {
                CoreError::Config(format!("invalid bind_addr {}: {}", self.server.bind_addr, e))
            })?;

        if let Some(retry) = &self.retry {
            if retry.initial_delay_ms > retry.max_delay_ms {
                return Err(CoreError::Config(
                    "retry.initial_delay_ms must not exceed retry.max_delay_ms".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Get the token endpoint URL as a parsed URL.
    pub fn token_endpoint_url(&self) -> CoreResult<Url> {
        Url::parse(&self.token_endpoint_url).map_err(CoreError::from)
    }
}

fn non_empty(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
