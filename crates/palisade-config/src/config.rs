//! Palisade configuration schema and environment loader.
//!
//! Configuration is layered: defaults built into the code, then
//! environment variable overrides, then [`PalisadeConfig::validate`]
//! asserting the security invariants at process start. The variable
//! names are the deployment contract and are read verbatim:
//!
//! | Variable               | Meaning                                    |
//! |------------------------|--------------------------------------------|
//! | `NODE_ENV`             | `production` selects production mode       |
//! | `SESSION_SECRET`       | HMAC signing secret, required in production|
//! | `CORS_ORIGINS`         | Comma-separated allowlist or `*`           |
//! | `ALLOW_NULL_ORIGIN`    | Tolerate `Origin: null` (dev only)         |
//! | `ALLOW_CREDENTIALS`    | Allow credentialed CORS requests           |
//! | `RATE_LIMIT_WINDOW_MS` | Fixed-window length in milliseconds        |
//! | `RATE_LIMIT_MAX`       | Request budget per window                  |
//! | `MAX_BODY_BYTES`       | Payload guard limit                        |
//! | `TRUST_PROXY`          | Honor `X-Forwarded-For`                    |
//! | `HTTP_ADDR`            | Listen address                             |

use crate::ConfigError;
use std::env;

/// Development secret; never accepted in production.
const DEV_SECRET: &str = "dev-secret-change-me";

/// Deployment mode, resolved from `NODE_ENV`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeploymentMode {
    /// Local development: relaxed origins, plaintext cookies.
    #[default]
    Development,
    /// Production-like: strict origin policy, `Secure` cookies.
    Production,
}

impl DeploymentMode {
    /// Resolves the mode from a `NODE_ENV` value.
    #[must_use]
    pub fn from_node_env(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("production") {
            Self::Production
        } else {
            Self::Development
        }
    }

    /// True in production mode.
    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

/// The CORS origin allowlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsOrigins {
    /// `CORS_ORIGINS=*`.
    Any,
    /// Exact-match allowlist.
    List(Vec<String>),
}

impl CorsOrigins {
    /// Parses the `CORS_ORIGINS` value.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        if value.trim() == "*" {
            return Self::Any;
        }
        Self::List(
            value
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// True for the wildcard allowlist.
    #[must_use]
    pub const fn is_wildcard(&self) -> bool {
        matches!(self, Self::Any)
    }
}

/// The complete Palisade configuration.
#[derive(Debug, Clone)]
pub struct PalisadeConfig {
    /// Deployment mode.
    pub mode: DeploymentMode,
    /// HMAC secret for session tokens and session-bound CSRF suffixes.
    pub session_secret: String,
    /// CORS origin allowlist.
    pub cors_origins: CorsOrigins,
    /// Whether `Origin: null` is tolerated (ignored in production).
    pub allow_null_origin: bool,
    /// Whether credentialed CORS requests are allowed.
    pub allow_credentials: bool,
    /// Rate-limit window length in milliseconds.
    pub rate_limit_window_ms: u64,
    /// Rate-limit request budget per window.
    pub rate_limit_max: u32,
    /// Payload guard limit in bytes.
    pub max_body_bytes: usize,
    /// Whether `X-Forwarded-For` is trustworthy.
    pub trust_proxy: bool,
    /// Listen address for the HTTP server.
    pub http_addr: String,
}

impl Default for PalisadeConfig {
    fn default() -> Self {
        Self {
            mode: DeploymentMode::Development,
            session_secret: DEV_SECRET.to_string(),
            cors_origins: CorsOrigins::List(vec!["http://localhost:3000".to_string()]),
            allow_null_origin: false,
            allow_credentials: true,
            rate_limit_window_ms: 60_000,
            rate_limit_max: 100,
            max_body_bytes: 1024 * 1024,
            trust_proxy: false,
            http_addr: "127.0.0.1:8080".to_string(),
        }
    }
}

impl PalisadeConfig {
    /// Loads the configuration from the process environment over defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when a variable is present but unparseable.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(value) = env::var("NODE_ENV") {
            config.mode = DeploymentMode::from_node_env(&value);
        }
        if let Ok(value) = env::var("SESSION_SECRET") {
            config.session_secret = value;
        }
        if let Ok(value) = env::var("CORS_ORIGINS") {
            config.cors_origins = CorsOrigins::parse(&value);
        }
        if let Ok(value) = env::var("ALLOW_NULL_ORIGIN") {
            config.allow_null_origin = parse_bool(&value)
                .ok_or_else(|| ConfigError::env_parse_error("ALLOW_NULL_ORIGIN", "expected boolean"))?;
        }
        if let Ok(value) = env::var("ALLOW_CREDENTIALS") {
            config.allow_credentials = parse_bool(&value)
                .ok_or_else(|| ConfigError::env_parse_error("ALLOW_CREDENTIALS", "expected boolean"))?;
        }
        if let Ok(value) = env::var("RATE_LIMIT_WINDOW_MS") {
            config.rate_limit_window_ms = value
                .parse()
                .map_err(|_| ConfigError::env_parse_error("RATE_LIMIT_WINDOW_MS", "expected integer"))?;
        }
        if let Ok(value) = env::var("RATE_LIMIT_MAX") {
            config.rate_limit_max = value
                .parse()
                .map_err(|_| ConfigError::env_parse_error("RATE_LIMIT_MAX", "expected integer"))?;
        }
        if let Ok(value) = env::var("MAX_BODY_BYTES") {
            config.max_body_bytes = value
                .parse()
                .map_err(|_| ConfigError::env_parse_error("MAX_BODY_BYTES", "expected integer"))?;
        }
        if let Ok(value) = env::var("TRUST_PROXY") {
            config.trust_proxy = parse_bool(&value)
                .ok_or_else(|| ConfigError::env_parse_error("TRUST_PROXY", "expected boolean"))?;
        }
        if let Ok(value) = env::var("HTTP_ADDR") {
            config.http_addr = value;
        }

        Ok(config)
    }

    /// Asserts the security invariants.
    ///
    /// Must pass before the server binds:
    ///
    /// - production requires a real `SESSION_SECRET`
    /// - wildcard origins are forbidden in production
    /// - wildcard origins and credentials are mutually exclusive
    /// - the rate-limit window and budget must be non-zero
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` naming the violated invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mode.is_production() {
            if self.session_secret.trim().is_empty() || self.session_secret == DEV_SECRET {
                return Err(ConfigError::missing_field("SESSION_SECRET"));
            }
            if self.cors_origins.is_wildcard() {
                return Err(ConfigError::validation_error(
                    "CORS_ORIGINS=* is not allowed in production",
                ));
            }
        }

        if self.cors_origins.is_wildcard() && self.allow_credentials {
            return Err(ConfigError::validation_error(
                "wildcard CORS origins cannot be combined with credentials",
            ));
        }

        if self.rate_limit_window_ms == 0 || self.rate_limit_max == 0 {
            return Err(ConfigError::validation_error(
                "rate limit window and budget must be non-zero",
            ));
        }

        if self.max_body_bytes == 0 {
            return Err(ConfigError::validation_error(
                "MAX_BODY_BYTES must be non-zero",
            ));
        }

        Ok(())
    }
}

/// Parses a boolean environment value.
fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
