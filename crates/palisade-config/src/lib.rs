//! # Palisade Config
//!
//! Environment-layered configuration for the Palisade BFF.
//!
//! Defaults are built into the code; environment variables override them;
//! [`PalisadeConfig::validate`] asserts the security invariants before the
//! server binds. A production process with a wildcard CORS allowlist or a
//! missing session secret refuses to start.
//!
//! ## Example
//!
//! ```
//! use palisade_config::PalisadeConfig;
//!
//! let config = PalisadeConfig::default();
//! assert!(config.validate().is_ok());
//! assert_eq!(config.rate_limit_max, 100);
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;

pub use config::{CorsOrigins, DeploymentMode, PalisadeConfig};
pub use error::ConfigError;
