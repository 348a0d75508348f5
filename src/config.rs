//! Configuration module for the payments gateway.
//!
//! Configuration is read once at startup from a JSON file:
//!
//! ```json
//! {
//!   "port": 8080,
//!   "base_path": "/payments",
//!   "payments_service": { "url": "$PAYMENTS_SERVICE_URL", "timeout_ms": 3000 },
//!   "routes": {
//!     "p2p": { "url": "http://p2p:8080", "check": "/check", "create": "/payments" },
//!     "p2m": { "url": "http://p2m:8080", "status": "/smpay/payments/{payment_id}" },
//!     "iban": { "url": "http://c2a:8080" },
//!     "tokenization": { "url": "http://tokenization:8080" }
//!   }
//! }
//! ```
//!
//! URL values accept `$VAR` and `${VAR}` references that are resolved from the environment.

use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::net::IpAddr;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use url::Url;

use crate::payment_type::PaymentType;

/// CLI arguments for the payments gateway.
#[derive(Parser, Debug)]
#[command(name = "payments-gateway")]
#[command(about = "Routes payment requests to per-type upstream services")]
struct CliArgs {
    /// Path to the JSON configuration file
    #[arg(long, short, env = "CONFIG", default_value = "config.json")]
    config: PathBuf,
}

/// Server configuration.
///
/// Fields missing from the file fall back to environment variables,
/// then to hardcoded defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "config_defaults::default_port")]
    port: u16,
    #[serde(default = "config_defaults::default_host")]
    host: IpAddr,
    #[serde(default = "config_defaults::default_base_path")]
    base_path: String,
    #[serde(default = "config_defaults::default_max_body_bytes")]
    max_body_bytes: usize,
    payments_service: PaymentsServiceConfig,
    routes: RoutesConfig,
}

/// Where to find the payments service that resolves payment and operation ids.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentsServiceConfig {
    pub url: LiteralOrEnv<Url>,
    /// Per-request timeout for lookups, in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl PaymentsServiceConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Upstream settings of one payment type.
///
/// Every path override is optional; a missing override means the operation
/// is not offered for this payment type.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteConfig {
    pub url: LiteralOrEnv<Url>,
    #[serde(default)]
    pub check: Option<String>,
    #[serde(default, alias = "payment")]
    pub create: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub cancel: Option<String>,
    #[serde(default)]
    pub repeat: Option<String>,
}

/// Upstream settings for every payment type. All four types must be present.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoutesConfig {
    pub p2p: RouteConfig,
    pub p2m: RouteConfig,
    pub iban: RouteConfig,
    pub tokenization: RouteConfig,
}

impl RoutesConfig {
    pub fn for_type(&self, payment_type: PaymentType) -> &RouteConfig {
        match payment_type {
            PaymentType::P2p => &self.p2p,
            PaymentType::P2m => &self.p2m,
            PaymentType::Iban => &self.iban,
            PaymentType::Tokenization => &self.tokenization,
        }
    }
}

/// A transparent wrapper that resolves environment variables during deserialization.
///
/// Supports both literal values and environment variable references:
/// - Literal: `"http://localhost:8083"`
/// - Simple env var: `"$P2P_URL"`
/// - Braced env var: `"${P2P_URL}"`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralOrEnv<T>(T);

impl<T> LiteralOrEnv<T> {
    pub fn from_literal(value: T) -> Self {
        Self(value)
    }

    pub fn inner(&self) -> &T {
        &self.0
    }

    /// Returns the variable name if the string matches `$VAR` or `${VAR}` syntax.
    fn parse_env_var_syntax(s: &str) -> Option<&str> {
        if let Some(braced) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
            Some(braced)
        } else if let Some(name) = s.strip_prefix('$') {
            let is_name = !name.is_empty()
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
            is_name.then_some(name)
        } else {
            None
        }
    }
}

impl<T> Deref for LiteralOrEnv<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'de, T> Deserialize<'de> for LiteralOrEnv<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;

        let value = match Self::parse_env_var_syntax(&s) {
            Some(var_name) => std::env::var(var_name).map_err(|_| {
                serde::de::Error::custom(format!(
                    "Environment variable '{var_name}' not found (referenced as '{s}')"
                ))
            })?,
            None => s,
        };

        let parsed = value
            .parse::<T>()
            .map_err(|e| serde::de::Error::custom(format!("Failed to parse value: {e}")))?;

        Ok(LiteralOrEnv(parsed))
    }
}

pub mod config_defaults {
    use std::env;
    use std::net::{IpAddr, Ipv4Addr};

    pub const DEFAULT_PORT: u16 = 8080;
    pub const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
    pub const DEFAULT_BASE_PATH: &str = "/payments";
    pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

    /// Returns the default port value with fallback: $PORT env var -> 8080
    pub fn default_port() -> u16 {
        env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PORT)
    }

    /// Returns the default host value with fallback: $HOST env var -> "0.0.0.0"
    pub fn default_host() -> IpAddr {
        env::var("HOST")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_HOST)
    }

    pub fn default_base_path() -> String {
        DEFAULT_BASE_PATH.to_string()
    }

    pub fn default_max_body_bytes() -> usize {
        DEFAULT_MAX_BODY_BYTES
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {0}: {1}")]
    FileRead(PathBuf, std::io::Error),
    #[error("Failed to parse config file: {0}")]
    JsonParse(#[from] serde_json::Error),
    #[error("Invalid base_path {0:?}: must start with '/' and must not end with '/'")]
    BasePath(String),
}

impl Config {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn host(&self) -> IpAddr {
        self.host
    }

    /// Public prefix of every gateway endpoint, e.g. `/payments`.
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Largest request body the gateway buffers for classification.
    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    pub fn payments_service(&self) -> &PaymentsServiceConfig {
        &self.payments_service
    }

    pub fn routes(&self) -> &RoutesConfig {
        &self.routes
    }

    /// Load configuration from CLI arguments and JSON file.
    ///
    /// The config file path is determined by:
    /// 1. `--config <path>` CLI argument
    /// 2. `$CONFIG` environment variable
    /// 3. `./config.json`
    pub fn load() -> Result<Self, ConfigError> {
        let cli_args = CliArgs::parse();
        let config_path = Path::new(&cli_args.config)
            .canonicalize()
            .map_err(|e| ConfigError::FileRead(cli_args.config, e))?;
        Self::load_from_path(config_path)
    }

    fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(&path).map_err(|e| ConfigError::FileRead(path, e))?;
        Self::from_json(&content)
    }

    /// Parses and validates configuration from a JSON document.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let base_path = self.base_path.as_str();
        if !base_path.starts_with('/') || base_path.ends_with('/') {
            return Err(ConfigError::BasePath(self.base_path.clone()));
        }
        Ok(())
    }
}
