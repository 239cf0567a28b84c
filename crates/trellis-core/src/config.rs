//! Connection pool configuration.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (`TRELLIS__STORE__*`)
//! 2. Config file (`[store]` section of `trellis.toml`)
//! 3. Defaults

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Server-side inference mode requested for every connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReasoningMode {
    #[default]
    None,
    Rdfs,
    Ql,
    Rl,
    El,
    Dl,
    Sl,
}

impl ReasoningMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Rdfs => "RDFS",
            Self::Ql => "QL",
            Self::Rl => "RL",
            Self::El => "EL",
            Self::Dl => "DL",
            Self::Sl => "SL",
        }
    }
}

impl fmt::Display for ReasoningMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Username/password pair sent when opening a connection.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Configuration for a connection pool against one server endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Server URL (scheme, host, and port).
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Database to open on the server.
    #[serde(default = "default_database")]
    pub database: String,

    #[serde(default)]
    pub credentials: Option<Credentials>,

    #[serde(default)]
    pub reasoning: ReasoningMode,

    /// Connections opened eagerly at startup.
    #[serde(default = "default_min_size")]
    pub min_size: usize,

    /// Upper bound on live connections.
    #[serde(default = "default_max_size")]
    pub max_size: usize,

    /// How long `acquire` waits for capacity before giving up.
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,

    /// Local storage home handed to the transport, if it needs one.
    #[serde(default)]
    pub home: Option<PathBuf>,
}

fn default_endpoint() -> String {
    "http://localhost:5820".to_string()
}

fn default_database() -> String {
    "trellis".to_string()
}

fn default_min_size() -> usize {
    1
}

fn default_max_size() -> usize {
    8
}

fn default_acquire_timeout_ms() -> u64 {
    30_000
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            database: default_database(),
            credentials: None,
            reasoning: ReasoningMode::default(),
            min_size: default_min_size(),
            max_size: default_max_size(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            home: None,
        }
    }
}

impl PoolConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    /// Check the sizing and endpoint invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::EmptyEndpoint);
        }
        if self.min_size > self.max_size {
            return Err(ConfigError::PoolSize {
                min_size: self.min_size,
                max_size: self.max_size,
            });
        }
        Ok(())
    }

    /// Load from `{file_prefix}.{toml,yaml,json}` (optional) and
    /// `TRELLIS__STORE__*` environment variables.
    ///
    /// A missing `[store]` section yields the defaults. The result is
    /// validated before it is returned.
    pub fn load(file_prefix: &str) -> Result<Self, ConfigError> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix("TRELLIS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Self::from_config(&cfg)
    }

    /// Extract the `store` section from an already-built [`config::Config`].
    pub fn from_config(cfg: &config::Config) -> Result<Self, ConfigError> {
        let loaded = match cfg.get::<PoolConfig>("store") {
            Ok(c) => c,
            Err(config::ConfigError::NotFound(_)) => PoolConfig::default(),
            Err(e) => return Err(e.into()),
        };
        loaded.validate()?;
        Ok(loaded)
    }
}
