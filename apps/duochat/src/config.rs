//! Configuration: defaults, then an optional JSON file, then CLI flags

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use shared_protocol::{
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_PORT, DecryptFailurePolicy, Framing, SessionConfig,
};

/// Environment variable naming a config file when `--config` is absent
pub const CONFIG_ENV: &str = "DUOCHAT_CONFIG";

/// Upper bound on every wait, one day
pub const MAX_TIMEOUT_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Port to host on and to connect to
    pub port: u16,
    /// How long to wait for a peer, in either role
    pub connect_timeout_secs: u64,
    /// Pause between failed connect attempts
    pub retry_pause_ms: u64,
    /// Bound on the key exchange once connected
    pub handshake_timeout_secs: u64,
    pub session: SessionConfig,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            retry_pause_ms: 500,
            handshake_timeout_secs: 30,
            session: SessionConfig::default(),
        }
    }
}

/// Values given on the command line; `None` keeps the loaded value
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub port: Option<u16>,
    pub connect_timeout_secs: Option<u64>,
    pub framing: Option<Framing>,
    pub decrypt_failure_policy: Option<DecryptFailurePolicy>,
}

impl ChatConfig {
    /// Load from `explicit`, else from `$DUOCHAT_CONFIG`, else defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

        match path {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn apply(mut self, overrides: &Overrides) -> Self {
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(secs) = overrides.connect_timeout_secs {
            self.connect_timeout_secs = secs;
        }
        if let Some(framing) = overrides.framing {
            self.session.framing = framing;
        }
        if let Some(policy) = overrides.decrypt_failure_policy {
            self.session.decrypt_failure_policy = policy;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must not be 0".into()));
        }
        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::Invalid("connect timeout must be positive".into()));
        }
        if self.handshake_timeout_secs == 0 {
            return Err(ConfigError::Invalid("handshake timeout must be positive".into()));
        }
        if self.connect_timeout_secs > MAX_TIMEOUT_SECS {
            return Err(ConfigError::Invalid(format!(
                "connect timeout must be at most {} seconds",
                MAX_TIMEOUT_SECS
            )));
        }
        if self.handshake_timeout_secs > MAX_TIMEOUT_SECS {
            return Err(ConfigError::Invalid(format!(
                "handshake timeout must be at most {} seconds",
                MAX_TIMEOUT_SECS
            )));
        }
        if self.retry_pause_ms == 0 {
            return Err(ConfigError::Invalid("retry pause must be positive".into()));
        }
        if self.session.receive_buffer_size == 0 {
            return Err(ConfigError::Invalid("receive buffer size must be positive".into()));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn retry_pause(&self) -> Duration {
        Duration::from_millis(self.retry_pause_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}
