//! Burnbox configuration

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context};
use burnbox_core::processor::{
    ProcessorParams, DEFAULT_MAX_DURATION, DEFAULT_MAX_FILE_SIZE, DEFAULT_MAX_PIN_ATTEMPTS,
};
use burnbox_crypto::cipher::KEY_SIZE;
use burnbox_crypto::Argon2Params;
use serde::{Deserialize, Serialize};

/// Default pin length
pub const DEFAULT_PIN_SIZE: usize = 5;

/// Upper bound accepted for `limits.max_duration_secs` (100 years)
pub const MAX_DURATION_LIMIT_SECS: u64 = 100 * 365 * 24 * 3600;

/// Default time between expiry sweeps (5 minutes)
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 300;

/// Top-level configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BurnboxConfig {
    /// Server secret, stretched to `32 - pin_size` bytes
    pub sign_key: String,
    /// Exact pin length in bytes
    pub pin_size: usize,
    /// Processing limits
    pub limits: LimitsConfig,
    /// Storage engine selection
    pub storage: StorageConfig,
    /// Pin hashing cost
    pub hasher: HasherConfig,
    /// Logging
    pub log: LogConfig,
}

impl Default for BurnboxConfig {
    fn default() -> Self {
        Self {
            sign_key: String::new(),
            pin_size: DEFAULT_PIN_SIZE,
            limits: LimitsConfig::default(),
            storage: StorageConfig::default(),
            hasher: HasherConfig::default(),
            log: LogConfig::default(),
        }
    }
}

// The sign key never reaches logs.
impl fmt::Debug for BurnboxConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BurnboxConfig")
            .field("sign_key", &"<redacted>")
            .field("pin_size", &self.pin_size)
            .field("limits", &self.limits)
            .field("storage", &self.storage)
            .field("hasher", &self.hasher)
            .field("log", &self.log)
            .finish()
    }
}

impl BurnboxConfig {
    /// Create with a sign key and defaults for everything else
    pub fn with_sign_key(sign_key: impl Into<String>) -> Self {
        Self {
            sign_key: sign_key.into(),
            ..Default::default()
        }
    }

    /// Load and validate a TOML config file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("invalid config {}", path.display()))
    }

    /// Parse and validate TOML
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: BurnboxConfig = toml::from_str(content)?;
        config.validate().map_err(|e| anyhow!(e))?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.sign_key.is_empty() {
            return Err("sign_key must be set".to_string());
        }
        if self.pin_size == 0 || self.pin_size >= KEY_SIZE {
            return Err(format!("pin_size must be between 1 and {}", KEY_SIZE - 1));
        }
        self.limits.validate()?;
        self.storage.validate()?;
        self.hasher.validate()?;
        Ok(())
    }
}

/// Processing limits; zero selects the built-in default
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Longest message lifetime in seconds
    pub max_duration_secs: u64,
    /// Wrong pins tolerated before destruction
    pub max_pin_attempts: u32,
    /// Largest file payload in bytes
    pub max_file_size: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_duration_secs: DEFAULT_MAX_DURATION.as_secs(),
            max_pin_attempts: DEFAULT_MAX_PIN_ATTEMPTS,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl LimitsConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_duration_secs > MAX_DURATION_LIMIT_SECS {
            return Err(format!(
                "limits.max_duration_secs must be at most {MAX_DURATION_LIMIT_SECS}"
            ));
        }
        Ok(())
    }

    /// Processor parameters for these limits
    pub fn to_params(&self) -> ProcessorParams {
        ProcessorParams {
            max_duration: Duration::from_secs(self.max_duration_secs),
            max_pin_attempts: self.max_pin_attempts,
            max_file_size: self.max_file_size,
        }
        .normalized()
    }
}

/// Storage engine kind
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    /// Volatile in-process map
    #[default]
    Memory,
    /// Embedded sled database
    Sled,
    /// SQLite database
    Sqlite,
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Engine::Memory => "memory",
            Engine::Sled => "sled",
            Engine::Sqlite => "sqlite",
        })
    }
}

/// Storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Engine to use
    pub engine: Engine,
    /// Database location for sled and SQLite
    pub path: Option<PathBuf>,
    /// Keep the database in memory instead of at `path`
    pub in_memory: bool,
    /// Seconds between expiry sweeps
    pub cleanup_interval_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            engine: Engine::Memory,
            path: None,
            in_memory: false,
            cleanup_interval_secs: DEFAULT_CLEANUP_INTERVAL_SECS,
        }
    }
}

impl StorageConfig {
    /// Get cleanup interval as Duration
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.cleanup_interval_secs == 0 {
            return Err("cleanup_interval_secs must be > 0".to_string());
        }
        if self.engine != Engine::Memory && !self.in_memory && self.path.is_none() {
            return Err(format!("storage.path is required for the {} engine", self.engine));
        }
        Ok(())
    }
}

/// Argon2id cost settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HasherConfig {
    /// Memory cost in KiB
    pub m_cost: u32,
    /// Number of passes
    pub t_cost: u32,
    /// Degree of parallelism
    pub p_cost: u32,
}

impl Default for HasherConfig {
    fn default() -> Self {
        let params = Argon2Params::default();
        Self {
            m_cost: params.m_cost,
            t_cost: params.t_cost,
            p_cost: params.p_cost,
        }
    }
}

impl HasherConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.t_cost == 0 || self.p_cost == 0 {
            return Err("hasher t_cost and p_cost must be > 0".to_string());
        }
        if self.m_cost < self.p_cost.saturating_mul(8) {
            return Err("hasher m_cost must be at least 8 * p_cost".to_string());
        }
        Ok(())
    }
}

impl From<&HasherConfig> for Argon2Params {
    fn from(config: &HasherConfig) -> Self {
        Argon2Params {
            m_cost: config.m_cost,
            t_cost: config.t_cost,
            p_cost: config.p_cost,
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
