//! Engine and write-ahead log configuration.
//!
//! Both structs deserialize with serde defaults, so a config file only
//! needs the keys it changes. Environment overrides use the `LOB` prefix
//! with `__` between nesting levels, e.g. `LOB_WAL__SYNC_INTERVAL=64`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::arena::NULL_SLOT;
use crate::error::{ArenaError, EngineError, WalError};
use crate::wal::buffer::ALIGNMENT;

const ENV_PREFIX: &str = "LOB";
const ENV_SEPARATOR: &str = "__";

/// Write-ahead log configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalConfig {
    /// Log file; created if missing, continued if present
    pub path: PathBuf,
    /// Write buffer size in bytes (rounded up to 4096)
    pub buffer_size: usize,
    /// Flush and fsync after this many records; 0 leaves it to the caller
    pub sync_interval: u32,
    /// Open with O_DIRECT and write whole aligned blocks
    ///
    /// The partial last block is rewritten in place on each flush.
    pub direct_io: bool,
    /// Append a CRC32 to every record
    pub crc_enabled: bool,
}

impl Default for WalConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("lob.wal"),
            buffer_size: 1 << 20,
            sync_interval: 0,
            direct_io: false,
            crc_enabled: true,
        }
    }
}

impl WalConfig {
    /// Default settings for a log at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), WalError> {
        if self.path.as_os_str().is_empty() {
            return Err(WalError::InvalidConfig("path is empty".into()));
        }
        if self.buffer_size < ALIGNMENT {
            return Err(WalError::InvalidConfig(format!(
                "buffer_size must be at least {ALIGNMENT}, got {}",
                self.buffer_size
            )));
        }
        Ok(())
    }
}

/// Order book engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Slots in the arena (orders plus price levels)
    pub capacity: u32,
    /// Number of product books
    pub max_products: usize,
    /// Caller bytes colocated with each slot
    pub hot_size: usize,
    /// Caller bytes per slot in the aux slab
    pub cold_size: usize,
    /// Durable logging; `None` runs in memory only
    pub wal: Option<WalConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            capacity: 1 << 20,
            max_products: 16,
            hot_size: 0,
            cold_size: 0,
            wal: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let cfg = config::Config::builder()
            .add_source(Self::environment())
            .build()?;

        cfg.try_deserialize()
    }

    /// Load configuration from file
    pub fn from_file(path: &str) -> Result<Self, config::ConfigError> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(Self::environment())
            .build()?;

        cfg.try_deserialize()
    }

    fn environment() -> config::Environment {
        config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator(ENV_SEPARATOR)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.capacity == 0 || self.capacity >= NULL_SLOT {
            return Err(ArenaError::InvalidConfig(format!(
                "capacity must be in 1..{NULL_SLOT}, got {}",
                self.capacity
            ))
            .into());
        }
        if self.max_products == 0 || self.max_products > u16::MAX as usize + 1 {
            return Err(ArenaError::InvalidConfig(format!(
                "max_products must be in 1..=65536, got {}",
                self.max_products
            ))
            .into());
        }
        if self.hot_size > u16::MAX as usize || self.cold_size > u16::MAX as usize {
            return Err(ArenaError::InvalidConfig(format!(
                "hot/cold sizes must fit in 16 bits, got {}/{}",
                self.hot_size, self.cold_size
            ))
            .into());
        }
        if let Some(wal) = &self.wal {
            wal.validate()?;
        }
        Ok(())
    }
}
