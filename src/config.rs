//! Device configuration and configuration loading helpers.

use std::env;
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use serde::Deserialize;

use crate::dispatch::DispatchStrategy;
use crate::status::BlockError;
use crate::transfer::KERNEL_SECTOR_SIZE;

/// Default device name
pub const DEFAULT_NAME: &str = "cryptrd";
/// Default number of sectors
pub const DEFAULT_SECTOR_COUNT: u64 = 1024;
/// Default sector size in bytes
pub const DEFAULT_SECTOR_SIZE: usize = KERNEL_SECTOR_SIZE;
/// Default idle delay before a media change is simulated
pub const DEFAULT_IDLE_DELAY: Duration = Duration::from_secs(30);

/// Errors returned by configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error while reading config files.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parse error.
    #[error("toml parse error: {0}")]
    Toml(#[from] toml::de::Error),
    /// Invalid value for a key.
    #[error("invalid value for {key}: {value}")]
    InvalidValue {
        /// Configuration key.
        key: String,
        /// Raw value string.
        value: String,
    },
    /// Unknown configuration key.
    #[error("unknown config key: {0}")]
    UnknownKey(String),
}

/// Construction parameters for a [`RamDisk`](crate::RamDisk)
///
/// Immutable once the device is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RamDiskConfig {
    /// Device name used in logs
    pub name: String,
    /// Number of sectors
    pub sector_count: u64,
    /// Sector size in bytes; a positive multiple of 512
    pub sector_size: usize,
    /// Request dispatch strategy
    pub dispatch: DispatchStrategy,
    /// Idle time after the last close before a media change is simulated
    pub idle_delay: Duration,
}

impl Default for RamDiskConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            sector_count: DEFAULT_SECTOR_COUNT,
            sector_size: DEFAULT_SECTOR_SIZE,
            dispatch: DispatchStrategy::Simple,
            idle_delay: DEFAULT_IDLE_DELAY,
        }
    }
}

impl RamDiskConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the device name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the number of sectors
    pub fn with_sector_count(mut self, sector_count: u64) -> Self {
        self.sector_count = sector_count;
        self
    }

    /// Set the sector size
    pub fn with_sector_size(mut self, sector_size: usize) -> Self {
        self.sector_size = sector_size;
        self
    }

    /// Set the dispatch strategy
    pub fn with_dispatch(mut self, dispatch: DispatchStrategy) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Set the idle delay
    pub fn with_idle_delay(mut self, idle_delay: Duration) -> Self {
        self.idle_delay = idle_delay;
        self
    }

    /// Check the configuration and compute the capacity in bytes
    pub fn validate(&self) -> Result<usize, BlockError> {
        if self.sector_count == 0 {
            return Err(BlockError::InvalidArgument("sector count must be positive"));
        }
        if self.sector_size == 0 || self.sector_size % KERNEL_SECTOR_SIZE != 0 {
            return Err(BlockError::InvalidArgument(
                "sector size must be a positive multiple of 512",
            ));
        }
        if Instant::now().checked_add(self.idle_delay).is_none() {
            return Err(BlockError::InvalidArgument("idle delay out of range"));
        }
        usize::try_from(self.sector_count)
            .ok()
            .and_then(|count| count.checked_mul(self.sector_size))
            .ok_or(BlockError::InvalidArgument("capacity overflows usize"))
    }
}

/// Top-level configuration schema.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CryptrdConfig {
    /// Device configuration.
    pub device: Option<DeviceConfigSpec>,
}

/// Device configuration from TOML/env.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceConfigSpec {
    /// Device name.
    pub name: Option<String>,
    /// Number of sectors.
    pub sector_count: Option<u64>,
    /// Sector size in bytes.
    pub sector_size: Option<usize>,
    /// Dispatch strategy name or legacy request-mode code.
    pub dispatch: Option<String>,
    /// Idle delay in milliseconds.
    pub idle_delay_ms: Option<u64>,
}

impl CryptrdConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Load configuration from the `CRYPTRD_CONFIG` env var (if set),
    /// then apply `CRYPTRD__section__field` overrides.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        let mut config = match env::var("CRYPTRD_CONFIG").ok() {
            Some(path) => Self::load_from_path(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply environment overrides in-place.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(env::vars())
    }

    fn apply_overrides(
        &mut self,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<(), ConfigError> {
        for (key, value) in vars {
            let Some(rest) = key.strip_prefix("CRYPTRD__") else {
                continue;
            };
            let path = rest.to_ascii_lowercase();
            let parts: Vec<&str> = path.split("__").collect();
            let value = value.trim().to_string();

            match parts.as_slice() {
                ["device", "name"] => {
                    self.device_mut().name = Some(value);
                }
                ["device", "sector_count"] => {
                    self.device_mut().sector_count = Some(parse_value(&key, &value)?);
                }
                ["device", "sector_size"] => {
                    self.device_mut().sector_size = Some(parse_value(&key, &value)?);
                }
                ["device", "dispatch"] => {
                    self.device_mut().dispatch = Some(value);
                }
                ["device", "idle_delay_ms"] => {
                    self.device_mut().idle_delay_ms = Some(parse_value(&key, &value)?);
                }
                _ => return Err(ConfigError::UnknownKey(key)),
            }
        }

        Ok(())
    }

    /// Build a validated `RamDiskConfig` using defaults plus overrides.
    pub fn to_ramdisk_config(&self) -> Result<RamDiskConfig, ConfigError> {
        let mut config = RamDiskConfig::default();
        if let Some(device) = &self.device {
            device.apply_to(&mut config)?;
        }
        config.validate().map_err(|err| ConfigError::InvalidValue {
            key: "device".into(),
            value: err.to_string(),
        })?;
        Ok(config)
    }

    fn device_mut(&mut self) -> &mut DeviceConfigSpec {
        self.device.get_or_insert_with(DeviceConfigSpec::default)
    }
}

impl DeviceConfigSpec {
    fn apply_to(&self, config: &mut RamDiskConfig) -> Result<(), ConfigError> {
        if let Some(name) = &self.name {
            config.name = name.clone();
        }
        if let Some(value) = self.sector_count {
            config.sector_count = value;
        }
        if let Some(value) = self.sector_size {
            config.sector_size = value;
        }
        if let Some(value) = &self.dispatch {
            config.dispatch = value.parse().map_err(|_| ConfigError::InvalidValue {
                key: "device.dispatch".into(),
                value: value.clone(),
            })?;
        }
        if let Some(value) = self.idle_delay_ms {
            config.idle_delay = Duration::from_millis(value);
        }
        Ok(())
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}
