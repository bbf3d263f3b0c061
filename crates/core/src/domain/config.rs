//! Configuration management for muffle
//!
//! This module provides:
//! - Engine timing, settings-store location and simulation seed config
//! - TOML load/save
//! - A config manager for `~/.config/muffle/config.toml` that falls back to
//!   factory defaults

use crate::domain::device::DeviceType;
use crate::domain::engine::EngineConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, error, info, instrument};

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Where the exclusion settings live
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Settings file (None = `settings.toml` next to the config file)
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// A device the simulated mixer starts with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatedDeviceConfig {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub origin: Option<String>,
    pub device_type: DeviceType,
}

/// Seed for the simulated audio session used by `muffle run`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Number of state polls the mixer stays in "connecting"
    pub connecting_polls: u32,

    /// How long the simulated panel takes to insert a row for a new device
    pub host_insert_delay_ms: u64,

    pub devices: Vec<SimulatedDeviceConfig>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            connecting_polls: 2,
            host_insert_delay_ms: 50,
            devices: Vec::new(),
        }
    }
}

/// Complete muffle configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MuffleConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl MuffleConfig {
    /// Load configuration from TOML file
    #[instrument(skip(path))]
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = fs::read_to_string(path).await?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;

        debug!("Configuration loaded successfully");
        Ok(config)
    }

    /// Save configuration to TOML file
    #[instrument(skip(self, path))]
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        info!(path = %path.display(), "Saving configuration");

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let toml_str = toml::to_string_pretty(self)?;
        fs::write(path, toml_str).await?;

        debug!("Configuration saved successfully");
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.engine.ready_poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "engine.ready_poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if let Some(device) = self
            .simulation
            .devices
            .iter()
            .find(|d| d.description.as_deref().is_some_and(str::is_empty))
        {
            return Err(ConfigError::Invalid(format!(
                "simulated {} device has an empty description; omit it instead",
                device.device_type
            )));
        }
        Ok(())
    }

    /// Resolve the settings file path against the config directory
    pub fn settings_path(&self, config_dir: &Path) -> PathBuf {
        self.store
            .path
            .clone()
            .unwrap_or_else(|| config_dir.join("settings.toml"))
    }

    /// Create factory default configuration
    pub fn factory_default() -> Self {
        let mut config = Self::default();

        let devices = [
            ("Speakers", "Built-in Audio", DeviceType::Output),
            ("Headphones", "Built-in Audio", DeviceType::Output),
            ("HDMI / DisplayPort", "Built-in Audio", DeviceType::Output),
            ("Microphone", "Built-in Audio", DeviceType::Input),
            ("Webcam Microphone", "USB Audio", DeviceType::Input),
        ];
        config.simulation.devices = devices
            .into_iter()
            .map(|(description, origin, device_type)| SimulatedDeviceConfig {
                description: Some(description.to_string()),
                origin: Some(origin.to_string()),
                device_type,
            })
            .collect();

        config
    }
}

/// Configuration manager for the main muffle config
///
/// Manages the config file at `~/.config/muffle/config.toml`.
pub struct ConfigManager {
    config_dir: PathBuf,
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(config_dir: PathBuf) -> Self {
        let config_path = config_dir.join("config.toml");
        Self {
            config_dir,
            config_path,
        }
    }

    /// Manage an explicit config file instead of the default location
    pub fn with_config_file(config_path: PathBuf) -> Self {
        let config_dir = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self {
            config_dir,
            config_path,
        }
    }

    /// Get the default config directory path
    ///
    /// Returns `~/.config/muffle` on Linux
    pub fn default_config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("muffle"))
            .ok_or_else(|| ConfigError::Invalid("Could not determine config directory".to_string()))
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load configuration from file
    ///
    /// If the config file doesn't exist, returns factory default.
    /// If the config file is corrupt, logs an error and returns factory default.
    #[instrument(skip(self))]
    pub async fn load(&self) -> MuffleConfig {
        if !self.config_path.exists() {
            info!(
                path = %self.config_path.display(),
                "Config file not found, creating factory default"
            );

            let config = MuffleConfig::factory_default();
            if let Err(e) = config.save_to_file(&self.config_path).await {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to save factory default config"
                );
            }
            return config;
        }

        match MuffleConfig::load_from_file(&self.config_path).await {
            Ok(config) => config,
            Err(e) => {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to load config, using factory default"
                );

                let backup_path = self.config_path.with_extension("toml.corrupt");
                if let Err(copy_err) = fs::copy(&self.config_path, &backup_path).await {
                    error!(
                        path = %backup_path.display(),
                        error = %copy_err,
                        "Failed to backup corrupt config"
                    );
                }

                MuffleConfig::factory_default()
            }
        }
    }

    #[instrument(skip(self, config))]
    pub async fn save(&self, config: &MuffleConfig) -> Result<()> {
        fs::create_dir_all(&self.config_dir).await?;
        config.save_to_file(&self.config_path).await
    }

    pub fn exists(&self) -> bool {
        self.config_path.exists()
    }
}
