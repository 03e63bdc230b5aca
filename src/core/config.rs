//! Configuration module for the picker thumbnail engine
//!
//! Supports loading configuration from a TOML file.
//! Configuration is stored in a standard location:
//! - Windows: %APPDATA%\picker_thumbnails\config.toml
//! - Linux: ~/.config/picker_thumbnails/config.toml
//! - macOS: ~/Library/Application Support/picker_thumbnails/config.toml

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application name used for config directory
const APP_NAME: &str = "picker_thumbnails";

/// Default config file name
const CONFIG_FILE_NAME: &str = "config.toml";

/// Get the standard configuration directory for the application.
pub fn get_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_NAME))
}

/// Get the standard configuration file path.
pub fn get_config_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
}

/// Write the commented default config to the standard location unless one exists.
///
/// Returns the path to the config file.
pub fn init_config() -> Result<PathBuf, ConfigError> {
    let config_path = get_config_path().ok_or(ConfigError::ConfigDirNotFound)?;

    if !config_path.exists() {
        if let Some(dir) = config_path.parent() {
            fs::create_dir_all(dir)
                .map_err(|e| ConfigError::WriteError(dir.to_path_buf(), e.to_string()))?;
        }
        fs::write(&config_path, Config::generate_default_config())
            .map_err(|e| ConfigError::WriteError(config_path.clone(), e.to_string()))?;
    }

    Ok(config_path)
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Cache tier budgets and backfill settings
    pub cache: CacheConfig,

    /// Decode worker settings
    pub decode: DecodeConfig,

    /// Grid layout settings
    pub grid: GridConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

/// Cache tier configuration
///
/// Each tier gets `memory_budget_mb / divisor` bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Memory the picker may spend on thumbnails, in megabytes
    pub memory_budget_mb: u64,

    /// Low-resolution tier share (1/n of the budget)
    pub low_res_divisor: u64,

    /// High-resolution tier share (1/n of the budget)
    pub high_res_divisor: u64,

    /// Full-width tier share (1/n of the budget)
    pub full_width_divisor: u64,

    /// Longest edge of low-resolution placeholders, in pixels
    pub low_res_size: u32,

    /// Threads used to scale low-resolution placeholders
    pub backfill_threads: usize,
}

/// Decode worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeConfig {
    /// Frames extracted for an animated video preview
    pub animation_frames: u32,

    /// Spacing between preview frames, in milliseconds
    pub frame_interval_ms: u64,

    /// Sources larger than this are not decoded (bytes)
    pub max_source_bytes: u64,
}

/// Grid layout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Edge length of a square grid cell, in pixels
    pub image_size: u32,

    /// Image width in magnified (single column) mode
    pub full_width_size: u32,

    /// Start in magnified mode
    pub magnified: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log to file
    pub log_to_file: bool,

    /// Log file path
    pub log_file: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_budget_mb: 256,
            low_res_divisor: 8,
            high_res_divisor: 4,
            full_width_divisor: 4,
            low_res_size: 40,
            backfill_threads: 2,
        }
    }
}

impl CacheConfig {
    fn share(&self, divisor: u64) -> usize {
        let budget = self.memory_budget_mb.saturating_mul(1024 * 1024);
        (budget / divisor.max(1)) as usize
    }

    pub fn low_res_bytes(&self) -> usize {
        self.share(self.low_res_divisor)
    }

    pub fn high_res_bytes(&self) -> usize {
        self.share(self.high_res_divisor)
    }

    pub fn full_width_bytes(&self) -> usize {
        self.share(self.full_width_divisor)
    }
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            animation_frames: 10,
            frame_interval_ms: 2000,
            max_source_bytes: 100 * 1024 * 1024, // 100 MB
        }
    }
}

impl DecodeConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            image_size: 180,
            full_width_size: 1080,
            magnified: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_to_file: false,
            log_file: PathBuf::from("./picker_thumbnails.log"),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.to_path_buf(), e.to_string()))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;

        Ok(config)
    }

    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./picker_thumbnails.toml (current directory)
    /// 2. Standard config location
    ///
    /// If no config file is found, returns default configuration.
    pub fn load_default() -> Result<Self, ConfigError> {
        let local = PathBuf::from("./picker_thumbnails.toml");
        if local.exists() {
            return Self::load(&local);
        }

        if let Some(config_path) = get_config_path() {
            if config_path.exists() {
                return Self::load(&config_path);
            }
        }

        Ok(Self::default())
    }

    /// The file [`Config::load_default`] would read, or the standard path if none exists
    pub fn get_active_config_path() -> PathBuf {
        let local = PathBuf::from("./picker_thumbnails.toml");
        if local.exists() {
            return local;
        }
        get_config_path().unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME))
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteError(parent.to_path_buf(), e.to_string()))?;
            }
        }

        fs::write(path.as_ref(), content)
            .map_err(|e| ConfigError::WriteError(path.as_ref().to_path_buf(), e.to_string()))?;

        Ok(())
    }

    /// Generate a default config file with comments
    pub fn generate_default_config() -> String {
        include_str!("../../config.example.toml").to_string()
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("Failed to read config file '{}': {}", .0.display(), .1)]
    ReadError(PathBuf, String),
    #[error("Failed to parse config file '{}': {}", .0.display(), .1)]
    ParseError(PathBuf, String),
    #[error("Failed to serialize configuration: {0}")]
    SerializeError(String),
    #[error("Failed to write config file '{}': {}", .0.display(), .1)]
    WriteError(PathBuf, String),
    #[error("Could not determine configuration directory")]
    ConfigDirNotFound,
}
