//! Configuration module for serialvis
//!
//! This module handles application configuration including:
//! - Serial link settings (port, baud rate, reconnect policy)
//! - Collection settings (channel capacity, ring buffer size, CSV log path)
//! - View settings (time window, refresh rate, auto-range parameters)
//!
//! # Files
//!
//! Configuration can be stored as TOML (`.toml`) or JSON (`.json`). Without
//! an explicit path, `config.toml` in the platform config directory is used
//! when it exists:
//! - **Linux**: `~/.config/serialvis/`
//! - **macOS**: `~/Library/Application Support/serialvis/`
//! - **Windows**: `%APPDATA%\serialvis\`
//!
//! Every field has a default, so a file only needs the values it changes:
//!
//! ```toml
//! [serial]
//! port = "/dev/ttyUSB0"
//!
//! [view]
//! plot_fields = ["ax", "ay", "az"]
//! fixed_range = [-20.0, 20.0]
//! ```

pub mod save_path;

pub use save_path::{resolve_save_path, resolve_save_path_at};

use crate::error::{Result, StreamError};
use crate::range::{DisplayRange, RangeSettings};
use crate::types::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_MAX_POINTS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application identifier for config directories
pub const APP_ID: &str = "serialvis";

/// Config filename inside the app config directory
pub const CONFIG_FILE: &str = "config.toml";

/// Default baud rate
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default read timeout in milliseconds
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 1000;

/// Default wait between reconnect attempts in milliseconds
pub const DEFAULT_RECONNECT_BACKOFF_MS: u64 = 2000;

/// Shortest refresh interval of the presenter
pub const MIN_REFRESH_INTERVAL_MS: u64 = 50;

/// Get the default config file path
pub fn default_config_path() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID).join(CONFIG_FILE))
}

// ==================== App Config ====================

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub serial: SerialConfig,

    #[serde(default)]
    pub collection: CollectionConfig,

    #[serde(default)]
    pub view: ViewConfig,
}

impl AppConfig {
    /// Load a config file, picking the format from the extension
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            StreamError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let mut config: AppConfig = if is_json(path) {
            serde_json::from_str(&content).map_err(|e| {
                StreamError::Config(format!("Failed to parse config file {:?}: {}", path, e))
            })?
        } else {
            toml::from_str(&content).map_err(|e| {
                StreamError::Config(format!("Failed to parse config file {:?}: {}", path, e))
            })?
        };

        config.validate()?;
        Ok(config)
    }

    /// Load the default config file, falling back to defaults
    pub fn load_or_default() -> Self {
        match default_config_path() {
            Some(path) if path.exists() => match Self::load(&path) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Ignoring config file: {}", e);
                    Self::default()
                }
            },
            _ => Self::default(),
        }
    }

    /// Save the config, picking the format from the extension
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StreamError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = if is_json(path) {
            serde_json::to_string_pretty(self)
                .map_err(|e| StreamError::Config(format!("Failed to serialize config: {}", e)))?
        } else {
            toml::to_string_pretty(self)
                .map_err(|e| StreamError::Config(format!("Failed to serialize config: {}", e)))?
        };

        std::fs::write(path, content).map_err(|e| {
            StreamError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }

    /// Clamp soft limits and reject values the pipeline cannot run with
    pub fn validate(&mut self) -> Result<()> {
        if !self.view.smoothing_alpha.is_finite() {
            return Err(StreamError::Config(format!(
                "smoothing_alpha must be a number in 0..1, got {}",
                self.view.smoothing_alpha
            )));
        }
        self.view.smoothing_alpha = self.view.smoothing_alpha.clamp(0.0, 1.0);

        if self.collection.max_points == 0 {
            return Err(StreamError::Config("max_points must be at least 1".to_string()));
        }
        if self.collection.channel_capacity == 0 {
            return Err(StreamError::Config(
                "channel_capacity must be at least 1".to_string(),
            ));
        }
        if !(self.view.window_seconds > 0.0 && self.view.window_seconds.is_finite()) {
            return Err(StreamError::Config(format!(
                "window_seconds must be positive, got {}",
                self.view.window_seconds
            )));
        }
        if !(self.view.margin_ratio >= 0.0 && self.view.margin_ratio.is_finite()) {
            return Err(StreamError::Config(format!(
                "margin_ratio must not be negative, got {}",
                self.view.margin_ratio
            )));
        }
        if let Some((lo, hi)) = self.view.fixed_range {
            if !(lo.is_finite() && hi.is_finite() && lo < hi) {
                return Err(StreamError::Config(format!(
                    "fixed range needs finite min < max, got {},{}",
                    lo, hi
                )));
            }
        }
        Ok(())
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"))
}

// ==================== Serial Config ====================

/// Serial link configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Port name, e.g. `/dev/ttyUSB0` or `COM7`
    pub port: String,

    /// Baud rate
    pub baud_rate: u32,

    /// Upper bound on one blocking read in milliseconds
    pub read_timeout_ms: u64,

    /// Reopen the port after failures instead of giving up
    pub auto_reconnect: bool,

    /// Wait between reconnect attempts in milliseconds
    pub reconnect_backoff_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            auto_reconnect: true,
            reconnect_backoff_ms: DEFAULT_RECONNECT_BACKOFF_MS,
        }
    }
}

impl SerialConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }
}

// ==================== Collection Config ====================

/// Data collection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    /// Capacity of the reader -> consumer channel
    pub channel_capacity: usize,

    /// Maximum number of points kept per series
    pub max_points: usize,

    /// CSV log path, already resolved to a concrete file
    pub save_path: Option<PathBuf>,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            max_points: DEFAULT_MAX_POINTS,
            save_path: None,
        }
    }
}

// ==================== View Config ====================

/// Presenter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    /// Trailing time window in seconds
    pub window_seconds: f64,

    /// Refresh rate in Hz
    pub refresh_hz: f64,

    /// Fixed vertical range; auto-range when absent
    pub fixed_range: Option<(f64, f64)>,

    /// Relative margin added to the auto range
    pub margin_ratio: f64,

    /// Smoothing factor for the auto range, 0..1
    pub smoothing_alpha: f64,

    /// Keep zero inside the auto range
    pub include_zero: bool,

    /// Fields to plot; picked from the first header when empty
    pub plot_fields: Vec<String>,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            window_seconds: 15.0,
            refresh_hz: 15.0,
            fixed_range: None,
            margin_ratio: 0.05,
            smoothing_alpha: 0.25,
            include_zero: false,
            plot_fields: Vec::new(),
        }
    }
}

impl ViewConfig {
    /// Interval between presenter refreshes
    ///
    /// Rates below 10 Hz are treated as 10 Hz and the interval never drops
    /// under [`MIN_REFRESH_INTERVAL_MS`].
    pub fn refresh_interval(&self) -> Duration {
        let hz = if self.refresh_hz.is_finite() {
            self.refresh_hz.max(10.0)
        } else {
            10.0
        };
        let ms = ((1000.0 / hz) as u64).max(MIN_REFRESH_INTERVAL_MS);
        Duration::from_millis(ms)
    }

    /// Auto-range parameters for this view
    pub fn range_settings(&self) -> RangeSettings {
        RangeSettings {
            margin_ratio: self.margin_ratio,
            smoothing_alpha: self.smoothing_alpha.clamp(0.0, 1.0),
            include_zero: self.include_zero,
            fixed: self.fixed_range.map(DisplayRange::from),
        }
    }
}

/// Parse a `min,max` pair as given on the command line
pub fn parse_range_pair(value: &str) -> Result<(f64, f64)> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    let invalid = || StreamError::Config(format!("Use format: min,max (e.g. -20,20), got {:?}", value));

    if parts.len() != 2 {
        return Err(invalid());
    }
    let lo = parts[0].parse::<f64>().map_err(|_| invalid())?;
    let hi = parts[1].parse::<f64>().map_err(|_| invalid())?;
    Ok((lo, hi))
}

// ==================== Tests ====================
