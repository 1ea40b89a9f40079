//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml
//!
//! Every section and key is optional; missing values fall back to the
//! defaults below, which match a ceiling-mounted MaxSonar on a Raspberry Pi.

use crate::services::detector::DetectorConfig;
use anyhow::{ensure, Context};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct SerialConfig {
    #[serde(default = "default_serial_device")]
    pub device: String,
    #[serde(default = "default_serial_baud")]
    pub baud: u32,
    /// Timeout of each underlying read on the port
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device: default_serial_device(),
            baud: default_serial_baud(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

fn default_serial_device() -> String {
    "/dev/ttyAMA0".to_string() // Raspberry Pi primary UART
}

fn default_serial_baud() -> u32 {
    9600
}

fn default_read_timeout_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Deserialize)]
pub struct AcquisitionConfig {
    /// How long a single acquisition may poll for a good frame
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,
    /// Pause between acquisitions in the main loop
    #[serde(default = "default_idle_delay_ms")]
    pub idle_delay_ms: u64,
    /// Consecutive steady-state timeouts tolerated before giving up (0 = never)
    #[serde(default = "default_max_consecutive_timeouts")]
    pub max_consecutive_timeouts: u32,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            max_wait_ms: default_max_wait_ms(),
            idle_delay_ms: default_idle_delay_ms(),
            max_consecutive_timeouts: default_max_consecutive_timeouts(),
        }
    }
}

fn default_max_wait_ms() -> u64 {
    3000
}

fn default_idle_delay_ms() -> u64 {
    100
}

fn default_max_consecutive_timeouts() -> u32 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    /// Distance below baseline that must be exceeded (2 ft)
    #[serde(default = "default_safety_margin_mm")]
    pub safety_margin_mm: f64,
    #[serde(default = "default_required_consecutive")]
    pub required_consecutive: u32,
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            safety_margin_mm: default_safety_margin_mm(),
            required_consecutive: default_required_consecutive(),
            cooldown_ms: default_cooldown_ms(),
        }
    }
}

fn default_safety_margin_mm() -> f64 {
    609.6
}

fn default_required_consecutive() -> u32 {
    3
}

fn default_cooldown_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Interval between metrics summary log lines (0 to disable)
    #[serde(default = "default_metrics_interval_secs")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval_secs() }
    }
}

fn default_metrics_interval_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    serial_device: String,
    serial_baud: u32,
    serial_read_timeout_ms: u64,
    max_wait_ms: u64,
    idle_delay_ms: u64,
    max_consecutive_timeouts: u32,
    safety_margin_mm: f64,
    required_consecutive: u32,
    cooldown_ms: u64,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        Self {
            serial_device: toml_config.serial.device,
            serial_baud: toml_config.serial.baud,
            serial_read_timeout_ms: toml_config.serial.read_timeout_ms,
            max_wait_ms: toml_config.acquisition.max_wait_ms,
            idle_delay_ms: toml_config.acquisition.idle_delay_ms,
            max_consecutive_timeouts: toml_config.acquisition.max_consecutive_timeouts,
            safety_margin_mm: toml_config.detection.safety_margin_mm,
            required_consecutive: toml_config.detection.required_consecutive,
            cooldown_ms: toml_config.detection.cooldown_ms,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file,
        }
    }

    /// Determine config file path from args or environment
    pub fn resolve_config_path(cli_path: Option<&str>) -> String {
        if let Some(path) = cli_path {
            return path.to_string();
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str, origin: &str) -> anyhow::Result<Self> {
        let toml_config: TomlConfig =
            toml::from_str(content).with_context(|| format!("Failed to parse config {}", origin))?;
        let config = Self::from_toml(toml_config, origin.to_string());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content, &path.display().to_string())
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %format!("{:#}", e), "config_fallback_to_defaults");
                Self::default()
            }
        }
    }

    /// Reject values the detector and reader cannot work with
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.serial_baud > 0, "serial.baud must be positive");
        ensure!(self.max_wait_ms > 0, "acquisition.max_wait_ms must be positive");
        ensure!(
            self.safety_margin_mm.is_finite() && self.safety_margin_mm >= 0.0,
            "detection.safety_margin_mm must be a non-negative number, got {}",
            self.safety_margin_mm
        );
        ensure!(
            self.required_consecutive >= 1,
            "detection.required_consecutive must be at least 1"
        );
        Ok(())
    }

    /// Detector settings derived from the `[detection]` section
    pub fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            safety_margin_mm: self.safety_margin_mm,
            required_consecutive: self.required_consecutive,
            cooldown: Duration::from_millis(self.cooldown_ms),
        }
    }

    pub fn serial_device(&self) -> &str {
        &self.serial_device
    }

    pub fn serial_baud(&self) -> u32 {
        self.serial_baud
    }

    pub fn serial_read_timeout(&self) -> Duration {
        Duration::from_millis(self.serial_read_timeout_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn idle_delay(&self) -> Duration {
        Duration::from_millis(self.idle_delay_ms)
    }

    pub fn max_consecutive_timeouts(&self) -> u32 {
        self.max_consecutive_timeouts
    }

    pub fn safety_margin_mm(&self) -> f64 {
        self.safety_margin_mm
    }

    pub fn required_consecutive(&self) -> u32 {
        self.required_consecutive
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method to override the serial device (used by tools)
    pub fn with_serial_device(mut self, device: &str) -> Self {
        self.serial_device = device.to_string();
        self
    }

    /// Builder method to override the acquisition deadline
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait_ms = max_wait.as_millis() as u64;
        self
    }

    /// Builder method for tests to set the timeout limit
    #[cfg(test)]
    pub fn with_max_consecutive_timeouts(mut self, limit: u32) -> Self {
        self.max_consecutive_timeouts = limit;
        self
    }
}
