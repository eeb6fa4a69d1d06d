//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every field has a default, so an empty file (or no file at all) is a valid
//! configuration:
//!
//! ```toml
//! [serial]
//! port = "/dev/rfcomm0"
//! baud_rate = 57600
//!
//! [decoder]
//! qnh_pa = 101325.0
//!
//! [locus]
//! enabled = true
//! output_dir = "./locus"
//!
//! [logging]
//! level = "info"
//! log_dir = "./logs"
//! ```

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{BfvError, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,

    #[serde(default)]
    pub decoder: DecoderConfig,

    #[serde(default)]
    pub locus: LocusConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    /// Device path; empty means try the usual USB and Bluetooth paths
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Read timeout for a single line
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Telemetry decoder configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DecoderConfig {
    /// Pressure reference for altitude, Pa
    #[serde(default = "default_qnh_pa")]
    pub qnh_pa: f64,
}

/// GPS log dump configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LocusConfig {
    #[serde(default = "default_locus_enabled")]
    pub enabled: bool,

    #[serde(default = "default_locus_output_dir")]
    pub output_dir: String,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Also write daily log files here when set
    #[serde(default)]
    pub log_dir: Option<String>,
}

// Default value functions
fn default_serial_port() -> String { String::new() }
fn default_baud_rate() -> u32 { 57600 }
fn default_timeout_ms() -> u64 { 2000 }

fn default_qnh_pa() -> f64 { crate::telemetry::decoder::DEFAULT_QNH_PA }

fn default_locus_enabled() -> bool { true }
fn default_locus_output_dir() -> String { ".".to_string() }

fn default_log_level() -> String { "info".to_string() }

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self { qnh_pa: default_qnh_pa() }
    }
}

impl Default for LocusConfig {
    fn default() -> Self {
        Self {
            enabled: default_locus_enabled(),
            output_dir: default_locus_output_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: None,
        }
    }
}

/// Baud rates the vario firmware can be switched to with `$BRB` / `$BRC`
const SUPPORTED_BAUD_RATES: &[u32] = &[9600, 19200, 38400, 57600, 115200];

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use bfv_link::config::Config;
    ///
    /// let config = Config::load("bfv-link.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if !SUPPORTED_BAUD_RATES.contains(&self.serial.baud_rate) {
            return Err(BfvError::Config(toml::de::Error::custom(
                "baud_rate must be one of: 9600, 19200, 38400, 57600, 115200",
            )));
        }

        if self.serial.timeout_ms == 0 || self.serial.timeout_ms > 60000 {
            return Err(BfvError::Config(toml::de::Error::custom(
                "timeout_ms must be between 1 and 60000",
            )));
        }

        // Same bounds as the outputQNH parameter: 80000 + 0..=65535 Pa
        let qnh = self.decoder.qnh_pa;
        if !(80000.0..=145535.0).contains(&qnh) {
            return Err(BfvError::Config(toml::de::Error::custom(
                "qnh_pa must be between 80000 and 145535",
            )));
        }

        if self.locus.enabled && self.locus.output_dir.is_empty() {
            return Err(BfvError::Config(toml::de::Error::custom(
                "locus output_dir cannot be empty when enabled",
            )));
        }

        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(BfvError::Config(toml::de::Error::custom(format!(
                "logging level must be one of: {}",
                LOG_LEVELS.join(", ")
            ))));
        }

        if matches!(&self.logging.log_dir, Some(dir) if dir.is_empty()) {
            return Err(BfvError::Config(toml::de::Error::custom(
                "logging log_dir cannot be empty, omit it instead",
            )));
        }

        Ok(())
    }
}
