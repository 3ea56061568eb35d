//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section and key is optional; missing values take the defaults
//! below.
//!
//! ```toml
//! [controller]
//! preset = "controller"
//!
//! [host]
//! preset = "extension"
//! deadzone = 10.0          # overrides the preset value
//!
//! [calibration]
//! epsilon = 1.0
//! decay = 0.99
//!
//! [sync]
//! endpoint = "mqtts://broker.example.com"
//! publish_interval_ms = 50
//!
//! [synthesizer.keys]
//! boost = ["Space"]
//! ```

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::actuation::KeyBindings;
use crate::error::{AirBridgeError, Result};
use crate::motion::pipeline::CONTROL_RANGE;
use crate::motion::{AxisMapping, CalibrationFilter, PipelineParams, PipelinePreset};
use crate::sync::Endpoint;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Motion pipeline on the publishing side.
    #[serde(default = "default_controller_pipeline")]
    pub controller: PipelineConfig,

    /// Actuation pipeline on the key-synthesizing side.
    #[serde(default = "default_host_pipeline")]
    pub host: PipelineConfig,

    #[serde(default)]
    pub calibration: CalibrationConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub sensor: SensorConfig,

    #[serde(default)]
    pub synthesizer: SynthesizerConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Pipeline configuration: a named preset plus explicit overrides.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct PipelineConfig {
    #[serde(default)]
    pub preset: PipelinePreset,

    #[serde(default)]
    pub smoothing_alpha: Option<f32>,

    #[serde(default)]
    pub deadzone: Option<f32>,

    #[serde(default)]
    pub max_tilt: Option<f32>,

    #[serde(default)]
    pub pwm_cycle_length: Option<u32>,

    #[serde(default)]
    pub pwm_min_fire: Option<f32>,

    #[serde(default)]
    pub axis_mapping: AxisMapping,
}

/// Calibration configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CalibrationConfig {
    #[serde(default = "default_epsilon")]
    pub epsilon: f32,

    #[serde(default = "default_decay")]
    pub decay: f32,
}

/// Transport configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    /// `mqtt://`, `mqtts://` or `memory://` URL.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// MQTT client id; generated when empty.
    #[serde(default)]
    pub client_id: String,

    #[serde(default = "default_publish_interval_ms")]
    pub publish_interval_ms: u64,

    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,

    /// How long a joining player waits for the room roster.
    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

/// Motion sensor configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SensorConfig {
    /// Event device path; auto-detected when empty.
    #[serde(default)]
    pub device_path: String,

    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

/// Key synthesizer configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SynthesizerConfig {
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    #[serde(default = "default_device_name")]
    pub device_name: String,

    #[serde(default)]
    pub keys: KeyBindings,
}

/// Telemetry configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_history_len")]
    pub history_len: usize,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    #[serde(default = "default_max_files_to_keep")]
    pub max_files_to_keep: usize,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily log files; console only when unset.
    #[serde(default)]
    pub log_dir: Option<String>,
}

// Default value functions
fn default_controller_pipeline() -> PipelineConfig { PipelineConfig::with_preset(PipelinePreset::Controller) }
fn default_host_pipeline() -> PipelineConfig { PipelineConfig::with_preset(PipelinePreset::Extension) }

fn default_epsilon() -> f32 { crate::motion::calibration::DEFAULT_EPSILON }
fn default_decay() -> f32 { crate::motion::calibration::DEFAULT_DECAY }

fn default_endpoint() -> String { "memory://local".to_string() }
fn default_publish_interval_ms() -> u64 { 50 }
fn default_keep_alive_secs() -> u64 { 5 }
fn default_join_timeout_ms() -> u64 { crate::sync::roster::DEFAULT_JOIN_TIMEOUT.as_millis() as u64 }

fn default_channel_capacity() -> usize { crate::motion::sensor::DEFAULT_SAMPLE_CAPACITY }

fn default_tick_ms() -> u64 { 16 }
fn default_device_name() -> String { crate::actuation::uinput::DEFAULT_DEVICE_NAME.to_string() }

fn default_log_dir() -> String { "./logs".to_string() }
fn default_history_len() -> usize { crate::telemetry::history::DEFAULT_HISTORY_LEN }
fn default_max_records_per_file() -> usize { 10000 }
fn default_max_files_to_keep() -> usize { 10 }

fn default_log_level() -> String { "info".to_string() }

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Default for Config {
    fn default() -> Self {
        Self {
            controller: default_controller_pipeline(),
            host: default_host_pipeline(),
            calibration: CalibrationConfig::default(),
            sync: SyncConfig::default(),
            sensor: SensorConfig::default(),
            synthesizer: SynthesizerConfig::default(),
            telemetry: TelemetryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            epsilon: default_epsilon(),
            decay: default_decay(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            client_id: String::new(),
            publish_interval_ms: default_publish_interval_ms(),
            keep_alive_secs: default_keep_alive_secs(),
            join_timeout_ms: default_join_timeout_ms(),
            username: None,
            password: None,
        }
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            device_path: String::new(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl Default for SynthesizerConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            device_name: default_device_name(),
            keys: KeyBindings::default(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            log_dir: default_log_dir(),
            history_len: default_history_len(),
            max_records_per_file: default_max_records_per_file(),
            max_files_to_keep: default_max_files_to_keep(),
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

impl PipelineConfig {
    /// A config using `preset` with no overrides.
    #[must_use]
    pub fn with_preset(preset: PipelinePreset) -> Self {
        Self {
            preset,
            ..Self::default()
        }
    }

    /// Resolves the preset and overrides into pipeline parameters.
    ///
    /// # Examples
    ///
    /// ```
    /// use air_bridge::config::PipelineConfig;
    /// use air_bridge::motion::PipelinePreset;
    ///
    /// let mut config = PipelineConfig::with_preset(PipelinePreset::Extension);
    /// config.deadzone = Some(10.0);
    ///
    /// let params = config.params();
    /// assert_eq!(params.deadzone, 10.0);
    /// assert_eq!(params.smoothing_alpha, 0.2);
    /// ```
    #[must_use]
    pub fn params(&self) -> PipelineParams {
        let base = self.preset.params();
        PipelineParams {
            smoothing_alpha: self.smoothing_alpha.unwrap_or(base.smoothing_alpha),
            deadzone: self.deadzone.unwrap_or(base.deadzone),
            max_tilt: self.max_tilt.unwrap_or(base.max_tilt),
            pwm_cycle_length: self.pwm_cycle_length.unwrap_or(base.pwm_cycle_length),
            pwm_min_fire: self.pwm_min_fire.unwrap_or(base.pwm_min_fire),
            axis_mapping: self.axis_mapping,
        }
    }

    fn validate(&self, section: &str) -> Result<()> {
        let params = self.params();

        if !(params.smoothing_alpha > 0.0 && params.smoothing_alpha <= 1.0) {
            return Err(invalid(format!("{}.smoothing_alpha must be in (0.0, 1.0]", section)));
        }

        if !(params.max_tilt > 0.0 && params.max_tilt <= CONTROL_RANGE) {
            return Err(invalid(format!(
                "{}.max_tilt must be in (0.0, {}]",
                section, CONTROL_RANGE
            )));
        }

        if !(params.deadzone >= 0.0 && params.deadzone < params.max_tilt) {
            return Err(invalid(format!(
                "{}.deadzone must be between 0.0 and max_tilt",
                section
            )));
        }

        if params.pwm_cycle_length == 0 || params.pwm_cycle_length > 60 {
            return Err(invalid(format!(
                "{}.pwm_cycle_length must be between 1 and 60",
                section
            )));
        }

        if !(params.pwm_min_fire >= 0.0 && params.pwm_min_fire < 1.0) {
            return Err(invalid(format!("{}.pwm_min_fire must be in [0.0, 1.0)", section)));
        }

        Ok(())
    }
}

impl CalibrationConfig {
    /// Builds an uncalibrated filter with these settings.
    #[must_use]
    pub fn filter(&self) -> CalibrationFilter {
        CalibrationFilter::new(self.epsilon, self.decay)
    }
}

impl SyncConfig {
    /// Parses the endpoint URL.
    ///
    /// # Errors
    ///
    /// Returns `TransportUnavailable` if the URL is not a supported endpoint.
    pub fn endpoint(&self) -> Result<Endpoint> {
        Endpoint::parse(&self.endpoint)
    }

    #[must_use]
    pub fn publish_interval(&self) -> Duration {
        Duration::from_millis(self.publish_interval_ms)
    }

    #[must_use]
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    #[must_use]
    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

impl SynthesizerConfig {
    #[must_use]
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

fn invalid(message: impl std::fmt::Display) -> AirBridgeError {
    AirBridgeError::Config(toml::de::Error::custom(message))
}

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
    /// use air_bridge::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
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
    /// Returns `Config` if any value is out of its valid range
    pub fn validate(&self) -> Result<()> {
        self.controller.validate("controller")?;
        self.host.validate("host")?;

        // Validate calibration
        if !(self.calibration.epsilon >= 0.0 && self.calibration.epsilon < CONTROL_RANGE) {
            return Err(invalid("calibration.epsilon must be between 0.0 and 60.0"));
        }

        if !(self.calibration.decay > 0.0 && self.calibration.decay <= 1.0) {
            return Err(invalid("calibration.decay must be in (0.0, 1.0]"));
        }

        // Validate transport
        if self.sync.endpoint().is_err() {
            return Err(invalid(format!(
                "sync.endpoint '{}' must be an mqtt://, mqtts:// or memory:// URL",
                self.sync.endpoint
            )));
        }

        if self.sync.publish_interval_ms == 0 || self.sync.publish_interval_ms > 1000 {
            return Err(invalid("sync.publish_interval_ms must be between 1 and 1000"));
        }

        if self.sync.keep_alive_secs == 0 || self.sync.keep_alive_secs > 3600 {
            return Err(invalid("sync.keep_alive_secs must be between 1 and 3600"));
        }

        if self.sync.join_timeout_ms == 0 || self.sync.join_timeout_ms > 60_000 {
            return Err(invalid("sync.join_timeout_ms must be between 1 and 60000"));
        }

        if self.sync.username.is_some() != self.sync.password.is_some() {
            return Err(invalid("sync.username and sync.password must be set together"));
        }

        if self.sensor.channel_capacity == 0 {
            return Err(invalid("sensor.channel_capacity must be greater than 0"));
        }

        // Validate synthesizer
        if self.synthesizer.tick_ms == 0 || self.synthesizer.tick_ms > 1000 {
            return Err(invalid("synthesizer.tick_ms must be between 1 and 1000"));
        }

        if self.synthesizer.keys.left.is_empty() || self.synthesizer.keys.right.is_empty() {
            return Err(invalid("synthesizer.keys.left and right cannot be empty"));
        }

        if self
            .synthesizer
            .keys
            .left
            .iter()
            .any(|key| self.synthesizer.keys.right.contains(key))
        {
            return Err(invalid("synthesizer.keys.left and right must not share keys"));
        }

        // Validate telemetry
        if self.telemetry.enabled && self.telemetry.log_dir.is_empty() {
            return Err(invalid("telemetry log_dir cannot be empty when enabled"));
        }

        if self.telemetry.history_len == 0 {
            return Err(invalid("history_len must be greater than 0"));
        }

        if self.telemetry.max_records_per_file == 0 {
            return Err(invalid("max_records_per_file must be greater than 0"));
        }

        if self.telemetry.max_files_to_keep == 0 {
            return Err(invalid("max_files_to_keep must be greater than 0"));
        }

        // Validate logging
        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            return Err(invalid(format!(
                "logging.level must be one of: {}",
                LOG_LEVELS.join(", ")
            )));
        }

        Ok(())
    }
}
