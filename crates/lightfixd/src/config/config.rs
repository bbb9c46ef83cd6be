use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use toml::Spanned;
use tracing_subscriber::filter::{LevelFilter, Targets};

use super::diagnostics::{
    format_diagnostics, Diagnostic, Error, FieldLocation, LoadError, ValidationError,
};
use super::partial::PartialConfig;
use crate::engine::DEFAULT_HISTORY_SIZE;
use crate::fixers::RollbackStrategy;

#[derive(Debug, Default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub mqtt: MqttConfig,
    pub devices: DevicesConfig,
    pub brightness: BrightnessConfig,
    pub on_level: OnLevelConfig,
}

// LogLevel needs Deserialize because it's used in PartialLoggingConfig with toml::Spanned
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: LogLevel,

    /// Per-target levels, e.g. `"lightfixd::engine" = "debug"`
    pub overrides: HashMap<String, LogLevel>,
}

impl LoggingConfig {
    /// Build the tracing filter for this configuration
    pub fn filter(&self) -> Targets {
        Targets::new()
            .with_default(LevelFilter::from(self.level))
            .with_targets(
                self.overrides
                    .iter()
                    .map(|(target, level)| (target.clone(), LevelFilter::from(*level))),
            )
    }
}

/// Connection to the MQTT broker the Zigbee2MQTT bridge publishes to
#[derive(Debug, Clone)]
pub struct MqttConfig {
    /// MQTT broker hostname or IP address
    pub broker: String,

    /// MQTT broker port
    pub port: u16,

    /// MQTT client ID
    pub client_id: String,

    /// Topic prefix devices publish under (default: "zigbee2mqtt")
    pub base_topic: String,

    /// Device names ending with this suffix are groups and are skipped
    pub group_suffix: Option<String>,

    /// Optional username for authentication
    pub username: Option<String>,

    /// Optional password for authentication
    pub password: Option<String>,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker: "localhost".to_string(),
            port: 1883,
            client_id: "lightfixd".to_string(),
            base_topic: "zigbee2mqtt".to_string(),
            group_suffix: Some("_g".to_string()),
            username: None,
            password: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct DevicesConfig {
    /// Devices no fixer ever touches
    pub ignored: HashSet<String>,
}

#[derive(Debug)]
pub struct BrightnessConfig {
    pub enabled: bool,

    /// Time a light must be quiet before its brightness is checked
    pub quiescence: Duration,

    /// Snapshots retained per light
    pub history_size: usize,

    /// On-time to search for a previous brightness (windowed strategy)
    pub lookback: Duration,

    pub strategy: RollbackStrategy,
}

impl Default for BrightnessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            quiescence: Duration::from_millis(500),
            history_size: DEFAULT_HISTORY_SIZE,
            lookback: Duration::from_secs(10),
            strategy: RollbackStrategy::default(),
        }
    }
}

#[derive(Debug)]
pub struct OnLevelConfig {
    pub enabled: bool,

    /// Time a light must be quiet before its on_level is checked
    pub quiescence: Duration,
}

impl Default for OnLevelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            quiescence: Duration::from_secs(1),
        }
    }
}

/// Error type for [`Config::from_files`]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] LoadError),

    /// One or more errors, already formatted for display
    #[error("{0}")]
    Invalid(String),
}

/// Collects validation errors with the location each field came from
struct Validator<'a> {
    locations: &'a HashMap<String, FieldLocation>,
    diagnostics: &'a mut Vec<Diagnostic>,
}

impl Validator<'_> {
    fn error(&mut self, field_path: &str, message: impl Into<String>) {
        self.diagnostics
            .push(Diagnostic::Error(Error::Validation(ValidationError {
                field_path: field_path.to_string(),
                message: message.into(),
                location: self.locations.get(field_path).cloned(),
            })));
    }

    /// A strictly positive number of seconds
    fn duration(
        &mut self,
        field_path: &str,
        value: Option<Spanned<f64>>,
        default: Duration,
    ) -> Duration {
        let Some(value) = value else {
            return default;
        };

        match Duration::try_from_secs_f64(value.into_inner()) {
            Ok(duration) if !duration.is_zero() => duration,
            _ => {
                self.error(field_path, "must be a positive number of seconds");
                default
            }
        }
    }
}

impl Config {
    /// Load configuration from multiple TOML files with import resolution
    ///
    /// Supports:
    /// - Multiple config files (e.g., base + secrets)
    /// - Import statements within config files
    /// - Conflict detection across all sources
    /// - Validation with all errors and warnings reported together
    ///
    /// Returns Ok((Config, diagnostics)) where diagnostics contains only warnings.
    pub fn from_files(paths: &[PathBuf]) -> Result<(Self, Vec<Diagnostic>), ConfigError> {
        let configs = PartialConfig::load_with_imports(paths)?;

        // Merge with first-wins semantics, collecting diagnostics
        let (partial, diagnostics) = PartialConfig::merge(configs);

        Self::from_partial(partial, diagnostics)
    }

    /// Convert a PartialConfig to a Config, validating all fields
    ///
    /// Takes diagnostics from the merge step and adds validation diagnostics.
    /// Returns Ok((Config, diagnostics)) if no errors, Err if there are errors.
    pub fn from_partial(
        partial: PartialConfig,
        mut diagnostics: Vec<Diagnostic>,
    ) -> Result<(Self, Vec<Diagnostic>), ConfigError> {
        let mut v = Validator {
            locations: &partial.locations,
            diagnostics: &mut diagnostics,
        };

        let logging = match partial.logging {
            Some(logging) => LoggingConfig {
                level: logging.level.map(Spanned::into_inner).unwrap_or_default(),
                overrides: logging
                    .overrides
                    .map(|hm| hm.into_iter().map(|(k, v)| (k, v.into_inner())).collect())
                    .unwrap_or_default(),
            },
            None => LoggingConfig::default(),
        };

        let defaults = MqttConfig::default();
        let mqtt = match partial.mqtt {
            Some(mqtt) => {
                let port = match mqtt.port.map(Spanned::into_inner) {
                    Some(0) => {
                        v.error("mqtt.port", "port must not be 0");
                        defaults.port
                    }
                    Some(port) => port,
                    None => defaults.port,
                };

                let base_topic = match mqtt.base_topic.map(Spanned::into_inner) {
                    Some(topic) => {
                        let topic = topic.trim_end_matches('/').to_string();
                        if topic.is_empty() || topic.contains(['+', '#']) {
                            v.error(
                                "mqtt.base_topic",
                                "must be a non-empty topic without wildcards",
                            );
                        }
                        topic
                    }
                    None => defaults.base_topic,
                };

                let username = mqtt.username.map(Spanned::into_inner);
                let password = mqtt.password.map(Spanned::into_inner);
                match (&username, &password) {
                    (Some(_), None) => v.error("mqtt.username", "username requires password"),
                    (None, Some(_)) => v.error("mqtt.password", "password requires username"),
                    _ => {}
                }

                MqttConfig {
                    broker: mqtt.broker.map(Spanned::into_inner).unwrap_or(defaults.broker),
                    port,
                    client_id: mqtt
                        .client_id
                        .map(Spanned::into_inner)
                        .unwrap_or(defaults.client_id),
                    base_topic,
                    group_suffix: match mqtt.group_suffix {
                        Some(suffix) => Some(suffix.into_inner()).filter(|s| !s.is_empty()),
                        None => defaults.group_suffix,
                    },
                    username,
                    password,
                }
            }
            None => defaults,
        };

        let devices = DevicesConfig {
            ignored: partial
                .devices
                .and_then(|d| d.ignored)
                .unwrap_or_default()
                .into_iter()
                .collect(),
        };

        let defaults = BrightnessConfig::default();
        let brightness = match partial.brightness {
            Some(brightness) => BrightnessConfig {
                enabled: brightness
                    .enabled
                    .map(Spanned::into_inner)
                    .unwrap_or(defaults.enabled),
                quiescence: v.duration(
                    "brightness.quiescence",
                    brightness.quiescence,
                    defaults.quiescence,
                ),
                history_size: match brightness.history_size.map(Spanned::into_inner) {
                    Some(0) => {
                        v.error("brightness.history_size", "must be at least 1");
                        defaults.history_size
                    }
                    Some(size) => size,
                    None => defaults.history_size,
                },
                lookback: v.duration("brightness.lookback", brightness.lookback, defaults.lookback),
                strategy: brightness
                    .strategy
                    .map(Spanned::into_inner)
                    .unwrap_or(defaults.strategy),
            },
            None => defaults,
        };

        let defaults = OnLevelConfig::default();
        let on_level = match partial.on_level {
            Some(on_level) => OnLevelConfig {
                enabled: on_level
                    .enabled
                    .map(Spanned::into_inner)
                    .unwrap_or(defaults.enabled),
                quiescence: v.duration(
                    "on_level.quiescence",
                    on_level.quiescence,
                    defaults.quiescence,
                ),
            },
            None => defaults,
        };

        let config = Config {
            logging,
            mqtt,
            devices,
            brightness,
            on_level,
        };

        // Check if there are any errors (not just warnings)
        if diagnostics.iter().any(|d| d.is_error()) {
            Err(ConfigError::Invalid(format_diagnostics(&diagnostics)))
        } else {
            Ok((config, diagnostics))
        }
    }
}
