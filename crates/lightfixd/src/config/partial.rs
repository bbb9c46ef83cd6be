use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use toml::Spanned;

use super::diagnostics::{
    Diagnostic, Error, FieldLocation, LoadError, MergeError, SourceInfo, Warning,
};
use super::LogLevel;
use crate::fixers::RollbackStrategy;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialConfig {
    #[serde(default)]
    pub imports: Vec<String>,

    pub logging: Option<PartialLoggingConfig>,
    pub mqtt: Option<PartialMqttConfig>,
    pub devices: Option<PartialDevicesConfig>,
    pub brightness: Option<PartialBrightnessConfig>,
    pub on_level: Option<PartialOnLevelConfig>,

    /// Source information for error reporting (not serialized)
    #[serde(skip)]
    pub source: Option<SourceInfo>,

    /// Where each merged field was defined, keyed by field path (not serialized)
    #[serde(skip)]
    pub locations: HashMap<String, FieldLocation>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialLoggingConfig {
    pub level: Option<Spanned<LogLevel>>,
    pub overrides: Option<HashMap<String, Spanned<LogLevel>>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialMqttConfig {
    pub broker: Option<Spanned<String>>,
    pub port: Option<Spanned<u16>>,
    pub client_id: Option<Spanned<String>>,
    pub base_topic: Option<Spanned<String>>,
    pub group_suffix: Option<Spanned<String>>,
    pub username: Option<Spanned<String>>,
    pub password: Option<Spanned<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialDevicesConfig {
    /// Devices never touched by any fixer. Lists from all files are combined.
    pub ignored: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialBrightnessConfig {
    pub enabled: Option<Spanned<bool>>,
    pub quiescence: Option<Spanned<f64>>,
    pub history_size: Option<Spanned<usize>>,
    pub lookback: Option<Spanned<f64>>,
    pub strategy: Option<Spanned<RollbackStrategy>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialOnLevelConfig {
    pub enabled: Option<Spanned<bool>>,
    pub quiescence: Option<Spanned<f64>>,
}

/// First-wins merge state shared across all files
#[derive(Default)]
struct Merger {
    diagnostics: Vec<Diagnostic>,
    locations: HashMap<String, FieldLocation>,
}

impl Merger {
    /// Keep the first definition of `field_path`, reporting any later one as a conflict
    fn field<T>(
        &mut self,
        field_path: &str,
        source: &SourceInfo,
        slot: &mut Option<Spanned<T>>,
        incoming: Option<Spanned<T>>,
    ) {
        let Some(value) = incoming else {
            return;
        };

        let location = FieldLocation::new(source, value.span());
        if let Some(prev) = self.locations.get(field_path) {
            self.diagnostics.push(Diagnostic::Error(Error::Merge(MergeError {
                field_path: field_path.to_string(),
                message: format!("'{}' defined in multiple config files", field_path),
                conflicts: vec![prev.clone(), location],
            })));
        } else {
            *slot = Some(value);
            self.locations.insert(field_path.to_string(), location);
        }
    }
}

impl PartialConfig {
    /// Load a single config file without processing imports
    pub fn from_file(path: &Path) -> Result<Self, LoadError> {
        let content = std::fs::read_to_string(path).map_err(|e| LoadError::Io {
            path: path.to_path_buf(),
            error: e,
        })?;

        Self::from_content(path, content)
    }

    /// Parse config text as if it had been read from `path`
    pub fn from_content(path: &Path, content: String) -> Result<Self, LoadError> {
        let mut config: PartialConfig = toml::from_str(&content).map_err(|e| LoadError::Parse {
            path: path.to_path_buf(),
            error: e,
        })?;

        config.source = Some(SourceInfo {
            file_path: path.to_path_buf(),
            content,
        });

        Ok(config)
    }

    /// Load config files with import resolution
    ///
    /// Each config file is loaded, then its imports are recursively processed.
    /// Cycle detection prevents infinite loops.
    ///
    /// Returns a Vec of all loaded configs in order (imports first, then parent)
    pub fn load_with_imports(paths: &[PathBuf]) -> Result<Vec<Self>, LoadError> {
        let mut visited = HashSet::new();
        let mut loaded = HashSet::new();
        let mut all_configs = Vec::new();

        for path in paths {
            Self::load_recursive(path, &mut visited, &mut loaded, &mut all_configs)?;
        }

        Ok(all_configs)
    }

    /// Recursively load a config file and its imports
    ///
    /// `visited` holds the current import chain; `loaded` every file already
    /// loaded, so a file imported from two places is only merged once.
    fn load_recursive(
        path: &Path,
        visited: &mut HashSet<PathBuf>,
        loaded: &mut HashSet<PathBuf>,
        configs: &mut Vec<Self>,
    ) -> Result<(), LoadError> {
        // Canonicalize the path to detect cycles reliably
        let canonical_path = path
            .canonicalize()
            .unwrap_or_else(|_| path.to_path_buf());

        if visited.contains(&canonical_path) {
            return Err(LoadError::ImportCycle {
                path: canonical_path.clone(),
                cycle: visited.iter().cloned().collect(),
            });
        }

        if !loaded.insert(canonical_path.clone()) {
            return Ok(());
        }

        visited.insert(canonical_path.clone());

        let config = Self::from_file(path)?;

        // Imports first (depth-first), relative to the importing file
        for import in &config.imports {
            let import_path = PathBuf::from(import);
            let resolved_path = if import_path.is_absolute() {
                import_path
            } else {
                let parent_dir = path.parent().unwrap_or_else(|| Path::new("."));
                parent_dir.join(import_path)
            };

            Self::load_recursive(&resolved_path, visited, loaded, configs)?;
        }

        configs.push(config);

        visited.remove(&canonical_path);

        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.imports.is_empty()
            && self.logging.is_none()
            && self.mqtt.is_none()
            && self.devices.is_none()
            && self.brightness.is_none()
            && self.on_level.is_none()
    }

    /// Merge multiple partial configs together
    ///
    /// Uses first-wins semantics: the first occurrence of a field is kept.
    /// Conflicts (same field defined in multiple configs) are collected as errors
    /// but merging continues to find all conflicts at once.
    ///
    /// Returns (merged, diagnostics) where diagnostics may contain warnings and errors
    pub fn merge<I>(configs: I) -> (Self, Vec<Diagnostic>)
    where
        I: IntoIterator<Item = Self>,
    {
        let mut result = PartialConfig::default();
        let mut merger = Merger::default();
        let mut imports = Vec::new();

        for config in configs {
            let source = config.source.clone().unwrap_or_else(|| SourceInfo {
                file_path: PathBuf::from("<unknown>"),
                content: String::new(),
            });

            if config.is_empty() {
                merger.diagnostics.push(Diagnostic::Warning(Warning::EmptyConfig {
                    file_path: source.file_path.clone(),
                }));
            }

            imports.extend(config.imports);

            if let Some(logging) = config.logging {
                let into = result.logging.get_or_insert_with(Default::default);
                merger.field("logging.level", &source, &mut into.level, logging.level);

                for (target, level) in logging.overrides.unwrap_or_default() {
                    let overrides = into.overrides.get_or_insert_with(HashMap::new);
                    let mut slot = overrides.remove(&target);
                    merger.field(
                        &format!("logging.overrides.{}", target),
                        &source,
                        &mut slot,
                        Some(level),
                    );
                    if let Some(level) = slot {
                        overrides.insert(target, level);
                    }
                }
            }

            if let Some(mqtt) = config.mqtt {
                let into = result.mqtt.get_or_insert_with(Default::default);
                merger.field("mqtt.broker", &source, &mut into.broker, mqtt.broker);
                merger.field("mqtt.port", &source, &mut into.port, mqtt.port);
                merger.field("mqtt.client_id", &source, &mut into.client_id, mqtt.client_id);
                merger.field("mqtt.base_topic", &source, &mut into.base_topic, mqtt.base_topic);
                merger.field(
                    "mqtt.group_suffix",
                    &source,
                    &mut into.group_suffix,
                    mqtt.group_suffix,
                );
                merger.field("mqtt.username", &source, &mut into.username, mqtt.username);
                merger.field("mqtt.password", &source, &mut into.password, mqtt.password);
            }

            if let Some(devices) = config.devices {
                let into = result.devices.get_or_insert_with(Default::default);
                if let Some(ignored) = devices.ignored {
                    into.ignored.get_or_insert_with(Vec::new).extend(ignored);
                }
            }

            if let Some(brightness) = config.brightness {
                let into = result.brightness.get_or_insert_with(Default::default);
                merger.field("brightness.enabled", &source, &mut into.enabled, brightness.enabled);
                merger.field(
                    "brightness.quiescence",
                    &source,
                    &mut into.quiescence,
                    brightness.quiescence,
                );
                merger.field(
                    "brightness.history_size",
                    &source,
                    &mut into.history_size,
                    brightness.history_size,
                );
                merger.field(
                    "brightness.lookback",
                    &source,
                    &mut into.lookback,
                    brightness.lookback,
                );
                merger.field(
                    "brightness.strategy",
                    &source,
                    &mut into.strategy,
                    brightness.strategy,
                );
            }

            if let Some(on_level) = config.on_level {
                let into = result.on_level.get_or_insert_with(Default::default);
                merger.field("on_level.enabled", &source, &mut into.enabled, on_level.enabled);
                merger.field(
                    "on_level.quiescence",
                    &source,
                    &mut into.quiescence,
                    on_level.quiescence,
                );
            }
        }

        result.imports = imports;
        result.locations = merger.locations;

        (result, merger.diagnostics)
    }
}
