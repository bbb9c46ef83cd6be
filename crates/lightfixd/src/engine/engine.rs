use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use super::registry::Registry;
use super::sink::CommandSink;
use crate::config::Config;
use crate::fixers::BrightnessRollback;
use crate::fixers::BrightnessSettings;
use crate::fixers::OnLevelReset;

/// lightfixd engine
///
/// Routes decoded device payloads to every enabled policy. Each policy keeps
/// its own registry of devices, so the same light can be tracked by several.
pub struct Engine {
    brightness: Option<Registry<BrightnessRollback>>,
    on_level: Option<Registry<OnLevelReset>>,
}

impl Engine {
    /// Create an engine with the policies enabled in `config`.
    pub fn new(config: &Config, sink: Arc<dyn CommandSink>) -> Self {
        let ignored = Arc::new(config.devices.ignored.clone());

        let brightness = config.brightness.enabled.then(|| {
            let settings = BrightnessSettings {
                history_size: config.brightness.history_size,
                lookback: config.brightness.lookback,
                strategy: config.brightness.strategy,
            };
            info!(
                "Brightness rollback enabled (quiescence {:?}, strategy {})",
                config.brightness.quiescence, settings.strategy
            );
            Registry::new(
                settings,
                config.brightness.quiescence,
                ignored.clone(),
                sink.clone(),
            )
        });

        let on_level = config.on_level.enabled.then(|| {
            info!(
                "On-level reset enabled (quiescence {:?})",
                config.on_level.quiescence
            );
            Registry::new((), config.on_level.quiescence, ignored.clone(), sink.clone())
        });

        Self {
            brightness,
            on_level,
        }
    }

    /// Handle one decoded payload published by `device`.
    pub fn dispatch(&mut self, device: &str, payload: &Value) {
        if let Some(registry) = &mut self.brightness {
            registry.dispatch(device, payload);
        }
        if let Some(registry) = &mut self.on_level {
            registry.dispatch(device, payload);
        }
    }

    pub fn brightness(&self) -> Option<&Registry<BrightnessRollback>> {
        self.brightness.as_ref()
    }

    pub fn on_level(&self) -> Option<&Registry<OnLevelReset>> {
        self.on_level.as_ref()
    }

    /// Cancel all pending decisions and forget every device.
    pub fn shutdown(&mut self) {
        info!("Engine shutting down");
        if let Some(registry) = self.brightness.take() {
            registry.cancel_all();
        }
        if let Some(registry) = self.on_level.take() {
            registry.cancel_all();
        }
    }
}
