use std::fmt;

use serde_json::Value;

/// Observable state of a dimmable light.
///
/// Brightness only matters while the light is on, so two "off" states are
/// equal whatever brightness they carry.
#[derive(Debug, Clone, Copy, Default, Eq)]
pub struct LightState {
    /// Whether the light is on or off.
    pub on: bool,

    /// Brightness level (0-255).
    pub brightness: u8,
}

impl LightState {
    pub fn new(on: bool, brightness: u8) -> Self {
        Self { on, brightness }
    }

    /// Decode a Zigbee2MQTT state payload, e.g. `{"state": "ON", "brightness": 128}`.
    ///
    /// Returns `None` unless both `state` and `brightness` are present.
    /// Brightness values outside 0-255 are clamped.
    pub fn from_payload(payload: &Value) -> Option<Self> {
        let state = payload.get("state")?.as_str()?;
        let brightness = payload.get("brightness")?;
        let brightness = match brightness.as_u64() {
            Some(b) => b.min(u64::from(u8::MAX)) as u8,
            None if brightness.as_i64().is_some() => 0,
            None => brightness.as_f64()?.clamp(0.0, 255.0).round() as u8,
        };

        Some(Self {
            on: state == "ON",
            brightness,
        })
    }
}

impl PartialEq for LightState {
    fn eq(&self, other: &Self) -> bool {
        match (self.on, other.on) {
            (false, false) => true,
            (true, true) => self.brightness == other.brightness,
            _ => false,
        }
    }
}

impl fmt::Display for LightState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let power = if self.on { "ON" } else { "OFF" };
        write!(f, "{:>3} {:>3}", power, self.brightness)
    }
}

/// Value of a light's power-on level setting (`level_config.on_level`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OnLevel {
    /// Restore the brightness the light had before it lost power.
    Previous,
    /// Fixed brightness on power-up.
    Level(u8),
    /// Any other value the device reports.
    Other(String),
}

impl OnLevel {
    /// Value of the ZCL `genLevelCtrl.onLevel` attribute meaning "previous".
    pub const PREVIOUS_ATTRIBUTE: u8 = 0xff;

    /// Decode `level_config.on_level` from a Zigbee2MQTT state payload.
    pub fn from_payload(payload: &Value) -> Option<Self> {
        let on_level = payload.get("level_config")?.get("on_level")?;
        Some(match on_level {
            Value::String(s) if s == "previous" => OnLevel::Previous,
            Value::String(s) => OnLevel::Other(s.clone()),
            Value::Number(n) => match n.as_u64().and_then(|n| u8::try_from(n).ok()) {
                Some(level) => OnLevel::Level(level),
                None => OnLevel::Other(n.to_string()),
            },
            other => OnLevel::Other(other.to_string()),
        })
    }

    /// The raw `onLevel` attribute value to write for this setting.
    pub fn attribute(&self) -> Option<u8> {
        match self {
            OnLevel::Previous => Some(Self::PREVIOUS_ATTRIBUTE),
            OnLevel::Level(level) => Some(*level),
            OnLevel::Other(_) => None,
        }
    }
}

impl fmt::Display for OnLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OnLevel::Previous => f.write_str("previous"),
            OnLevel::Level(level) => write!(f, "{}", level),
            OnLevel::Other(s) => f.write_str(s),
        }
    }
}
