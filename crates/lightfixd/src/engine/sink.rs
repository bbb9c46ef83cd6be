use std::error::Error;

use async_trait::async_trait;

use super::state::OnLevel;

/// Corrective command sent to a device.
#[derive(Debug, Clone, PartialEq, Eq, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Command {
    /// Set the light's brightness (0-255).
    SetBrightness(u8),

    /// Write the light's power-on level configuration.
    SetOnLevel(OnLevel),
}

impl Command {
    /// Short name of the command kind, for logging.
    pub fn kind(&self) -> &'static str {
        self.into()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("command {command} cannot be encoded: {reason}")]
    Unsupported {
        command: &'static str,
        reason: String,
    },

    #[error("failed to deliver command: {0}")]
    Transport(#[source] Box<dyn Error + Send + Sync>),
}

/// Destination for corrective commands.
///
/// Implementations deliver best-effort; callers do not wait for the device
/// to acknowledge.
#[async_trait]
pub trait CommandSink: Send + Sync {
    async fn send(&self, device: &str, command: Command) -> Result<(), SendError>;
}

/// Sink that records every command, for tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub sent: std::sync::Mutex<Vec<(String, Command)>>,
}

#[cfg(test)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(String, Command)> {
        self.sent.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl CommandSink for RecordingSink {
    async fn send(&self, device: &str, command: Command) -> Result<(), SendError> {
        self.sent.lock().unwrap().push((device.to_string(), command));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_kind() {
        assert_eq!(Command::SetBrightness(3).kind(), "set_brightness");
        assert_eq!(Command::SetOnLevel(OnLevel::Previous).kind(), "set_on_level");
    }
}
