pub mod config;
pub mod engine;
pub mod fixers;
#[cfg(feature = "integration_mqtt")]
pub mod integrations;

pub use config::format_diagnostics;
pub use config::Config;
pub use config::Diagnostic;
pub use config::LogLevel;
pub use engine::Command;
pub use engine::CommandSink;
pub use engine::Engine;
pub use engine::LightState;
pub use engine::OnLevel;
