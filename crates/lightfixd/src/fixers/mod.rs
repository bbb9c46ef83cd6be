//! Correction policies.

pub mod brightness;
pub mod on_level;

pub use brightness::BrightnessRollback;
pub use brightness::BrightnessSettings;
pub use brightness::RollbackStrategy;
pub use on_level::OnLevelReset;
