mod debounce;
mod device;
#[allow(clippy::module_inception)]
mod engine;
mod history;
mod policy;
mod registry;
mod sink;
pub mod state;

pub use debounce::Debouncer;
pub use device::Device;
pub use engine::Engine;
pub use history::History;
pub use history::DEFAULT_HISTORY_SIZE;
pub use policy::Policy;
pub use registry::Registry;
pub use sink::Command;
pub use sink::CommandSink;
pub use sink::SendError;
pub use state::LightState;
pub use state::OnLevel;

#[cfg(test)]
pub use sink::RecordingSink;
