use serde_json::Value;
use tokio::time::Instant;

use super::sink::Command;

/// A correction policy: what to track per device, and what to do once the
/// device has settled.
///
/// One policy value exists per device. The device engine serializes every
/// call, so implementations need no locking of their own.
pub trait Policy: Send + 'static {
    /// The part of a payload this policy cares about.
    type Update: Send;

    /// Per-policy settings shared by every device.
    type Settings: Clone + Send + Sync;

    /// Name used in log output.
    const NAME: &'static str;

    /// Fresh per-device state.
    fn new(settings: &Self::Settings) -> Self;

    /// Extract the relevant update from a payload.
    ///
    /// `None` means the payload is not relevant to this policy.
    fn parse(payload: &Value) -> Option<Self::Update>;

    /// Record an update observed at `now`.
    ///
    /// Returns whether the device should (re)arm its decision timer.
    fn observe(&mut self, device: &str, now: Instant, update: Self::Update) -> bool;

    /// Decide on the state settled at `deadline`, when the quiescence window
    /// closed.
    ///
    /// Updates observed after `deadline` belong to a later window and must
    /// not influence this decision.
    fn decide(&mut self, device: &str, deadline: Instant) -> Option<Command>;
}
