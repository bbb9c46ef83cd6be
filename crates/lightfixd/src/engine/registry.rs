use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::info;

use super::device::Device;
use super::policy::Policy;
use super::sink::CommandSink;

/// All devices tracked by one policy, keyed by device name.
///
/// Devices are created on the first relevant payload and live until the
/// registry is dropped.
pub struct Registry<P: Policy> {
    settings: P::Settings,
    quiescence: Duration,
    ignored: Arc<HashSet<String>>,
    sink: Arc<dyn CommandSink>,
    devices: HashMap<String, Device<P>>,
}

impl<P: Policy> Registry<P> {
    pub fn new(
        settings: P::Settings,
        quiescence: Duration,
        ignored: Arc<HashSet<String>>,
        sink: Arc<dyn CommandSink>,
    ) -> Self {
        Self {
            settings,
            quiescence,
            ignored,
            sink,
            devices: HashMap::new(),
        }
    }

    /// Route a decoded payload to `device`.
    ///
    /// Ignored devices and payloads without the policy's shape are dropped
    /// before any device is created.
    pub fn dispatch(&mut self, device: &str, payload: &Value) {
        if self.ignored.contains(device) {
            return;
        }

        let Some(update) = P::parse(payload) else {
            return;
        };

        self.get_or_create(device).handle(update);
    }

    /// The device named `device`, created if this is its first appearance.
    pub fn get_or_create(&mut self, device: &str) -> &Device<P> {
        if !self.devices.contains_key(device) {
            info!(device, policy = P::NAME, "Learned about new device");
            let created = Device::new(device, &self.settings, self.quiescence, self.sink.clone());
            self.devices.insert(device.to_string(), created);
        }

        &self.devices[device]
    }

    pub fn get(&self, device: &str) -> Option<&Device<P>> {
        self.devices.get(device)
    }

    pub fn contains(&self, device: &str) -> bool {
        self.devices.contains_key(device)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Cancel every pending decision.
    pub fn cancel_all(&self) {
        for device in self.devices.values() {
            device.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::time::Instant;

    use super::*;
    use crate::engine::sink::Command;
    use crate::engine::sink::RecordingSink;

    /// Policy that fires a brightness command carrying the last seen `n`.
    struct Echo {
        last: u8,
    }

    impl Policy for Echo {
        type Update = u8;
        type Settings = ();
        const NAME: &'static str = "echo";

        fn new(_: &()) -> Self {
            Self { last: 0 }
        }

        fn parse(payload: &Value) -> Option<u8> {
            payload.get("n")?.as_u64().map(|n| n as u8)
        }

        fn observe(&mut self, _: &str, _: Instant, update: u8) -> bool {
            self.last = update;
            true
        }

        fn decide(&mut self, _: &str, _: Instant) -> Option<Command> {
            Some(Command::SetBrightness(self.last))
        }
    }

    fn registry(ignored: &[&str], sink: Arc<RecordingSink>) -> Registry<Echo> {
        let ignored = ignored.iter().map(|s| s.to_string()).collect();
        Registry::new((), Duration::from_millis(500), Arc::new(ignored), sink)
    }

    #[tokio::test(start_paused = true)]
    async fn test_lazily_creates_once_per_device() {
        let sink = Arc::new(RecordingSink::new());
        let mut registry = registry(&[], sink);

        registry.dispatch("kitchen", &json!({"n": 1}));
        registry.dispatch("kitchen", &json!({"n": 2}));
        registry.dispatch("hall", &json!({"n": 3}));

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("kitchen"));
        assert!(registry.contains("hall"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_irrelevant_payload_creates_nothing() {
        let sink = Arc::new(RecordingSink::new());
        let mut registry = registry(&[], sink.clone());

        registry.dispatch("kitchen", &json!({"linkquality": 90}));
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(registry.is_empty());
        assert!(sink.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ignored_device_never_created() {
        let sink = Arc::new(RecordingSink::new());
        let mut registry = registry(&["porch"], sink.clone());

        registry.dispatch("porch", &json!({"n": 7}));
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(!registry.contains("porch"));
        assert!(sink.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_devices_debounce_independently() {
        let sink = Arc::new(RecordingSink::new());
        let mut registry = registry(&[], sink.clone());

        registry.dispatch("a", &json!({"n": 10}));
        tokio::time::sleep(Duration::from_millis(300)).await;
        registry.dispatch("b", &json!({"n": 20}));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(sink.sent(), vec![("a".to_string(), Command::SetBrightness(10))]);
        assert!(registry.get("b").is_some_and(|d| d.is_pending()));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(sink.sent().len(), 2);
        assert_eq!(sink.sent()[1], ("b".to_string(), Command::SetBrightness(20)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all() {
        let sink = Arc::new(RecordingSink::new());
        let mut registry = registry(&[], sink.clone());

        registry.dispatch("a", &json!({"n": 10}));
        registry.cancel_all();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(sink.sent().is_empty());
    }
}
