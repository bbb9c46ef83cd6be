use serde_json::Value;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::client::MqttClient;
use super::client::MqttMessage;
use super::topic::device_from_topic;
use super::topic::is_group;
use super::MqttError;
use crate::config::MqttConfig;
use crate::engine::Engine;

/// Feeds Zigbee2MQTT device state into the engine
///
/// Owns the client's incoming stream. Commands go out through the engine's
/// sink, which holds its own publishing handle.
pub struct MqttBridge<C: MqttClient> {
    client: C,
    base_topic: String,
    group_suffix: Option<String>,
    engine: Engine,
}

impl<C: MqttClient> MqttBridge<C> {
    /// Create a bridge over an already connected client
    pub fn new(client: C, config: &MqttConfig, engine: Engine) -> Self {
        Self {
            client,
            base_topic: config.base_topic.clone(),
            group_suffix: config.group_suffix.clone(),
            engine,
        }
    }

    /// Subscribe to every device state topic
    pub async fn subscribe(&mut self) -> Result<(), MqttError> {
        let topic = format!("{}/+", self.base_topic);
        info!("Subscribing to device state topics: {}", topic);
        self.client.subscribe(&topic).await
    }

    /// Process messages until the connection is lost
    pub async fn run(&mut self) -> Result<(), MqttError> {
        while let Some(msg) = self.client.poll_message().await {
            self.handle_message(&msg);
        }
        Err(MqttError::ConnectionLost)
    }

    /// Route one publish to the engine
    pub fn handle_message(&mut self, msg: &MqttMessage) {
        let Some(device) = device_from_topic(&msg.topic, &self.base_topic) else {
            debug!("Ignoring message on topic: {}", msg.topic);
            return;
        };

        if is_group(device, self.group_suffix.as_deref()) {
            debug!("Ignoring group: {}", device);
            return;
        }

        let payload: Value = match serde_json::from_slice(&msg.payload) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Malformed payload from {}: {}", device, e);
                return;
            }
        };

        self.engine.dispatch(device, &payload);
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Stop the engine, dropping any pending corrections
    pub fn shutdown(&mut self) {
        info!("MQTT bridge shutting down");
        self.engine.shutdown();
    }
}
