//! Zigbee2MQTT over MQTT: device state in, corrective commands out.

mod client;
#[allow(clippy::module_inception)]
mod mqtt;
mod sink;
mod topic;

pub use client::MqttClient;
pub use client::MqttMessage;
pub use client::RumqttcClient;
pub use mqtt::MqttBridge;
pub use sink::encode;
pub use sink::MqttCommandSink;
pub use sink::Publish;
pub use sink::Publisher;
pub use topic::device_from_topic;
pub use topic::is_group;

#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    #[error("MQTT client not connected. Call connect() first.")]
    NotConnected,

    #[error("failed to subscribe to '{topic}'")]
    Subscribe {
        topic: String,
        #[source]
        source: rumqttc::ClientError,
    },

    #[error("connection to the MQTT broker was lost")]
    ConnectionLost,
}
