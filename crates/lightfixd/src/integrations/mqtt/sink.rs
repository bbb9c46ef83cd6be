use std::sync::Arc;

use async_trait::async_trait;
use rumqttc::QoS;
use serde_json::json;
use tracing::info;

use crate::engine::Command;
use crate::engine::CommandSink;
use crate::engine::SendError;

/// Outgoing half of an MQTT connection.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, qos: QoS, payload: Vec<u8>) -> Result<(), SendError>;
}

/// A command rendered as an MQTT publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publish {
    pub topic: String,
    pub qos: QoS,
    pub payload: Vec<u8>,
}

/// Render `command` for `device` in Zigbee2MQTT's command topics.
pub fn encode(base_topic: &str, device: &str, command: &Command) -> Result<Publish, SendError> {
    match command {
        Command::SetBrightness(brightness) => Ok(Publish {
            topic: format!("{}/{}/set/brightness", base_topic, device),
            qos: QoS::AtLeastOnce,
            payload: brightness.to_string().into_bytes(),
        }),
        Command::SetOnLevel(level) => {
            let on_level = level.attribute().ok_or_else(|| SendError::Unsupported {
                command: command.kind(),
                reason: format!("on_level '{}' has no attribute value", level),
            })?;

            // Raw attribute write on endpoint 1, Zigbee2MQTT's converter
            // does not accept "previous".
            let payload = json!({
                "write": {
                    "cluster": "genLevelCtrl",
                    "options": {},
                    "payload": { "onLevel": on_level },
                }
            });

            Ok(Publish {
                topic: format!("{}/{}/1/set", base_topic, device),
                qos: QoS::AtMostOnce,
                payload: payload.to_string().into_bytes(),
            })
        }
    }
}

/// Sends commands to Zigbee2MQTT devices.
pub struct MqttCommandSink {
    publisher: Arc<dyn Publisher>,
    base_topic: String,
}

impl MqttCommandSink {
    pub fn new(publisher: Arc<dyn Publisher>, base_topic: impl Into<String>) -> Self {
        Self {
            publisher,
            base_topic: base_topic.into(),
        }
    }
}

#[async_trait]
impl CommandSink for MqttCommandSink {
    async fn send(&self, device: &str, command: Command) -> Result<(), SendError> {
        let publish = encode(&self.base_topic, device, &command)?;
        self.publisher
            .publish(&publish.topic, publish.qos, publish.payload)
            .await?;
        info!("Sent {} to {}", command.kind(), device);
        Ok(())
    }
}

/// Publisher that records every publish, for tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    pub published: std::sync::Mutex<Vec<Publish>>,
}

#[cfg(test)]
#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, topic: &str, qos: QoS, payload: Vec<u8>) -> Result<(), SendError> {
        self.published.lock().unwrap().push(Publish {
            topic: topic.to_string(),
            qos,
            payload,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::engine::OnLevel;

    #[test]
    fn test_encode_brightness() {
        let publish = encode("zigbee2mqtt", "desk", &Command::SetBrightness(200)).unwrap();
        assert_eq!(publish.topic, "zigbee2mqtt/desk/set/brightness");
        assert_eq!(publish.qos, QoS::AtLeastOnce);
        assert_eq!(publish.payload, b"200");
    }

    #[test]
    fn test_encode_on_level_previous() {
        let publish = encode(
            "zigbee2mqtt",
            "desk",
            &Command::SetOnLevel(OnLevel::Previous),
        )
        .unwrap();
        assert_eq!(publish.topic, "zigbee2mqtt/desk/1/set");
        assert_eq!(publish.qos, QoS::AtMostOnce);

        let payload: Value = serde_json::from_slice(&publish.payload).unwrap();
        assert_eq!(
            payload,
            json!({"write": {"cluster": "genLevelCtrl", "options": {}, "payload": {"onLevel": 255}}})
        );
    }

    #[test]
    fn test_encode_on_level_fixed() {
        let publish = encode("z2m", "lamp", &Command::SetOnLevel(OnLevel::Level(40))).unwrap();
        let payload: Value = serde_json::from_slice(&publish.payload).unwrap();
        assert_eq!(payload["write"]["payload"]["onLevel"], 40);
    }

    #[test]
    fn test_encode_on_level_unknown_is_unsupported() {
        let err = encode(
            "zigbee2mqtt",
            "desk",
            &Command::SetOnLevel(OnLevel::Other("weird".to_string())),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            SendError::Unsupported {
                command: "set_on_level",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_sink_publishes() {
        let publisher = Arc::new(RecordingPublisher::default());
        let sink = MqttCommandSink::new(publisher.clone(), "zigbee2mqtt");

        sink.send("desk", Command::SetBrightness(7)).await.unwrap();

        let published = publisher.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, "zigbee2mqtt/desk/set/brightness");
        assert_eq!(published[0].payload, b"7");
    }
}
