use crate::entities::{Button, Entity, filter_entities_with_commands};
use log::{debug, error, info, warn};
use rumqttc::{AsyncClient, QoS, SubscribeFilter};

/// A message this bridge sends to the broker
///
/// Everything published by the protocol is retained and delivered at least
/// once, so only the topic and the payload vary.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: String,
}

/// Builds the discovery config messages, one per entity
///
/// An entity whose config cannot be serialized is logged and skipped; the
/// remaining entities are still announced.
pub fn discovery_messages(entity_list: &[Entity]) -> Vec<OutboundMessage> {
    entity_list
        .iter()
        .filter_map(|entity| match serde_json::to_string(entity.discovery_config()) {
            Ok(payload) => Some(OutboundMessage {
                topic: entity.discovery_topic().to_string(),
                payload,
            }),
            Err(err) => {
                error!(
                    "Cannot serialize discovery config of {}: {err}",
                    entity.discovery_config().unique_id
                );
                None
            }
        })
        .collect()
}

/// Builds the "available" messages, one per entity
pub fn availability_messages(entity_list: &[Entity]) -> Vec<OutboundMessage> {
    entity_list
        .iter()
        .map(|entity| {
            let availability = &entity.discovery_config().availability;
            OutboundMessage {
                topic: availability.topic.clone(),
                payload: availability.payload_available.to_string(),
            }
        })
        .collect()
}

/// Builds the state messages for the binary sensors
///
/// The state is the sensor's "on" payload: a reachable bridge means the host
/// is powered. No live telemetry is read.
pub fn state_messages(entity_list: &[Entity]) -> Vec<OutboundMessage> {
    entity_list
        .iter()
        .filter_map(|entity| match entity {
            Entity::BinarySensor(sensor) => {
                let payload = sensor.config.payload_on?;
                Some(OutboundMessage {
                    topic: sensor.config.state_topic.clone(),
                    payload: payload.to_string(),
                })
            }
            Entity::Button(_) => None,
        })
        .collect()
}

/// Builds the subscription filters covering every command topic
pub fn command_subscriptions(buttons: &[&Button]) -> Vec<SubscribeFilter> {
    buttons
        .iter()
        .filter_map(|button| button.command_topic())
        .map(|topic| SubscribeFilter::new(topic.to_string(), QoS::AtLeastOnce))
        .collect()
}

/// Runs the publication sequence for one successful connection
///
/// Discovery configs go out only on the first connection of the process; the
/// broker retains them across reconnects. Availability, sensor states and the
/// command subscriptions are refreshed on every connection, since brokers do
/// not keep subscriptions across a clean-session reconnect.
pub async fn run_connection_sequence(
    client: &AsyncClient,
    entity_list: &[Entity],
    first_connection: bool,
) {
    if first_connection {
        publish_all(client, "discovery config", discovery_messages(entity_list)).await;
    } else {
        debug!("Skipping discovery configs, the broker retains them");
    }

    publish_all(client, "availability", availability_messages(entity_list)).await;
    publish_all(client, "sensor state", state_messages(entity_list)).await;

    subscribe_to_commands(client, entity_list).await;
}

/// Publishes a batch of retained messages, skipping over individual failures
async fn publish_all(client: &AsyncClient, kind: &str, messages: Vec<OutboundMessage>) {
    info!("Publishing {} {kind} message(s)", messages.len());

    for message in messages {
        debug!("Publishing to topic {} : {}", message.topic, message.payload);
        if let Err(err) = client
            .publish(&message.topic, QoS::AtLeastOnce, true, message.payload)
            .await
        {
            warn!("Error publishing {kind} to {:?}: {err}", message.topic);
        }
    }
}

/// Subscribes to every command topic in one batched call
async fn subscribe_to_commands(client: &AsyncClient, entity_list: &[Entity]) {
    let buttons = filter_entities_with_commands(entity_list);
    let filters = command_subscriptions(&buttons);
    if filters.is_empty() {
        debug!("No command topics to subscribe to");
        return;
    }

    info!("Subscribing to {} command topic(s)", filters.len());
    if let Err(err) = client.subscribe_many(filters).await {
        warn!("Failed to subscribe to command topics: {err}");
        return;
    }

    info!("Ready to receive commands");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::Configuration;
    use crate::entities::get_entities;
    use serde_json::Value;
    use std::collections::HashMap;

    fn test_config() -> Configuration {
        let mut config = Configuration::load("conf/mqtt-power-bridge.conf")
            .expect("Failed to load default config");
        config.device_name = String::from("office-pc");
        config.device_id = String::from("office_pc");
        config
    }

    #[test]
    fn test_discovery_messages() {
        let entity_list = get_entities(&test_config());
        let messages = discovery_messages(&entity_list);

        assert_eq!(messages.len(), entity_list.len());
        for (message, entity) in messages.iter().zip(&entity_list) {
            assert_eq!(message.topic, entity.discovery_topic());

            let json: HashMap<String, Value> =
                serde_json::from_str(&message.payload).expect("Discovery payload is not JSON");
            assert_eq!(
                json["unique_id"].as_str().unwrap(),
                entity.discovery_config().unique_id
            );
        }
    }

    /// Availability goes out once per entity, on the shared host channel
    #[test]
    fn test_availability_messages() {
        let entity_list = get_entities(&test_config());
        let messages = availability_messages(&entity_list);

        assert_eq!(messages.len(), entity_list.len());
        for message in &messages {
            assert_eq!(message.topic, "office-pc/state");
            assert_eq!(message.payload, "online");
        }
    }

    /// Only the power sensor has a state to publish, and it is always "on"
    #[test]
    fn test_state_messages() {
        let entity_list = get_entities(&test_config());
        let messages = state_messages(&entity_list);

        assert_eq!(
            messages,
            vec![OutboundMessage {
                topic: String::from("office-pc/binary_sensor/power/state"),
                payload: String::from("ON"),
            }]
        );
    }

    #[test]
    fn test_command_subscriptions() {
        let mut config = test_config();
        config.debug_mode = true;

        let entity_list = get_entities(&config);
        let buttons = filter_entities_with_commands(&entity_list);
        let filters = command_subscriptions(&buttons);

        let paths: Vec<&str> = filters.iter().map(|filter| filter.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "office-pc/button/shutdown/command",
                "office-pc/button/reboot/command",
                "office-pc/button/test/command"
            ]
        );
        assert!(filters.iter().all(|filter| filter.qos == QoS::AtLeastOnce));
    }
}
