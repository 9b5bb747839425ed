use serde::Serialize;
use std::fmt;
use strum_macros::{Display, EnumIter};

/// Home Assistant component a discovered entity registers under
///
/// The `Display` form is the string used in topic paths.
#[derive(Debug, Clone, Copy, PartialEq, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum Component {
    /// Read-only on/off entity
    BinarySensor,

    /// Stateless pressable entity
    Button,
}

/// Device sent to Home Assistant
///
/// Static metadata shared by all entities belonging to one host.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Device {
    /// Identifier of the device. This corresponds to the `device-id` configuration field
    pub identifiers: String,

    /// Operating system and architecture of the host, for example `linux/x86_64`
    pub manufacturer: String,

    /// Model of the device. This corresponds to the `device-name` configuration field
    pub model: String,

    /// Name of the device. This corresponds to the `device-name` configuration field
    pub name: String,
}

/// Availability channel of an entity
///
/// A retained topic carrying the payloads that tell Home Assistant whether the
/// entity is usable. All entities of this bridge share the host-level channel.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Availability {
    /// Topic the availability payloads are published on
    pub topic: String,

    /// Payload published when the host is reachable
    pub payload_available: &'static str,

    /// Payload published when the host is gone, also used as the last will
    pub payload_not_available: &'static str,
}

/// Discovery descriptor for a single entity
///
/// This is the retained JSON message that makes Home Assistant create the
/// entity. Field names follow the MQTT discovery schema.
///
/// See <https://www.home-assistant.io/integrations/mqtt#mqtt-discovery>
#[derive(Serialize, Debug, Clone)]
pub struct DiscoveryConfig {
    /// Device the entity belongs to
    pub device: Device,

    /// Availability channel gating the entity
    pub availability: Availability,

    /// Suggested entity id, including the component domain
    pub default_entity_id: String,

    /// Unique ID for the entity. This is constructed from the device name and the entity suffix
    pub unique_id: String,

    /// Name of the entity, shown in Home Assistant
    pub name: String,

    /// Icon for the entity
    pub icon: &'static str,

    /// Topic the entity state is published on
    pub state_topic: String,

    /// Topic Home Assistant publishes commands on. Only present for entities that accept commands
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_topic: Option<String>,

    /// Payload representing the "on" state. Only present for binary sensors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_on: Option<&'static str>,

    /// Payload representing the "off" state. Only present for binary sensors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_off: Option<&'static str>,

    /// Delivery-guarantee level, always 1 (at least once)
    pub qos: u8,
}

impl fmt::Display for DiscoveryConfig {
    /// Formats the descriptor in JSON format
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let Ok(descriptor) = serde_json::to_string(&self) else {
            return Err(fmt::Error);
        };
        write!(f, "{descriptor}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::collections::HashMap;
    use strum::IntoEnumIterator;

    fn sample_config(command_topic: Option<String>) -> DiscoveryConfig {
        DiscoveryConfig {
            device: Device {
                identifiers: String::from("test_device"),
                manufacturer: String::from("linux/x86_64"),
                model: String::from("Test Device"),
                name: String::from("Test Device"),
            },
            availability: Availability {
                topic: String::from("Test Device/state"),
                payload_available: "online",
                payload_not_available: "offline",
            },
            default_entity_id: String::from("button.test_device_button_shutdown"),
            unique_id: String::from("test_device_button_shutdown"),
            name: String::from("Shutdown"),
            icon: "mdi:power",
            state_topic: String::from("Test Device/button/shutdown/state"),
            command_topic,
            payload_on: None,
            payload_off: None,
            qos: 1,
        }
    }

    #[test]
    fn test_component_topic_names() {
        let names: Vec<String> = Component::iter().map(|c| c.to_string()).collect();
        assert_eq!(names, vec!["binary_sensor", "button"]);
    }

    #[test]
    fn test_discovery_config_json() {
        let config = sample_config(Some(String::from("Test Device/button/shutdown/command")));
        let json: HashMap<String, Value> =
            serde_json::from_str(&config.to_string()).expect("Cannot read discovery config");

        assert_eq!(json["device"]["identifiers"].as_str().unwrap(), "test_device");
        assert_eq!(json["availability"]["topic"].as_str().unwrap(), "Test Device/state");
        assert_eq!(json["availability"]["payload_available"].as_str().unwrap(), "online");
        assert_eq!(
            json["availability"]["payload_not_available"].as_str().unwrap(),
            "offline"
        );
        assert_eq!(json["unique_id"].as_str().unwrap(), "test_device_button_shutdown");
        assert_eq!(json["name"].as_str().unwrap(), "Shutdown");
        assert_eq!(json["icon"].as_str().unwrap(), "mdi:power");
        assert_eq!(
            json["command_topic"].as_str().unwrap(),
            "Test Device/button/shutdown/command"
        );
        assert_eq!(json["qos"].as_u64().unwrap(), 1);

        // Absent optional fields are skipped, not serialized as null
        assert!(!json.contains_key("payload_on"));
        assert!(!json.contains_key("payload_off"));
    }

    #[test]
    fn test_optional_command_topic_is_skipped() {
        let config = sample_config(None);
        let json: HashMap<String, Value> =
            serde_json::from_str(&config.to_string()).expect("Cannot read discovery config");

        assert!(!json.contains_key("command_topic"));
    }
}
