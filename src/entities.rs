use crate::configuration::Configuration;
use crate::home_assistant::{Availability, Component, Device, DiscoveryConfig};
use crate::system;
use log::{error, info};
use std::sync::Arc;
use tokio::task;

/// Availability payload published while the host is up
pub const PAYLOAD_ONLINE: &str = "online";
/// Availability payload published on shutdown and as the last will
pub const PAYLOAD_OFFLINE: &str = "offline";

const PAYLOAD_ON: &str = "ON";
const PAYLOAD_OFF: &str = "OFF";

/// Local action triggered by a button press
pub type Action = Arc<dyn Fn() + Send + Sync>;

/// Read-only entity reporting the host power state
#[derive(Debug, Clone)]
pub struct BinarySensor {
    /// Topic the discovery config is published on
    pub discovery_topic: String,

    /// Discovery descriptor for this sensor
    pub config: DiscoveryConfig,
}

/// Pressable entity that triggers a local action on the host
#[derive(Clone)]
pub struct Button {
    /// Topic the discovery config is published on
    pub discovery_topic: String,

    /// Discovery descriptor for this button
    pub config: DiscoveryConfig,

    action: Action,
}

impl Button {
    /// Creates a button around a local action
    pub fn new(discovery_topic: String, config: DiscoveryConfig, action: Action) -> Button {
        Button {
            discovery_topic,
            config,
            action,
        }
    }

    /// Topic Home Assistant publishes presses of this button on
    pub fn command_topic(&self) -> Option<&str> {
        self.config.command_topic.as_deref()
    }

    /// Queues the button action on the executor without waiting for it
    ///
    /// A panic inside the action is contained and logged; it never reaches
    /// the caller.
    pub fn queue_action(&self) {
        let action = Arc::clone(&self.action);
        let name = self.config.unique_id.clone();
        task::spawn(async move {
            if let Err(err) = task::spawn_blocking(move || action()).await {
                error!("Action of {name} failed: {err}");
            }
        });
    }
}

/// One Home Assistant-visible feature exposed by this bridge
pub enum Entity {
    /// Read-only state, no command topic
    BinarySensor(BinarySensor),

    /// Carries a local action and a command topic
    Button(Button),
}

impl Entity {
    /// Topic the discovery config of this entity is published on
    ///
    /// Unique for every entity of a device.
    pub fn discovery_topic(&self) -> &str {
        match self {
            Entity::BinarySensor(sensor) => &sensor.discovery_topic,
            Entity::Button(button) => &button.discovery_topic,
        }
    }

    /// Discovery descriptor of this entity
    pub fn discovery_config(&self) -> &DiscoveryConfig {
        match self {
            Entity::BinarySensor(sensor) => &sensor.config,
            Entity::Button(button) => &button.config,
        }
    }
}

/// Returns the device metadata shared by all entities of this host
pub fn device(config: &Configuration) -> Device {
    Device {
        identifiers: config.device_id.clone(),
        manufacturer: format!("{}/{}", std::env::consts::OS, std::env::consts::ARCH),
        model: config.device_name.clone(),
        name: config.device_name.clone(),
    }
}

/// Returns the host-level availability channel
///
/// This is the channel every entity is gated on, and the topic the last will
/// is registered for.
pub fn device_availability(config: &Configuration) -> Availability {
    Availability {
        topic: format!("{}/state", config.device_name),
        payload_available: PAYLOAD_ONLINE,
        payload_not_available: PAYLOAD_OFFLINE,
    }
}

/// Builds the entity list for this host
///
/// Always returns, in fixed order, the power sensor and the shutdown and
/// reboot buttons. In debug mode an additional no-op Test button is appended.
/// The list is rebuilt from the configuration on every call.
///
/// ## Example
///
/// ```
/// use mqtt_power_bridge::{Configuration, entities};
///
/// let config = Configuration::load("conf/mqtt-power-bridge.conf").expect("Cannot load configuration");
/// let entity_list = entities::get_entities(&config);
///
/// assert_eq!(entity_list.len(), 3);
/// ```
pub fn get_entities(config: &Configuration) -> Vec<Entity> {
    let mut entity_list = vec![
        Entity::BinarySensor(power_sensor(config)),
        Entity::Button(button(
            config,
            "shutdown",
            "Shutdown",
            "mdi:power",
            Arc::new(shutdown_action),
        )),
        Entity::Button(button(
            config,
            "reboot",
            "Reboot",
            "mdi:restart",
            Arc::new(reboot_action),
        )),
    ];

    if config.debug_mode {
        entity_list.push(Entity::Button(button(
            config,
            "test",
            "Test",
            "mdi:test-tube",
            Arc::new(|| info!("Test button pressed")),
        )));
    }

    entity_list
}

/// Keeps the entities that expose a command topic, preserving their order
pub fn filter_entities_with_commands(entity_list: &[Entity]) -> Vec<&Button> {
    entity_list
        .iter()
        .filter_map(|entity| match entity {
            Entity::Button(button) => Some(button),
            Entity::BinarySensor(_) => None,
        })
        .collect()
}

/// Discovery topic for an entity, unique per suffix
fn discovery_topic(config: &Configuration, component: Component, suffix: &str) -> String {
    format!(
        "{}/{component}/{}/{}_{suffix}/config",
        config.mqtt.discovery_prefix, config.device_id, config.device_name
    )
}

fn state_topic(config: &Configuration, component: Component, short: &str) -> String {
    format!("{}/{component}/{short}/state", config.device_name)
}

fn command_topic(config: &Configuration, component: Component, short: &str) -> String {
    format!("{}/{component}/{short}/command", config.device_name)
}

/// Creates the sensor exposing the host power state
///
/// Its state is published as "on" whenever the bridge is connected; the
/// availability channel and the last will flip it when the host is gone.
fn power_sensor(config: &Configuration) -> BinarySensor {
    let component = Component::BinarySensor;
    let suffix = "sensor_power";

    BinarySensor {
        discovery_topic: discovery_topic(config, component, suffix),
        config: DiscoveryConfig {
            device: device(config),
            availability: device_availability(config),
            default_entity_id: format!("{component}.{}_{suffix}", config.device_name),
            unique_id: format!("{}_{suffix}", config.device_name),
            name: String::from("Power"),
            icon: "mdi:power",
            state_topic: state_topic(config, component, "power"),
            command_topic: None,
            payload_on: Some(PAYLOAD_ON),
            payload_off: Some(PAYLOAD_OFF),
            qos: 1,
        },
    }
}

/// Creates a button entity named after its command short name
fn button(
    config: &Configuration,
    short: &'static str,
    name: &'static str,
    icon: &'static str,
    action: Action,
) -> Button {
    let component = Component::Button;
    let suffix = format!("button_{short}");

    Button::new(
        discovery_topic(config, component, &suffix),
        DiscoveryConfig {
            device: device(config),
            availability: device_availability(config),
            default_entity_id: format!("{component}.{}_{suffix}", config.device_name),
            unique_id: format!("{}_{suffix}", config.device_name),
            name: String::from(name),
            icon,
            state_topic: state_topic(config, component, short),
            command_topic: Some(command_topic(config, component, short)),
            payload_on: None,
            payload_off: None,
            qos: 1,
        },
        action,
    )
}

/// Powers off the host, without waiting for the command to complete
fn shutdown_action() {
    info!("Shutdown button pressed, shutting the system down");
    let mut command = match system::shutdown_command() {
        Ok(command) => command,
        Err(err) => {
            error!("Cannot shut down: {err}");
            return;
        }
    };

    match command.spawn() {
        Ok(_) => info!("System shutdown initiated"),
        Err(err) => error!("Failed to start the shutdown command: {err}"),
    }
}

/// Reboots the host, without waiting for the command to complete
fn reboot_action() {
    info!("Reboot button pressed, rebooting the system");
    let mut command = match system::reboot_command() {
        Ok(command) => command,
        Err(err) => {
            error!("Cannot reboot: {err}");
            return;
        }
    };

    match command.spawn() {
        Ok(_) => info!("System reboot initiated"),
        Err(err) => error!("Failed to start the reboot command: {err}"),
    }
}
