//! # mqtt-power-bridge
//!
//! `mqtt-power-bridge` exposes a machine's power state to the MQTT integration of
//! Home Assistant and accepts shutdown and reboot commands back
//!
//!

pub use self::configuration::Configuration;
pub use self::configuration::Mqtt;
pub use self::daemon::Daemon;
pub use self::entities::Button;
pub use self::entities::Entity;
pub use self::home_assistant::Availability;
pub use self::home_assistant::Device;
pub use self::home_assistant::DiscoveryConfig;

/// Contains the configuration stuff
pub mod configuration;
/// Contains the daemon code
pub mod daemon;
/// Contains the entity registry for this host
pub mod entities;
/// Contains Home Assistant discovery data
pub mod home_assistant;
/// Contains the messages sent on each connection
pub mod publication;
/// Contains the platform power commands
pub mod system;
