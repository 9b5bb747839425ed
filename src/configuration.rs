use convert_case::{Case, Casing};
use serde::Deserialize;
use serde_inline_default::serde_inline_default;
use std::error::Error;

/// Contains the configuration for communicating with the MQTT broker
#[serde_inline_default]
#[derive(Deserialize)]
pub struct Mqtt {
    /// Hostname or IP address. Default: localhost
    #[serde_inline_default(String::from("localhost"))]
    pub host: String,

    /// Port of the connection to the broker. Default: 1883
    #[serde_inline_default(1883)]
    pub port: u16,

    /// Username for the connection to the broker. Default: empty
    #[serde(default)]
    pub username: String,

    /// Password for the connection to the broker. Default: empty
    #[serde(default)]
    pub password: String,

    /// Prefix for the discovery topics sent to Home Assistant. Default: homeassistant
    ///
    /// This must match the configuration of the MQTT integration in Home Assistant
    ///
    /// See <https://www.home-assistant.io/integrations/mqtt#discovery-options>
    #[serde_inline_default(String::from("homeassistant"))]
    #[serde(rename = "discovery-prefix")]
    pub discovery_prefix: String,
}

/// Contains all the configuration for `mqtt-power-bridge`
#[serde_inline_default]
#[derive(Deserialize)]
pub struct Configuration {
    /// Name of the device as shown in Home Assistant. It should be unique among the
    /// devices reporting to the same broker. Default: machine hostname
    #[serde(default = "hostname")]
    #[serde(rename = "device-name")]
    pub device_name: String,

    /// Identifier of the device in Home Assistant. Default: snake_cased machine hostname
    #[serde(default = "default_device_id")]
    #[serde(rename = "device-id")]
    pub device_id: String,

    /// Exposes an additional no-op Test button for end-to-end checks. Default: false
    #[serde(default)]
    #[serde(rename = "debug-mode")]
    pub debug_mode: bool,

    /// Sets the verbosity of the logs.
    ///   * 1 => Error
    ///  * 2 => Warning
    ///  * 3 => Info
    ///  * 4 => Debug
    ///  * 5 => Trace
    #[serde_inline_default(2)]
    #[serde(rename = "log-verbosity")]
    pub log_verbosity: usize,

    /// Contains the configuration for communicating with the MQTT broker
    pub mqtt: Mqtt,
}

fn hostname() -> String {
    sysinfo::System::host_name().expect("Cannot read hostname")
}

fn default_device_id() -> String {
    hostname().to_case(Case::Snake)
}

impl Configuration {
    /// Load the configuration from a file
    ///
    /// ## Example
    ///
    /// ```
    /// use mqtt_power_bridge::Configuration;
    ///
    /// let config = Configuration::load("conf/mqtt-power-bridge.conf").expect("Cannot load configuration");
    ///
    /// assert_eq!(config.mqtt.host, "localhost");
    /// ```
    pub fn load(path: &str) -> Result<Configuration, Box<dyn Error>> {
        toml::from_str(std::fs::read_to_string(path)?.as_str()).map_err(|err| err.into())
    }
}
