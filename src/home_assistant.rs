use crate::prelude::*;

use serde::Serialize;

// Device {{{
/// Identity block shared by every sensor of the installation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Device {
    pub identifiers: Vec<String>,
    pub name: String,
    pub model: String,
    pub manufacturer: String,
    pub suggested_area: String,
}

impl Device {
    pub fn x1_mini_g3(suggested_area: &str) -> Self {
        Self {
            identifiers: vec!["Solax_X1_Mini_G3".to_owned()],
            name: "SolaX".to_owned(),
            model: "X1 Mini G3".to_owned(),
            manufacturer: "SolaX".to_owned(),
            suggested_area: suggested_area.to_owned(),
        }
    }
} // }}}

// Entity {{{
/// MQTT discovery payload for one sensor.
///
/// `device_class` and `unit_of_measurement` are sent as null when absent, the
/// optional extras are left out entirely.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Entity<'a> {
    pub state_topic: String,
    pub name: &'a str,
    pub unique_id: &'a str,
    pub icon: &'a str,
    pub device_class: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_class: Option<&'static str>,
    pub unit_of_measurement: Option<&'static str>,
    pub device: &'a Device,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_category: Option<&'static str>,
} // }}}

#[derive(Clone, Debug)]
pub struct Config {
    prefix: String,
    device: Device,
}

impl Config {
    pub fn new(ha: &config::HomeAssistant) -> Self {
        Self {
            prefix: ha.prefix().to_owned(),
            device: Device::x1_mini_g3(ha.suggested_area()),
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn state_topic(&self, descriptor: &MeasurementDescriptor) -> String {
        format!("{}/sensor/{}/state", self.prefix, descriptor.id())
    }

    pub fn config_topic(&self, descriptor: &MeasurementDescriptor) -> String {
        format!("{}/sensor/{}/config", self.prefix, descriptor.id())
    }

    pub fn entity<'a>(&'a self, descriptor: &'a MeasurementDescriptor) -> Entity<'a> {
        Entity {
            state_topic: self.state_topic(descriptor),
            name: descriptor.name(),
            unique_id: descriptor.id(),
            icon: descriptor.icon(),
            device_class: descriptor.device_class(),
            state_class: descriptor.kind().state_class(),
            unit_of_measurement: descriptor.unit(),
            device: &self.device,
            object_id: descriptor.object_id(),
            entity_category: descriptor.diagnostic().then_some("diagnostic"),
        }
    }

    pub fn discovery(&self, descriptor: &MeasurementDescriptor) -> Result<mqtt::Message> {
        Ok(mqtt::Message {
            topic: self.config_topic(descriptor),
            retain: true,
            payload: serde_json::to_string(&self.entity(descriptor))?,
        })
    }

    /// Discovery messages for every sensor, published once at startup.
    pub fn all(&self, registry: &Registry) -> Result<Vec<mqtt::Message>> {
        registry.iter().map(|d| self.discovery(d)).collect()
    }
}
