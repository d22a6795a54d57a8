use crate::prelude::*;

use serde::Deserialize;
use std::sync::Arc;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub inverter: Inverter,
    #[serde(default)]
    pub mqtt: Mqtt,

    #[serde(default = "Config::default_loglevel")]
    pub loglevel: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            inverter: Inverter::default(),
            mqtt: Mqtt::default(),
            loglevel: Self::default_loglevel(),
        }
    }
}

// Inverter {{{
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Inverter {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub password: String,

    pub timeout: Option<u64>,
    pub poll_interval: Option<u64>,
    pub offline_interval: Option<u64>,
}

impl Inverter {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn timeout(&self) -> u64 {
        self.timeout.unwrap_or(5)
    }

    pub fn poll_interval(&self) -> u64 {
        self.poll_interval.unwrap_or(5)
    }

    pub fn offline_interval(&self) -> u64 {
        self.offline_interval.unwrap_or(60)
    }
} // }}}

// HomeAssistant {{{
#[derive(Clone, Debug, Deserialize)]
pub struct HomeAssistant {
    #[serde(default = "Config::default_mqtt_homeassistant_prefix")]
    pub prefix: String,

    #[serde(default = "Config::default_suggested_area")]
    pub suggested_area: String,
}

impl Default for HomeAssistant {
    fn default() -> Self {
        Self {
            prefix: Config::default_mqtt_homeassistant_prefix(),
            suggested_area: Config::default_suggested_area(),
        }
    }
}

impl HomeAssistant {
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn suggested_area(&self) -> &str {
        &self.suggested_area
    }
} // }}}

// Mqtt {{{
#[derive(Clone, Debug, Deserialize)]
pub struct Mqtt {
    #[serde(default)]
    pub host: String,
    #[serde(default = "Config::default_mqtt_port")]
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,

    #[serde(default = "Config::default_mqtt_client_id")]
    pub client_id: String,

    #[serde(default)]
    pub homeassistant: HomeAssistant,
}

impl Default for Mqtt {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: Config::default_mqtt_port(),
            username: None,
            password: None,
            client_id: Config::default_mqtt_client_id(),
            homeassistant: HomeAssistant::default(),
        }
    }
}

impl Mqtt {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn username(&self) -> &Option<String> {
        &self.username
    }

    pub fn password(&self) -> &Option<String> {
        &self.password
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn homeassistant(&self) -> &HomeAssistant {
        &self.homeassistant
    }
} // }}}

#[derive(Clone, Debug)]
pub struct ConfigWrapper {
    config: Arc<Config>,
}

impl ConfigWrapper {
    pub fn new(file: &str) -> Result<Self> {
        Ok(Self::from_config(Config::new(file)?))
    }

    pub fn from_config(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn inverter(&self) -> &Inverter {
        &self.config.inverter
    }

    pub fn mqtt(&self) -> &Mqtt {
        &self.config.mqtt
    }

    pub fn homeassistant(&self) -> &HomeAssistant {
        &self.config.mqtt.homeassistant
    }

    pub fn loglevel(&self) -> &str {
        &self.config.loglevel
    }

    pub fn log_summary(&self) {
        self.config.log_summary()
    }
}

impl Config {
    /// Read `file` if it exists, then apply environment overrides.
    pub fn new(file: &str) -> Result<Self> {
        let mut config = if std::path::Path::new(file).exists() {
            let content = std::fs::read_to_string(file)
                .map_err(|err| anyhow!("config.rs:error reading {}: {}", file, err))?;
            Self::from_yaml(&content)?
        } else {
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        // an empty file deserializes to unit, not an empty map
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Overrides from the variables the container image documents.
    pub fn apply_env<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn number<T: FromStr>(key: &str, value: String) -> Result<T> {
            value
                .trim()
                .parse()
                .map_err(|_| anyhow!("config.rs:{} must be a number, got {:?}", key, value))
        }

        if let Some(v) = var("SOLAX_IP") {
            self.inverter.host = v;
        }
        if let Some(v) = var("SOLAX_PASSWORD") {
            self.inverter.password = v;
        }
        if let Some(v) = var("TIME_DELAY") {
            self.inverter.poll_interval = Some(number("TIME_DELAY", v)?);
        }
        if let Some(v) = var("OFFLINE_DELAY") {
            self.inverter.offline_interval = Some(number("OFFLINE_DELAY", v)?);
        }
        if let Some(v) = var("MQTT_IP") {
            self.mqtt.host = v;
        }
        if let Some(v) = var("MQTT_PORT") {
            self.mqtt.port = number("MQTT_PORT", v)?;
        }
        if let Some(v) = var("MQTT_USERNAME") {
            self.mqtt.username = Some(v);
        }
        if let Some(v) = var("MQTT_PASSWORD") {
            self.mqtt.password = Some(v);
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.inverter.host.is_empty() {
            bail!("inverter.host (SOLAX_IP) cannot be empty");
        }
        if self.inverter.timeout() == 0 {
            bail!("inverter.timeout must be at least 1 second");
        }
        if self.inverter.poll_interval() == 0 {
            bail!("inverter.poll_interval (TIME_DELAY) must be at least 1 second");
        }
        if self.inverter.offline_interval() == 0 {
            bail!("inverter.offline_interval (OFFLINE_DELAY) must be at least 1 second");
        }
        if self.mqtt.host.is_empty() {
            bail!("mqtt.host (MQTT_IP) cannot be empty");
        }
        if self.mqtt.port == 0 {
            bail!("mqtt.port must be between 1 and 65535");
        }
        if self.mqtt.client_id.is_empty() {
            bail!("mqtt.client_id cannot be empty");
        }

        Ok(())
    }

    pub fn log_summary(&self) {
        info!("Configuration loaded successfully:");
        info!("  Inverter:");
        info!("    Host: {}", self.inverter.host);
        info!("    Timeout: {}s", self.inverter.timeout());
        info!("    Poll Interval: {}s", self.inverter.poll_interval());
        info!("    Offline Interval: {}s", self.inverter.offline_interval());
        info!("  MQTT:");
        info!("    Host: {}", self.mqtt.host);
        info!("    Port: {}", self.mqtt.port);
        info!(
            "    Auth: {}",
            if self.mqtt.username.is_some() && self.mqtt.password.is_some() {
                "enabled"
            } else {
                "disabled"
            }
        );
        info!("    Home Assistant Prefix: {}", self.mqtt.homeassistant.prefix);
        info!("  Log Level: {}", self.loglevel);

        if self.inverter.offline_interval() < self.inverter.poll_interval() {
            warn!(
                "inverter.offline_interval ({}s) is shorter than poll_interval ({}s)",
                self.inverter.offline_interval(),
                self.inverter.poll_interval()
            );
        }
    }

    fn default_mqtt_port() -> u16 {
        1883
    }

    fn default_mqtt_client_id() -> String {
        "solax-bridge".to_string()
    }

    fn default_mqtt_homeassistant_prefix() -> String {
        "homeassistant".to_string()
    }

    fn default_suggested_area() -> String {
        "Garage".to_string()
    }

    fn default_loglevel() -> String {
        "info".to_string()
    }
}
