mod common;
use common::*;
use solax_bridge::prelude::*;

use solax_bridge::config::Config;
use std::collections::HashMap;

const EXAMPLE: &str = r#"
inverter:
  host: 192.168.1.50
  password: SXXXXXXXXX
  poll_interval: 10

mqtt:
  host: broker.local
  username: solax
  password: hunter2
  homeassistant:
    suggested_area: Roof

loglevel: debug
"#;

fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key: &str| vars.get(key).cloned()
}

fn valid() -> Config {
    let mut config = Config::default();
    config.inverter.host = "192.168.1.50".to_string();
    config.mqtt.host = "broker.local".to_string();
    config
}

#[test]
fn parses_yaml_with_defaults() -> Result<()> {
    let config = Config::from_yaml(EXAMPLE)?;

    assert_eq!(config.inverter.host(), "192.168.1.50");
    assert_eq!(config.inverter.password(), "SXXXXXXXXX");
    assert_eq!(config.inverter.poll_interval(), 10);
    assert_eq!(config.inverter.offline_interval(), 60);
    assert_eq!(config.inverter.timeout(), 5);

    assert_eq!(config.mqtt.host(), "broker.local");
    assert_eq!(config.mqtt.port(), 1883);
    assert_eq!(config.mqtt.username(), &Some("solax".to_string()));
    assert_eq!(config.mqtt.client_id(), "solax-bridge");
    assert_eq!(config.mqtt.homeassistant().prefix(), "homeassistant");
    assert_eq!(config.mqtt.homeassistant().suggested_area(), "Roof");
    assert_eq!(config.loglevel, "debug");

    config.validate()
}

#[test]
fn empty_file_is_all_defaults() -> Result<()> {
    let config = Config::from_yaml("\n")?;

    assert_eq!(config.inverter.host(), "");
    assert_eq!(config.mqtt.port(), 1883);
    assert_eq!(config.loglevel, "info");
    assert!(config.validate().is_err());

    Ok(())
}

#[test]
fn mistyped_values_are_rejected() {
    assert!(Config::from_yaml("mqtt:\n  port: lots\n").is_err());
}

#[test]
fn environment_overrides_file() -> Result<()> {
    let mut config = Config::from_yaml(EXAMPLE)?;

    config.apply_env(env(&[
        ("SOLAX_IP", "10.0.0.7"),
        ("SOLAX_PASSWORD", "other"),
        ("MQTT_IP", "mosquitto"),
        ("MQTT_PORT", "8883"),
        ("MQTT_USERNAME", "bridge"),
        ("TIME_DELAY", " 15 "),
        ("OFFLINE_DELAY", "600"),
    ]))?;

    assert_eq!(config.inverter.host(), "10.0.0.7");
    assert_eq!(config.inverter.password(), "other");
    assert_eq!(config.inverter.poll_interval(), 15);
    assert_eq!(config.inverter.offline_interval(), 600);
    assert_eq!(config.mqtt.host(), "mosquitto");
    assert_eq!(config.mqtt.port(), 8883);
    assert_eq!(config.mqtt.username(), &Some("bridge".to_string()));
    // untouched
    assert_eq!(config.mqtt.password(), &Some("hunter2".to_string()));

    Ok(())
}

#[test]
fn non_numeric_environment_is_an_error() {
    let mut config = valid();

    let err = config.apply_env(env(&[("TIME_DELAY", "soon")])).unwrap_err();
    assert!(err.to_string().contains("TIME_DELAY"));

    assert!(config.apply_env(env(&[("MQTT_PORT", "70000")])).is_err());
}

#[test]
fn validation() {
    assert!(valid().validate().is_ok());

    let mut config = valid();
    config.inverter.host.clear();
    assert!(config.validate().is_err());

    let mut config = valid();
    config.mqtt.host.clear();
    assert!(config.validate().is_err());

    let mut config = valid();
    config.inverter.poll_interval = Some(0);
    assert!(config.validate().is_err());

    let mut config = valid();
    config.inverter.offline_interval = Some(0);
    assert!(config.validate().is_err());

    let mut config = valid();
    config.mqtt.port = 0;
    assert!(config.validate().is_err());

    let mut config = valid();
    config.mqtt.client_id.clear();
    assert!(config.validate().is_err());
}

#[test]
fn loads_from_file() -> Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(EXAMPLE.as_bytes())?;

    let config = ConfigWrapper::new(file.path().to_str().unwrap_or_default())?;

    assert_eq!(config.mqtt().host(), "broker.local");
    assert_eq!(config.homeassistant().suggested_area(), "Roof");
    assert_eq!(config.loglevel(), "debug");

    Ok(())
}

#[test]
fn missing_file_needs_environment() {
    common_setup();

    // defaults alone have no hosts
    assert!(Config::new("/nonexistent/solax-bridge.yaml").is_err());
}
