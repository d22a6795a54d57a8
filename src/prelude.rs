pub use anyhow::{anyhow, bail, Error, Result};
pub use log::{debug, error, info, trace, warn};
pub use std::io::Write;
pub use std::str::FromStr;
pub use tokio::sync::broadcast;

pub use crate::{
    channels::Channels,
    config::{self, ConfigWrapper},
    error::DecodeError,
    home_assistant, mqtt,
    options::Options,
    poller, scheduler, sensor,
    sensor::{DerivedValue, MeasurementDescriptor, MeasurementKind, Registry, Section},
    solax,
    solax::payload::RawPayload,
};
