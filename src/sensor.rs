use crate::prelude::*;

use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::collections::HashSet;

// Section {{{
/// The two integer arrays of a realtime data response.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Section {
    Data,
    Information,
}

impl Section {
    pub fn key(&self) -> &'static str {
        match self {
            Section::Data => "Data",
            Section::Information => "Information",
        }
    }
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
} // }}}

// MeasurementKind {{{
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum MeasurementKind {
    Energy,
    Power,
    /// Power computed as primary minus sign corrected secondary.
    PowerDelta,
    Frequency,
    Voltage,
    Current,
    Temperature,
    Status,
    Version,
}

impl MeasurementKind {
    pub fn device_class(&self) -> Option<&'static str> {
        use MeasurementKind::*;

        match self {
            Energy => Some("energy"),
            Power | PowerDelta => Some("power"),
            Frequency => Some("frequency"),
            Voltage => Some("voltage"),
            Current => Some("current"),
            Temperature => Some("temperature"),
            Status | Version => None,
        }
    }

    pub fn unit(&self) -> Option<&'static str> {
        use MeasurementKind::*;

        match self {
            Energy => Some("kWh"),
            Power | PowerDelta => Some("W"),
            Frequency => Some("Hz"),
            Voltage => Some("V"),
            Current => Some("A"),
            Temperature => Some("°C"),
            Status | Version => None,
        }
    }

    pub fn state_class(&self) -> Option<&'static str> {
        use MeasurementKind::*;

        match self {
            Energy => Some("total_increasing"),
            Status | Version => None,
            _ => Some("measurement"),
        }
    }

    /// Raw values of these kinds are signed 16 bit quantities sent as unsigned.
    pub fn is_signed(&self) -> bool {
        matches!(self, MeasurementKind::Power | MeasurementKind::PowerDelta)
    }

    pub fn needs_secondary(&self) -> bool {
        matches!(self, MeasurementKind::PowerDelta)
    }
} // }}}

// InverterStatus {{{
#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum InverterStatus {
    Waiting = 0,
    Checking = 1,
    Normal = 2,
    Off = 3,
    PermanentFault = 4,
    Updating = 5,
    EpsCheck = 6,
    EpsMode = 7,
    SelfTest = 8,
    Idle = 9,
    Standby = 10,
}

impl InverterStatus {
    pub fn label(&self) -> &'static str {
        use InverterStatus::*;

        match self {
            Waiting => "Waiting",
            Checking => "Checking",
            Normal => "Normal",
            Off => "Off",
            PermanentFault => "Permanent Fault",
            Updating => "Updating",
            EpsCheck => "EPS Check",
            EpsMode => "EPS Mode",
            SelfTest => "Self Test",
            Idle => "Idle",
            Standby => "Standby",
        }
    }

    /// Never fails; codes outside the table read as "Unknown".
    pub fn label_for(code: i64) -> &'static str {
        u8::try_from(code)
            .ok()
            .and_then(|c| Self::try_from(c).ok())
            .map(|s| s.label())
            .unwrap_or("Unknown")
    }
} // }}}

// DerivedValue {{{
#[derive(Clone, Debug, PartialEq)]
pub enum DerivedValue {
    Quantity(f64),
    Label(String),
}

impl std::fmt::Display for DerivedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DerivedValue::Quantity(v) => write!(f, "{}", v),
            DerivedValue::Label(s) => write!(f, "{}", s),
        }
    }
} // }}}

/// Reinterpret an unsigned 16 bit reading as two's complement.
pub fn sign_correct(raw: i64) -> i64 {
    if raw >= 32768 {
        raw - 65536
    } else {
        raw
    }
}

/// "Feed-in Power" -> "feedin_power"
pub fn slug(name: &str) -> String {
    name.replace(' ', "_").replace('-', "").to_lowercase()
}

// MeasurementDescriptor {{{
#[derive(Clone, Debug, PartialEq)]
pub struct MeasurementDescriptor {
    id: String,
    name: String,
    kind: MeasurementKind,
    section: Section,
    index: usize,
    secondary_index: Option<usize>,
    scale: f64,
    unit: Option<&'static str>,
    icon: String,
    device_class: Option<&'static str>,
    diagnostic: bool,
}

impl MeasurementDescriptor {
    pub fn new(
        name: &str,
        kind: MeasurementKind,
        section: Section,
        index: usize,
        secondary_index: Option<usize>,
        scale: f64,
        icon: &str,
    ) -> Self {
        // the composite sensor keeps the bare slug so its entity id doesn't
        // carry the device prefix
        let id = match kind {
            MeasurementKind::PowerDelta => slug(name),
            _ => format!("solax_{}", slug(name)),
        };

        Self {
            id,
            name: name.to_owned(),
            kind,
            section,
            index,
            secondary_index,
            scale,
            unit: kind.unit(),
            icon: icon.to_owned(),
            device_class: kind.device_class(),
            diagnostic: kind == MeasurementKind::Version,
        }
    }

    pub fn energy(name: &str, icon: &str, index: usize, scale: f64) -> Self {
        Self::new(name, MeasurementKind::Energy, Section::Data, index, None, scale, icon)
    }

    pub fn power(name: &str, icon: &str, index: usize) -> Self {
        Self::new(name, MeasurementKind::Power, Section::Data, index, None, 1.0, icon)
    }

    pub fn power_delta(name: &str, icon: &str, index: usize, secondary_index: usize) -> Self {
        Self::new(
            name,
            MeasurementKind::PowerDelta,
            Section::Data,
            index,
            Some(secondary_index),
            1.0,
            icon,
        )
    }

    pub fn frequency(name: &str, index: usize) -> Self {
        Self::new(
            name,
            MeasurementKind::Frequency,
            Section::Data,
            index,
            None,
            100.0,
            "mdi:music-clef-treble",
        )
    }

    pub fn voltage(name: &str, index: usize) -> Self {
        Self::new(name, MeasurementKind::Voltage, Section::Data, index, None, 10.0, "mdi:current-ac")
    }

    pub fn current(name: &str, index: usize) -> Self {
        Self::new(name, MeasurementKind::Current, Section::Data, index, None, 10.0, "mdi:current-ac")
    }

    pub fn temperature(name: &str, index: usize) -> Self {
        Self::new(
            name,
            MeasurementKind::Temperature,
            Section::Data,
            index,
            None,
            1.0,
            "mdi:thermometer",
        )
    }

    pub fn status(name: &str, index: usize) -> Self {
        Self::new(name, MeasurementKind::Status, Section::Data, index, None, 1.0, "mdi:check")
    }

    pub fn version(name: &str, index: usize) -> Self {
        Self::new(name, MeasurementKind::Version, Section::Information, index, None, 1.0, "mdi:sync")
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> MeasurementKind {
        self.kind
    }

    pub fn section(&self) -> Section {
        self.section
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn secondary_index(&self) -> Option<usize> {
        self.secondary_index
    }

    pub fn unit(&self) -> Option<&'static str> {
        self.unit
    }

    pub fn icon(&self) -> &str {
        &self.icon
    }

    pub fn device_class(&self) -> Option<&'static str> {
        self.device_class
    }

    pub fn diagnostic(&self) -> bool {
        self.diagnostic
    }

    /// Identifier override published to Home Assistant, composite sensors only.
    pub fn object_id(&self) -> Option<&str> {
        match self.kind {
            MeasurementKind::PowerDelta => Some(&self.id),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.scale.is_finite() && self.scale > 0.0) {
            bail!("sensor {}: scale must be positive, got {}", self.name, self.scale);
        }

        match (self.kind.needs_secondary(), self.secondary_index) {
            (true, None) => bail!("sensor {}: {:?} needs a secondary index", self.name, self.kind),
            (false, Some(i)) => bail!(
                "sensor {}: {:?} takes no secondary index (got {})",
                self.name,
                self.kind,
                i
            ),
            _ => {}
        }

        if self.id.is_empty() || self.id == "solax_" {
            bail!("sensor name {:?} yields an empty id", self.name);
        }

        Ok(())
    }

    fn scaled(&self, raw: i64) -> f64 {
        raw as f64 / self.scale
    }

    fn signed(&self, raw: i64) -> Result<i64, DecodeError> {
        if !(0..=0xFFFF).contains(&raw) {
            return Err(DecodeError::MalformedSection(self.section));
        }
        Ok(sign_correct(raw))
    }

    /// Derive this sensor's value from one poll's payload.
    pub fn derive(&self, payload: &RawPayload) -> Result<DerivedValue, DecodeError> {
        use MeasurementKind::*;

        let raw = payload.value(self.section, self.index)?;

        let value = match self.kind {
            Power => DerivedValue::Quantity(self.scaled(self.signed(raw)?)),
            PowerDelta => {
                let ac = self.scaled(raw);
                let feed_in = match self.secondary_index {
                    Some(index) => self.scaled(self.signed(payload.value(self.section, index)?)?),
                    None => 0.0,
                };
                DerivedValue::Quantity(ac - feed_in)
            }
            Status => {
                let code = self.scaled(raw);
                let label = if code.fract() == 0.0 {
                    InverterStatus::label_for(code as i64)
                } else {
                    "Unknown"
                };
                DerivedValue::Label(label.to_owned())
            }
            Version => DerivedValue::Label(self.scaled(raw).to_string()),
            Energy | Frequency | Voltage | Current | Temperature => {
                DerivedValue::Quantity(self.scaled(raw))
            }
        };

        Ok(value)
    }
} // }}}

/// Free function form of [`MeasurementDescriptor::derive`].
pub fn derive(descriptor: &MeasurementDescriptor, payload: &RawPayload) -> Result<DerivedValue, DecodeError> {
    descriptor.derive(payload)
}

// Registry {{{
/// The full set of sensors published for one inverter.
#[derive(Clone, Debug)]
pub struct Registry {
    descriptors: Vec<MeasurementDescriptor>,
    readiness: Vec<usize>,
}

impl Registry {
    /// `readiness` lists the Data indices of the energy accumulators; while
    /// they all read zero the inverter has not finished starting up.
    pub fn new(descriptors: Vec<MeasurementDescriptor>, readiness: Vec<usize>) -> Result<Self> {
        let mut seen = HashSet::new();

        for descriptor in &descriptors {
            descriptor.validate()?;
            if !seen.insert(descriptor.id().to_owned()) {
                bail!("duplicate sensor id {}", descriptor.id());
            }
        }

        if descriptors.iter().filter(|d| d.kind() == MeasurementKind::Status).count() > 1 {
            bail!("at most one status sensor is supported");
        }

        Ok(Self {
            descriptors,
            readiness,
        })
    }

    /// Sensor table of the X1 Mini G3.
    pub fn x1_mini_g3() -> Result<Self> {
        use MeasurementDescriptor as M;

        Self::new(
            vec![
                M::temperature("Inverter Temperature", 55),
                M::energy("Energy Today", "mdi:solar-panel", 13, 10.0),
                M::energy("Energy Total", "mdi:chart-line", 11, 10.0),
                M::voltage("DC Voltage 1", 3),
                M::current("DC Current 1", 5),
                M::power("DC Power 1", "mdi:power-socket-de", 7),
                M::voltage("AC Output Voltage", 0),
                M::current("AC Current", 1),
                M::power("AC Power", "mdi:solar-panel", 2),
                M::frequency("AC Frequency", 9),
                M::status("Inverter Operation Mode", 10),
                M::power("Feed-in Power", "mdi:transmission-tower", 48),
                M::energy("Feed-in Energy", "mdi:home-export-outline", 50, 100.0),
                M::energy("Consume Energy", "mdi:home-import-outline", 52, 100.0),
                M::version("Inverter Version DSP", 4),
                M::version("Inverter Version ARM", 6),
                M::power_delta("Home Consumption Power", "mdi:home", 2, 48),
            ],
            vec![50, 52],
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = &MeasurementDescriptor> {
        self.descriptors.iter()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&MeasurementDescriptor> {
        self.descriptors.iter().find(|d| d.id() == id)
    }

    /// The sensor that receives the "Offline" marker.
    pub fn status(&self) -> Option<&MeasurementDescriptor> {
        self.descriptors
            .iter()
            .find(|d| d.kind() == MeasurementKind::Status)
    }

    /// True while every readiness accumulator reads exactly zero. A field
    /// that cannot be read is not zero, so it never holds the sensors back.
    pub fn is_initializing(&self, payload: &RawPayload) -> bool {
        if self.readiness.is_empty() {
            return false;
        }

        self.readiness
            .iter()
            .all(|index| match payload.value(Section::Data, *index) {
                Ok(value) => value == 0,
                Err(e) => {
                    debug!("readiness check: {}", e);
                    false
                }
            })
    }
} // }}}
