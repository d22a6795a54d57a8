use crate::prelude::*;

use serde_json::Value;

/// One realtime data response, as returned by the inverter's local API.
///
/// Both sections must be present and be lists. Their contents are checked
/// field by field when sensors read them, so a short list only affects the
/// sensors that point past its end.
#[derive(Clone, Debug, PartialEq)]
pub struct RawPayload {
    data: Vec<Value>,
    information: Vec<Value>,
}

impl RawPayload {
    pub fn decode(body: &str) -> Result<Self, DecodeError> {
        let mut document: Value = serde_json::from_str(body)
            .map_err(|e| DecodeError::InvalidFormat(e.to_string()))?;

        let object = document
            .as_object_mut()
            .ok_or_else(|| DecodeError::InvalidFormat("top level is not an object".to_owned()))?;

        let mut take = |section: Section| match object.remove(section.key()) {
            Some(Value::Array(values)) => Ok(values),
            Some(other) => Err(DecodeError::InvalidFormat(format!(
                "{} is not a list: {}",
                section, other
            ))),
            None => Err(DecodeError::InvalidFormat(format!("missing {} key", section))),
        };

        let data = take(Section::Data)?;
        let information = take(Section::Information)?;

        Ok(Self { data, information })
    }

    /// Build a payload straight from register values, handy for tests.
    pub fn from_sections(data: Vec<i64>, information: Vec<i64>) -> Self {
        Self {
            data: data.into_iter().map(Value::from).collect(),
            information: information.into_iter().map(Value::from).collect(),
        }
    }

    fn section(&self, section: Section) -> &[Value] {
        match section {
            Section::Data => &self.data,
            Section::Information => &self.information,
        }
    }

    pub fn value(&self, section: Section, index: usize) -> Result<i64, DecodeError> {
        let values = self.section(section);

        values
            .get(index)
            .ok_or(DecodeError::OutOfRange {
                section,
                index,
                len: values.len(),
            })
            .and_then(|value| integer(value).ok_or(DecodeError::MalformedSection(section)))
    }
}

// firmware sometimes sends whole numbers as 3.0
fn integer(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
            .map(|f| f as i64)
    })
}
