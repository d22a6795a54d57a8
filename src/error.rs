use crate::sensor::Section;

/// Failures turning an inverter response into sensor values.
///
/// `InvalidFormat` is raised by the payload decoder and aborts the whole
/// cycle. The other two are raised per sensor while deriving a value, so one
/// bad field only skips that sensor. `MalformedSection` covers a field that
/// is not an integer, or a signed reading outside the 16 bit range.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid payload format: {0}")]
    InvalidFormat(String),

    #[error("section {0} holds a value that is not a valid reading")]
    MalformedSection(Section),

    #[error("index {index} out of range for section {section} (len {len})")]
    OutOfRange {
        section: Section,
        index: usize,
        len: usize,
    },
}
