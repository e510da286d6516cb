//! Payload transformation: raw broker bytes to a validated forward record.

use crate::{ForwardRecord, SensorReading, ValidationError};
use serde::Deserialize;

/// Inbound wire shape
///
/// Absent or `null` fields decode to `None`; a field of the wrong type fails
/// the whole decode.
#[derive(Debug, Deserialize)]
struct WireReading {
    #[serde(default)]
    peso: Option<f64>,
    #[serde(default)]
    tamano: Option<String>,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    esp32_fk: Option<String>,
}

impl From<WireReading> for SensorReading {
    fn from(wire: WireReading) -> Self {
        SensorReading {
            weight: wire.peso.unwrap_or_default(),
            size: wire.tamano.unwrap_or_default(),
            color: wire.color.unwrap_or_default(),
            device_id: wire.esp32_fk.unwrap_or_default(),
        }
    }
}

/// Decode a raw payload into a typed reading without validating it
pub fn parse(raw: &[u8]) -> Result<SensorReading, ValidationError> {
    let wire: WireReading = serde_json::from_slice(raw)?;
    Ok(wire.into())
}

/// Turn a raw broker payload into the record sent to the sink
///
/// # Errors
///
/// - [`ValidationError::MalformedPayload`] if `raw` is not a JSON object of the
///   reading schema
/// - [`ValidationError::MissingIdentifier`] if `esp32_fk` is absent or empty
pub fn transform(raw: &[u8]) -> Result<ForwardRecord, ValidationError> {
    let reading = parse(raw)?;
    reading.validate()?;
    Ok(ForwardRecord::from_validated(reading))
}

/// Printable excerpt of a raw payload for diagnostics
///
/// Invalid UTF-8 is replaced, and the result is cut to `limit` characters
/// with a trailing ellipsis when truncated.
pub fn payload_excerpt(raw: &[u8], limit: usize) -> String {
    truncate_chars(&String::from_utf8_lossy(raw), limit)
}

pub(crate) fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}
