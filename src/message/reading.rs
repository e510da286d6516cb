//! SensorReading and ForwardRecord - one reading on its way in and out

use crate::ValidationError;
use serde::Serialize;

/// A reading as published by a sensor device
///
/// Pass-through value object: no derived state, no unit conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    /// Measured weight, unit chosen by the device
    pub weight: f64,
    /// Categorical size label; any string is accepted
    pub size: String,
    /// Color label
    pub color: String,
    /// Identifier of the originating device, the sink's join key
    pub device_id: String,
}

impl SensorReading {
    /// Check the reading's invariants
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.device_id.is_empty() {
            return Err(ValidationError::MissingIdentifier);
        }
        Ok(())
    }
}

/// The body POSTed to the sink for one reading
///
/// Field-identical to the inbound schema. Only [`crate::transform`] builds
/// one, and only from a reading that passed [`SensorReading::validate`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForwardRecord {
    #[serde(rename = "peso")]
    weight: f64,
    #[serde(rename = "tamano")]
    size: String,
    color: String,
    #[serde(rename = "esp32_fk")]
    device_id: String,
}

impl ForwardRecord {
    pub(crate) fn from_validated(reading: SensorReading) -> Self {
        debug_assert!(reading.validate().is_ok());
        Self {
            weight: reading.weight,
            size: reading.size,
            color: reading.color,
            device_id: reading.device_id,
        }
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn size(&self) -> &str {
        &self.size
    }

    pub fn color(&self) -> &str {
        &self.color
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Serialize to the outbound JSON body
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}
