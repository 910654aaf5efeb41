//! DHT temperature/humidity sensors.
//!
//! Reads go through the correlated request path: the sensor opcode is sent
//! with a fresh correlation code and the firmware answers on that code with
//! an 8-byte payload — two little-endian 32-bit floats, temperature then
//! humidity.  A sentinel of exactly -999.0 in both fields means the sensor
//! is absent or the wrong type is configured.

use crate::link::error::LinkError;
use crate::link::session::LinkHandle;
use crate::link::types::Command;
use serde::{Deserialize, Serialize};

/// Sentinel reported by the firmware when the sensor did not answer.
const SENSOR_ABSENT: f32 = -999.0;

/// Supported DHT sensor variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DhtKind {
    Dht11,
    Dht21,
    Dht22,
}

impl DhtKind {
    /// Sensor-read command for this variant.
    pub fn command(self) -> Command {
        match self {
            Self::Dht11 => Command::Dht11,
            Self::Dht21 => Command::Dht21,
            Self::Dht22 => Command::Dht22,
        }
    }
}

/// One decoded sensor response.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DhtReading {
    /// Temperature in degrees Celsius.
    pub temperature: f32,
    /// Relative humidity in percent.
    pub humidity: f32,
}

impl DhtReading {
    /// Decode a sensor response payload.
    pub fn decode(payload: &[u8]) -> Result<Self, LinkError> {
        if payload.len() != 8 {
            return Err(LinkError::MalformedFrame(format!(
                "DHT response must be 8 bytes, got {}",
                payload.len()
            )));
        }
        let mut temperature = [0u8; 4];
        let mut humidity = [0u8; 4];
        temperature.copy_from_slice(&payload[0..4]);
        humidity.copy_from_slice(&payload[4..8]);
        Ok(Self {
            temperature: f32::from_le_bytes(temperature),
            humidity: f32::from_le_bytes(humidity),
        })
    }

    /// Whether the firmware reported the sensor as absent/misconfigured.
    pub fn is_absent(&self) -> bool {
        self.temperature == SENSOR_ABSENT && self.humidity == SENSOR_ABSENT
    }
}

/// Request one reading from the sensor on the given pin.
pub async fn read(link: &LinkHandle, kind: DhtKind, pin: u8) -> Result<DhtReading, LinkError> {
    let payload = link.send_with_response(kind.command(), pin).await?;
    DhtReading::decode(&payload)
}
