//! Frame parsing for controller output.
//!
//! Every line the controller sends is one frame, selected by prefix:
//! - `PING_OK` - liveness acknowledgment
//! - `RELAYS:` - relay snapshot
//! - `SENSORS:` - sensor snapshot
//! - `STATE:` - legacy combined snapshot (13 or 17 fields)
//!
//! Frames are validated in full before anything is returned, so a caller
//! either gets a complete frame or an error, never half of one.

use crate::constants::*;
use crate::error::{ProtocolError, ProtocolResult};

/// State of a float switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum WaterLevel {
    /// Float raised: reservoir is full enough.
    High,
    /// Float dropped: reservoir is low.
    Low,
}

/// Air and water temperature readings carried by sensor frames.
///
/// `None` means the controller reported the `-1` sentinel for that sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClimateReadings {
    /// Air temperature in °C.
    pub air_temp: Option<f64>,
    /// Relative humidity in %.
    pub humidity: Option<f64>,
    /// First water temperature probe in °C.
    pub water_temp1: Option<f64>,
    /// Second water temperature probe in °C.
    pub water_temp2: Option<f64>,
}

/// Float switch states. `None` means the switch reported the sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloatSwitches {
    /// Top reservoir.
    pub top: Option<WaterLevel>,
    /// Bottom reservoir.
    pub bottom: Option<WaterLevel>,
}

/// pH / EC probe readings from a legacy `STATE:` frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WaterChemistry {
    /// Short schema: one shared probe pair.
    Single {
        /// pH.
        ph: Option<f64>,
        /// Electrical conductivity in mS/cm.
        ec: Option<f64>,
    },
    /// Extended schema: a probe pair per reservoir.
    Split {
        /// Top reservoir pH.
        ph_top: Option<f64>,
        /// Top reservoir EC.
        ec_top: Option<f64>,
        /// Bottom reservoir pH.
        ph_bottom: Option<f64>,
        /// Bottom reservoir EC.
        ec_bottom: Option<f64>,
    },
}

/// Relay states from a `RELAYS:` frame (or the head of a `STATE:` frame).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayFrame {
    /// Relay states in [`RELAY_KEYS`] order.
    pub states: [bool; RELAY_FIELD_COUNT],
}

impl RelayFrame {
    /// Parse the body of a `RELAYS:` frame (everything after the prefix).
    pub fn parse(body: &str) -> ProtocolResult<RelayFrame> {
        let fields = split_fields(body);
        if fields.len() != RELAY_FIELD_COUNT {
            return Err(ProtocolError::FieldCount {
                frame: "RELAYS",
                expected: "7",
                actual: fields.len(),
            });
        }
        Self::from_fields("RELAYS", &fields)
    }

    fn from_fields(frame: &'static str, fields: &[&str]) -> ProtocolResult<RelayFrame> {
        let mut states = [false; RELAY_FIELD_COUNT];
        for (index, state) in states.iter_mut().enumerate() {
            *state = parse_flag(frame, index, fields[index])?;
        }
        Ok(RelayFrame { states })
    }

    /// Iterate `(key, on)` pairs in wire order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, bool)> + '_ {
        RELAY_KEYS.iter().copied().zip(self.states.iter().copied())
    }

    /// Get the state reported for a relay key.
    pub fn get(&self, key: &str) -> Option<bool> {
        self.iter().find(|(k, _)| *k == key).map(|(_, on)| on)
    }

    /// Encode as a controller would send it (without terminator).
    pub fn to_line(&self) -> String {
        let flags: Vec<&str> = self.states.iter().map(|&on| if on { "1" } else { "0" }).collect();
        format!("{}{}", RELAYS_PREFIX, flags.join(","))
    }
}

/// Sensor snapshot from a `SENSORS:` frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorFrame {
    /// Temperatures and humidity.
    pub climate: ClimateReadings,
    /// Float switches.
    pub floats: FloatSwitches,
}

impl SensorFrame {
    /// Parse the body of a `SENSORS:` frame.
    ///
    /// Format: `air_temp,humidity,water_temp1,water_temp2,float_top,float_bottom`
    pub fn parse(body: &str) -> ProtocolResult<SensorFrame> {
        const FRAME: &str = "SENSORS";
        let fields = split_fields(body);
        if fields.len() != SENSOR_FIELD_COUNT {
            return Err(ProtocolError::FieldCount {
                frame: FRAME,
                expected: "6",
                actual: fields.len(),
            });
        }

        Ok(SensorFrame {
            climate: parse_climate(FRAME, &fields, 0)?,
            floats: FloatSwitches {
                top: parse_level(FRAME, 4, fields[4])?,
                bottom: parse_level(FRAME, 5, fields[5])?,
            },
        })
    }
}

/// Which `STATE:` layout a frame used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacySchema {
    /// 13 fields: relays, climate, single pH/EC.
    Short,
    /// 17 fields: relays, float switches, climate, split pH/EC.
    Extended,
}

/// Combined snapshot from a legacy `STATE:` frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegacyStateFrame {
    /// Relay states.
    pub relays: RelayFrame,
    /// Temperatures and humidity.
    pub climate: ClimateReadings,
    /// pH / EC probes.
    pub chemistry: WaterChemistry,
    /// Float switches (extended schema only).
    pub floats: Option<FloatSwitches>,
}

impl LegacyStateFrame {
    /// Parse the body of a `STATE:` frame. The field count picks the schema.
    pub fn parse(body: &str) -> ProtocolResult<LegacyStateFrame> {
        const FRAME: &str = "STATE";
        let fields = split_fields(body);

        match fields.len() {
            LEGACY_SHORT_FIELD_COUNT => Ok(LegacyStateFrame {
                relays: RelayFrame::from_fields(FRAME, &fields)?,
                climate: parse_climate(FRAME, &fields, 7)?,
                chemistry: WaterChemistry::Single {
                    ph: parse_measurement(FRAME, 11, fields[11])?,
                    ec: parse_measurement(FRAME, 12, fields[12])?,
                },
                floats: None,
            }),
            LEGACY_EXTENDED_FIELD_COUNT => Ok(LegacyStateFrame {
                relays: RelayFrame::from_fields(FRAME, &fields)?,
                floats: Some(FloatSwitches {
                    top: parse_level(FRAME, 7, fields[7])?,
                    bottom: parse_level(FRAME, 8, fields[8])?,
                }),
                climate: parse_climate(FRAME, &fields, 9)?,
                chemistry: WaterChemistry::Split {
                    ph_top: parse_measurement(FRAME, 13, fields[13])?,
                    ec_top: parse_measurement(FRAME, 14, fields[14])?,
                    ph_bottom: parse_measurement(FRAME, 15, fields[15])?,
                    ec_bottom: parse_measurement(FRAME, 16, fields[16])?,
                },
            }),
            actual => Err(ProtocolError::FieldCount {
                frame: FRAME,
                expected: "13 or 17",
                actual,
            }),
        }
    }

    /// The layout this frame was decoded from.
    pub fn schema(&self) -> LegacySchema {
        match self.chemistry {
            WaterChemistry::Single { .. } => LegacySchema::Short,
            WaterChemistry::Split { .. } => LegacySchema::Extended,
        }
    }
}

/// A decoded controller frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// `PING_OK`.
    PingAck,
    /// `RELAYS:` snapshot.
    Relays(RelayFrame),
    /// `SENSORS:` snapshot.
    Sensors(SensorFrame),
    /// `STATE:` snapshot.
    LegacyState(LegacyStateFrame),
    /// Unrecognized line (boot banners, debug prints, future frames).
    Unknown(String),
}

impl Frame {
    /// Parse a frame line (terminator already removed).
    ///
    /// Unknown prefixes are not an error; they decode to [`Frame::Unknown`].
    pub fn parse(line: &str) -> ProtocolResult<Frame> {
        let line = line.trim();

        if line == PING_ACK {
            return Ok(Frame::PingAck);
        }

        if let Some(body) = line.strip_prefix(RELAYS_PREFIX) {
            return RelayFrame::parse(body).map(Frame::Relays);
        }

        if let Some(body) = line.strip_prefix(SENSORS_PREFIX) {
            return SensorFrame::parse(body).map(Frame::Sensors);
        }

        if let Some(body) = line.strip_prefix(STATE_PREFIX) {
            return LegacyStateFrame::parse(body).map(Frame::LegacyState);
        }

        log::debug!("ignoring unrecognized line: {:?}", line);
        Ok(Frame::Unknown(line.to_string()))
    }

    /// Short name of the frame kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::PingAck => "PING_OK",
            Frame::Relays(_) => "RELAYS",
            Frame::Sensors(_) => "SENSORS",
            Frame::LegacyState(_) => "STATE",
            Frame::Unknown(_) => "UNKNOWN",
        }
    }

    /// Whether this frame proves the controller is alive and talking protocol.
    pub fn is_valid(&self) -> bool {
        !matches!(self, Frame::Unknown(_))
    }
}

// ============================================================================
// Field Helpers
// ============================================================================

// Fields are kept raw. Flags must match exactly; numbers tolerate padding.
fn split_fields(body: &str) -> Vec<&str> {
    body.split(',').collect()
}

fn parse_flag(frame: &'static str, index: usize, value: &str) -> ProtocolResult<bool> {
    match value {
        "1" => Ok(true),
        "0" => Ok(false),
        _ => Err(ProtocolError::InvalidFlag {
            frame,
            index,
            value: value.to_string(),
        }),
    }
}

fn parse_number(frame: &'static str, index: usize, value: &str) -> ProtocolResult<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ProtocolError::InvalidNumber {
            frame,
            index,
            value: value.to_string(),
        })
}

fn parse_measurement(frame: &'static str, index: usize, value: &str) -> ProtocolResult<Option<f64>> {
    let number = parse_number(frame, index, value)?;
    Ok(if number == SENSOR_SENTINEL { None } else { Some(number) })
}

fn parse_level(frame: &'static str, index: usize, value: &str) -> ProtocolResult<Option<WaterLevel>> {
    match value {
        "1" => Ok(Some(WaterLevel::High)),
        "0" => Ok(Some(WaterLevel::Low)),
        SENSOR_SENTINEL_FIELD => Ok(None),
        _ => Err(ProtocolError::InvalidFlag {
            frame,
            index,
            value: value.to_string(),
        }),
    }
}

fn parse_climate(frame: &'static str, fields: &[&str], start: usize) -> ProtocolResult<ClimateReadings> {
    Ok(ClimateReadings {
        air_temp: parse_measurement(frame, start, fields[start])?,
        humidity: parse_measurement(frame, start + 1, fields[start + 1])?,
        water_temp1: parse_measurement(frame, start + 2, fields[start + 2])?,
        water_temp2: parse_measurement(frame, start + 3, fields[start + 3])?,
    })
}
