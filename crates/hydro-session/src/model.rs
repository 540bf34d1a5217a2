//! Device State Model.
//!
//! Mirror of the rig's relays and sensors as last reported by the
//! controller. Decoded frames are applied whole: each `apply_*` replaces
//! exactly the fields its frame carries and stamps them with the same time.
//! Relay and sensor groups are independent of each other.

use chrono::{DateTime, Utc};
use hydro_protocol::{
    ClimateReadings, DeviceCode, FloatSwitches, Frame, LegacyStateFrame, RelayFrame, SensorFrame,
    WaterChemistry, WaterLevel,
};
use serde::{Serialize, Serializer};

use crate::config::ActuatorSpec;
use crate::error::ConfigError;

// ============================================================================
// Readings
// ============================================================================

/// One sensor field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Reading<T> {
    /// Never reported since the session started.
    Unset,
    /// The controller reported the sensor as absent or faulty (`-1`).
    Absent,
    /// A valid reading.
    Value(T),
}

impl<T> Default for Reading<T> {
    fn default() -> Self {
        Reading::Unset
    }
}

impl<T: Copy> Reading<T> {
    /// Build from a decoded field, where `None` is the absent sentinel.
    pub fn reported(value: Option<T>) -> Self {
        match value {
            Some(v) => Reading::Value(v),
            None => Reading::Absent,
        }
    }

    /// The value, if valid.
    pub fn value(&self) -> Option<T> {
        match self {
            Reading::Value(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Reading::Unset)
    }
}

/// A reading plus when it was last written.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample<T> {
    pub reading: Reading<T>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl<T> Default for Sample<T> {
    fn default() -> Self {
        Sample {
            reading: Reading::Unset,
            updated_at: None,
        }
    }
}

impl<T: Copy> Sample<T> {
    fn set(&mut self, value: Option<T>, now: DateTime<Utc>) {
        self.reading = Reading::reported(value);
        self.updated_at = Some(now);
    }

    /// The value, if valid.
    pub fn value(&self) -> Option<T> {
        self.reading.value()
    }
}

/// Every sensor field the controller can report.
///
/// Firmware that reports a single pH/EC pair (short `STATE:` frames) fills
/// the `_top` fields.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct SensorReading {
    pub air_temp: Sample<f64>,
    pub humidity: Sample<f64>,
    pub water_temp1: Sample<f64>,
    pub water_temp2: Sample<f64>,
    pub ph_top: Sample<f64>,
    pub ph_bottom: Sample<f64>,
    pub ec_top: Sample<f64>,
    pub ec_bottom: Sample<f64>,
    pub float_top: Sample<WaterLevel>,
    pub float_bottom: Sample<WaterLevel>,
}

impl SensorReading {
    fn apply_climate(&mut self, climate: &ClimateReadings, now: DateTime<Utc>) {
        self.air_temp.set(climate.air_temp, now);
        self.humidity.set(climate.humidity, now);
        self.water_temp1.set(climate.water_temp1, now);
        self.water_temp2.set(climate.water_temp2, now);
    }

    fn apply_floats(&mut self, floats: &FloatSwitches, now: DateTime<Utc>) {
        self.float_top.set(floats.top, now);
        self.float_bottom.set(floats.bottom, now);
    }

    fn apply_chemistry(&mut self, chemistry: &WaterChemistry, now: DateTime<Utc>) {
        match *chemistry {
            WaterChemistry::Single { ph, ec } => {
                self.ph_top.set(ph, now);
                self.ec_top.set(ec, now);
            }
            WaterChemistry::Split {
                ph_top,
                ec_top,
                ph_bottom,
                ec_bottom,
            } => {
                self.ph_top.set(ph_top, now);
                self.ec_top.set(ec_top, now);
                self.ph_bottom.set(ph_bottom, now);
                self.ec_bottom.set(ec_bottom, now);
            }
        }
    }
}

// ============================================================================
// Actuators
// ============================================================================

/// One controllable relay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActuatorState {
    pub key: String,
    #[serde(serialize_with = "serialize_code")]
    pub code: DeviceCode,
    pub on: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

fn serialize_code<S: Serializer>(code: &DeviceCode, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(code.as_str())
}

/// Read-only copy of the whole model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSnapshot {
    pub actuators: Vec<ActuatorState>,
    pub sensors: SensorReading,
}

impl DeviceSnapshot {
    /// State of one actuator.
    pub fn actuator(&self, key: &str) -> Option<&ActuatorState> {
        self.actuators.iter().find(|a| a.key == key)
    }
}

/// What applying a frame changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelUpdate {
    /// Actuators whose on/off value actually flipped, in table order.
    pub changed: Vec<(String, bool)>,
    /// Whether the frame carried sensor fields.
    pub sensors_updated: bool,
}

// ============================================================================
// Model
// ============================================================================

/// Single-writer store for actuator and sensor state.
#[derive(Debug, Clone)]
pub struct DeviceStateModel {
    actuators: Vec<ActuatorState>,
    sensors: SensorReading,
}

impl DeviceStateModel {
    /// Build the actuator table. Keys and codes must be unique.
    pub fn new(specs: &[ActuatorSpec]) -> Result<Self, ConfigError> {
        let mut actuators: Vec<ActuatorState> = Vec::with_capacity(specs.len());
        for spec in specs {
            let code = DeviceCode::new(&spec.code)
                .map_err(|e| ConfigError::Invalid(format!("actuator {}: {}", spec.key, e)))?;
            if actuators.iter().any(|a| a.key == spec.key || a.code == code) {
                return Err(ConfigError::Invalid(format!(
                    "actuator {} ({}) is not unique",
                    spec.key, code
                )));
            }
            actuators.push(ActuatorState {
                key: spec.key.clone(),
                code,
                on: false,
                updated_at: None,
            });
        }

        Ok(DeviceStateModel {
            actuators,
            sensors: SensorReading::default(),
        })
    }

    /// Route a decoded frame to its apply operation.
    pub fn apply(&mut self, frame: &Frame, now: DateTime<Utc>) -> ModelUpdate {
        match frame {
            Frame::Relays(relays) => self.apply_relays(relays, now),
            Frame::Sensors(sensors) => self.apply_sensors(sensors, now),
            Frame::LegacyState(state) => self.apply_legacy_state(state, now),
            Frame::PingAck | Frame::Unknown(_) => ModelUpdate::default(),
        }
    }

    /// Replace relay states from a `RELAYS:` frame.
    ///
    /// Relays are matched by key, so a custom table only picks up the keys
    /// it shares with the firmware's fixed order.
    pub fn apply_relays(&mut self, relays: &RelayFrame, now: DateTime<Utc>) -> ModelUpdate {
        let mut update = ModelUpdate::default();
        for (key, on) in relays.iter() {
            if let Some(actuator) = self.actuators.iter_mut().find(|a| a.key == key) {
                if actuator.on != on {
                    update.changed.push((actuator.key.clone(), on));
                }
                actuator.on = on;
                actuator.updated_at = Some(now);
            }
        }
        update
    }

    /// Replace climate and float fields from a `SENSORS:` frame.
    pub fn apply_sensors(&mut self, sensors: &SensorFrame, now: DateTime<Utc>) -> ModelUpdate {
        self.sensors.apply_climate(&sensors.climate, now);
        self.sensors.apply_floats(&sensors.floats, now);
        ModelUpdate {
            changed: Vec::new(),
            sensors_updated: true,
        }
    }

    /// Replace relays and every sensor field a `STATE:` frame carries.
    pub fn apply_legacy_state(&mut self, state: &LegacyStateFrame, now: DateTime<Utc>) -> ModelUpdate {
        let mut update = self.apply_relays(&state.relays, now);
        self.sensors.apply_climate(&state.climate, now);
        self.sensors.apply_chemistry(&state.chemistry, now);
        if let Some(floats) = &state.floats {
            self.sensors.apply_floats(floats, now);
        }
        update.sensors_updated = true;
        update
    }

    /// Record a commanded value before the controller confirms it.
    ///
    /// Returns `None` for an unknown key, otherwise whether the value changed.
    pub fn set_optimistic(&mut self, key: &str, on: bool, now: DateTime<Utc>) -> Option<bool> {
        let actuator = self.actuators.iter_mut().find(|a| a.key == key)?;
        let changed = actuator.on != on;
        actuator.on = on;
        actuator.updated_at = Some(now);
        Some(changed)
    }

    /// Wire code for a key.
    pub fn code_for(&self, key: &str) -> Option<DeviceCode> {
        self.actuator(key).map(|a| a.code)
    }

    pub fn actuator(&self, key: &str) -> Option<&ActuatorState> {
        self.actuators.iter().find(|a| a.key == key)
    }

    pub fn actuators(&self) -> &[ActuatorState] {
        &self.actuators
    }

    pub fn sensors(&self) -> &SensorReading {
        &self.sensors
    }

    pub fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            actuators: self.actuators.clone(),
            sensors: self.sensors,
        }
    }
}
