//! Session configuration.
//!
//! Every field has a default matching the stock rig, so a config file only
//! needs the values it changes:
//!
//! ```yaml
//! device_path: /dev/ttyACM0
//! relay_poll_interval_ms: 2000
//! auto_reconnect: false
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use hydro_protocol::{DeviceCode, DEFAULT_MAX_LINE_LENGTH, RELAY_CODES, RELAY_KEYS};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Paths tried, in order, when no device path is configured.
pub const DEFAULT_CANDIDATE_PATHS: [&str; 4] =
    ["/dev/ttyACM0", "/dev/ttyACM1", "/dev/ttyUSB0", "/dev/ttyUSB1"];

/// One controllable relay: logical key and the code the firmware knows it by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActuatorSpec {
    /// Logical key, e.g. `lights_top`.
    pub key: String,
    /// Two-letter wire code, e.g. `LT`.
    pub code: String,
}

impl ActuatorSpec {
    /// Create a new actuator spec.
    pub fn new(key: impl Into<String>, code: impl Into<String>) -> Self {
        ActuatorSpec {
            key: key.into(),
            code: code.into(),
        }
    }
}

/// The stock relay table.
pub fn default_actuators() -> Vec<ActuatorSpec> {
    RELAY_KEYS
        .iter()
        .zip(RELAY_CODES.iter())
        .map(|(key, code)| ActuatorSpec::new(*key, *code))
        .collect()
}

/// Configuration for a [`SessionManager`](crate::SessionManager).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Device path to open. When `None`, `candidate_paths` are tried in order.
    pub device_path: Option<String>,

    /// Paths tried when `device_path` is not set. First success wins.
    pub candidate_paths: Vec<String>,

    /// Line speed.
    pub baud_rate: u32,

    /// Give up opening a path after this long.
    pub open_timeout_ms: u64,

    /// Quiet period after opening before any traffic is sent.
    /// Most boards reset when the port opens and need time to boot.
    pub settle_delay_ms: u64,

    /// Without a valid frame for this long, the link is considered stale
    /// and a ping probe is sent.
    pub liveness_timeout_ms: u64,

    /// How long a ping probe may go unanswered before the line is dropped.
    pub ping_timeout_ms: u64,

    /// Interval between `GET_RELAYS` polls.
    pub relay_poll_interval_ms: u64,

    /// Interval between `GET_SENSORS` polls.
    pub sensor_poll_interval_ms: u64,

    /// Minimum spacing between reconnect attempts.
    pub reconnect_interval_ms: u64,

    /// Sleep between non-blocking reads in the reader worker.
    pub read_poll_interval_ms: u64,

    /// Sleep between ticks of the periodic worker.
    pub tick_interval_ms: u64,

    /// Longest partial line kept while waiting for a terminator.
    pub max_line_length: usize,

    /// Reopen the line after it drops.
    pub auto_reconnect: bool,

    /// Never touch hardware. The session stays disconnected and commands
    /// only update local state.
    pub simulate: bool,

    /// Send the host's local time when a connection settles.
    pub sync_time_on_connect: bool,

    /// Poll with `GET_STATE` instead of `GET_RELAYS` + `GET_SENSORS`, for
    /// firmware that only emits the combined `STATE:` frame.
    pub legacy_state_poll: bool,

    /// Relay table. Fixed for the life of the session.
    pub actuators: Vec<ActuatorSpec>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            device_path: None,
            candidate_paths: DEFAULT_CANDIDATE_PATHS.iter().map(|p| p.to_string()).collect(),
            baud_rate: 9600,
            open_timeout_ms: 2000,
            settle_delay_ms: 2000,
            liveness_timeout_ms: 10_000,
            ping_timeout_ms: 1000,
            relay_poll_interval_ms: 3000,
            sensor_poll_interval_ms: 60_000,
            reconnect_interval_ms: 5000,
            read_poll_interval_ms: 20,
            tick_interval_ms: 100,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            auto_reconnect: true,
            simulate: false,
            sync_time_on_connect: true,
            legacy_state_poll: false,
            actuators: default_actuators(),
        }
    }
}

impl SessionConfig {
    /// Parse a YAML document. Missing fields take their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: SessionConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML config file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// A config that never opens hardware.
    pub fn simulated() -> Self {
        SessionConfig {
            simulate: true,
            ..Default::default()
        }
    }

    /// Pin the device path instead of trying candidates.
    pub fn with_device_path(mut self, path: impl Into<String>) -> Self {
        self.device_path = Some(path.into());
        self
    }

    /// Set the post-open settle delay.
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Enable or disable reconnecting after the line drops.
    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Check the values make sense together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.baud_rate == 0 {
            return invalid("baud_rate must be non-zero".to_string());
        }

        let intervals = [
            ("liveness_timeout_ms", self.liveness_timeout_ms),
            ("ping_timeout_ms", self.ping_timeout_ms),
            ("relay_poll_interval_ms", self.relay_poll_interval_ms),
            ("sensor_poll_interval_ms", self.sensor_poll_interval_ms),
            ("reconnect_interval_ms", self.reconnect_interval_ms),
            ("read_poll_interval_ms", self.read_poll_interval_ms),
            ("tick_interval_ms", self.tick_interval_ms),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, ms)| *ms == 0) {
            return invalid(format!("{} must be non-zero", name));
        }

        if self.max_line_length == 0 {
            return invalid("max_line_length must be non-zero".to_string());
        }

        if self.device_path.is_none() && self.candidate_paths.is_empty() && !self.simulate {
            return invalid("no device_path and no candidate_paths".to_string());
        }

        let mut keys = HashSet::new();
        let mut codes = HashSet::new();
        for spec in &self.actuators {
            let code = DeviceCode::new(&spec.code)
                .map_err(|e| ConfigError::Invalid(format!("actuator {}: {}", spec.key, e)))?;
            if !keys.insert(spec.key.as_str()) {
                return invalid(format!("duplicate actuator key {}", spec.key));
            }
            if !codes.insert(code) {
                return invalid(format!("duplicate device code {}", code));
            }
        }

        Ok(())
    }

    /// Paths to try, in order.
    pub fn connect_paths(&self) -> Vec<String> {
        match &self.device_path {
            Some(path) => vec![path.clone()],
            None => self.candidate_paths.clone(),
        }
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_millis(self.liveness_timeout_ms)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    pub fn relay_poll_interval(&self) -> Duration {
        Duration::from_millis(self.relay_poll_interval_ms)
    }

    pub fn sensor_poll_interval(&self) -> Duration {
        Duration::from_millis(self.sensor_poll_interval_ms)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn read_poll_interval(&self) -> Duration {
        Duration::from_millis(self.read_poll_interval_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.actuators.len(), 7);
        assert_eq!(config.connect_paths()[0], "/dev/ttyACM0");
    }

    #[test]
    fn test_yaml_partial_override() {
        let config = SessionConfig::from_yaml_str(
            "device_path: /dev/ttyUSB3\nrelay_poll_interval_ms: 1500\nauto_reconnect: false\n",
        )
        .unwrap();
        assert_eq!(config.connect_paths(), vec!["/dev/ttyUSB3".to_string()]);
        assert_eq!(config.relay_poll_interval(), Duration::from_millis(1500));
        assert!(!config.auto_reconnect);
        assert_eq!(config.sensor_poll_interval_ms, 60_000);
    }

    #[test]
    fn test_yaml_custom_actuators() {
        let yaml = "actuators:\n  - key: lights_top\n    code: LT\n  - key: fan\n    code: FN\n";
        let config = SessionConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.actuators[1], ActuatorSpec::new("fan", "FN"));
    }

    #[test]
    fn test_rejects_duplicate_codes() {
        let yaml = "actuators:\n  - key: a\n    code: LT\n  - key: b\n    code: LT\n";
        assert!(matches!(
            SessionConfig::from_yaml_str(yaml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_rejects_bad_code_and_zero_interval() {
        assert!(SessionConfig::from_yaml_str("actuators:\n  - key: a\n    code: lt\n").is_err());
        assert!(SessionConfig::from_yaml_str("ping_timeout_ms: 0\n").is_err());
        assert!(SessionConfig::from_yaml_str("baud_rate: [1]\n").is_err());
    }

    #[test]
    fn test_yaml_file() {
        let path = std::env::temp_dir().join(format!("hydro-session-{}.yaml", std::process::id()));
        std::fs::write(&path, "baud_rate: 115200\n").unwrap();
        let config = SessionConfig::from_yaml_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.baud_rate, 115200);
        assert!(matches!(SessionConfig::from_yaml_file(&path), Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_simulated_needs_no_paths() {
        let mut config = SessionConfig::simulated();
        config.candidate_paths.clear();
        assert!(config.validate().is_ok());
    }
}
