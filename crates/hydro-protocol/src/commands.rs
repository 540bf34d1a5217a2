//! Commands that can be sent to the rig controller.
//!
//! The controller understands a fixed vocabulary:
//! - Liveness probing (`PING`)
//! - Relay control (`<CODE>:ON` / `<CODE>:OFF`, `RESET_SCHEDULE`)
//! - Clock sync (`SET_TIME:HH:MM:SS`)
//! - Snapshot polling (`GET_RELAYS`, `GET_SENSORS`, `GET_STATE`)

use std::fmt;
use std::str::FromStr;

use crate::codec::LineCodec;
use crate::error::{ProtocolError, ProtocolResult};

/// Two-letter code the firmware uses to address a relay (e.g. `LT`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceCode([u8; 2]);

impl DeviceCode {
    /// Validate and build a device code. Exactly two ASCII uppercase letters.
    pub fn new(code: &str) -> ProtocolResult<DeviceCode> {
        match code.as_bytes() {
            [a, b] if a.is_ascii_uppercase() && b.is_ascii_uppercase() => Ok(DeviceCode([*a, *b])),
            _ => Err(ProtocolError::InvalidDeviceCode(code.to_string())),
        }
    }

    /// Get the code as it appears on the wire.
    pub fn as_str(&self) -> &str {
        // Only ASCII letters are ever stored.
        std::str::from_utf8(&self.0).unwrap_or("??")
    }
}

impl FromStr for DeviceCode {
    type Err = ProtocolError;

    fn from_str(s: &str) -> ProtocolResult<DeviceCode> {
        DeviceCode::new(s)
    }
}

impl fmt::Display for DeviceCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Commands that can be sent to the rig controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Liveness probe, answered with `PING_OK`.
    Ping,

    /// Force a relay on or off, overriding the onboard schedule.
    SetDevice {
        /// The relay to drive.
        code: DeviceCode,
        /// Target state.
        on: bool,
    },

    /// Hand every relay back to the onboard schedule.
    ResetSchedule,

    /// Set the controller's wall clock.
    SetTime {
        /// Hours (0-23).
        hour: u8,
        /// Minutes (0-59).
        minute: u8,
        /// Seconds (0-59).
        second: u8,
    },

    /// Request a `RELAYS:` snapshot.
    GetRelays,

    /// Request a `SENSORS:` snapshot.
    GetSensors,

    /// Request a legacy `STATE:` snapshot.
    GetState,
}

impl Command {
    /// Encode the command as a line to send to the controller.
    /// Returns the bytes to send (including the `\n` terminator).
    pub fn encode(&self) -> Vec<u8> {
        let cmd_str = self.to_command_string();
        LineCodec::encode_command(&cmd_str)
    }

    /// Get the command string without the terminator.
    pub fn to_command_string(&self) -> String {
        match self {
            Command::Ping => "PING".to_string(),
            Command::SetDevice { code, on } => {
                format!("{}:{}", code, if *on { "ON" } else { "OFF" })
            }
            Command::ResetSchedule => "RESET_SCHEDULE".to_string(),
            Command::SetTime { hour, minute, second } => {
                format!("SET_TIME:{:02}:{:02}:{:02}", hour, minute, second)
            }
            Command::GetRelays => "GET_RELAYS".to_string(),
            Command::GetSensors => "GET_SENSORS".to_string(),
            Command::GetState => "GET_STATE".to_string(),
        }
    }

    /// Parse a command line as the controller would.
    ///
    /// The host never needs this; it exists for scripted stand-ins of the
    /// controller.
    pub fn parse(line: &str) -> ProtocolResult<Command> {
        let line = line.trim();
        let invalid = || ProtocolError::InvalidCommand(line.to_string());

        match line {
            "PING" => return Ok(Command::Ping),
            "RESET_SCHEDULE" => return Ok(Command::ResetSchedule),
            "GET_RELAYS" => return Ok(Command::GetRelays),
            "GET_SENSORS" => return Ok(Command::GetSensors),
            "GET_STATE" => return Ok(Command::GetState),
            _ => {}
        }

        if let Some(time) = line.strip_prefix("SET_TIME:") {
            let parts: Vec<&str> = time.split(':').collect();
            if parts.len() != 3 {
                return Err(invalid());
            }
            let hour: u8 = parts[0].parse().map_err(|_| invalid())?;
            let minute: u8 = parts[1].parse().map_err(|_| invalid())?;
            let second: u8 = parts[2].parse().map_err(|_| invalid())?;
            if hour > 23 || minute > 59 || second > 59 {
                return Err(invalid());
            }
            return Ok(Command::SetTime { hour, minute, second });
        }

        let (code, state) = line.split_once(':').ok_or_else(invalid)?;
        let code = DeviceCode::new(code)?;
        match state {
            "ON" => Ok(Command::SetDevice { code, on: true }),
            "OFF" => Ok(Command::SetDevice { code, on: false }),
            _ => Err(invalid()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_ping() {
        assert_eq!(Command::Ping.encode(), b"PING\n");
    }

    #[test]
    fn test_encode_set_device() {
        let code = DeviceCode::new("LT").unwrap();
        assert_eq!(Command::SetDevice { code, on: true }.encode(), b"LT:ON\n");
        assert_eq!(Command::SetDevice { code, on: false }.encode(), b"LT:OFF\n");
    }

    #[test]
    fn test_encode_set_time_pads_fields() {
        let cmd = Command::SetTime { hour: 7, minute: 5, second: 9 };
        assert_eq!(cmd.encode(), b"SET_TIME:07:05:09\n");
    }

    #[test]
    fn test_encode_polls() {
        assert_eq!(Command::ResetSchedule.encode(), b"RESET_SCHEDULE\n");
        assert_eq!(Command::GetRelays.encode(), b"GET_RELAYS\n");
        assert_eq!(Command::GetSensors.encode(), b"GET_SENSORS\n");
        assert_eq!(Command::GetState.encode(), b"GET_STATE\n");
    }

    #[test]
    fn test_device_code_validation() {
        assert!(DeviceCode::new("DR").is_ok());
        assert!(DeviceCode::new("dr").is_err());
        assert!(DeviceCode::new("D").is_err());
        assert!(DeviceCode::new("DRX").is_err());
        assert!(DeviceCode::new("D1").is_err());
        assert_eq!("SB".parse::<DeviceCode>().unwrap().to_string(), "SB");
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("PING").unwrap(), Command::Ping);
        assert_eq!(
            Command::parse("PB:OFF\r").unwrap(),
            Command::SetDevice { code: DeviceCode::new("PB").unwrap(), on: false }
        );
        assert_eq!(
            Command::parse("SET_TIME:23:59:01").unwrap(),
            Command::SetTime { hour: 23, minute: 59, second: 1 }
        );
        assert!(Command::parse("SET_TIME:24:00:00").is_err());
        assert!(Command::parse("LT:MAYBE").is_err());
        assert!(Command::parse("REBOOT").is_err());
    }
}
