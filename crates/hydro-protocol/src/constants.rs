//! Wire constants shared by the command encoder and the frame decoder.

/// Line terminator used in both directions.
pub const LINE_TERMINATOR: u8 = b'\n';

/// Default ceiling for a partial line before it is discarded as noise.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 256;

// ============================================================================
// Inbound Frame Prefixes
// ============================================================================

/// Reply to a `PING` command.
pub const PING_ACK: &str = "PING_OK";

/// Prefix of a relay snapshot frame.
pub const RELAYS_PREFIX: &str = "RELAYS:";

/// Prefix of a sensor snapshot frame.
pub const SENSORS_PREFIX: &str = "SENSORS:";

/// Prefix of a legacy combined state frame.
pub const STATE_PREFIX: &str = "STATE:";

// ============================================================================
// Field Counts
// ============================================================================

/// Number of relay flags in `RELAYS:` and at the head of `STATE:`.
pub const RELAY_FIELD_COUNT: usize = 7;

/// Number of values in a `SENSORS:` frame.
pub const SENSOR_FIELD_COUNT: usize = 6;

/// Number of values in a short (single pH/EC probe) `STATE:` frame.
pub const LEGACY_SHORT_FIELD_COUNT: usize = 13;

/// Number of values in an extended (split pH/EC, float switches) `STATE:` frame.
pub const LEGACY_EXTENDED_FIELD_COUNT: usize = 17;

/// Value the firmware reports for a sensor that is missing or failed to read.
pub const SENSOR_SENTINEL: f64 = -1.0;

/// The sentinel as it appears in a float switch field.
pub const SENSOR_SENTINEL_FIELD: &str = "-1";

/// Logical relay keys in the positional order used by relay flags on the wire.
pub const RELAY_KEYS: [&str; RELAY_FIELD_COUNT] = [
    "lights_top",
    "lights_bottom",
    "pump_top",
    "pump_bottom",
    "sensor_pump_top",
    "sensor_pump_bottom",
    "drain",
];

/// Two-letter device codes the stock firmware assigns to [`RELAY_KEYS`], same order.
pub const RELAY_CODES: [&str; RELAY_FIELD_COUNT] = ["LT", "LB", "PT", "PB", "ST", "SB", "DR"];
