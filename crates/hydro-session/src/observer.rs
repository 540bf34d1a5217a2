//! Hooks for the presentation layer and telemetry persistence.
//!
//! Callbacks are invoked from the session's worker threads with no session
//! locks held, so an observer may call back into the session.

use chrono::{DateTime, Utc};
use crossbeam_channel::Sender;

use crate::liveness::LivenessStatus;
use crate::model::SensorReading;

/// Receives session notifications. Every method defaults to a no-op.
pub trait SessionObserver: Send + Sync {
    /// The connection indicator changed.
    fn on_connection_status(&self, _status: LivenessStatus) {}

    /// An actuator's value changed, whether by report or by command.
    fn on_actuator_changed(&self, _key: &str, _on: bool) {}

    /// A sensor-bearing frame was accepted.
    fn on_sensor_updated(&self, _sensors: &SensorReading) {}

    /// A line failed to decode and was discarded.
    fn on_protocol_error(&self, _message: &str) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl SessionObserver for NullObserver {}

/// Observer callbacks as values.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    ConnectionStatus(LivenessStatus),
    ActuatorChanged { key: String, on: bool },
    SensorUpdated(SensorReading),
    ProtocolError(String),
}

/// Forwards callbacks over a channel, for UIs that prefer message passing.
///
/// Events are dropped once the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: Sender<SessionEvent>,
}

impl ChannelObserver {
    pub fn new(tx: Sender<SessionEvent>) -> Self {
        ChannelObserver { tx }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }
}

impl SessionObserver for ChannelObserver {
    fn on_connection_status(&self, status: LivenessStatus) {
        self.emit(SessionEvent::ConnectionStatus(status));
    }

    fn on_actuator_changed(&self, key: &str, on: bool) {
        self.emit(SessionEvent::ActuatorChanged {
            key: key.to_string(),
            on,
        });
    }

    fn on_sensor_updated(&self, sensors: &SensorReading) {
        self.emit(SessionEvent::SensorUpdated(*sensors));
    }

    fn on_protocol_error(&self, message: &str) {
        self.emit(SessionEvent::ProtocolError(message.to_string()));
    }
}

/// Which frame a telemetry record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetrySource {
    Sensors,
    LegacyState,
}

/// One accepted sensor-bearing frame.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    pub received_at: DateTime<Utc>,
    pub source: TelemetrySource,
    /// The line as received, without terminator.
    pub line: String,
    /// Sensor state after the frame was applied.
    pub sensors: SensorReading,
}

/// Destination for telemetry records. Storage is up to the implementor.
pub trait TelemetrySink: Send + Sync {
    fn record(&self, record: &TelemetryRecord);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_observer_forwards() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let observer = ChannelObserver::new(tx);

        observer.on_connection_status(LivenessStatus::Alive);
        observer.on_actuator_changed("drain", true);
        observer.on_protocol_error("bad frame");

        let events: Vec<SessionEvent> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                SessionEvent::ConnectionStatus(LivenessStatus::Alive),
                SessionEvent::ActuatorChanged { key: "drain".to_string(), on: true },
                SessionEvent::ProtocolError("bad frame".to_string()),
            ]
        );
    }

    #[test]
    fn test_channel_observer_survives_dropped_receiver() {
        let (tx, rx) = crossbeam_channel::unbounded();
        drop(rx);
        let observer = ChannelObserver::new(tx);
        observer.on_sensor_updated(&SensorReading::default());
    }
}
