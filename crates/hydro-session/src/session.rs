//! Session Manager.
//!
//! Owns the serial line and drives it through
//! `Disconnected -> Connecting -> Connected <-> Degraded -> Disconnected`.
//!
//! The manager is clock-injected: [`SessionManager::tick`] advances the
//! state machine and [`SessionManager::pump`] drains the line, both at a
//! caller-supplied `Instant`. The worker threads in [`crate::workers`] call
//! them on a short sleep cycle; tests call them directly.
//!
//! Locking: the machine lock is taken before the connection lock, never the
//! other way round. The codec lock is never held together with either.
//! Observer callbacks run after every lock is released.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local, Utc};
use hydro_protocol::{Command, DeviceCode, Frame, LineCodec};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, trace, warn};

use crate::config::SessionConfig;
use crate::dispatcher::set_time_command;
use crate::error::{SessionResult, TransportError};
use crate::liveness::{LivenessCheck, LivenessMonitor, LivenessStatus, SessionState};
use crate::model::{DeviceSnapshot, DeviceStateModel, SensorReading};
use crate::observer::{SessionObserver, TelemetryRecord, TelemetrySink, TelemetrySource};
use crate::schedule::Periodic;
use crate::transport::{Connector, SerialConnector, Transport};

// ============================================================================
// Public Types
// ============================================================================

/// What happened on the wire for one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Written to the line.
    Sent,
    /// Nothing written: simulate mode, no open line, or still settling.
    NotConnected,
    /// The write failed and the session has gone Disconnected.
    Failed,
}

impl Delivery {
    /// Merge the outcomes of several commands. A failure outranks a skipped
    /// write, which outranks success.
    pub fn combine(self, other: Delivery) -> Delivery {
        match (self, other) {
            (Delivery::Failed, _) | (_, Delivery::Failed) => Delivery::Failed,
            (Delivery::NotConnected, _) | (_, Delivery::NotConnected) => Delivery::NotConnected,
            _ => Delivery::Sent,
        }
    }

    pub fn is_sent(&self) -> bool {
        matches!(self, Delivery::Sent)
    }
}

/// Identity of the open line.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionInfo {
    pub path: String,
    pub baud_rate: u32,
    pub opened_at: DateTime<Utc>,
    pub is_open: bool,
    /// Last successful read or write.
    pub last_activity: Option<Instant>,
}

// ============================================================================
// Internal State
// ============================================================================

struct Connection {
    path: String,
    baud_rate: u32,
    opened_at: DateTime<Utc>,
    last_activity: Option<Instant>,
    transport: Box<dyn Transport>,
}

struct Machine {
    state: SessionState,
    /// Last status reported to the observer.
    status: LivenessStatus,
    settle_until: Option<Instant>,
    liveness: LivenessMonitor,
    relay_poll: Periodic,
    sensor_poll: Periodic,
    next_connect_at: Option<Instant>,
    /// Set by `close`; cleared by `connect` and `request_reconnect`.
    reconnect_suspended: bool,
}

/// Observer work collected under the locks and delivered after.
enum Notice {
    Status(LivenessStatus),
    Actuator(String, bool),
    Sensors(SensorReading),
    ProtocolError(String),
    Telemetry(TelemetryRecord),
}

struct Shared {
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    observer: Arc<dyn SessionObserver>,
    telemetry: Mutex<Option<Arc<dyn TelemetrySink>>>,
    machine: Mutex<Machine>,
    connection: Mutex<Option<Connection>>,
    model: RwLock<DeviceStateModel>,
    codec: Mutex<LineCodec>,
    stop: AtomicBool,
}

// ============================================================================
// Session Manager
// ============================================================================

/// Handle to a session. Clones share the same line and state.
#[derive(Clone)]
pub struct SessionManager {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("state", &self.state())
            .field("connection", &self.connection_info())
            .finish()
    }
}

impl SessionManager {
    /// Create a session. No line is opened until [`connect`](Self::connect).
    pub fn new(
        config: SessionConfig,
        connector: Arc<dyn Connector>,
        observer: Arc<dyn SessionObserver>,
    ) -> SessionResult<Self> {
        config.validate()?;
        let model = DeviceStateModel::new(&config.actuators)?;

        let machine = Machine {
            state: SessionState::Disconnected,
            status: LivenessStatus::Unknown,
            settle_until: None,
            liveness: LivenessMonitor::new(config.liveness_timeout(), config.ping_timeout()),
            relay_poll: Periodic::new(config.relay_poll_interval()),
            sensor_poll: Periodic::new(config.sensor_poll_interval()),
            next_connect_at: None,
            reconnect_suspended: false,
        };

        Ok(SessionManager {
            shared: Arc::new(Shared {
                codec: Mutex::new(LineCodec::with_max_line_length(config.max_line_length)),
                config,
                connector,
                observer,
                telemetry: Mutex::new(None),
                machine: Mutex::new(machine),
                connection: Mutex::new(None),
                model: RwLock::new(model),
                stop: AtomicBool::new(false),
            }),
        })
    }

    /// Create a session over real serial ports.
    pub fn with_serial(config: SessionConfig, observer: Arc<dyn SessionObserver>) -> SessionResult<Self> {
        Self::new(config, Arc::new(SerialConnector), observer)
    }

    /// Install the sink that receives accepted sensor frames.
    pub fn set_telemetry_sink(&self, sink: Arc<dyn TelemetrySink>) {
        *self.shared.telemetry.lock() = Some(sink);
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    // ========================================================================
    // Connection Lifecycle
    // ========================================================================

    /// Open the line if none is open.
    ///
    /// Tries the configured path or each candidate in order; the first that
    /// opens wins. Returns `Ok(false)` in simulate mode, where hardware is
    /// never touched. On failure the session stays Disconnected and, with
    /// auto-reconnect on, a retry is scheduled one reconnect interval out.
    pub fn connect(&self, now: Instant) -> Result<bool, TransportError> {
        let mut notices = Vec::new();
        let result = {
            let mut machine = self.shared.machine.lock();
            machine.reconnect_suspended = false;
            self.connect_locked(&mut machine, now, &mut notices)
        };
        self.emit(notices);
        result
    }

    /// Drop any open line and connect again right away.
    pub fn request_reconnect(&self, now: Instant) -> Result<bool, TransportError> {
        let mut notices = Vec::new();
        let result = {
            let mut machine = self.shared.machine.lock();
            machine.reconnect_suspended = false;
            if machine.state != SessionState::Disconnected {
                self.disconnect_locked(&mut machine, "reconnect requested", now, &mut notices);
            }
            self.connect_locked(&mut machine, now, &mut notices)
        };
        self.emit(notices);
        result
    }

    /// Close the line and stop reconnecting until `connect` is called.
    pub fn close(&self) {
        let mut notices = Vec::new();
        {
            let mut machine = self.shared.machine.lock();
            machine.reconnect_suspended = true;
            machine.next_connect_at = None;
            if machine.state != SessionState::Disconnected {
                self.disconnect_locked(&mut machine, "closed", Instant::now(), &mut notices);
            }
        }
        self.emit(notices);
    }

    /// Ask the workers to exit and close the line.
    pub fn shutdown(&self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        self.close();
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stop.load(Ordering::SeqCst)
    }

    fn connect_locked(
        &self,
        machine: &mut Machine,
        now: Instant,
        notices: &mut Vec<Notice>,
    ) -> Result<bool, TransportError> {
        let config = &self.shared.config;

        if config.simulate {
            debug!("Session: simulate mode, not opening hardware");
            machine.next_connect_at = None;
            self.sync_status(machine, notices);
            return Ok(false);
        }

        if machine.state != SessionState::Disconnected {
            return Ok(true);
        }

        let mut last_error = None;
        for path in config.connect_paths() {
            match self
                .shared
                .connector
                .open(&path, config.baud_rate, config.open_timeout())
            {
                Ok(transport) => {
                    info!("Session[{}]: opened at {} baud", path, config.baud_rate);
                    self.shared.codec.lock().clear();
                    *self.shared.connection.lock() = Some(Connection {
                        path,
                        baud_rate: config.baud_rate,
                        opened_at: Utc::now(),
                        last_activity: None,
                        transport,
                    });
                    machine.state = SessionState::Connecting;
                    machine.settle_until = Some(now + config.settle_delay());
                    machine.next_connect_at = None;
                    self.sync_status(machine, notices);
                    return Ok(true);
                }
                Err(e) => {
                    debug!("Session[{}]: open failed: {}", path, e);
                    last_error = Some(e);
                }
            }
        }

        machine.next_connect_at = if config.auto_reconnect && !machine.reconnect_suspended {
            Some(now + config.reconnect_interval())
        } else {
            None
        };
        self.sync_status(machine, notices);

        let error = last_error.unwrap_or_else(|| TransportError::NotFound("no device path".to_string()));
        warn!("Session: no controller found: {}", error);
        Err(error)
    }

    fn disconnect_locked(
        &self,
        machine: &mut Machine,
        reason: &str,
        now: Instant,
        notices: &mut Vec<Notice>,
    ) {
        if let Some(mut connection) = self.shared.connection.lock().take() {
            warn!("Session[{}]: disconnected: {}", connection.path, reason);
            connection.transport.close();
        }
        self.shared.codec.lock().clear();

        machine.state = SessionState::Disconnected;
        machine.settle_until = None;
        machine.relay_poll.stop();
        machine.sensor_poll.stop();

        let config = &self.shared.config;
        machine.next_connect_at = if config.auto_reconnect && !machine.reconnect_suspended {
            Some(now + config.reconnect_interval())
        } else {
            None
        };
        self.sync_status(machine, notices);
    }

    fn go_online(&self, machine: &mut Machine, now: Instant, notices: &mut Vec<Notice>) {
        let config = &self.shared.config;
        info!("Session: connected");

        machine.state = SessionState::Connected;
        machine.settle_until = None;
        machine.liveness.reset(now);
        self.sync_status(machine, notices);

        if config.sync_time_on_connect {
            let command = set_time_command(Local::now().time());
            self.write_locked(machine, &command, now, notices);
        }

        // First polls go out on this tick.
        machine.relay_poll.start_at(now);
        if !config.legacy_state_poll {
            machine.sensor_poll.start_at(now);
        }
    }

    // ========================================================================
    // Periodic Work
    // ========================================================================

    /// Advance the state machine: reconnect when due, finish settling,
    /// check liveness and send due polls.
    pub fn tick(&self, now: Instant) {
        if self.is_stopped() {
            return;
        }

        let mut notices = Vec::new();
        {
            let mut machine = self.shared.machine.lock();
            self.tick_locked(&mut machine, now, &mut notices);
        }
        self.emit(notices);
    }

    fn tick_locked(&self, machine: &mut Machine, now: Instant, notices: &mut Vec<Notice>) {
        if machine.state == SessionState::Disconnected {
            match machine.next_connect_at {
                Some(at) if now >= at => {
                    debug!("Session: reconnect attempt");
                    // Failure reschedules itself.
                    let _ = self.connect_locked(machine, now, notices);
                }
                _ => {}
            }
        }

        if machine.state == SessionState::Connecting {
            match machine.settle_until {
                Some(until) if now >= until => self.go_online(machine, now, notices),
                _ => return,
            }
        }

        if !machine.state.is_online() {
            return;
        }

        match machine.liveness.check(now) {
            LivenessCheck::Healthy | LivenessCheck::AwaitingProbe => {}
            LivenessCheck::Stale => {
                if machine.state == SessionState::Connected {
                    info!("Session: no valid frame within liveness timeout, probing");
                    machine.state = SessionState::Degraded;
                    self.sync_status(machine, notices);
                }
                if self.write_locked(machine, &Command::Ping, now, notices).is_sent() {
                    machine.liveness.probe_sent(now);
                }
            }
            LivenessCheck::ProbeExpired => {
                self.disconnect_locked(machine, "ping probe timed out", now, notices);
                return;
            }
        }

        if !machine.state.is_online() {
            return;
        }

        if machine.relay_poll.fire(now) {
            let poll = if self.shared.config.legacy_state_poll {
                Command::GetState
            } else {
                Command::GetRelays
            };
            self.write_locked(machine, &poll, now, notices);
        }

        if machine.state.is_online() && machine.sensor_poll.fire(now) {
            self.write_locked(machine, &Command::GetSensors, now, notices);
        }
    }

    /// Pull the next relay poll forward to `now + delay`.
    pub fn request_relay_poll_after(&self, delay: Duration, now: Instant) {
        self.shared.machine.lock().relay_poll.schedule_at(now + delay);
    }

    // ========================================================================
    // Wire I/O
    // ========================================================================

    /// Send a command if the line is online.
    pub fn send(&self, command: &Command) -> Delivery {
        let now = Instant::now();
        let mut notices = Vec::new();
        let delivery = {
            let mut machine = self.shared.machine.lock();
            self.write_locked(&mut machine, command, now, &mut notices)
        };
        self.emit(notices);
        delivery
    }

    fn write_locked(
        &self,
        machine: &mut Machine,
        command: &Command,
        now: Instant,
        notices: &mut Vec<Notice>,
    ) -> Delivery {
        if !machine.state.is_online() {
            debug!("Session: not connected, dropping {}", command.to_command_string());
            return Delivery::NotConnected;
        }

        let bytes = command.encode();
        let result = {
            let mut connection = self.shared.connection.lock();
            let Some(connection) = connection.as_mut() else {
                return Delivery::NotConnected;
            };
            trace!("Session[{}]: >> {}", connection.path, command.to_command_string());
            let result = connection.transport.write_all(&bytes);
            if result.is_ok() {
                connection.last_activity = Some(now);
            }
            result
        };

        match result {
            Ok(()) => Delivery::Sent,
            Err(e) => {
                let reason = format!("write failed: {}", e);
                self.disconnect_locked(machine, &reason, now, notices);
                Delivery::Failed
            }
        }
    }

    /// Drain the line, decode every complete line and apply valid frames.
    ///
    /// Returns the number of valid frames processed.
    pub fn pump(&self, now: Instant) -> usize {
        if self.is_stopped() {
            return 0;
        }

        let read = {
            let mut connection = self.shared.connection.lock();
            let Some(connection) = connection.as_mut() else {
                return 0;
            };
            let read = connection.transport.read_available();
            if matches!(&read, Ok(bytes) if !bytes.is_empty()) {
                connection.last_activity = Some(now);
            }
            read
        };

        let mut notices = Vec::new();
        let bytes = match read {
            Ok(bytes) => bytes,
            Err(e) => {
                {
                    let mut machine = self.shared.machine.lock();
                    let reason = format!("read failed: {}", e);
                    self.disconnect_locked(&mut machine, &reason, now, &mut notices);
                }
                self.emit(notices);
                return 0;
            }
        };
        if bytes.is_empty() {
            return 0;
        }

        let (lines, overflow) = {
            let mut codec = self.shared.codec.lock();
            let overflow = codec.push(&bytes).err();
            let lines: Vec<String> = codec.lines().collect();
            (lines, overflow)
        };

        let mut frames = 0;
        for line in lines {
            trace!("Session: << {}", line);
            match Frame::parse(&line) {
                Ok(Frame::Unknown(_)) => {}
                Ok(frame) => {
                    frames += 1;
                    self.handle_frame(&line, &frame, now, &mut notices);
                }
                Err(e) => {
                    warn!("Session: discarding {:?}: {}", line, e);
                    notices.push(Notice::ProtocolError(format!("{} in {:?}", e, line)));
                }
            }
        }

        if let Some(e) = overflow {
            warn!("Session: {}", e);
            notices.push(Notice::ProtocolError(e.to_string()));
        }

        self.emit(notices);
        frames
    }

    fn handle_frame(&self, line: &str, frame: &Frame, now: Instant, notices: &mut Vec<Notice>) {
        {
            let mut machine = self.shared.machine.lock();
            if machine.state.is_online() {
                machine.liveness.record_frame(now);
                if machine.state == SessionState::Degraded {
                    info!("Session: {} received, link recovered", frame.kind());
                    machine.state = SessionState::Connected;
                    self.sync_status(&mut machine, notices);
                }
            }
        }

        let received_at = Utc::now();
        let (update, sensors) = {
            let mut model = self.shared.model.write();
            let update = model.apply(frame, received_at);
            (update, *model.sensors())
        };

        for (key, on) in update.changed {
            debug!("Session: {} reported {}", key, if on { "ON" } else { "OFF" });
            notices.push(Notice::Actuator(key, on));
        }

        if update.sensors_updated {
            notices.push(Notice::Sensors(sensors));
            let source = match frame {
                Frame::Sensors(_) => Some(TelemetrySource::Sensors),
                Frame::LegacyState(_) => Some(TelemetrySource::LegacyState),
                _ => None,
            };
            if let Some(source) = source {
                notices.push(Notice::Telemetry(TelemetryRecord {
                    received_at,
                    source,
                    line: line.to_string(),
                    sensors,
                }));
            }
        }
    }

    // ========================================================================
    // Model Access
    // ========================================================================

    /// Record a commanded actuator value ahead of confirmation.
    ///
    /// Returns `None` for an unknown key.
    pub fn apply_optimistic(&self, key: &str, on: bool) -> Option<bool> {
        let changed = self.shared.model.write().set_optimistic(key, on, Utc::now())?;
        if changed {
            self.shared.observer.on_actuator_changed(key, on);
        }
        Some(changed)
    }

    pub fn code_for(&self, key: &str) -> Option<DeviceCode> {
        self.shared.model.read().code_for(key)
    }

    /// Current value of an actuator.
    pub fn actuator_on(&self, key: &str) -> Option<bool> {
        self.shared.model.read().actuator(key).map(|a| a.on)
    }

    /// Keys of every actuator, in table order.
    pub fn actuator_keys(&self) -> Vec<String> {
        self.shared
            .model
            .read()
            .actuators()
            .iter()
            .map(|a| a.key.clone())
            .collect()
    }

    pub fn snapshot(&self) -> DeviceSnapshot {
        self.shared.model.read().snapshot()
    }

    pub fn sensors(&self) -> SensorReading {
        *self.shared.model.read().sensors()
    }

    pub fn state(&self) -> SessionState {
        self.shared.machine.lock().state
    }

    /// Last connection status reported to the observer.
    pub fn liveness(&self) -> LivenessStatus {
        self.shared.machine.lock().status
    }

    pub fn connection_info(&self) -> Option<ConnectionInfo> {
        self.shared.connection.lock().as_ref().map(|c| ConnectionInfo {
            path: c.path.clone(),
            baud_rate: c.baud_rate,
            opened_at: c.opened_at,
            is_open: c.transport.is_open(),
            last_activity: c.last_activity,
        })
    }

    /// When the next automatic reconnect attempt is due, if any.
    pub fn next_reconnect_at(&self) -> Option<Instant> {
        self.shared.machine.lock().next_connect_at
    }

    // ========================================================================
    // Notifications
    // ========================================================================

    /// Bring the reported indicator in line with the state machine.
    fn sync_status(&self, machine: &mut Machine, notices: &mut Vec<Notice>) {
        let status = machine.state.liveness();
        if machine.status != status {
            debug!("Session: status {} -> {}", machine.status, status);
            machine.status = status;
            notices.push(Notice::Status(status));
        }
    }

    fn emit(&self, notices: Vec<Notice>) {
        let observer = &self.shared.observer;
        for notice in notices {
            match notice {
                Notice::Status(status) => observer.on_connection_status(status),
                Notice::Actuator(key, on) => observer.on_actuator_changed(&key, on),
                Notice::Sensors(sensors) => observer.on_sensor_updated(&sensors),
                Notice::ProtocolError(message) => observer.on_protocol_error(&message),
                Notice::Telemetry(record) => {
                    let sink = self.shared.telemetry.lock().clone();
                    if let Some(sink) = sink {
                        sink.record(&record);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::NullObserver;
    use crate::transport::MemoryConnector;

    #[test]
    fn test_delivery_combine() {
        use Delivery::*;
        assert_eq!(Sent.combine(Sent), Sent);
        assert_eq!(Sent.combine(NotConnected), NotConnected);
        assert_eq!(NotConnected.combine(Failed), Failed);
        assert_eq!(Failed.combine(Sent), Failed);
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = SessionConfig::default();
        config.tick_interval_ms = 0;
        let result = SessionManager::new(config, Arc::new(MemoryConnector::new()), Arc::new(NullObserver));
        assert!(result.is_err());
    }

    #[test]
    fn test_starts_disconnected() {
        let session = SessionManager::new(
            SessionConfig::default(),
            Arc::new(MemoryConnector::new()),
            Arc::new(NullObserver),
        )
        .unwrap();
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(session.liveness(), LivenessStatus::Unknown);
        assert!(session.connection_info().is_none());
        assert_eq!(session.send(&Command::Ping), Delivery::NotConnected);
        assert_eq!(session.pump(Instant::now()), 0);
    }
}
