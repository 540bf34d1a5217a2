//! Serial session layer for the hydroponics rig controller.
//!
//! This crate keeps a live, self-healing link to the rig's microcontroller
//! and mirrors its relays and sensors:
//!
//! - [`transport`]: opening serial lines (real or in-memory)
//! - [`SessionManager`]: connect, settle, poll, probe and reconnect
//! - [`DeviceStateModel`]: the mirrored relay and sensor state
//! - [`CommandDispatcher`]: operator commands with optimistic updates
//! - [`SessionWorkers`]: the reader and poller threads
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use hydro_session::{CommandDispatcher, NullObserver, SessionConfig, SessionManager, SessionWorkers};
//!
//! let config = SessionConfig::from_yaml_file("rig.yaml")?;
//! let session = SessionManager::with_serial(config, Arc::new(NullObserver))?;
//! let workers = SessionWorkers::spawn(session.clone());
//!
//! let dispatcher = CommandDispatcher::new(session);
//! dispatcher.set_actuator("lights_top", true)?;
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod liveness;
pub mod logging;
pub mod model;
pub mod observer;
pub mod schedule;
pub mod session;
pub mod transport;
pub mod workers;

pub use config::{ActuatorSpec, SessionConfig};
pub use dispatcher::{set_time_command, CommandDispatcher};
pub use error::{ConfigError, DispatchError, SessionError, SessionResult, TransportError};
pub use liveness::{LivenessStatus, SessionState};
pub use model::{ActuatorState, DeviceSnapshot, DeviceStateModel, Reading, Sample, SensorReading};
pub use observer::{
    ChannelObserver, NullObserver, SessionEvent, SessionObserver, TelemetryRecord, TelemetrySink,
    TelemetrySource,
};
pub use session::{ConnectionInfo, Delivery, SessionManager};
pub use transport::{
    Connector, MemoryConnector, MemoryDevice, SerialConnector, Transport,
};
pub use workers::SessionWorkers;

pub use hydro_protocol as protocol;
