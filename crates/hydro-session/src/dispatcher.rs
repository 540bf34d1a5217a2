//! Command Dispatcher.
//!
//! Turns operator intents into wire commands. Actuator commands update the
//! model optimistically before the controller confirms; the next relay poll
//! reconciles.

use std::time::{Duration, Instant};

use chrono::{Local, Timelike};
use hydro_protocol::Command;
use tracing::info;

use crate::error::DispatchError;
use crate::session::{Delivery, SessionManager};

/// How long after `RESET_SCHEDULE` the relays are re-read.
pub const RESET_REPOLL_DELAY: Duration = Duration::from_secs(1);

/// Build a `SET_TIME` command for a wall-clock time.
pub fn set_time_command(time: impl Timelike) -> Command {
    Command::SetTime {
        hour: time.hour() as u8,
        minute: time.minute() as u8,
        // Leap seconds are reported as 60+; the controller only takes 0-59.
        second: time.second().min(59) as u8,
    }
}

/// Operator-facing command API over a session.
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    session: SessionManager,
}

impl CommandDispatcher {
    pub fn new(session: SessionManager) -> Self {
        CommandDispatcher { session }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Switch an actuator on or off.
    ///
    /// Unknown keys fail without touching the wire. Otherwise the model is
    /// updated first and the command sent if a line is online.
    pub fn set_actuator(&self, key: &str, on: bool) -> Result<Delivery, DispatchError> {
        let code = self
            .session
            .code_for(key)
            .ok_or_else(|| DispatchError::UnknownActuator(key.to_string()))?;

        self.session.apply_optimistic(key, on);
        let delivery = self.session.send(&Command::SetDevice { code, on });
        info!("Dispatcher: {} -> {} ({:?})", key, if on { "ON" } else { "OFF" }, delivery);
        Ok(delivery)
    }

    /// Flip an actuator from its current model value.
    pub fn toggle_actuator(&self, key: &str) -> Result<Delivery, DispatchError> {
        let on = self
            .session
            .actuator_on(key)
            .ok_or_else(|| DispatchError::UnknownActuator(key.to_string()))?;
        self.set_actuator(key, !on)
    }

    /// Drive every actuator to the same value.
    pub fn set_all(&self, on: bool) -> Delivery {
        self.session
            .actuator_keys()
            .iter()
            .filter_map(|key| self.set_actuator(key, on).ok())
            .fold(Delivery::Sent, Delivery::combine)
    }

    /// Hand relays back to the onboard schedule and re-read them shortly after.
    pub fn reset_schedule(&self) -> Delivery {
        let delivery = self.session.send(&Command::ResetSchedule);
        if delivery.is_sent() {
            self.session
                .request_relay_poll_after(RESET_REPOLL_DELAY, Instant::now());
        }
        delivery
    }

    /// Set the controller clock to the host's local time.
    pub fn sync_time(&self) -> Delivery {
        self.sync_time_to(Local::now().time())
    }

    pub fn sync_time_to(&self, time: impl Timelike) -> Delivery {
        self.session.send(&set_time_command(time))
    }

    /// Request a legacy combined snapshot.
    pub fn request_state(&self) -> Delivery {
        self.session.send(&Command::GetState)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveTime;

    use super::*;
    use crate::config::SessionConfig;
    use crate::observer::NullObserver;
    use crate::transport::MemoryConnector;

    fn dispatcher() -> CommandDispatcher {
        let session = SessionManager::new(
            SessionConfig::simulated(),
            Arc::new(MemoryConnector::new()),
            Arc::new(NullObserver),
        )
        .unwrap();
        CommandDispatcher::new(session)
    }

    #[test]
    fn test_set_time_command() {
        let time = NaiveTime::from_hms_opt(7, 5, 9).unwrap();
        assert_eq!(
            set_time_command(time),
            Command::SetTime { hour: 7, minute: 5, second: 9 }
        );
    }

    #[test]
    fn test_unknown_actuator() {
        let dispatcher = dispatcher();
        assert_eq!(
            dispatcher.set_actuator("fan", true),
            Err(DispatchError::UnknownActuator("fan".to_string()))
        );
        assert!(dispatcher.toggle_actuator("fan").is_err());
    }

    #[test]
    fn test_simulated_commands_update_model_only() {
        let dispatcher = dispatcher();
        assert_eq!(dispatcher.set_actuator("lights_top", true), Ok(Delivery::NotConnected));
        assert_eq!(dispatcher.session().actuator_on("lights_top"), Some(true));

        assert_eq!(dispatcher.toggle_actuator("lights_top"), Ok(Delivery::NotConnected));
        assert_eq!(dispatcher.session().actuator_on("lights_top"), Some(false));

        assert_eq!(dispatcher.set_all(true), Delivery::NotConnected);
        assert!(dispatcher.session().snapshot().actuators.iter().all(|a| a.on));

        assert_eq!(dispatcher.reset_schedule(), Delivery::NotConnected);
        assert_eq!(dispatcher.sync_time(), Delivery::NotConnected);
        assert_eq!(dispatcher.request_state(), Delivery::NotConnected);
    }
}
