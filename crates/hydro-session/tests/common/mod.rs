#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use hydro_session::{
    ChannelObserver, LivenessStatus, MemoryConnector, MemoryDevice, SessionConfig, SessionEvent,
    SessionManager,
};

pub const PATH: &str = "/dev/ttyACM0";

pub fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

pub struct Rig {
    pub session: SessionManager,
    pub connector: Arc<MemoryConnector>,
    pub events: Receiver<SessionEvent>,
    pub start: Instant,
}

impl Rig {
    pub fn new(config: SessionConfig) -> Self {
        let connector = Arc::new(MemoryConnector::new());
        let (tx, events) = crossbeam_channel::unbounded();
        let session = SessionManager::new(
            config,
            connector.clone(),
            Arc::new(ChannelObserver::new(tx)),
        )
        .unwrap();
        Rig {
            session,
            connector,
            events,
            start: Instant::now(),
        }
    }

    /// Connect to an attached device and wait out the settle delay.
    ///
    /// Returns the device and the instant the session went online. Writes
    /// and events from the connect sequence are drained.
    pub fn online(config: SessionConfig) -> (Rig, MemoryDevice, Instant) {
        let settle = config.settle_delay();
        let rig = Rig::new(config);
        let device = rig.connector.attach(PATH);
        assert!(rig.session.connect(rig.start).unwrap());
        let online_at = rig.start + settle;
        rig.session.tick(online_at);
        device.take_received();
        rig.drain();
        (rig, device, online_at)
    }

    pub fn drain(&self) -> Vec<SessionEvent> {
        self.events.try_iter().collect()
    }

    pub fn statuses(&self) -> Vec<LivenessStatus> {
        self.drain()
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::ConnectionStatus(s) => Some(s),
                _ => None,
            })
            .collect()
    }
}

pub fn config() -> SessionConfig {
    SessionConfig::default().with_device_path(PATH)
}
