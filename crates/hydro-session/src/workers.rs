//! Background workers driving a session.
//!
//! Two threads share one [`SessionManager`]:
//! - the reader drains the line and decodes frames
//! - the poller attempts the first connection, then ticks the state machine
//!   (liveness, polls, reconnects)
//!
//! Both observe a stop flag once per cycle and are joined on stop, never
//! killed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tracing::{debug, warn};

use crate::session::SessionManager;

/// Handle to the running workers.
pub struct SessionWorkers {
    session: SessionManager,
    stop_flag: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
    poller: Option<JoinHandle<()>>,
}

impl SessionWorkers {
    /// Start the reader and poller threads.
    pub fn spawn(session: SessionManager) -> Self {
        let stop_flag = Arc::new(AtomicBool::new(false));

        let reader = {
            let session = session.clone();
            let stop_flag = Arc::clone(&stop_flag);
            let interval = session.config().read_poll_interval();
            thread::Builder::new()
                .name("hydro-reader".to_string())
                .spawn(move || {
                    while !should_stop(&stop_flag, &session) {
                        session.pump(Instant::now());
                        thread::sleep(interval);
                    }
                    debug!("Session: reader exiting");
                })
                .expect("Failed to spawn reader thread")
        };

        let poller = {
            let session = session.clone();
            let stop_flag = Arc::clone(&stop_flag);
            let interval = session.config().tick_interval();
            thread::Builder::new()
                .name("hydro-poller".to_string())
                .spawn(move || {
                    if let Err(e) = session.connect(Instant::now()) {
                        warn!("Session: initial connect failed: {}", e);
                    }
                    while !should_stop(&stop_flag, &session) {
                        session.tick(Instant::now());
                        thread::sleep(interval);
                    }
                    debug!("Session: poller exiting");
                })
                .expect("Failed to spawn poller thread")
        };

        SessionWorkers {
            session,
            stop_flag,
            reader: Some(reader),
            poller: Some(poller),
        }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn is_running(&self) -> bool {
        self.reader.is_some() || self.poller.is_some()
    }

    /// Stop both threads and wait for them. The session stays usable.
    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        for handle in [self.reader.take(), self.poller.take()].into_iter().flatten() {
            if handle.join().is_err() {
                warn!("Session: worker thread panicked");
            }
        }
    }
}

impl Drop for SessionWorkers {
    fn drop(&mut self) {
        self.stop();
    }
}

fn should_stop(stop_flag: &AtomicBool, session: &SessionManager) -> bool {
    stop_flag.load(Ordering::SeqCst) || session.is_stopped()
}
