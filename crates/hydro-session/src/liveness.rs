//! Link liveness.
//!
//! The session is only as alive as the last valid frame. When the line goes
//! quiet for longer than the liveness timeout a single `PING` probe is sent;
//! if nothing valid comes back before the probe times out, the line is
//! considered dead.

use std::fmt;
use std::time::{Duration, Instant};

/// Connection indicator shown to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LivenessStatus {
    /// No line has been opened yet, or the line is still settling.
    Unknown,
    /// Valid frames are arriving.
    Alive,
    /// The line is quiet and a probe is outstanding.
    Stale,
    /// No open line.
    Disconnected,
}

impl fmt::Display for LivenessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LivenessStatus::Unknown => "unknown",
            LivenessStatus::Alive => "alive",
            LivenessStatus::Stale => "stale",
            LivenessStatus::Disconnected => "disconnected",
        };
        f.write_str(s)
    }
}

/// Session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Disconnected,
    /// Line open, waiting out the settle delay.
    Connecting,
    Connected,
    /// Liveness timeout passed; a probe is outstanding.
    Degraded,
}

impl SessionState {
    /// Indicator value for this state.
    pub fn liveness(&self) -> LivenessStatus {
        match self {
            SessionState::Disconnected => LivenessStatus::Disconnected,
            SessionState::Connecting => LivenessStatus::Unknown,
            SessionState::Connected => LivenessStatus::Alive,
            SessionState::Degraded => LivenessStatus::Stale,
        }
    }

    /// Whether a line is open and past its settle delay.
    pub fn is_online(&self) -> bool {
        matches!(self, SessionState::Connected | SessionState::Degraded)
    }
}

/// Result of a liveness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessCheck {
    /// A valid frame arrived within the timeout.
    Healthy,
    /// Quiet for too long and no probe sent yet.
    Stale,
    /// Probe sent, still within its timeout.
    AwaitingProbe,
    /// Probe went unanswered.
    ProbeExpired,
}

/// Tracks time since the last valid frame and any outstanding probe.
#[derive(Debug, Clone)]
pub struct LivenessMonitor {
    timeout: Duration,
    probe_timeout: Duration,
    last_frame: Option<Instant>,
    probe_sent_at: Option<Instant>,
}

impl LivenessMonitor {
    pub fn new(timeout: Duration, probe_timeout: Duration) -> Self {
        LivenessMonitor {
            timeout,
            probe_timeout,
            last_frame: None,
            probe_sent_at: None,
        }
    }

    /// Start a fresh window at `now`, e.g. when a line finishes settling.
    pub fn reset(&mut self, now: Instant) {
        self.last_frame = Some(now);
        self.probe_sent_at = None;
    }

    /// A valid frame arrived. Clears any outstanding probe.
    pub fn record_frame(&mut self, now: Instant) {
        self.last_frame = Some(now);
        self.probe_sent_at = None;
    }

    pub fn probe_sent(&mut self, now: Instant) {
        self.probe_sent_at = Some(now);
    }

    pub fn check(&self, now: Instant) -> LivenessCheck {
        if let Some(sent) = self.probe_sent_at {
            return if now.saturating_duration_since(sent) >= self.probe_timeout {
                LivenessCheck::ProbeExpired
            } else {
                LivenessCheck::AwaitingProbe
            };
        }

        match self.last_frame {
            Some(last) if now.saturating_duration_since(last) <= self.timeout => {
                LivenessCheck::Healthy
            }
            _ => LivenessCheck::Stale,
        }
    }
}
