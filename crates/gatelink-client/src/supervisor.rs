//! Reconnection supervision.
//!
//! [`Supervisor`] is the pure state machine behind the client's lifecycle;
//! the driver feeds it lifecycle facts and arms timers from its answers.

use std::time::Duration;

use gatelink_core::config::ReconnectSettings;

/// Capped exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, multiplier: f64) -> Self {
        Self {
            initial,
            max: max.max(initial),
            multiplier: multiplier.max(1.0),
            current: initial,
        }
    }

    pub fn from_settings(settings: &ReconnectSettings) -> Self {
        Self::new(
            Duration::from_millis(settings.initial_delay_ms),
            Duration::from_millis(settings.max_delay_ms),
            settings.multiplier,
        )
    }

    /// Delay the next attempt will wait.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Take the current delay and grow it for the attempt after.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.mul_f64(self.multiplier).min(self.max);
        delay
    }

    /// Return to the initial delay.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from_settings(&ReconnectSettings::default())
    }
}

/// Lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Not running; nothing scheduled.
    Idle,
    /// A socket is open or opening and the handshake has not finished.
    Connecting,
    /// Handshake complete.
    Connected,
    /// Waiting out a backoff delay before the next attempt.
    WaitingToRetry,
}

/// Reconnection state machine.
#[derive(Debug, Clone)]
pub struct Supervisor {
    phase: Phase,
    backoff: Backoff,
    running: bool,
}

impl Supervisor {
    pub fn new(backoff: Backoff) -> Self {
        Self {
            phase: Phase::Idle,
            backoff,
            running: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// True between `connect` and `disconnect`.
    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Start supervising. Returns true when a socket should be opened now.
    ///
    /// Connecting while already connecting or connected does nothing; while
    /// waiting to retry it skips the rest of the delay.
    pub fn connect(&mut self) -> bool {
        self.running = true;
        match self.phase {
            Phase::Idle | Phase::WaitingToRetry => {
                self.phase = Phase::Connecting;
                true
            }
            Phase::Connecting | Phase::Connected => false,
        }
    }

    /// The handshake succeeded.
    pub fn handshake_succeeded(&mut self) {
        if self.phase == Phase::Connecting {
            self.phase = Phase::Connected;
            self.backoff.reset();
        }
    }

    /// The socket closed or the handshake failed. Returns the delay before
    /// the next attempt, or `None` when no retry should happen.
    pub fn connection_lost(&mut self) -> Option<Duration> {
        if !self.running {
            self.phase = Phase::Idle;
            return None;
        }
        match self.phase {
            Phase::Connecting | Phase::Connected => {
                self.phase = Phase::WaitingToRetry;
                Some(self.backoff.next_delay())
            }
            Phase::Idle | Phase::WaitingToRetry => None,
        }
    }

    /// The retry delay elapsed. Returns true when a socket should be opened.
    pub fn retry_elapsed(&mut self) -> bool {
        if self.phase == Phase::WaitingToRetry && self.running {
            self.phase = Phase::Connecting;
            true
        } else {
            false
        }
    }

    /// Stop supervising: no further attempts until `connect`.
    pub fn disconnect(&mut self) {
        self.running = false;
        self.phase = Phase::Idle;
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new(Backoff::default())
    }
}
