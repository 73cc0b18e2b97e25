use std::time::Duration;

use tokio::time::Instant;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub warning_after: Duration,
    pub timeout_after: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            warning_after: Duration::from_secs(25 * 60),
            timeout_after: Duration::from_secs(30 * 60),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.warning_after >= self.timeout_after {
            return Err(AppError::ValidationError(format!(
                "warning threshold {:?} must be below timeout {:?}",
                self.warning_after, self.timeout_after
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    WarningShown,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Idle long enough to warn; the session ends after `remaining`.
    Warning { remaining: Duration },
    /// Activity arrived while the warning was up.
    Resumed,
    /// Timed out. The user has been logged out.
    Expired,
}

/// Inactivity state machine: `Active -> WarningShown -> Expired`.
///
/// Activity returns the tracker to `Active` unless it already expired.
#[derive(Debug)]
pub struct ActivityTracker {
    config: SessionConfig,
    last_activity: Instant,
    state: SessionState,
}

impl ActivityTracker {
    pub fn new(config: SessionConfig, now: Instant) -> Self {
        Self {
            config,
            last_activity: now,
            state: SessionState::Active,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn idle(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }

    pub fn record_activity(&mut self, now: Instant) -> Option<SessionEvent> {
        match self.state {
            SessionState::Expired => None,
            // activity stamps can arrive out of order through the channel
            _ if now <= self.last_activity => None,
            previous => {
                self.last_activity = now;
                self.state = SessionState::Active;
                (previous == SessionState::WarningShown).then_some(SessionEvent::Resumed)
            }
        }
    }

    pub fn poll(&mut self, now: Instant) -> Option<SessionEvent> {
        let idle = self.idle(now);
        match self.state {
            SessionState::Expired => None,
            _ if idle >= self.config.timeout_after => {
                self.state = SessionState::Expired;
                Some(SessionEvent::Expired)
            }
            SessionState::Active if idle >= self.config.warning_after => {
                self.state = SessionState::WarningShown;
                Some(SessionEvent::Warning {
                    remaining: self.config.timeout_after - idle,
                })
            }
            _ => None,
        }
    }

    /// When the next transition is due, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.state {
            SessionState::Active => Some(self.last_activity + self.config.warning_after),
            SessionState::WarningShown => Some(self.last_activity + self.config.timeout_after),
            SessionState::Expired => None,
        }
    }

    /// Starts over after a new login.
    pub fn reset(&mut self, now: Instant) {
        self.last_activity = now;
        self.state = SessionState::Active;
    }
}
