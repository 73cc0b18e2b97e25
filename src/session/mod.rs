//! Inactivity guard for a signed-in session.

mod activity;
mod monitor;

pub use activity::{ActivityTracker, SessionConfig, SessionEvent, SessionState};
pub use monitor::{spawn_monitor, SessionHandle, SessionTerminator};
