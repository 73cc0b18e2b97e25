use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use super::activity::{ActivityTracker, SessionConfig, SessionEvent, SessionState};
use crate::storage::{Store, INACTIVITY_WARNING_KEY};

/// Ends the session when the inactivity timeout fires.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionTerminator: Send + Sync {
    async fn terminate(&self);
}

/// Handle to a running inactivity monitor. Dropping it stops the monitor.
pub struct SessionHandle {
    activity: watch::Sender<Instant>,
    state: watch::Receiver<SessionState>,
    events: broadcast::Sender<SessionEvent>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Reports user interaction.
    pub fn touch(&self) {
        // the monitor only stops listening after expiry
        let _ = self.activity.send(Instant::now());
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Waits for the monitor to finish, which happens after expiry.
    pub async fn join(self) -> Result<(), tokio::task::JoinError> {
        let SessionHandle { activity, task, .. } = self;
        let result = task.await;
        drop(activity);
        result
    }

    pub fn stop(self) {
        self.task.abort();
    }
}

/// Starts watching for inactivity.
///
/// Instead of polling, the monitor sleeps until the next transition is due
/// and reschedules whenever activity arrives.
pub fn spawn_monitor(
    config: SessionConfig,
    terminator: Arc<dyn SessionTerminator>,
    store: Arc<dyn Store>,
) -> SessionHandle {
    let now = Instant::now();
    let (activity_tx, activity_rx) = watch::channel(now);
    let (state_tx, state_rx) = watch::channel(SessionState::Active);
    let (events_tx, _) = broadcast::channel(16);

    let monitor = Monitor {
        tracker: ActivityTracker::new(config, now),
        terminator,
        store,
        state: state_tx,
        events: events_tx.clone(),
    };
    let task = tokio::spawn(monitor.run(activity_rx));

    SessionHandle {
        activity: activity_tx,
        state: state_rx,
        events: events_tx,
        task,
    }
}

struct Monitor {
    tracker: ActivityTracker,
    terminator: Arc<dyn SessionTerminator>,
    store: Arc<dyn Store>,
    state: watch::Sender<SessionState>,
    events: broadcast::Sender<SessionEvent>,
}

impl Monitor {
    async fn run(mut self, mut activity: watch::Receiver<Instant>) {
        info!("Session monitor started");
        loop {
            let Some(deadline) = self.tracker.next_deadline() else {
                break;
            };

            tokio::select! {
                changed = activity.changed() => {
                    if changed.is_err() {
                        debug!("Session handle dropped, stopping monitor");
                        break;
                    }
                    let at = *activity.borrow_and_update();
                    if let Some(event) = self.tracker.record_activity(at) {
                        self.clear_warning_flag().await;
                        self.publish(event);
                    }
                }
                _ = sleep_until(deadline) => {
                    if let Some(event) = self.tracker.poll(Instant::now()) {
                        self.handle_transition(&event).await;
                        self.publish(event);
                    }
                }
            }
        }
        info!("Session monitor stopped");
    }

    async fn handle_transition(&self, event: &SessionEvent) {
        match event {
            SessionEvent::Warning { remaining } => {
                info!("Session idle, logging out in {:?}", remaining);
                if let Err(e) = self.store.set(INACTIVITY_WARNING_KEY, "true").await {
                    warn!("Could not persist inactivity warning: {}", e);
                }
            }
            SessionEvent::Expired => {
                info!("Session expired after inactivity, forcing logout");
                self.clear_warning_flag().await;
                self.terminator.terminate().await;
            }
            SessionEvent::Resumed => {}
        }
    }

    async fn clear_warning_flag(&self) {
        if let Err(e) = self.store.remove(INACTIVITY_WARNING_KEY).await {
            warn!("Could not clear inactivity warning: {}", e);
        }
    }

    fn publish(&self, event: SessionEvent) {
        self.state.send_replace(self.tracker.state());
        // no subscribers is fine
        let _ = self.events.send(event);
    }
}
