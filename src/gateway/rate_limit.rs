use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use crate::error::ApiError;

/// What happens to a call issued while the window is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowMode {
    /// Wait until the window has room, in arrival order.
    Queue,
    /// Fail immediately with [`ApiError::RateLimited`].
    Reject,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub max_requests: u32,
    pub mode: OverflowMode,
    pub max_queued: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            max_requests: 60,
            mode: OverflowMode::Queue,
            max_queued: 100,
        }
    }
}

/// Snapshot of the limiter, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitState {
    pub in_window: usize,
    pub queued: usize,
    pub limited: bool,
}

#[derive(Debug)]
struct RequestWindow {
    timestamps: VecDeque<Instant>,
}

impl RequestWindow {
    fn new() -> Self {
        Self {
            timestamps: VecDeque::new(),
        }
    }

    fn cleanup_old_requests(&mut self, now: Instant, window: Duration) {
        while let Some(oldest) = self.timestamps.front() {
            if now.duration_since(*oldest) >= window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    fn add_request(&mut self, now: Instant) {
        self.timestamps.push_back(now);
    }

    fn request_count(&self) -> usize {
        self.timestamps.len()
    }

    fn opens_at(&self, window: Duration) -> Option<Instant> {
        self.timestamps.front().map(|oldest| *oldest + window)
    }
}

/// Decrements the queued counter when a waiting caller leaves, whether it
/// was admitted or its future was dropped.
struct QueueSlot<'a>(&'a AtomicUsize);

impl Drop for QueueSlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Sliding-window limiter for outgoing requests.
///
/// At most `max_requests` admissions happen within any trailing `window`.
pub struct RateLimiter {
    window: Mutex<RequestWindow>,
    // tokio's Mutex is fair, so holding it while waiting keeps queued callers FIFO
    turnstile: Mutex<()>,
    queued: AtomicUsize,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            window: Mutex::new(RequestWindow::new()),
            turnstile: Mutex::new(()),
            queued: AtomicUsize::new(0),
            config,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Admits one request, waiting or failing according to the overflow mode.
    pub async fn acquire(&self) -> Result<(), ApiError> {
        if self.try_admit(true).await.is_ok() {
            return Ok(());
        }

        if self.config.mode == OverflowMode::Reject {
            warn!("Rate limit of {} requests per {:?} reached, rejecting", self.config.max_requests, self.config.window);
            return Err(ApiError::RateLimited);
        }

        let position = self.queued.fetch_add(1, Ordering::SeqCst);
        let _slot = QueueSlot(&self.queued);
        if position >= self.config.max_queued {
            warn!("Request queue full ({} waiting)", position);
            return Err(ApiError::QueueFull);
        }

        debug!("Rate limit reached, queueing request at position {}", position);
        let _turn = self.turnstile.lock().await;
        loop {
            match self.try_admit(false).await {
                Ok(()) => return Ok(()),
                Err(opens_at) => sleep_until(opens_at).await,
            }
        }
    }

    /// Records an admission if the window has room. Otherwise returns the
    /// instant at which the oldest request leaves the window.
    async fn try_admit(&self, fresh: bool) -> Result<(), Instant> {
        let mut window = self.window.lock().await;
        let now = Instant::now();
        window.cleanup_old_requests(now, self.config.window);

        // newcomers do not overtake callers already queued
        let queue_clear = !fresh || self.queued.load(Ordering::SeqCst) == 0;
        if queue_clear && window.request_count() < self.config.max_requests as usize {
            window.add_request(now);
            return Ok(());
        }

        Err(window.opens_at(self.config.window).unwrap_or(now))
    }

    pub async fn is_limited(&self) -> bool {
        self.state().await.limited
    }

    pub async fn state(&self) -> RateLimitState {
        let mut window = self.window.lock().await;
        window.cleanup_old_requests(Instant::now(), self.config.window);
        let in_window = window.request_count();

        RateLimitState {
            in_window,
            queued: self.queued.load(Ordering::SeqCst),
            limited: in_window >= self.config.max_requests as usize,
        }
    }
}
