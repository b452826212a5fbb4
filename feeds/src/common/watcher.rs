//! Liveness watchdog bookkeeping

use std::time::Duration;
use tokio::time::Instant;

/// Tracks whether data is still arriving on a connection.
///
/// The client marks the watcher on every data-bearing event and polls
/// [`deadline`](Self::deadline) in its select loop; when the deadline
/// passes without a mark the connection is considered dead — typically a
/// half-open socket the transport never noticed — and the client
/// triggers a reconnect, stopping the watcher until the next
/// `Connected`. Pure bookkeeping: no timer task of its own, so starting
/// and stopping are free and idempotent.
#[derive(Debug)]
pub struct LivenessWatcher {
    interval: Duration,
    last_seen: Instant,
    armed: bool,
}

impl LivenessWatcher {
    /// Create a stopped watcher with the given interval.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_seen: Instant::now(),
            armed: false,
        }
    }

    /// Arm the watcher, resetting any previous deadline.
    pub fn start(&mut self) {
        self.last_seen = Instant::now();
        self.armed = true;
    }

    /// Disarm the watcher.
    pub fn stop(&mut self) {
        self.armed = false;
    }

    /// Record that data arrived now.
    pub fn mark(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Whether the watcher is armed.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Instant at which the connection counts as dead.
    ///
    /// Meaningful only while armed; callers gate their timer on
    /// [`is_armed`](Self::is_armed).
    #[must_use]
    pub fn deadline(&self) -> Instant {
        self.last_seen + self.interval
    }

    /// Whether the deadline has passed without a mark.
    #[must_use]
    pub fn expired(&self, now: Instant) -> bool {
        self.armed && now >= self.deadline()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{advance, sleep};

    #[tokio::test(start_paused = true)]
    async fn test_marks_push_the_deadline() {
        let mut watcher = LivenessWatcher::new(Duration::from_secs(90));
        watcher.start();

        advance(Duration::from_secs(60)).await;
        assert!(!watcher.expired(Instant::now()));

        watcher.mark();
        advance(Duration::from_secs(60)).await;
        // 120s since start but only 60s since the mark.
        assert!(!watcher.expired(Instant::now()));

        advance(Duration::from_secs(31)).await;
        assert!(watcher.expired(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_watcher_never_expires() {
        let mut watcher = LivenessWatcher::new(Duration::from_secs(1));
        watcher.start();
        watcher.stop();
        sleep(Duration::from_secs(10)).await;
        assert!(!watcher.expired(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent_and_rearms() {
        let mut watcher = LivenessWatcher::new(Duration::from_secs(10));
        watcher.start();
        advance(Duration::from_secs(9)).await;
        watcher.start();
        advance(Duration::from_secs(9)).await;
        // Re-arming reset the window.
        assert!(!watcher.expired(Instant::now()));
        advance(Duration::from_secs(2)).await;
        assert!(watcher.expired(Instant::now()));
    }
}
