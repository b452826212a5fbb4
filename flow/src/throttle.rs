//! Rate-limiting call combinator

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};

enum Op<T> {
    Call(T),
    Cancel,
}

/// Rate-limits invocations of a callback to at most one per interval.
///
/// The first [`call`](Self::call) invokes the callback immediately and
/// starts a cooldown. Calls arriving during the cooldown coalesce
/// last-write-wins: exactly one trailing invocation fires when the
/// cooldown expires, carrying the most recent arguments, and re-arms the
/// cooldown from that invocation. No call is silently dropped if it was
/// the most recent one at expiry.
///
/// The callback runs on a dedicated task; the handle is cheap to clone
/// and send. Dropping every handle stops the task.
pub struct Throttle<T: Send + 'static> {
    tx: mpsc::UnboundedSender<Op<T>>,
}

impl<T: Send + 'static> Throttle<T> {
    /// Wrap `callback` so it fires at most once per `interval`.
    pub fn new<F>(interval: Duration, mut callback: F) -> Self
    where
        F: FnMut(T) + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<Op<T>>();

        tokio::spawn(async move {
            let mut pending: Option<T> = None;
            let mut cooldown_until: Option<Instant> = None;

            loop {
                let deadline = cooldown_until.unwrap_or_else(Instant::now);
                tokio::select! {
                    biased;
                    op = rx.recv() => match op {
                        None => break,
                        Some(Op::Cancel) => {
                            pending = None;
                            cooldown_until = None;
                        }
                        Some(Op::Call(args)) => {
                            let cooling = cooldown_until
                                .is_some_and(|until| Instant::now() < until);
                            if cooling {
                                pending = Some(args);
                            } else {
                                callback(args);
                                cooldown_until = Some(Instant::now() + interval);
                            }
                        }
                    },
                    () = sleep_until(deadline), if cooldown_until.is_some() => {
                        cooldown_until = None;
                        if let Some(args) = pending.take() {
                            callback(args);
                            cooldown_until = Some(Instant::now() + interval);
                        }
                    }
                }
            }
        });

        Self { tx }
    }

    /// Request an invocation with `args`.
    ///
    /// Invoked immediately when no cooldown is active; otherwise `args`
    /// replace any previously pending arguments.
    pub fn call(&self, args: T) {
        let _ = self.tx.send(Op::Call(args));
    }

    /// Discard any pending trailing invocation and clear the cooldown.
    pub fn cancel(&self) {
        let _ = self.tx.send(Op::Cancel);
    }
}

impl<T: Send + 'static> Clone for Throttle<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::time::sleep;

    fn recorder() -> (Arc<Mutex<Vec<u32>>>, impl FnMut(u32) + Send + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |v| sink.lock().unwrap().push(v))
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_call_fires_immediately() {
        let (seen, sink) = recorder();
        let throttle = Throttle::new(Duration::from_millis(100), sink);

        throttle.call(1);
        sleep(Duration::from_millis(1)).await;
        assert_eq!(*seen.lock().unwrap(), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_coalesces_to_latest() {
        let (seen, sink) = recorder();
        let throttle = Throttle::new(Duration::from_millis(100), sink);

        throttle.call(1);
        sleep(Duration::from_millis(10)).await;
        throttle.call(2);
        sleep(Duration::from_millis(10)).await;
        throttle.call(3);
        sleep(Duration::from_millis(5)).await;
        // Inside the cooldown: only the immediate invocation so far.
        assert_eq!(*seen.lock().unwrap(), vec![1]);

        sleep(Duration::from_millis(100)).await;
        // Trailing invocation carries the latest arguments only.
        assert_eq!(*seen.lock().unwrap(), vec![1, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trailing_invocation_rearms_cooldown() {
        let (seen, sink) = recorder();
        let throttle = Throttle::new(Duration::from_millis(100), sink);

        throttle.call(1); // fires at t=0
        sleep(Duration::from_millis(50)).await;
        throttle.call(2); // pending, fires at t=100
        sleep(Duration::from_millis(70)).await;
        throttle.call(3); // t=120, inside the re-armed cooldown
        sleep(Duration::from_millis(30)).await;
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);

        sleep(Duration::from_millis(60)).await;
        // Re-armed cooldown expired at t=200 and flushed the latest call.
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_clears_pending_and_cooldown() {
        let (seen, sink) = recorder();
        let throttle = Throttle::new(Duration::from_millis(100), sink);

        throttle.call(1);
        sleep(Duration::from_millis(10)).await;
        throttle.call(2);
        throttle.cancel();
        sleep(Duration::from_millis(200)).await;
        // Pending trailing call discarded.
        assert_eq!(*seen.lock().unwrap(), vec![1]);

        // Cooldown cleared too: the next call is immediate.
        throttle.call(5);
        sleep(Duration::from_millis(1)).await;
        assert_eq!(*seen.lock().unwrap(), vec![1, 5]);
    }
}
