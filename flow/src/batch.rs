//! Call-coalescing combinator

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};

enum Op<T> {
    Push(T),
    Cancel,
}

/// Coalesces many calls into few, chunked by a maximum batch size.
///
/// Each [`push`](Self::push) appends one argument tuple and re-arms a
/// debounced flush `collect_interval` later. The flush drains everything
/// accumulated through the callback in chunks of at most `batch_size`.
/// With a zero interval, calls issued back-to-back still collapse into
/// one flush on the next timer turn — which is what lets a burst of
/// per-market subscribe calls become a single wire message bounded by
/// the venue's max-items-per-message limit.
pub struct Batch<T: Send + 'static> {
    tx: mpsc::UnboundedSender<Op<T>>,
}

impl<T: Send + 'static> Batch<T> {
    /// Wrap `callback`, flushing at most `batch_size` items per call.
    ///
    /// # Panics
    /// Panics if `batch_size` is zero.
    pub fn new<F>(batch_size: usize, collect_interval: Duration, mut callback: F) -> Self
    where
        F: FnMut(Vec<T>) + Send + 'static,
    {
        assert!(batch_size > 0, "batch size must be positive");
        let (tx, mut rx) = mpsc::unbounded_channel::<Op<T>>();

        tokio::spawn(async move {
            let mut accumulated: Vec<T> = Vec::new();
            let mut flush_at: Option<Instant> = None;

            loop {
                let deadline = flush_at.unwrap_or_else(Instant::now);
                tokio::select! {
                    biased;
                    op = rx.recv() => match op {
                        None => break,
                        Some(Op::Cancel) => {
                            accumulated.clear();
                            flush_at = None;
                        }
                        Some(Op::Push(args)) => {
                            accumulated.push(args);
                            flush_at = Some(Instant::now() + collect_interval);
                        }
                    },
                    () = sleep_until(deadline), if flush_at.is_some() => {
                        flush_at = None;
                        while !accumulated.is_empty() {
                            let take = batch_size.min(accumulated.len());
                            let chunk: Vec<T> = accumulated.drain(..take).collect();
                            callback(chunk);
                        }
                    }
                }
            }
        });

        Self { tx }
    }

    /// Append one argument tuple and re-arm the flush timer.
    pub fn push(&self, args: T) {
        let _ = self.tx.send(Op::Push(args));
    }

    /// Discard accumulated arguments and the pending flush.
    pub fn cancel(&self) {
        let _ = self.tx.send(Op::Cancel);
    }
}

impl<T: Send + 'static> Clone for Batch<T> {
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

    fn recorder() -> (
        Arc<Mutex<Vec<Vec<u32>>>>,
        impl FnMut(Vec<u32>) + Send + 'static,
    ) {
        let chunks = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&chunks);
        (chunks, move |chunk| sink.lock().unwrap().push(chunk))
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_chunks_by_batch_size() {
        let (chunks, sink) = recorder();
        let batch = Batch::new(3, Duration::ZERO, sink);

        for i in 0..5 {
            batch.push(i);
        }
        sleep(Duration::from_millis(1)).await;

        let chunks = chunks.lock().unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], vec![0, 1, 2]);
        assert_eq!(chunks[1], vec![3, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_resets_on_each_push() {
        let (chunks, sink) = recorder();
        let batch = Batch::new(10, Duration::from_millis(50), sink);

        batch.push(1);
        sleep(Duration::from_millis(30)).await;
        batch.push(2);
        sleep(Duration::from_millis(30)).await;
        // First deadline was pushed out by the second call.
        assert!(chunks.lock().unwrap().is_empty());

        sleep(Duration::from_millis(25)).await;
        assert_eq!(*chunks.lock().unwrap(), vec![vec![1, 2]]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_discards_accumulated() {
        let (chunks, sink) = recorder();
        let batch = Batch::new(10, Duration::from_millis(50), sink);

        batch.push(1);
        batch.push(2);
        batch.cancel();
        sleep(Duration::from_millis(100)).await;
        assert!(chunks.lock().unwrap().is_empty());

        batch.push(3);
        sleep(Duration::from_millis(60)).await;
        assert_eq!(*chunks.lock().unwrap(), vec![vec![3]]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exact_multiple_has_no_empty_tail_chunk() {
        let (chunks, sink) = recorder();
        let batch = Batch::new(2, Duration::ZERO, sink);

        for i in 0..4 {
            batch.push(i);
        }
        sleep(Duration::from_millis(1)).await;

        let chunks = chunks.lock().unwrap();
        assert_eq!(*chunks, vec![vec![0, 1], vec![2, 3]]);
    }
}
