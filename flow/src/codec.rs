//! Serialized decompression pipeline

use crate::queue::Queue;
use std::io::Read;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, oneshot};
use tracing::trace;

/// Decompression routine to apply.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CodecOp {
    /// gzip member (RFC 1952)
    Gunzip,
    /// zlib stream (RFC 1950)
    Inflate,
    /// raw DEFLATE stream (RFC 1951)
    InflateRaw,
}

/// Errors surfaced by [`SerializedCodec`].
///
/// A failed operation is reported only to its own submitter; queued
/// operations behind it are unaffected.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The payload was not a valid stream for the requested routine
    #[error("decompression failed: {0}")]
    Decode(#[from] std::io::Error),
    /// The codec was dropped before the operation completed
    #[error("codec shut down before the operation completed")]
    Shutdown,
}

struct Job {
    op: CodecOp,
    data: Vec<u8>,
    done: oneshot::Sender<Result<Vec<u8>, CodecError>>,
}

struct Shared {
    pending: Mutex<Queue<Job>>,
    wakeup: Notify,
    closed: AtomicBool,
}

/// Funnels decompression through a bounded set of native calls.
///
/// Native inflate runs on the blocking pool; a burst of frames from many
/// sockets would otherwise fan out into as many concurrent native calls.
/// Jobs instead land in a FIFO [`Queue`] drained by `concurrency` worker
/// tasks (default 1, the resource-protection policy of a shared codec:
/// one native call in flight at a time, completions in submission
/// order). Raise the concurrency where the host has headroom.
pub struct SerializedCodec {
    shared: Arc<Shared>,
}

impl SerializedCodec {
    /// Create a codec with a single in-flight native call.
    #[must_use]
    pub fn new() -> Self {
        Self::with_concurrency(1)
    }

    /// Create a codec allowing up to `concurrency` in-flight calls.
    ///
    /// # Panics
    /// Panics if `concurrency` is zero.
    #[must_use]
    pub fn with_concurrency(concurrency: usize) -> Self {
        assert!(concurrency > 0, "codec needs at least one worker");
        let shared = Arc::new(Shared {
            pending: Mutex::new(Queue::new()),
            wakeup: Notify::new(),
            closed: AtomicBool::new(false),
        });

        for _ in 0..concurrency {
            let shared = Arc::clone(&shared);
            tokio::spawn(async move {
                loop {
                    let job = shared.pending.lock().expect("codec queue poisoned").shift();
                    match job {
                        Some(job) => {
                            let Job { op, data, done } = job;
                            let result = tokio::task::spawn_blocking(move || decode(op, &data))
                                .await
                                .unwrap_or_else(|_| {
                                    Err(std::io::Error::other("decoder task aborted"))
                                });
                            let _ = done.send(result.map_err(CodecError::from));
                        }
                        None => {
                            if shared.closed.load(Ordering::Acquire) {
                                break;
                            }
                            shared.wakeup.notified().await;
                        }
                    }
                }
                trace!("codec worker stopped");
            });
        }

        Self { shared }
    }

    /// Enqueue an operation; the receiver resolves with its result.
    ///
    /// Enqueueing is synchronous, so submission order is completion
    /// order at concurrency 1.
    pub fn submit(&self, op: CodecOp, data: Vec<u8>) -> oneshot::Receiver<Result<Vec<u8>, CodecError>> {
        let (done, rx) = oneshot::channel();
        self.shared
            .pending
            .lock()
            .expect("codec queue poisoned")
            .push(Job { op, data, done });
        self.shared.wakeup.notify_one();
        rx
    }

    /// Decompress `data` with `op`, awaiting the queued result.
    pub async fn decompress(&self, op: CodecOp, data: Vec<u8>) -> Result<Vec<u8>, CodecError> {
        self.submit(op, data).await.map_err(|_| CodecError::Shutdown)?
    }
}

impl Default for SerializedCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SerializedCodec {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.wakeup.notify_waiters();
    }
}

fn decode(op: CodecOp, data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    match op {
        CodecOp::Gunzip => {
            flate2::read::GzDecoder::new(data).read_to_end(&mut out)?;
        }
        CodecOp::Inflate => {
            flate2::read::ZlibDecoder::new(data).read_to_end(&mut out)?;
        }
        CodecOp::InflateRaw => {
            flate2::read::DeflateDecoder::new(data).read_to_end(&mut out)?;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::{DeflateEncoder, GzEncoder};
    use std::io::Write;
    use std::sync::Arc;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[tokio::test]
    async fn test_inflate_known_fixture() {
        // zlib.compress(b"hello") — fixed bytes, fixed expected output.
        let fixture = [
            0x78, 0x9c, 0xcb, 0x48, 0xcd, 0xc9, 0xc9, 0x07, 0x00, 0x06, 0x2c, 0x02, 0x15,
        ];
        let codec = SerializedCodec::new();
        let out = codec
            .decompress(CodecOp::Inflate, fixture.to_vec())
            .await
            .unwrap();
        assert_eq!(out, b"hello");
    }

    #[tokio::test]
    async fn test_gunzip_and_raw_roundtrip() {
        let codec = SerializedCodec::new();

        let payload = b"order book frame".to_vec();
        let out = codec
            .decompress(CodecOp::Gunzip, gzip(&payload))
            .await
            .unwrap();
        assert_eq!(out, payload);

        let mut enc = DeflateEncoder::new(Vec::new(), Compression::default());
        enc.write_all(&payload).unwrap();
        let raw = enc.finish().unwrap();
        let out = codec.decompress(CodecOp::InflateRaw, raw).await.unwrap();
        assert_eq!(out, payload);
    }

    #[tokio::test]
    async fn test_completions_in_submission_order() {
        let codec = SerializedCodec::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..5u8 {
            let payload = vec![i; 64 + i as usize];
            let rx = codec.submit(CodecOp::Gunzip, gzip(&payload));
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                let out = rx.await.unwrap().unwrap();
                assert_eq!(out, payload);
                order.lock().unwrap().push(i);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_error_isolated_to_its_job() {
        let codec = SerializedCodec::new();

        let good_before = codec.submit(CodecOp::Gunzip, gzip(b"before"));
        let corrupt = codec.submit(CodecOp::Gunzip, vec![0xde, 0xad, 0xbe, 0xef]);
        let good_after = codec.submit(CodecOp::Gunzip, gzip(b"after"));

        assert_eq!(good_before.await.unwrap().unwrap(), b"before");
        assert!(matches!(
            corrupt.await.unwrap(),
            Err(CodecError::Decode(_))
        ));
        assert_eq!(good_after.await.unwrap().unwrap(), b"after");
    }
}
