//! Inbound accumulation buffer
//!
//! Single-writer (the transport's I/O task or thread), single-reader (the
//! caller draining via `take`). Appends and reads are serialized by the
//! internal mutex; waiters are woken through a [`tokio::sync::Notify`] so the
//! writer side can run on a plain thread.

use bytes::{Bytes, BytesMut};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::transport::ReceivePredicate;

/// Accumulated inbound bytes plus waiter wakeup
pub struct RxBuffer {
    inner: Mutex<BytesMut>,
    arrived: Notify,
}

impl RxBuffer {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BytesMut::new()),
            arrived: Notify::new(),
        }
    }

    /// Append newly received bytes and wake waiters
    pub fn push(&self, bytes: &[u8]) {
        {
            let mut buf = self.inner.lock().expect("rx buffer lock poisoned");
            buf.extend_from_slice(bytes);
        }
        self.arrived.notify_waiters();
    }

    /// Number of pending bytes
    pub fn len(&self) -> usize {
        self.inner.lock().expect("rx buffer lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain and return everything pending
    pub fn take(&self) -> Bytes {
        let mut buf = self.inner.lock().expect("rx buffer lock poisoned");
        buf.split().freeze()
    }

    /// Discard everything pending
    pub fn clear(&self) {
        self.inner.lock().expect("rx buffer lock poisoned").clear();
    }

    /// Wait until `predicate` holds for the pending bytes or `timeout` lapses
    ///
    /// Returns `true` the moment the predicate is satisfied, `false` on
    /// timeout. The predicate is re-checked after every arrival; the timeout
    /// is a fixed deadline for this call.
    pub async fn wait(&self, timeout: Duration, predicate: &ReceivePredicate) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            // Register for wakeup before checking: notify_waiters only wakes
            // already-registered waiters, so an arrival between the check
            // and the await would otherwise be lost.
            let arrived = self.arrived.notified();
            tokio::pin!(arrived);
            arrived.as_mut().enable();

            {
                let buf = self.inner.lock().expect("rx buffer lock poisoned");
                if predicate.is_satisfied(&buf) {
                    return true;
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            if tokio::time::timeout(deadline - now, arrived).await.is_err() {
                // Deadline hit while waiting; one final check for bytes that
                // raced the timer.
                let buf = self.inner.lock().expect("rx buffer lock poisoned");
                return predicate.is_satisfied(&buf);
            }
        }
    }
}

impl Default for RxBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_push_take_roundtrip() {
        let rx = RxBuffer::new();
        rx.push(b"VOLT 5.0");
        rx.push(b"\n");
        assert_eq!(rx.len(), 9);
        assert_eq!(&rx.take()[..], b"VOLT 5.0\n");
        assert!(rx.is_empty());
    }

    #[tokio::test]
    async fn test_wait_already_satisfied() {
        let rx = RxBuffer::new();
        rx.push(b"abc\n");
        assert!(
            rx.wait(Duration::from_millis(10), &ReceivePredicate::Escape(b'\n'))
                .await
        );
    }

    #[tokio::test]
    async fn test_wait_times_out_without_bytes() {
        let rx = RxBuffer::new();
        let satisfied = rx
            .wait(Duration::from_millis(20), &ReceivePredicate::ByteCount(1))
            .await;
        assert!(!satisfied);
    }

    #[tokio::test]
    async fn test_wait_wakes_on_late_arrival() {
        let rx = Arc::new(RxBuffer::new());
        let pusher = {
            let rx = Arc::clone(&rx);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                rx.push(b"5.001\n");
            })
        };

        let satisfied = rx
            .wait(Duration::from_secs(2), &ReceivePredicate::Escape(b'\n'))
            .await;
        assert!(satisfied);
        pusher.await.expect("pusher task failed");
    }

    #[tokio::test]
    async fn test_wait_returns_early_before_deadline() {
        let rx = Arc::new(RxBuffer::new());
        let rx2 = Arc::clone(&rx);
        tokio::spawn(async move {
            rx2.push(b"x");
        });

        let start = std::time::Instant::now();
        let satisfied = rx
            .wait(Duration::from_secs(30), &ReceivePredicate::ByteCount(1))
            .await;
        assert!(satisfied);
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
