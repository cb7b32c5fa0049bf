//! Suspend-until-available FIFO coupling an outbound request to its inbound response.
//!
//! Correlation is causal: nothing inspects a packet to pair it with a request. The
//! caller must keep exactly one request outstanding per correlator before calling
//! [`ResponseCorrelator::dequeue`], otherwise unrelated packets get misattributed.
//!
//! The queue is unbounded. A producer that keeps enqueueing while nobody dequeues will
//! grow it without limit.

use crate::core::packet::Packet;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tracing::trace;

/// Single-consumer packet queue. Share it behind an `Arc`.
#[derive(Debug)]
pub struct ResponseCorrelator {
    name: &'static str,
    queue: Mutex<VecDeque<Packet>>,
    ready: Notify,
    closed: AtomicBool,
}

impl ResponseCorrelator {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            queue: Mutex::new(VecDeque::new()),
            ready: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Packet>> {
        // The queue holds plain data; a panicked holder cannot leave it half-updated.
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append to the tail. Never blocks.
    pub fn enqueue(&self, packet: Packet) {
        let depth = {
            let mut queue = self.lock();
            queue.push_back(packet);
            queue.len()
        };
        trace!(correlator = self.name, depth, "Packet enqueued");
        self.ready.notify_one();
    }

    /// Wait for the oldest packet and remove it.
    ///
    /// Returns `None` once the correlator is closed and empty, so a waiter is released
    /// when the link goes away.
    pub async fn dequeue(&self) -> Option<Packet> {
        loop {
            // Register interest before checking so an enqueue between the check and the
            // await is not lost.
            let notified = self.ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(packet) = self.lock().pop_front() {
                return Some(packet);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }

            notified.await;
        }
    }

    /// Non-suspending variant of [`dequeue`](Self::dequeue).
    pub fn try_dequeue(&self) -> Option<Packet> {
        self.lock().pop_front()
    }

    /// Release any waiter. Items already queued can still be dequeued.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.ready.notify_waiters();
        self.ready.notify_one();
    }

    /// Accept waiters again after a [`close`](Self::close).
    pub fn reopen(&self) {
        self.closed.store(false, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Discard everything queued, returning how many packets were dropped.
    pub fn drain(&self) -> usize {
        let mut queue = self.lock();
        let dropped = queue.len();
        queue.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn packet(cmd: u8) -> Packet {
        Packet::new(36, 0, cmd, vec![cmd])
    }

    #[tokio::test]
    async fn returns_items_in_arrival_order() {
        let correlator = ResponseCorrelator::new("cmd");
        for cmd in 1..=3 {
            correlator.enqueue(packet(cmd));
        }

        for cmd in 1..=3 {
            assert_eq!(correlator.dequeue().await.unwrap().cmd, cmd);
        }
        assert!(correlator.is_empty());
    }

    #[tokio::test]
    async fn dequeue_suspends_until_enqueue() {
        let correlator = Arc::new(ResponseCorrelator::new("meta"));
        let waiter = {
            let correlator = Arc::clone(&correlator);
            tokio::spawn(async move { correlator.dequeue().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        correlator.enqueue(packet(7));
        let got = waiter.await.unwrap().unwrap();
        assert_eq!(got.cmd, 7);
    }

    #[tokio::test]
    async fn close_releases_waiter() {
        let correlator = Arc::new(ResponseCorrelator::new("cmd"));
        let waiter = {
            let correlator = Arc::clone(&correlator);
            tokio::spawn(async move { correlator.dequeue().await })
        };

        tokio::task::yield_now().await;
        correlator.close();
        assert_eq!(waiter.await.unwrap(), None);
    }

    #[tokio::test]
    async fn closed_queue_still_yields_buffered_items() {
        let correlator = ResponseCorrelator::new("cmd");
        correlator.enqueue(packet(1));
        correlator.close();

        assert_eq!(correlator.dequeue().await.unwrap().cmd, 1);
        assert_eq!(correlator.dequeue().await, None);

        correlator.reopen();
        correlator.enqueue(packet(2));
        assert_eq!(correlator.dequeue().await.unwrap().cmd, 2);
    }

    #[test]
    fn drain_reports_dropped_count() {
        let correlator = ResponseCorrelator::new("meta");
        correlator.enqueue(packet(1));
        correlator.enqueue(packet(2));
        assert_eq!(correlator.len(), 2);
        assert_eq!(correlator.drain(), 2);
        assert_eq!(correlator.try_dequeue(), None);
    }
}
