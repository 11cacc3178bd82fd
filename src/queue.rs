use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};
use tokio::time::{Duration, Instant};
use tokio_util_shim::CancellationToken;

use crate::error::{Error, Result};
use crate::message::{Message, Priority};

/// What happens to a producer when the queue is at or above `high_water`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShedPolicy {
    /// Park the producer until the queue drains below `low_water`, or the deadline elapses.
    Block,
    /// Drop the oldest message in the lowest occupied band to make room.
    DropOldestLow,
    /// Reject the new message immediately with `Overflow`.
    RejectNew,
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub capacity: usize,
    pub high_water: usize,
    pub low_water: usize,
    pub enqueue_deadline: Duration,
    pub shed_policy: ShedPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        let capacity = 256;
        Self {
            capacity,
            high_water: (capacity * 3) / 4,
            low_water: capacity / 4,
            enqueue_deadline: Duration::from_secs(5),
            shed_policy: ShedPolicy::Block,
        }
    }
}

#[derive(Default)]
struct Bands {
    critical: VecDeque<Message>,
    high: VecDeque<Message>,
    normal: VecDeque<Message>,
    low: VecDeque<Message>,
    closed: bool,
}

impl Bands {
    fn len(&self) -> usize {
        self.critical.len() + self.high.len() + self.normal.len() + self.low.len()
    }

    fn band_mut(&mut self, priority: Priority) -> &mut VecDeque<Message> {
        match priority {
            Priority::Critical => &mut self.critical,
            Priority::High => &mut self.high,
            Priority::Normal => &mut self.normal,
            Priority::Low => &mut self.low,
        }
    }

    /// Pops the highest-priority, oldest message across all bands.
    fn pop_highest(&mut self) -> Option<Message> {
        for band in [&mut self.critical, &mut self.high, &mut self.normal, &mut self.low] {
            if let Some(m) = band.pop_front() {
                return Some(m);
            }
        }
        None
    }

    fn drop_oldest_low(&mut self) -> bool {
        for band in [&mut self.low, &mut self.normal, &mut self.high] {
            if band.pop_front().is_some() {
                return true;
            }
        }
        false
    }
}

/// Bounded, priority-banded, single-consumer message queue (MPSC semantics). The only
/// coordination primitive shared between producers (CLI input, timers, provider
/// callbacks) and the orchestrator.
pub struct MessageQueue {
    config: QueueConfig,
    bands: Mutex<Bands>,
    not_empty: Notify,
    not_full: Notify,
}

impl MessageQueue {
    pub fn new(config: QueueConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            bands: Mutex::new(Bands::default()),
            not_empty: Notify::new(),
            not_full: Notify::new(),
        })
    }

    pub fn with_defaults() -> Arc<Self> {
        Self::new(QueueConfig::default())
    }

    pub async fn enqueue(&self, message: Message) -> Result<()> {
        let deadline = Instant::now() + self.config.enqueue_deadline;
        loop {
            {
                let mut bands = self.bands.lock().await;
                if bands.closed {
                    return Err(Error::business("QUEUE_CLOSED", "queue is closed"));
                }
                let len = bands.len();
                if len < self.config.capacity {
                    let priority = message.priority;
                    bands.band_mut(priority).push_back(message);
                    drop(bands);
                    self.not_empty.notify_one();
                    return Ok(());
                }
                // len >= capacity > high_water here, so every shed policy applies.
                match self.config.shed_policy {
                    ShedPolicy::RejectNew => {
                        return Err(Error::business("OVERFLOW", "queue at capacity"));
                    }
                    ShedPolicy::DropOldestLow => {
                        if bands.drop_oldest_low() {
                            let priority = message.priority;
                            bands.band_mut(priority).push_back(message);
                            drop(bands);
                            self.not_empty.notify_one();
                            return Ok(());
                        }
                        return Err(Error::business("OVERFLOW", "queue at capacity"));
                    }
                    ShedPolicy::Block => {}
                }
            }

            if Instant::now() >= deadline {
                return Err(Error::timeout("OVERFLOW", "enqueue deadline exceeded under backpressure"));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            let _ = tokio::time::timeout(remaining, self.not_full.notified()).await;
        }
    }

    /// Suspends until a message is available, cancellation fires, or the queue closes.
    pub async fn dequeue(&self, cancellation: &CancellationToken) -> Result<Message> {
        loop {
            {
                let mut bands = self.bands.lock().await;
                if let Some(msg) = bands.pop_highest() {
                    let remaining = bands.len();
                    drop(bands);
                    if remaining <= self.config.low_water {
                        self.not_full.notify_waiters();
                    }
                    return Ok(msg);
                }
                if bands.closed {
                    return Err(Error::business("QUEUE_CLOSED", "queue is closed and drained"));
                }
            }

            tokio::select! {
                _ = self.not_empty.notified() => continue,
                _ = cancellation.cancelled() => {
                    return Err(Error::cancelled("dequeue cancelled"));
                }
            }
        }
    }

    pub async fn try_dequeue(&self) -> Option<Message> {
        let mut bands = self.bands.lock().await;
        let msg = bands.pop_highest();
        if msg.is_some() {
            let remaining = bands.len();
            drop(bands);
            if remaining <= self.config.low_water {
                self.not_full.notify_waiters();
            }
        }
        msg
    }

    pub async fn close(&self) {
        let mut bands = self.bands.lock().await;
        bands.closed = true;
        drop(bands);
        self.not_empty.notify_waiters();
    }

    pub async fn len(&self) -> usize {
        self.bands.lock().await.len()
    }
}

/// A small local re-implementation of the bits of `tokio_util::sync::CancellationToken`
/// this crate needs, to avoid a dependency whose only use would be this one type.
pub mod tokio_util_shim {
    use std::sync::Arc;
    use tokio::sync::Notify;

    #[derive(Clone, Default)]
    pub struct CancellationToken {
        inner: Arc<Inner>,
    }

    #[derive(Default)]
    struct Inner {
        notify: Notify,
        cancelled: std::sync::atomic::AtomicBool,
    }

    impl CancellationToken {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn cancel(&self) {
            self.inner.cancelled.store(true, std::sync::atomic::Ordering::SeqCst);
            self.inner.notify.notify_waiters();
        }

        pub fn is_cancelled(&self) -> bool {
            self.inner.cancelled.load(std::sync::atomic::Ordering::SeqCst)
        }

        pub async fn cancelled(&self) {
            if self.is_cancelled() {
                return;
            }
            loop {
                let notified = self.inner.notify.notified();
                if self.is_cancelled() {
                    return;
                }
                notified.await;
                if self.is_cancelled() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Payload;

    fn msg(priority: Priority) -> Message {
        Message::new(priority, Payload::progress("p", 0.0, "x"))
    }

    #[tokio::test]
    async fn strict_priority_across_bands() {
        let q = MessageQueue::with_defaults();
        q.enqueue(msg(Priority::Low)).await.unwrap();
        q.enqueue(msg(Priority::Normal)).await.unwrap();
        q.enqueue(msg(Priority::Critical)).await.unwrap();
        q.enqueue(msg(Priority::High)).await.unwrap();

        let token = tokio_util_shim::CancellationToken::new();
        assert_eq!(q.dequeue(&token).await.unwrap().priority, Priority::Critical);
        assert_eq!(q.dequeue(&token).await.unwrap().priority, Priority::High);
        assert_eq!(q.dequeue(&token).await.unwrap().priority, Priority::Normal);
        assert_eq!(q.dequeue(&token).await.unwrap().priority, Priority::Low);
    }

    #[tokio::test]
    async fn fifo_within_band() {
        let q = MessageQueue::with_defaults();
        let a = Message::new(Priority::Normal, Payload::progress("a", 0.0, ""));
        let b = Message::new(Priority::Normal, Payload::progress("b", 0.0, ""));
        let a_id = a.id.clone();
        let b_id = b.id.clone();
        q.enqueue(a).await.unwrap();
        q.enqueue(b).await.unwrap();

        let token = tokio_util_shim::CancellationToken::new();
        assert_eq!(q.dequeue(&token).await.unwrap().id, a_id);
        assert_eq!(q.dequeue(&token).await.unwrap().id, b_id);
    }

    #[tokio::test]
    async fn dequeue_observes_cancellation() {
        let q = MessageQueue::with_defaults();
        let token = tokio_util_shim::CancellationToken::new();
        token.cancel();
        let err = q.dequeue(&token).await.unwrap_err();
        assert_eq!(err.category, crate::error::ErrorCategory::Cancelled);
    }

    #[tokio::test]
    async fn closed_queue_rejects_enqueue_once_drained() {
        let q = MessageQueue::with_defaults();
        q.close().await;
        let err = q.enqueue(msg(Priority::Normal)).await.unwrap_err();
        assert_eq!(err.code, "QUEUE_CLOSED");
    }

    #[tokio::test]
    async fn reject_new_policy_rejects_at_capacity() {
        let mut cfg = QueueConfig::default();
        cfg.capacity = 2;
        cfg.high_water = 2;
        cfg.low_water = 1;
        cfg.shed_policy = ShedPolicy::RejectNew;
        cfg.enqueue_deadline = Duration::from_millis(50);
        let q = MessageQueue::new(cfg);
        q.enqueue(msg(Priority::Low)).await.unwrap();
        q.enqueue(msg(Priority::Low)).await.unwrap();
        let err = q.enqueue(msg(Priority::Low)).await.unwrap_err();
        assert_eq!(err.code, "OVERFLOW");
    }
}
