//! Silence watchdog
//!
//! A single cancellable deadline. Rearming replaces the pending deadline, so
//! at most one firing is ever outstanding and it is measured from the most
//! recent arm.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::conversation::{EventKind, EventSink};

#[derive(Debug, Default)]
pub struct Watchdog {
    pending: Option<JoinHandle<()>>,
    generation: u64,
}

impl Watchdog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or rearm) the deadline `duration` from now
    ///
    /// Returns the generation the firing event will carry.
    pub fn arm(&mut self, duration: Duration, events: &EventSink) -> u64 {
        self.cancel();

        let generation = self.generation;
        let deadline = Instant::now() + duration;
        let events = events.clone();

        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            events.post(EventKind::WatchdogFired { generation });
        }));

        tracing::trace!(generation, timeout_ms = duration.as_millis(), "watchdog armed");
        generation
    }

    /// Cancel the pending deadline; idempotent
    pub fn cancel(&mut self) {
        if let Some(task) = self.pending.take() {
            task.abort();
        }
        // Any firing already queued is now stale
        self.generation += 1;
    }

    /// Accept a firing; returns false if it belongs to a cancelled deadline
    pub fn fired(&mut self, generation: u64) -> bool {
        if self.pending.is_none() || generation != self.generation {
            return false;
        }
        self.pending = None;
        true
    }

    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.pending.is_some()
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::conversation::Event;

    fn generation(event: &Event) -> u64 {
        match event.kind {
            EventKind::WatchdogFired { generation } => generation,
            ref other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_timeout() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let events = EventSink::new(1, tx);
        let mut watchdog = Watchdog::new();

        let armed = watchdog.arm(Duration::from_secs(5), &events);
        tokio::time::advance(Duration::from_millis(4999)).await;
        assert!(rx.try_recv().is_err());

        let event = rx.recv().await.unwrap();
        assert_eq!(generation(&event), armed);
        assert!(watchdog.fired(armed));
        assert!(!watchdog.is_armed());
        assert!(!watchdog.fired(armed));
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_restarts_the_countdown() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let events = EventSink::new(1, tx);
        let mut watchdog = Watchdog::new();
        let start = Instant::now();

        let mut last = 0;
        for _ in 0..5 {
            last = watchdog.arm(Duration::from_secs(2), &events);
            tokio::time::advance(Duration::from_secs(1)).await;
        }

        let event = rx.recv().await.unwrap();
        // Last arm happened at t=4s
        assert_eq!(start.elapsed(), Duration::from_secs(6));
        assert_eq!(generation(&event), last);
        assert!(watchdog.fired(last));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_firing() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let events = EventSink::new(1, tx);
        let mut watchdog = Watchdog::new();

        let armed = watchdog.arm(Duration::from_secs(1), &events);
        watchdog.cancel();
        tokio::time::advance(Duration::from_secs(2)).await;

        assert!(rx.try_recv().is_err());
        assert!(!watchdog.fired(armed));
    }
}
