//! Subscription record and per-activation delivery gate
//!
//! The record is plain data plus the state its own poll loop mutates. The
//! task handle that drives it lives in the manager, so observers never touch
//! cancellation-sensitive resources.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;

use crate::core::{
    HealthStatus, SubscriptionEvent, SubscriptionId, SubscriptionKind, SubscriptionStatus,
    Watermark,
};
use crate::domain::{Filter, SeenSet};

/// State owned by one subscription's loop
#[derive(Debug)]
pub struct PollState {
    /// In-memory position; `None` until loaded from the store or cold-started
    pub watermark: Option<Watermark>,
    /// Last position written to the store
    pub persisted: Option<Watermark>,
    /// Cold-start position; queries never reach back before it
    pub origin: Option<Watermark>,
    pub seen: SeenSet,
    pub consecutive_failures: u32,
}

impl PollState {
    pub fn new(seen_capacity: usize) -> Self {
        Self {
            watermark: None,
            persisted: None,
            origin: None,
            seen: SeenSet::new(seen_capacity),
            consecutive_failures: 0,
        }
    }
}

/// A registered subscription
pub struct Subscription {
    pub id: SubscriptionId,
    pub name: String,
    pub kind: SubscriptionKind,
    pub filter: Filter,
    pub poll_interval: Duration,
    pub created_at: DateTime<Utc>,
    events: broadcast::Sender<SubscriptionEvent>,
    /// Held for a whole cycle so cycles never overlap
    pub(crate) state: tokio::sync::Mutex<PollState>,
    /// Mirror of `PollState::consecutive_failures` readable without awaiting
    failures: AtomicU32,
}

impl Subscription {
    pub fn new(
        id: SubscriptionId,
        name: impl Into<String>,
        kind: SubscriptionKind,
        filter: Filter,
        poll_interval: Duration,
        seen_capacity: usize,
        event_buffer: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(event_buffer.max(1));
        Self {
            id,
            name: name.into(),
            kind,
            filter,
            poll_interval,
            created_at: Utc::now(),
            events,
            state: tokio::sync::Mutex::new(PollState::new(seen_capacity)),
            failures: AtomicU32::new(0),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SubscriptionEvent> {
        self.events.subscribe()
    }

    /// Send to current observers; having none is not an error
    pub(crate) fn emit(&self, event: SubscriptionEvent) {
        let _ = self.events.send(event);
    }

    pub(crate) fn record_failures(&self, count: u32) {
        self.failures.store(count, Ordering::SeqCst);
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    pub fn health(&self, degraded_after: u32) -> HealthStatus {
        let failures = self.consecutive_failures();
        if failures >= degraded_after {
            HealthStatus::Degraded {
                consecutive_failures: failures,
            }
        } else {
            HealthStatus::Healthy
        }
    }
}

/// Read-only view of a subscription
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionInfo {
    pub id: SubscriptionId,
    pub name: String,
    pub kind: SubscriptionKind,
    pub filter: Filter,
    pub poll_interval_secs: u64,
    pub status: SubscriptionStatus,
    pub created_at: DateTime<Utc>,
    pub health: HealthStatus,
    pub consecutive_failures: u32,
}

/// Open for one activation, closed by stop.
///
/// Everything observable a cycle does (delivery, seen-set and watermark
/// updates) runs inside [`DeliveryGate::with_open`]. Closing takes the same
/// lock, so once `close` returns no further delivery can start.
#[derive(Debug, Clone)]
pub struct DeliveryGate(Arc<Mutex<bool>>);

impl DeliveryGate {
    pub fn open() -> Self {
        Self(Arc::new(Mutex::new(true)))
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn close(&self) {
        *self.lock() = false;
    }

    pub fn is_open(&self) -> bool {
        *self.lock()
    }

    /// Run `f` only if the gate is still open; `None` means discarded
    pub fn with_open<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        let open = self.lock();
        if *open {
            Some(f())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_gate_discards() {
        let gate = DeliveryGate::open();
        assert_eq!(gate.with_open(|| 1), Some(1));

        let other = gate.clone();
        other.close();
        assert!(!gate.is_open());
        assert_eq!(gate.with_open(|| 2), None);
    }

    #[test]
    fn test_health_threshold() {
        let sub = Subscription::new(
            SubscriptionId::new(),
            "wallet",
            SubscriptionKind::Wallet,
            Filter::default(),
            Duration::from_secs(5),
            10,
            4,
        );
        sub.record_failures(2);
        assert_eq!(sub.health(3), HealthStatus::Healthy);
        sub.record_failures(3);
        assert_eq!(
            sub.health(3),
            HealthStatus::Degraded {
                consecutive_failures: 3
            }
        );
    }
}
