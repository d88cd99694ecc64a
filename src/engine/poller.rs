//! Per-subscription polling loop
//!
//! One cycle: resolve the watermark, query the ledger for the window since
//! it, filter and dedup the page, deliver the delta, advance and persist the
//! watermark. A failed query changes nothing except the failure count, so
//! the next cycle retries the same window.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::subscription::{DeliveryGate, PollState, Subscription};
use crate::config::EngineSettings;
use crate::core::{
    DeltaBatch, HealthSignal, HealthStatus, LedgerQueryPort, MonitorResult, QueryError,
    SubscriptionEvent, TransactionPage, TransactionQuery, Watermark, WatermarkMode,
    WatermarkStore,
};

/// What a single cycle did
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Cold start: watermark set to the activation position, nothing queried
    Initialized(Watermark),
    /// Query succeeded; `delivered` may be zero
    Completed { delivered: usize, watermark: Watermark },
    /// Query failed or timed out
    Failed { consecutive_failures: u32 },
    /// Stopped while the cycle was running; results dropped
    Discarded,
}

/// Drives one activation of a subscription
pub struct Poller {
    subscription: Arc<Subscription>,
    client: Arc<dyn LedgerQueryPort>,
    store: Arc<dyn WatermarkStore>,
    settings: Arc<EngineSettings>,
    health: broadcast::Sender<HealthSignal>,
    gate: DeliveryGate,
    cancel: CancellationToken,
}

impl Poller {
    pub fn new(
        subscription: Arc<Subscription>,
        client: Arc<dyn LedgerQueryPort>,
        store: Arc<dyn WatermarkStore>,
        settings: Arc<EngineSettings>,
        health: broadcast::Sender<HealthSignal>,
        gate: DeliveryGate,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            subscription,
            client,
            store,
            settings,
            health,
            gate,
            cancel,
        }
    }

    /// Tick at the poll interval until cancelled. The first tick is immediate.
    pub async fn run(self) {
        let sub = &self.subscription;
        info!(
            "Polling {} subscription {} ({}) every {:?}",
            sub.kind, sub.name, sub.id, sub.poll_interval
        );

        let mut ticker = interval(sub.poll_interval);
        // A slow cycle pushes the schedule back rather than bursting
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if self.poll_once().await == CycleOutcome::Discarded {
                        break;
                    }
                }
            }
        }

        info!("Stopped polling subscription {} ({})", sub.name, sub.id);
    }

    /// Run one cycle. Cycles of the same subscription are serialized.
    pub async fn poll_once(&self) -> CycleOutcome {
        let mut state = self.subscription.state.lock().await;
        if !self.gate.is_open() {
            return CycleOutcome::Discarded;
        }

        let watermark = match self.resolve_watermark(&mut state).await {
            Ok(Some(watermark)) => watermark,
            Ok(None) => return self.cold_start(&mut state).await,
            Err(err) => return self.fail(&mut state, err),
        };

        let now = Utc::now();
        let query = self.build_query(&state, watermark, now);
        debug!("Cycle for {} from {}", self.subscription.id, watermark);

        let page = match self.query(&query).await {
            Some(Ok(page)) => page,
            Some(Err(err)) => return self.fail(&mut state, err),
            None => return CycleOutcome::Discarded,
        };

        let candidate = self.next_watermark(&page, now);
        let fetched = page.transactions.len();
        let matching: Vec<_> = page
            .transactions
            .into_iter()
            .filter(|record| self.subscription.filter.matches(record))
            .collect();

        let sub = &self.subscription;
        let delivered = self.gate.with_open(|| {
            let novel = state.seen.compute_delta(matching);
            let advanced = match candidate {
                Some(candidate) => watermark.advance(candidate),
                None => watermark,
            };
            state.watermark = Some(advanced);

            let recovered = state.consecutive_failures >= self.settings.degraded_after_failures;
            state.consecutive_failures = 0;
            sub.record_failures(0);

            let delivered = novel.len();
            if !novel.is_empty() {
                sub.emit(SubscriptionEvent::Delta(DeltaBatch {
                    subscription_id: sub.id,
                    records: novel,
                    watermark: advanced,
                    produced_at: Utc::now(),
                }));
            }
            if recovered {
                self.signal_health(HealthStatus::Healthy);
            }
            (delivered, advanced)
        });

        let Some((delivered, advanced)) = delivered else {
            debug!("Discarding cycle result for stopped subscription {}", sub.id);
            return CycleOutcome::Discarded;
        };

        debug!(
            "Subscription {}: {} fetched, {} delivered, watermark {}",
            sub.id, fetched, delivered, advanced
        );
        self.persist(&mut state).await;

        CycleOutcome::Completed {
            delivered,
            watermark: advanced,
        }
    }

    /// In-memory position, else the persisted one
    async fn resolve_watermark(&self, state: &mut PollState) -> MonitorResult<Option<Watermark>> {
        if state.watermark.is_some() {
            return Ok(state.watermark);
        }

        // A store failure must not fall through to a cold start
        let stored = self.store.get(&self.subscription.id).await.map_err(|err| {
            error!("Failed to load watermark for {}: {}", self.subscription.id, err);
            err
        })?;

        if let Some(stored) = stored {
            info!("Resuming subscription {} from {}", self.subscription.id, stored);
            state.watermark = Some(stored);
            state.persisted = Some(stored);
        }
        Ok(stored)
    }

    /// Begin at the activation instant, without backfill
    async fn cold_start(&self, state: &mut PollState) -> CycleOutcome {
        let start = match self.settings.watermark_mode {
            WatermarkMode::Timestamp => Watermark::Timestamp(Utc::now()),
            WatermarkMode::Round => match self.query_round().await {
                Some(Ok(round)) => Watermark::Round(round + 1),
                Some(Err(err)) => return self.fail(state, err),
                None => return CycleOutcome::Discarded,
            },
        };

        let applied = self.gate.with_open(|| {
            state.watermark = Some(start);
            state.origin = Some(start);
        });
        if applied.is_none() {
            return CycleOutcome::Discarded;
        }

        info!("Subscription {} starts at {}", self.subscription.id, start);
        self.persist(state).await;
        CycleOutcome::Initialized(start)
    }

    fn build_query(&self, state: &PollState, watermark: Watermark, now: DateTime<Utc>) -> TransactionQuery {
        let mut lower = watermark.with_overlap(self.settings.overlap(), self.settings.overlap_rounds);
        if let Some(origin) = state.origin {
            lower = lower.advance(origin);
        }

        let query = self.subscription.filter.to_query();
        match lower {
            Watermark::Timestamp(after) => query.with_after_time(after).with_before_time(now),
            Watermark::Round(round) => query.with_min_round(round),
        }
    }

    /// Candidate position after a successful query
    fn next_watermark(&self, page: &TransactionPage, now: DateTime<Utc>) -> Option<Watermark> {
        let mode = self.settings.watermark_mode;
        let latest_record = page
            .transactions
            .iter()
            .filter_map(|record| record.position(mode))
            .reduce(Watermark::advance);

        if page.truncated {
            // Resume from where the page stopped, not from `now`
            return latest_record;
        }

        match mode {
            WatermarkMode::Timestamp => Some(Watermark::Timestamp(now)),
            WatermarkMode::Round => page
                .current_round
                .map(|round| Watermark::Round(round + 1))
                .or(latest_record),
        }
    }

    /// Bounded, cancellable ledger query. `None` if stopped meanwhile.
    async fn query(&self, query: &TransactionQuery) -> Option<Result<TransactionPage, QueryError>> {
        let timeout = self.settings.query_timeout();
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            result = tokio::time::timeout(timeout, self.client.search_transactions(query)) => {
                Some(result.unwrap_or(Err(QueryError::Timeout(timeout))))
            }
        }
    }

    async fn query_round(&self) -> Option<Result<u64, QueryError>> {
        let timeout = self.settings.query_timeout();
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            result = tokio::time::timeout(timeout, self.client.latest_round()) => {
                Some(result.unwrap_or(Err(QueryError::Timeout(timeout))))
            }
        }
    }

    fn fail(&self, state: &mut PollState, err: impl fmt::Display) -> CycleOutcome {
        let sub = &self.subscription;
        let threshold = self.settings.degraded_after_failures;

        let reported = self.gate.with_open(|| {
            state.consecutive_failures += 1;
            let failures = state.consecutive_failures;
            sub.record_failures(failures);

            warn!(
                "Query failed for subscription {} ({} consecutive): {}",
                sub.id, failures, err
            );
            sub.emit(SubscriptionEvent::QueryFailed {
                subscription_id: sub.id,
                error: err.to_string(),
                consecutive_failures: failures,
            });
            if failures == threshold {
                self.signal_health(HealthStatus::Degraded {
                    consecutive_failures: failures,
                });
            }
            failures
        });

        match reported {
            Some(consecutive_failures) => CycleOutcome::Failed { consecutive_failures },
            None => CycleOutcome::Discarded,
        }
    }

    fn signal_health(&self, status: HealthStatus) {
        let signal = HealthSignal {
            subscription_id: self.subscription.id,
            status,
            at: Utc::now(),
        };
        match status {
            HealthStatus::Degraded { consecutive_failures } => warn!(
                "Subscription {} degraded after {} consecutive failures",
                self.subscription.id, consecutive_failures
            ),
            HealthStatus::Healthy => info!("Subscription {} recovered", self.subscription.id),
        }
        self.subscription.emit(SubscriptionEvent::Health(signal.clone()));
        let _ = self.health.send(signal);
    }

    /// Write the in-memory position if it moved. A failed write is retried
    /// on the next successful cycle.
    async fn persist(&self, state: &mut PollState) {
        let Some(watermark) = state.watermark else {
            return;
        };
        if state.persisted == Some(watermark) {
            return;
        }

        match self.store.set(&self.subscription.id, watermark).await {
            Ok(()) => state.persisted = Some(watermark),
            Err(err) => error!(
                "Failed to persist watermark for {}: {}",
                self.subscription.id, err
            ),
        }
    }
}
