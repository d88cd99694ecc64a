//! Subscription manager
//!
//! Sole owner of every polling task. Lifecycle calls are synchronous so that
//! `active_count` never lags behind a start or stop.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::poller::Poller;
use super::subscription::{DeliveryGate, Subscription, SubscriptionInfo};
use crate::config::EngineSettings;
use crate::core::{
    HealthSignal, LedgerQueryPort, MonitorError, MonitorResult, SubscriptionEvent,
    SubscriptionId, SubscriptionKind, SubscriptionStatus, ValidationError, WatermarkStore,
};
use crate::domain::{Filter, FilterInput};

const MIN_POLL_INTERVAL_SECS: u64 = 1;
const MAX_POLL_INTERVAL_SECS: u64 = 3600;

/// A running poll task and the handles needed to stop it
struct Activation {
    gate: DeliveryGate,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Activation {
    /// After this returns, the task delivers nothing more
    fn deactivate(&self) {
        self.gate.close();
        self.cancel.cancel();
    }
}

struct Entry {
    subscription: Arc<Subscription>,
    activation: Option<Activation>,
    /// Tasks of stopped activations that may still be finishing a write
    draining: Vec<JoinHandle<()>>,
}

impl Entry {
    fn new(subscription: Arc<Subscription>) -> Self {
        Self {
            subscription,
            activation: None,
            draining: Vec::new(),
        }
    }

    /// Every task still attached to this entry, active or stopped
    fn take_tasks(&mut self) -> Vec<JoinHandle<()>> {
        let mut tasks = std::mem::take(&mut self.draining);
        if let Some(activation) = self.activation.take() {
            activation.deactivate();
            tasks.push(activation.handle);
        }
        tasks
    }

    fn status(&self) -> SubscriptionStatus {
        if self.activation.is_some() {
            SubscriptionStatus::Active
        } else {
            SubscriptionStatus::Inactive
        }
    }
}

/// Creates, starts, stops and removes subscriptions
pub struct SubscriptionManager {
    client: Arc<dyn LedgerQueryPort>,
    store: Arc<dyn WatermarkStore>,
    settings: Arc<EngineSettings>,
    entries: RwLock<HashMap<SubscriptionId, Entry>>,
    health: broadcast::Sender<HealthSignal>,
    /// Parent of every activation token
    shutdown: CancellationToken,
}

impl SubscriptionManager {
    pub fn new(
        client: Arc<dyn LedgerQueryPort>,
        store: Arc<dyn WatermarkStore>,
        settings: EngineSettings,
    ) -> Self {
        let (health, _) = broadcast::channel(settings.event_buffer.max(1));
        Self {
            client,
            store,
            settings: Arc::new(settings),
            entries: RwLock::new(HashMap::new()),
            health,
            shutdown: CancellationToken::new(),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<SubscriptionId, Entry>> {
        self.entries.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<SubscriptionId, Entry>> {
        self.entries.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Validate `input` and register an Inactive subscription under a fresh id.
    /// `poll_interval_secs` falls back to the engine default.
    pub fn create(
        &self,
        kind: SubscriptionKind,
        input: &FilterInput,
        poll_interval_secs: Option<u64>,
    ) -> MonitorResult<SubscriptionId> {
        self.register(SubscriptionId::new(), kind.as_str(), kind, input, poll_interval_secs)
    }

    /// Like [`create`](Self::create), but the id is derived from `name`, so a
    /// durable store resumes the subscription where a previous run left it.
    /// A name already registered fails with `AlreadyExists`.
    pub fn create_named(
        &self,
        name: &str,
        kind: SubscriptionKind,
        input: &FilterInput,
        poll_interval_secs: Option<u64>,
    ) -> MonitorResult<SubscriptionId> {
        self.register(SubscriptionId::from_name(name), name, kind, input, poll_interval_secs)
    }

    fn register(
        &self,
        id: SubscriptionId,
        name: &str,
        kind: SubscriptionKind,
        input: &FilterInput,
        poll_interval_secs: Option<u64>,
    ) -> MonitorResult<SubscriptionId> {
        let secs = poll_interval_secs.unwrap_or(self.settings.default_poll_interval_secs);
        if !(MIN_POLL_INTERVAL_SECS..=MAX_POLL_INTERVAL_SECS).contains(&secs) {
            return Err(ValidationError::InvalidPollInterval(secs).into());
        }
        let filter = Filter::from_input(kind, input)?;

        let subscription = Arc::new(Subscription::new(
            id,
            name,
            kind,
            filter,
            Duration::from_secs(secs),
            self.settings.seen_capacity,
            self.settings.event_buffer,
        ));

        {
            let mut entries = self.write();
            if entries.contains_key(&id) {
                return Err(MonitorError::AlreadyExists { id });
            }
            entries.insert(id, Entry::new(subscription));
        }

        info!("Created {} subscription {} ({})", kind, name, id);
        Ok(id)
    }

    /// Begin polling. Starting an Active subscription is a no-op.
    /// Must be called from within a Tokio runtime.
    pub fn start(&self, id: &SubscriptionId) -> MonitorResult<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| MonitorError::Configuration(format!("no Tokio runtime: {}", e)))?;
        if self.shutdown.is_cancelled() {
            return Err(MonitorError::Configuration("manager is shut down".into()));
        }

        let mut entries = self.write();
        let entry = entries
            .get_mut(id)
            .ok_or(MonitorError::NotFound { id: *id })?;
        if entry.activation.is_some() {
            debug!("Subscription {} already active", id);
            return Ok(());
        }

        let gate = DeliveryGate::open();
        let cancel = self.shutdown.child_token();
        let poller = Poller::new(
            entry.subscription.clone(),
            self.client.clone(),
            self.store.clone(),
            self.settings.clone(),
            self.health.clone(),
            gate.clone(),
            cancel.clone(),
        );
        let handle = runtime.spawn(poller.run());

        entry.activation = Some(Activation {
            gate,
            cancel,
            handle,
        });
        info!("Started subscription {}", id);
        Ok(())
    }

    /// Stop polling. Stopping an Inactive subscription is a no-op.
    ///
    /// No delivery starts after this returns. The watermark and seen ids are
    /// kept for the next start.
    pub fn stop(&self, id: &SubscriptionId) -> MonitorResult<()> {
        let mut entries = self.write();
        let entry = entries
            .get_mut(id)
            .ok_or(MonitorError::NotFound { id: *id })?;

        entry.draining.retain(|task| !task.is_finished());
        if let Some(activation) = entry.activation.take() {
            activation.deactivate();
            entry.draining.push(activation.handle);
            info!("Stopped subscription {}", id);
        }
        Ok(())
    }

    /// Stop if active, then discard the subscription and its watermark
    pub async fn remove(&self, id: &SubscriptionId) -> MonitorResult<()> {
        let mut entry = self
            .write()
            .remove(id)
            .ok_or(MonitorError::NotFound { id: *id })?;

        // Wait so no task, stopped or not, can persist after the removal below
        for task in entry.take_tasks() {
            task.abort();
            let _ = task.await;
        }

        self.store.remove(id).await?;
        info!("Removed subscription {}", id);
        Ok(())
    }

    /// Number of Active subscriptions
    pub fn active_count(&self) -> usize {
        self.read()
            .values()
            .filter(|entry| entry.activation.is_some())
            .count()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn status(&self, id: &SubscriptionId) -> MonitorResult<SubscriptionStatus> {
        self.read()
            .get(id)
            .map(Entry::status)
            .ok_or(MonitorError::NotFound { id: *id })
    }

    /// Deltas, query failures and health changes of one subscription
    pub fn subscribe(&self, id: &SubscriptionId) -> MonitorResult<broadcast::Receiver<SubscriptionEvent>> {
        self.read()
            .get(id)
            .map(|entry| entry.subscription.subscribe())
            .ok_or(MonitorError::NotFound { id: *id })
    }

    /// [`subscribe`](Self::subscribe) as a `Stream`
    pub fn subscribe_stream(&self, id: &SubscriptionId) -> MonitorResult<BroadcastStream<SubscriptionEvent>> {
        self.subscribe(id).map(BroadcastStream::new)
    }

    /// Degraded and recovered signals from every subscription
    pub fn health_events(&self) -> broadcast::Receiver<HealthSignal> {
        self.health.subscribe()
    }

    pub fn info(&self, id: &SubscriptionId) -> MonitorResult<SubscriptionInfo> {
        self.read()
            .get(id)
            .map(|entry| self.describe(entry))
            .ok_or(MonitorError::NotFound { id: *id })
    }

    /// Every subscription, oldest first
    pub fn list(&self) -> Vec<SubscriptionInfo> {
        let mut infos: Vec<SubscriptionInfo> =
            self.read().values().map(|entry| self.describe(entry)).collect();
        infos.sort_by_key(|info| info.created_at);
        infos
    }

    fn describe(&self, entry: &Entry) -> SubscriptionInfo {
        let sub = &entry.subscription;
        SubscriptionInfo {
            id: sub.id,
            name: sub.name.clone(),
            kind: sub.kind,
            filter: sub.filter.clone(),
            poll_interval_secs: sub.poll_interval.as_secs(),
            status: entry.status(),
            created_at: sub.created_at,
            health: sub.health(self.settings.degraded_after_failures),
            consecutive_failures: sub.consecutive_failures(),
        }
    }

    /// Stop every subscription and wait for the tasks to finish, aborting
    /// any that outlive the shutdown timeout
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let handles: Vec<JoinHandle<()>> = self
            .write()
            .values_mut()
            .flat_map(Entry::take_tasks)
            .collect();

        if handles.is_empty() {
            return;
        }

        let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();
        let count = handles.len();
        let timeout = self.settings.shutdown_timeout();
        if tokio::time::timeout(timeout, futures::future::join_all(handles))
            .await
            .is_err()
        {
            warn!("Poll tasks still running after {:?}; aborting", timeout);
            aborts.iter().for_each(|abort| abort.abort());
        }

        info!("Shut down {} poll tasks", count);
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        self.shutdown.cancel();
        let entries = self
            .entries
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for task in entries.values_mut().flat_map(Entry::take_tasks) {
            task.abort();
        }
    }
}
