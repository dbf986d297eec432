use futures::StreamExt;
use metrics::counter;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use swarming_core::{
    Agent, AgentId, ClusterEvent, ClusterGateway, EventKind, EventStream, Item, ItemFilter,
    SubscriptionId,
};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::aggregator_metrics::{
    EVENTS_APPLIED_TOTAL, EVENTS_DISCARDED_TOTAL, EVENTS_QUEUED_TOTAL, RECOUNTS_TOTAL,
    SNAPSHOT_FAILURES_TOTAL,
};
use crate::cache_state::CacheState;
use crate::config::{AggregatorConfig, BookingTracking};
use crate::errors::{AggregatorError, Result};
use crate::recount::{debounce, RecountTrigger};
use crate::row::{AgentRow, RowChange};

/// Lifecycle of one aggregation cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Not started yet
    Created,
    /// Subscribed, snapshot in flight, events are buffered
    Initializing,
    /// Snapshot applied, events are applied as they arrive
    Live,
    /// Torn down, events are discarded
    Stopped,
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionState::Created => write!(f, "created"),
            SubscriptionState::Initializing => write!(f, "initializing"),
            SubscriptionState::Live => write!(f, "live"),
            SubscriptionState::Stopped => write!(f, "stopped"),
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: SubscriptionState,
    cache: CacheState,
    pending: VecDeque<ClusterEvent>,
    subscription: Option<SubscriptionId>,
}

/// State reachable from the background tasks.
#[derive(Debug)]
struct Shared {
    inner: Mutex<Inner>,
    changes: broadcast::Sender<RowChange>,
    recount: RecountTrigger,
    debounce_bookings: bool,
}

struct Snapshot {
    agents: Vec<Agent>,
    items: Vec<Item>,
    booking_counts: Option<Vec<(AgentId, u64)>>,
}

/// Live per-agent counts kept in sync with the cluster.
///
/// ## Purpose:
/// Maintain one [`AgentRow`] per agent while items are created, deleted and moved, starting
/// from a snapshot that is fetched while events keep arriving.
///
/// ## Process:
/// 1. `start` subscribes first, so no event can fall between the snapshot and the feed.
/// 2. Events received while the snapshot is in flight are queued in arrival order.
/// 3. The snapshot is applied, the queue replayed and the cache marked live in a single
///    lock hold. Events already reflected in the snapshot are no-ops on replay.
/// 4. From then on every event is applied immediately and the resulting changes published.
///
/// With [`BookingTracking::Debounced`], booking events only mark the counts stale; a
/// single timer recounts bookings per agent once the events have been quiet for the
/// configured delay.
pub struct Aggregator<G: ClusterGateway> {
    gateway: Arc<G>,
    config: AggregatorConfig,
    shared: Arc<Shared>,
    recount_rx: Mutex<Option<mpsc::UnboundedReceiver<()>>>,
    cancel: CancellationToken,
}

impl<G: ClusterGateway> Aggregator<G> {
    pub fn new(gateway: Arc<G>, config: AggregatorConfig) -> Self {
        let (changes, _) = broadcast::channel(config.change_channel_capacity.max(1));
        let (recount, recount_rx) = RecountTrigger::new();

        let shared = Shared {
            inner: Mutex::new(Inner {
                state: SubscriptionState::Created,
                cache: CacheState::new(&config),
                pending: VecDeque::new(),
                subscription: None,
            }),
            changes,
            recount,
            debounce_bookings: config.debounces_bookings(),
        };

        Aggregator {
            gateway,
            config,
            shared: Arc::new(shared),
            recount_rx: Mutex::new(Some(recount_rx)),
            cancel: CancellationToken::new(),
        }
    }

    /// Subscribe, load the snapshot and go live. Returns the rows as of going live.
    ///
    /// A failed or empty snapshot cancels the subscription and leaves the cache
    /// `Initializing`; the instance refuses to start again and a new one has to be created.
    pub async fn start(&self) -> Result<Vec<AgentRow>> {
        {
            let mut inner = self.shared.inner.lock().await;
            if inner.state != SubscriptionState::Created {
                return Err(AggregatorError::InvalidState(inner.state));
            }
            inner.state = SubscriptionState::Initializing;
        }

        let stream = self.gateway.subscribe(&self.config.event_kinds()).await?;
        {
            let mut inner = self.shared.inner.lock().await;
            if inner.state != SubscriptionState::Initializing {
                drop(inner);
                self.release(Some(stream.id())).await;
                return Err(AggregatorError::Stopped);
            }
            inner.subscription = Some(stream.id());
        }
        info!(subscription_id = %stream.id(), "aggregation cache subscribed");

        tokio::spawn(pump_events(
            self.shared.clone(),
            stream,
            self.cancel.clone(),
        ));
        if self.config.debounces_bookings() {
            self.spawn_recount_timer().await;
        }

        let snapshot = match self.fetch_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "snapshot fetch failed, cache stays initializing");
                counter!(SNAPSHOT_FAILURES_TOTAL.name).increment(1);
                self.cancel.cancel();
                let subscription = {
                    let mut inner = self.shared.inner.lock().await;
                    inner.pending.clear();
                    inner.subscription.take()
                };
                self.release(subscription).await;
                return Err(e);
            }
        };

        let mut inner = self.shared.inner.lock().await;
        if inner.state != SubscriptionState::Initializing {
            return Err(AggregatorError::Stopped);
        }

        inner.cache.apply_snapshot(&snapshot.agents, &snapshot.items);
        if let Some(counts) = &snapshot.booking_counts {
            inner.cache.apply_booking_counts(counts);
        }

        let mut replayed = 0usize;
        let mut bookings_touched = false;
        while let Some(event) = inner.pending.pop_front() {
            if self.shared.is_debounced(&event) {
                bookings_touched = true;
                continue;
            }
            inner.cache.apply_event(&event);
            replayed += 1;
        }

        inner.state = SubscriptionState::Live;
        let rows = inner.cache.rows();
        drop(inner);

        counter!(EVENTS_APPLIED_TOTAL.name).increment(replayed as u64);
        if bookings_touched {
            self.shared.recount.request();
        }
        info!(agents = rows.len(), replayed, "aggregation cache is live");
        Ok(rows)
    }

    /// Cancel the subscription and the recount timer, and clear every row.
    pub async fn stop(&self) {
        let subscription = {
            let mut inner = self.shared.inner.lock().await;
            if inner.state == SubscriptionState::Stopped {
                return;
            }
            inner.state = SubscriptionState::Stopped;
            inner.cache.clear();
            inner.pending.clear();
            inner.subscription.take()
        };

        self.cancel.cancel();
        self.release(subscription).await;
        info!("aggregation cache stopped");
    }

    async fn release(&self, subscription: Option<SubscriptionId>) {
        if let Some(id) = subscription {
            if let Err(e) = self.gateway.unsubscribe(id).await {
                warn!(subscription_id = %id, error = %e, "failed to cancel the subscription");
            }
        }
    }

    pub async fn state(&self) -> SubscriptionState {
        self.shared.inner.lock().await.state
    }

    pub async fn get_row(&self, agent_id: AgentId) -> Option<AgentRow> {
        self.shared.inner.lock().await.cache.row(agent_id).cloned()
    }

    pub async fn get_all_rows(&self) -> Vec<AgentRow> {
        self.shared.inner.lock().await.cache.rows()
    }

    /// Row changes published while the cache is live.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<RowChange> {
        self.shared.changes.subscribe()
    }

    async fn spawn_recount_timer(&self) {
        let Some(rx) = self.recount_rx.lock().await.take() else {
            return;
        };
        let shared = self.shared.clone();
        let gateway = self.gateway.clone();

        tokio::spawn(debounce(
            rx,
            self.config.recount_delay(),
            self.cancel.clone(),
            move || {
                let shared = shared.clone();
                let gateway = gateway.clone();
                async move { shared.recount_bookings(gateway.as_ref()).await }
            },
        ));
    }

    async fn fetch_snapshot(&self) -> Result<Snapshot> {
        let agents = self.gateway.fetch_agents().await?;
        if agents.is_empty() {
            return Err(AggregatorError::EmptySnapshot);
        }

        let mut items = Vec::new();
        if self.config.track_elements {
            items.extend(self.gateway.fetch_items(ItemFilter::elements()).await?);
        }

        let mut booking_counts = None;
        match self.config.bookings {
            BookingTracking::Disabled => {}
            BookingTracking::Incremental => {
                items.extend(self.gateway.fetch_items(ItemFilter::active_bookings()).await?);
            }
            BookingTracking::Debounced => {
                let bookings = self
                    .gateway
                    .fetch_items(ItemFilter::active_bookings())
                    .await?;
                let mut counts: BTreeMap<AgentId, u64> =
                    agents.iter().map(|agent| (agent.id, 0)).collect();
                for booking in &bookings {
                    *counts.entry(booking.host_agent_id).or_insert(0) += 1;
                }
                booking_counts = Some(counts.into_iter().collect());
            }
        }

        debug!(agents = agents.len(), items = items.len(), "snapshot fetched");
        Ok(Snapshot {
            agents,
            items,
            booking_counts,
        })
    }
}

impl<G: ClusterGateway> Drop for Aggregator<G> {
    fn drop(&mut self) {
        self.cancel.cancel();

        // The unsubscribe has to await, so it runs on the current runtime if there is one.
        let subscription = match self.shared.inner.try_lock() {
            Ok(mut inner) => inner.subscription.take(),
            Err(_) => None,
        };
        if let (Some(id), Ok(handle)) = (subscription, Handle::try_current()) {
            let gateway = self.gateway.clone();
            handle.spawn(async move {
                if let Err(e) = gateway.unsubscribe(id).await {
                    warn!(subscription_id = %id, error = %e, "failed to cancel the subscription");
                }
            });
        }
    }
}

impl Shared {
    fn is_debounced(&self, event: &ClusterEvent) -> bool {
        self.debounce_bookings && event.kind() == EventKind::Bookings
    }

    async fn on_event(&self, event: ClusterEvent) {
        let mut inner = self.inner.lock().await;
        match inner.state {
            SubscriptionState::Initializing => {
                inner.pending.push_back(event);
                counter!(EVENTS_QUEUED_TOTAL.name).increment(1);
            }
            SubscriptionState::Live => {
                if self.is_debounced(&event) {
                    self.recount.request();
                    return;
                }
                let changes = inner.cache.apply_event(&event);
                counter!(EVENTS_APPLIED_TOTAL.name).increment(1);
                self.publish(changes);
            }
            SubscriptionState::Created | SubscriptionState::Stopped => {
                trace!(event = %event, state = %inner.state, "event discarded");
                counter!(EVENTS_DISCARDED_TOTAL.name).increment(1);
            }
        }
    }

    fn publish(&self, changes: Vec<RowChange>) {
        for change in changes {
            // no receiver is not an error
            let _ = self.changes.send(change);
        }
    }

    /// Query the active booking count of every agent and commit what changed.
    ///
    /// The queries run without holding the lock; the results are dropped if the cache
    /// stopped meanwhile.
    async fn recount_bookings<G: ClusterGateway>(&self, gateway: &G) {
        if !self.recount.take_dirty() {
            return;
        }

        let agent_ids = {
            let inner = self.inner.lock().await;
            if inner.state != SubscriptionState::Live {
                return;
            }
            inner.cache.agent_ids()
        };

        let mut counts = Vec::with_capacity(agent_ids.len());
        for agent_id in agent_ids {
            match gateway
                .count_items(agent_id, ItemFilter::active_bookings())
                .await
            {
                Ok(count) => counts.push((agent_id, count as u64)),
                Err(e) => warn!(agent_id, error = %e, "booking recount failed"),
            }
        }

        let mut inner = self.inner.lock().await;
        if inner.state != SubscriptionState::Live {
            debug!("booking recount discarded, cache no longer live");
            return;
        }
        let changes = inner.cache.apply_booking_counts(&counts);
        counter!(RECOUNTS_TOTAL.name).increment(1);
        debug!(changed = changes.len(), "booking recount committed");
        self.publish(changes);
    }
}

async fn pump_events(shared: Arc<Shared>, mut stream: EventStream, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            next = stream.next() => match next {
                Some(Ok(event)) => shared.on_event(event).await,
                Some(Err(e)) => warn!(error = %e, "event stream error"),
                None => {
                    info!("event stream closed");
                    break;
                }
            },
        }
    }
}
