use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::trace;

use crate::agent::{Agent, AgentId};
use crate::errors::{GatewayError, Result};
use crate::events::{ClusterEvent, EventKind, EventStream, SubscriptionId};
use crate::gateway::{ClusterGateway, MoveResult};
use crate::item::{Item, ItemFilter, ItemId};

#[derive(Debug)]
struct Subscriber {
    kinds: Vec<EventKind>,
    tx: mpsc::UnboundedSender<ClusterEvent>,
}

/// MemoryGateway is an in-process cluster that implements the ClusterGateway trait.
/// Every mutation is pushed to the matching subscribers, like the platform would.
/// SHOULD BE USED ONLY FOR TESTING PURPOSES
#[derive(Debug, Clone)]
pub struct MemoryGateway {
    agents: Arc<DashMap<AgentId, Agent>>,
    items: Arc<DashMap<ItemId, Item>>,
    subscribers: Arc<DashMap<SubscriptionId, Subscriber>>,
    move_failures: Arc<DashMap<ItemId, String>>,
    unacknowledged_moves: Arc<DashMap<ItemId, ()>>,
    // snapshot fetches wait while this is false
    fetch_gate: Arc<watch::Sender<bool>>,
    subscribe_gate: Arc<watch::Sender<bool>>,
    fetch_error: Arc<Mutex<Option<String>>>,
    count_calls: Arc<AtomicUsize>,
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGateway {
    pub fn new() -> Self {
        let (fetch_gate, _) = watch::channel(true);
        let (subscribe_gate, _) = watch::channel(true);
        MemoryGateway {
            agents: Arc::new(DashMap::new()),
            items: Arc::new(DashMap::new()),
            subscribers: Arc::new(DashMap::new()),
            move_failures: Arc::new(DashMap::new()),
            unacknowledged_moves: Arc::new(DashMap::new()),
            fetch_gate: Arc::new(fetch_gate),
            subscribe_gate: Arc::new(subscribe_gate),
            fetch_error: Arc::new(Mutex::new(None)),
            count_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Build a cluster from agents and items without emitting events.
    pub fn with_cluster(agents: Vec<Agent>, items: Vec<Item>) -> Self {
        let gateway = Self::new();
        for agent in agents {
            gateway.agents.insert(agent.id, agent);
        }
        for item in items {
            gateway.items.insert(item.id, item);
        }
        gateway
    }

    pub fn upsert_agent(&self, agent: Agent) {
        self.agents.insert(agent.id, agent.clone());
        self.publish(ClusterEvent::AgentInfo(agent));
    }

    pub fn upsert_item(&self, item: Item) {
        self.items.insert(item.id, item.clone());
        self.publish(ClusterEvent::ItemUpserted(item));
    }

    pub fn delete_item(&self, id: ItemId) {
        if self.items.remove(&id).is_some() {
            self.publish(ClusterEvent::ItemDeleted(id));
        }
    }

    /// Push an event to the subscribers without touching the stored cluster.
    pub fn publish(&self, event: ClusterEvent) {
        let kind = event.kind();
        for entry in self.subscribers.iter() {
            if entry.value().kinds.contains(&kind) {
                let _ = entry.value().tx.send(event.clone());
            }
        }
    }

    /// Make every later move of `id` fail with `message`.
    pub fn fail_move(&self, id: ItemId, message: impl Into<String>) {
        self.move_failures.insert(id, message.into());
    }

    /// Move `id` when asked but leave it out of the returned results.
    pub fn skip_move_result(&self, id: ItemId) {
        self.unacknowledged_moves.insert(id, ());
    }

    /// Block snapshot fetches until [`MemoryGateway::release_fetches`] is called.
    pub fn hold_fetches(&self) {
        self.fetch_gate.send_replace(false);
    }

    pub fn release_fetches(&self) {
        self.fetch_gate.send_replace(true);
    }

    /// Block new subscriptions until [`MemoryGateway::release_subscriptions`] is called.
    pub fn hold_subscriptions(&self) {
        self.subscribe_gate.send_replace(false);
    }

    pub fn release_subscriptions(&self) {
        self.subscribe_gate.send_replace(true);
    }

    /// Make snapshot fetches fail (`Some`) or succeed again (`None`).
    pub async fn set_fetch_error(&self, error: Option<String>) {
        *self.fetch_error.lock().await = error;
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn count_calls(&self) -> usize {
        self.count_calls.load(Ordering::SeqCst)
    }

    pub fn item(&self, id: &ItemId) -> Option<Item> {
        self.items.get(id).map(|item| item.clone())
    }

    pub fn items_on(&self, agent_id: AgentId) -> Vec<Item> {
        let mut items: Vec<Item> = self
            .items
            .iter()
            .filter(|entry| entry.value().host_agent_id == agent_id)
            .map(|entry| entry.value().clone())
            .collect();
        items.sort_by_key(|item| item.id);
        items
    }

    async fn before_fetch(&self) -> Result<()> {
        let mut gate = self.fetch_gate.subscribe();
        gate.wait_for(|open| *open)
            .await
            .map_err(|_| GatewayError::TransportError("fetch gate closed".to_string()))?;

        match self.fetch_error.lock().await.as_ref() {
            Some(message) => Err(GatewayError::TransportError(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ClusterGateway for MemoryGateway {
    async fn fetch_agents(&self) -> Result<Vec<Agent>> {
        self.before_fetch().await?;
        let mut agents: Vec<Agent> = self.agents.iter().map(|a| a.value().clone()).collect();
        agents.sort();
        Ok(agents)
    }

    async fn fetch_items(&self, filter: ItemFilter) -> Result<Vec<Item>> {
        self.before_fetch().await?;
        let now = Utc::now();
        let mut items: Vec<Item> = self
            .items
            .iter()
            .filter(|entry| filter.matches(entry.value(), now))
            .map(|entry| entry.value().clone())
            .collect();
        items.sort_by_key(|item| item.id);
        Ok(items)
    }

    async fn subscribe(&self, kinds: &[EventKind]) -> Result<EventStream> {
        let mut gate = self.subscribe_gate.subscribe();
        gate.wait_for(|open| *open)
            .await
            .map_err(|_| GatewayError::TransportError("subscribe gate closed".to_string()))?;

        let id = SubscriptionId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.insert(
            id,
            Subscriber {
                kinds: kinds.to_vec(),
                tx,
            },
        );
        trace!(subscription_id = %id, "memory gateway subscription opened");
        Ok(EventStream::from_channel(id, rx))
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        // dropping the sender ends the stream
        self.subscribers.remove(&id);
        Ok(())
    }

    async fn count_items(&self, agent_id: AgentId, filter: ItemFilter) -> Result<usize> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        Ok(self
            .items
            .iter()
            .filter(|entry| {
                entry.value().host_agent_id == agent_id && filter.matches(entry.value(), now)
            })
            .count())
    }

    async fn move_items(&self, items: &[ItemId], target: AgentId) -> Result<Vec<MoveResult>> {
        if !self.agents.contains_key(&target) {
            return Err(GatewayError::UnknownAgent(target));
        }

        let mut results = Vec::with_capacity(items.len());
        for id in items {
            if let Some(message) = self.move_failures.get(id) {
                results.push(MoveResult::failed(*id, message.value().clone()));
                continue;
            }

            let moved = match self.items.get_mut(id) {
                Some(mut item) => {
                    item.host_agent_id = target;
                    Some(item.clone())
                }
                None => None,
            };

            match moved {
                Some(item) => {
                    self.publish(ClusterEvent::ItemUpserted(item));
                    if !self.unacknowledged_moves.contains_key(id) {
                        results.push(MoveResult::succeeded(*id));
                    }
                }
                None => results.push(MoveResult::failed(*id, "item not found")),
            }
        }
        Ok(results)
    }
}
