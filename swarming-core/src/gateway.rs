use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::agent::{Agent, AgentId};
use crate::errors::Result;
use crate::events::{EventKind, EventStream, SubscriptionId};
use crate::item::{Item, ItemFilter, ItemId};

/// Outcome of moving one item, as acknowledged by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveResult {
    pub item_id: ItemId,
    pub success: bool,
    pub message: Option<String>,
}

impl MoveResult {
    pub fn succeeded(item_id: ItemId) -> Self {
        MoveResult {
            item_id,
            success: true,
            message: None,
        }
    }

    pub fn failed(item_id: ItemId, message: impl Into<String>) -> Self {
        MoveResult {
            item_id,
            success: false,
            message: Some(message.into()),
        }
    }
}

/// Access to the cluster platform: snapshots, change events and move commands.
#[async_trait]
pub trait ClusterGateway: Send + Sync + 'static {
    async fn fetch_agents(&self) -> Result<Vec<Agent>>;
    async fn fetch_items(&self, filter: ItemFilter) -> Result<Vec<Item>>;

    /// Open a live feed restricted to the given event kinds.
    async fn subscribe(&self, kinds: &[EventKind]) -> Result<EventStream>;
    async fn unsubscribe(&self, id: SubscriptionId) -> Result<()>;

    /// Number of items matching `filter` currently hosted by `agent_id`.
    async fn count_items(&self, agent_id: AgentId, filter: ItemFilter) -> Result<usize>;

    /// Ask the platform to move `items` to `target`. One result per requested item.
    async fn move_items(&self, items: &[ItemId], target: AgentId) -> Result<Vec<MoveResult>>;
}
