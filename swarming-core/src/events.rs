use futures::stream::Stream;
use futures::StreamExt;
use std::task::{Context, Poll};
use std::{fmt, pin::Pin};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use crate::agent::Agent;
use crate::errors::Result;
use crate::item::{Item, ItemId, ItemKind};

/// Event categories a subscription can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    AgentInfo,
    Elements,
    Bookings,
}

impl From<ItemKind> for EventKind {
    fn from(kind: ItemKind) -> Self {
        match kind {
            ItemKind::Element => EventKind::Elements,
            ItemKind::Booking => EventKind::Bookings,
        }
    }
}

/// A change pushed by the platform.
///
/// An upsert carries the full current state of the item; whether it is a first
/// sighting, a migration or a no-op is decided by the consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterEvent {
    AgentInfo(Agent),
    ItemUpserted(Item),
    ItemDeleted(ItemId),
}

impl ClusterEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ClusterEvent::AgentInfo(_) => EventKind::AgentInfo,
            ClusterEvent::ItemUpserted(item) => item.kind().into(),
            ClusterEvent::ItemDeleted(id) => id.kind().into(),
        }
    }
}

impl fmt::Display for ClusterEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterEvent::AgentInfo(agent) => write!(f, "AgentInfo(agent: {})", agent),
            ClusterEvent::ItemUpserted(item) => write!(
                f,
                "ItemUpserted(item: {}, host: {})",
                item.id, item.host_agent_id
            ),
            ClusterEvent::ItemDeleted(id) => write!(f, "ItemDeleted(item: {})", id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        SubscriptionId(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Live event feed of one subscription. Ends when the subscription is cancelled.
pub struct EventStream {
    id: SubscriptionId,
    inner: Pin<Box<dyn Stream<Item = Result<ClusterEvent>> + Send>>,
}

impl Stream for EventStream {
    type Item = Result<ClusterEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl EventStream {
    pub fn new(
        id: SubscriptionId,
        stream: impl Stream<Item = Result<ClusterEvent>> + Send + 'static,
    ) -> Self {
        Self {
            id,
            inner: Box::pin(stream),
        }
    }

    /// Create an EventStream from an unbounded channel receiver.
    pub fn from_channel(id: SubscriptionId, rx: mpsc::UnboundedReceiver<ClusterEvent>) -> Self {
        let stream = UnboundedReceiverStream::new(rx).map(Ok);
        Self::new(id, stream)
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream").field("id", &self.id).finish()
    }
}
