use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::agent::AgentId;

/// Identity of a movable resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemId {
    Element { dataminer_id: u32, element_id: u32 },
    Booking(Uuid),
}

impl ItemId {
    pub fn element(dataminer_id: u32, element_id: u32) -> Self {
        ItemId::Element {
            dataminer_id,
            element_id,
        }
    }

    pub fn kind(&self) -> ItemKind {
        match self {
            ItemId::Element { .. } => ItemKind::Element,
            ItemId::Booking(_) => ItemKind::Booking,
        }
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemId::Element {
                dataminer_id,
                element_id,
            } => write!(f, "{}/{}", dataminer_id, element_id),
            ItemId::Booking(id) => write!(f, "{}", id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Element,
    Booking,
}

/// Counter category an item contributes to in the per-agent counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterKind {
    Bookings,
    SwarmableElements,
    NonSwarmableElements,
}

impl fmt::Display for CounterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CounterKind::Bookings => write!(f, "bookings"),
            CounterKind::SwarmableElements => write!(f, "swarmable_elements"),
            CounterKind::NonSwarmableElements => write!(f, "non_swarmable_elements"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Ongoing,
    Ended,
    Canceled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingInfo {
    pub status: BookingStatus,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// A movable resource hosted by one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    pub host_agent_id: AgentId,
    /// Whether the platform allows this item to be moved at all.
    pub swarmable: bool,
    pub booking: Option<BookingInfo>,
}

impl Item {
    pub fn element(
        dataminer_id: u32,
        element_id: u32,
        name: impl Into<String>,
        host_agent_id: AgentId,
        swarmable: bool,
    ) -> Self {
        Item {
            id: ItemId::element(dataminer_id, element_id),
            name: name.into(),
            host_agent_id,
            swarmable,
            booking: None,
        }
    }

    pub fn booking(
        id: Uuid,
        name: impl Into<String>,
        host_agent_id: AgentId,
        status: BookingStatus,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Item {
            id: ItemId::Booking(id),
            name: name.into(),
            host_agent_id,
            swarmable: true,
            booking: Some(BookingInfo { status, start, end }),
        }
    }

    pub fn kind(&self) -> ItemKind {
        self.id.kind()
    }

    pub fn counter(&self) -> CounterKind {
        match (self.kind(), self.swarmable) {
            (ItemKind::Booking, _) => CounterKind::Bookings,
            (ItemKind::Element, true) => CounterKind::SwarmableElements,
            (ItemKind::Element, false) => CounterKind::NonSwarmableElements,
        }
    }

    /// Bookings are active when they end in the future and are not canceled.
    /// Elements are always active.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        match &self.booking {
            Some(info) => info.end > now && info.status != BookingStatus::Canceled,
            None => true,
        }
    }

    /// A booking that is currently running must stay where it is.
    pub fn is_ongoing(&self) -> bool {
        matches!(&self.booking, Some(info) if info.status == BookingStatus::Ongoing)
    }
}

/// Selection of items for snapshot queries and per-agent counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFilter {
    pub kind: ItemKind,
    pub active_only: bool,
}

impl ItemFilter {
    pub fn elements() -> Self {
        ItemFilter {
            kind: ItemKind::Element,
            active_only: false,
        }
    }

    pub fn active_bookings() -> Self {
        ItemFilter {
            kind: ItemKind::Booking,
            active_only: true,
        }
    }

    pub fn matches(&self, item: &Item, now: DateTime<Utc>) -> bool {
        item.kind() == self.kind && (!self.active_only || item.is_active(now))
    }
}
