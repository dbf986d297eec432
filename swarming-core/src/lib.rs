//! Swarming core: the cluster model shared by the planner and the aggregation cache.
//!
//! Agents host items (elements and bookings). The platform is reached through the
//! [`ClusterGateway`] trait, which supplies snapshots and change events and accepts
//! move commands. [`MemoryGateway`] is an in-process implementation for tests.

mod agent;
pub use agent::{Agent, AgentHealth, AgentId};

mod errors;
pub use errors::{GatewayError, Result};

mod item;
pub use item::{BookingInfo, BookingStatus, CounterKind, Item, ItemFilter, ItemId, ItemKind};

mod events;
pub use events::{ClusterEvent, EventKind, EventStream, SubscriptionId};

mod gateway;
pub use gateway::{ClusterGateway, MoveResult};

mod memory_gateway;
pub use memory_gateway::MemoryGateway;
