#![allow(dead_code)]

use chrono::{Duration, Utc};
use std::sync::Arc;
use swarming_core::{Agent, AgentId, BookingStatus, Item, MemoryGateway};
use uuid::Uuid;

/// Creates `count` swarmable elements hosted on `host`, numbered from `first_id`.
pub fn swarmable_elements(host: AgentId, first_id: u32, count: u32) -> Vec<Item> {
    (first_id..first_id + count)
        .map(|id| Item::element(1, id, format!("element-{}", id), host, true))
        .collect()
}

pub fn fixed_elements(host: AgentId, first_id: u32, count: u32) -> Vec<Item> {
    (first_id..first_id + count)
        .map(|id| Item::element(1, id, format!("fixed-{}", id), host, false))
        .collect()
}

/// Creates a booking on `host` ending in one hour.
pub fn booking(host: AgentId, status: BookingStatus) -> Item {
    let now = Utc::now();
    Item::booking(
        Uuid::new_v4(),
        "booking",
        host,
        status,
        now - Duration::minutes(10),
        now + Duration::hours(1),
    )
}

pub fn agents(ids: &[AgentId]) -> Vec<Agent> {
    ids.iter()
        .map(|id| Agent::healthy(*id, format!("dma-{}", id)))
        .collect()
}

/// Creates an in-memory cluster with the given agents and items
pub fn create_cluster(agents: Vec<Agent>, items: Vec<Item>) -> Arc<MemoryGateway> {
    Arc::new(MemoryGateway::with_cluster(agents, items))
}

pub fn sizes(gateway: &MemoryGateway, ids: &[AgentId]) -> Vec<usize> {
    ids.iter().map(|id| gateway.items_on(*id).len()).collect()
}
