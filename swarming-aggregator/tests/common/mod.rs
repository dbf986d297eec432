#![allow(dead_code)]

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use swarming_aggregator::{AgentRow, Aggregator, AggregatorConfig, BookingTracking};
use swarming_core::{Agent, AgentId, BookingStatus, CounterKind, Item, MemoryGateway};
use uuid::Uuid;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn element(id: u32, host: AgentId, swarmable: bool) -> Item {
    Item::element(1, id, format!("element-{}", id), host, swarmable)
}

/// Creates a confirmed booking on `host` ending in one hour.
pub fn booking(host: AgentId) -> Item {
    let now = Utc::now();
    Item::booking(
        Uuid::new_v4(),
        "booking",
        host,
        BookingStatus::Confirmed,
        now,
        now + ChronoDuration::hours(1),
    )
}

pub fn elements_config() -> AggregatorConfig {
    AggregatorConfig {
        bookings: BookingTracking::Disabled,
        ..Default::default()
    }
}

/// Creates a two-agent cluster with the given items
pub fn create_cluster(items: Vec<Item>) -> Arc<MemoryGateway> {
    Arc::new(MemoryGateway::with_cluster(
        vec![Agent::healthy(1, "dma-1"), Agent::healthy(2, "dma-2")],
        items,
    ))
}

pub fn create_aggregator(
    gateway: &Arc<MemoryGateway>,
    config: AggregatorConfig,
) -> Arc<Aggregator<MemoryGateway>> {
    Arc::new(Aggregator::new(gateway.clone(), config))
}

pub fn count(rows: &[AgentRow], agent_id: AgentId, kind: CounterKind) -> u64 {
    rows.iter()
        .find(|row| row.agent_id == agent_id)
        .map(|row| row.count(kind))
        .unwrap_or(0)
}

/// Waits until the aggregator has opened its subscription.
pub async fn wait_for_subscription(gateway: &MemoryGateway) {
    for _ in 0..200 {
        if gateway.subscriber_count() > 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("aggregator never subscribed");
}

/// Polls until the counter of `agent_id` reaches `expected`.
pub async fn wait_for_count(
    aggregator: &Aggregator<MemoryGateway>,
    agent_id: AgentId,
    kind: CounterKind,
    expected: u64,
) {
    for _ in 0..200 {
        let current = aggregator
            .get_row(agent_id)
            .await
            .map(|row| row.count(kind))
            .unwrap_or(0);
        if current == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!(
        "counter {} of agent {} never reached {}",
        kind, agent_id, expected
    );
}
