//! Aggregation cache lifecycle against the in-memory cluster: snapshot, replay, live
//! updates, teardown and the debounced booking recount.

mod common;

use common::{
    booking, count, create_aggregator, create_cluster, element, elements_config, init_tracing,
    wait_for_count, wait_for_subscription,
};
use std::time::Duration;
use swarming_aggregator::{
    AgentState, AggregatorConfig, AggregatorError, BookingTracking, RowChange, SubscriptionState,
};
use swarming_core::{Agent, ClusterEvent, CounterKind, ItemId};

/// **Test:** Snapshot becomes the initial rows
///
/// **Reason:** The consumer renders the rows returned by `start`.
///
/// **Expectation:** Both agents have a row with their swarmable and non-swarmable counts, and the
/// cache is live.
#[tokio::test]
async fn test_start_returns_snapshot_rows() {
    init_tracing();
    let gateway = create_cluster(vec![
        element(1, 1, true),
        element(2, 1, true),
        element(3, 1, false),
        element(4, 2, true),
    ]);
    let aggregator = create_aggregator(&gateway, elements_config());

    let rows = aggregator.start().await.unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(count(&rows, 1, CounterKind::SwarmableElements), 2);
    assert_eq!(count(&rows, 1, CounterKind::NonSwarmableElements), 1);
    assert_eq!(count(&rows, 2, CounterKind::SwarmableElements), 1);
    assert_eq!(rows[0].agent_name, "dma-1");
    assert_eq!(rows[0].agent_state, AgentState::Healthy);
    assert_eq!(aggregator.state().await, SubscriptionState::Live);
}

/// **Test:** Events during the snapshot fetch are replayed exactly once
///
/// **Reason:** Events that arrive while the snapshot is in flight may or may not already be
/// reflected in it. Replaying them must neither lose nor double count anything.
///
/// **Expectation:** An add, a move and a delete that the snapshot already contains are no-ops,
/// while an add announced only through the feed is counted.
#[tokio::test]
async fn test_events_during_snapshot_are_replayed() {
    init_tracing();
    let gateway = create_cluster(vec![element(1, 1, true), element(2, 1, true)]);
    let aggregator = create_aggregator(&gateway, elements_config());
    gateway.hold_fetches();

    let starter = aggregator.clone();
    let start = tokio::spawn(async move { starter.start().await });
    wait_for_subscription(&gateway).await;
    assert_eq!(aggregator.state().await, SubscriptionState::Initializing);

    // reflected in the snapshot as well
    gateway.upsert_item(element(3, 1, true));
    gateway.upsert_item(element(1, 2, true));
    gateway.delete_item(ItemId::element(1, 2));
    // only announced on the feed
    gateway.publish(ClusterEvent::ItemUpserted(element(9, 2, false)));
    tokio::time::sleep(Duration::from_millis(20)).await;

    gateway.release_fetches();
    let rows = start.await.unwrap().unwrap();

    assert_eq!(count(&rows, 1, CounterKind::SwarmableElements), 1);
    assert_eq!(count(&rows, 2, CounterKind::SwarmableElements), 1);
    assert_eq!(count(&rows, 2, CounterKind::NonSwarmableElements), 1);
}

/// **Test:** Live events are applied and published
///
/// **Reason:** Once live, every counter change reaches the consumer as a cell update.
///
/// **Expectation:** A migration publishes the decrement on the old agent and the increment on the
/// new one; an unknown host gets a placeholder row.
#[tokio::test]
async fn test_live_events_publish_changes() {
    init_tracing();
    let gateway = create_cluster(vec![element(1, 1, true)]);
    let aggregator = create_aggregator(&gateway, elements_config());
    aggregator.start().await.unwrap();
    let mut changes = aggregator.subscribe_changes();

    gateway.upsert_item(element(1, 2, true));

    let first = tokio::time::timeout(Duration::from_secs(1), changes.recv())
        .await
        .unwrap()
        .unwrap();
    let second = tokio::time::timeout(Duration::from_secs(1), changes.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        first,
        RowChange::CellUpdated {
            agent_id: 1,
            counter: CounterKind::SwarmableElements,
            value: 0
        }
    );
    assert_eq!(
        second,
        RowChange::CellUpdated {
            agent_id: 2,
            counter: CounterKind::SwarmableElements,
            value: 1
        }
    );

    gateway.publish(ClusterEvent::ItemUpserted(element(5, 7, true)));
    wait_for_count(&aggregator, 7, CounterKind::SwarmableElements, 1).await;
    let placeholder = aggregator.get_row(7).await.unwrap();
    assert_eq!(placeholder.agent_name, "Agent 7");
    assert_eq!(placeholder.agent_state, AgentState::Unknown);

    gateway.upsert_agent(Agent::healthy(7, "dma-7"));
    let mut renamed = false;
    for _ in 0..100 {
        if aggregator.get_row(7).await.map(|row| row.agent_name) == Some("dma-7".to_string()) {
            renamed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(renamed);
    assert_eq!(aggregator.get_all_rows().await.len(), 3);
}

/// **Test:** Empty snapshot is rejected
///
/// **Reason:** A cluster without agents means the platform answered with nothing usable.
///
/// **Expectation:** `EmptySnapshot`, and the cache stays initializing until stopped.
#[tokio::test]
async fn test_empty_snapshot_is_rejected() {
    let gateway = std::sync::Arc::new(swarming_core::MemoryGateway::new());
    let aggregator = create_aggregator(&gateway, elements_config());

    let err = aggregator.start().await.unwrap_err();

    assert!(matches!(err, AggregatorError::EmptySnapshot));
    assert_eq!(aggregator.state().await, SubscriptionState::Initializing);

    aggregator.stop().await;
    assert_eq!(aggregator.state().await, SubscriptionState::Stopped);
    assert_eq!(gateway.subscriber_count(), 0);
}

/// **Test:** Snapshot fetch failure is fatal to the instance
///
/// **Reason:** A failed fetch leaves an unusable cache; starting it again is refused.
///
/// **Expectation:** The gateway error surfaces, a second start fails with `InvalidState`.
#[tokio::test]
async fn test_snapshot_failure() {
    let gateway = create_cluster(vec![element(1, 1, true)]);
    gateway
        .set_fetch_error(Some("connection reset".to_string()))
        .await;
    let aggregator = create_aggregator(&gateway, elements_config());

    let err = aggregator.start().await.unwrap_err();
    assert!(matches!(err, AggregatorError::Gateway(_)));

    let err = aggregator.start().await.unwrap_err();
    assert!(matches!(
        err,
        AggregatorError::InvalidState(SubscriptionState::Initializing)
    ));
}

/// **Test:** Failed snapshot releases the subscription
///
/// **Reason:** The instance cannot go live any more, so it must not keep a gateway subscription
/// or buffer the events that keep arriving.
///
/// **Expectation:** No subscriber is left after the failed start, later events are not applied,
/// and dropping the instance changes nothing.
#[tokio::test]
async fn test_snapshot_failure_releases_subscription() {
    init_tracing();
    let gateway = create_cluster(vec![element(1, 1, true)]);
    gateway
        .set_fetch_error(Some("connection reset".to_string()))
        .await;
    let aggregator = create_aggregator(&gateway, elements_config());

    assert!(aggregator.start().await.is_err());
    assert_eq!(gateway.subscriber_count(), 0);

    for id in 2..200 {
        gateway.upsert_item(element(id, 2, true));
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(aggregator.state().await, SubscriptionState::Initializing);
    assert!(aggregator.get_all_rows().await.is_empty());

    drop(aggregator);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(gateway.subscriber_count(), 0);
}

/// **Test:** Dropping a live instance cancels its subscription
///
/// **Reason:** Callers replace the instance instead of stopping it; the old subscription must
/// not stay registered on the platform.
///
/// **Expectation:** The subscriber count drops back to zero shortly after the drop.
#[tokio::test]
async fn test_drop_unsubscribes() {
    let gateway = create_cluster(vec![element(1, 1, true)]);
    let aggregator = create_aggregator(&gateway, elements_config());
    aggregator.start().await.unwrap();
    assert_eq!(gateway.subscriber_count(), 1);

    drop(aggregator);
    for _ in 0..100 {
        if gateway.subscriber_count() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(gateway.subscriber_count(), 0);
}

/// **Test:** Stop while the subscription is being opened
///
/// **Reason:** `stop` can run between the subscribe request and its answer; the subscription
/// opened afterwards belongs to nobody.
///
/// **Expectation:** `start` fails with `Stopped` and the late subscription is cancelled.
#[tokio::test]
async fn test_stop_during_subscribe() {
    let gateway = create_cluster(vec![element(1, 1, true)]);
    gateway.hold_subscriptions();
    let aggregator = create_aggregator(&gateway, elements_config());

    let starting = {
        let aggregator = aggregator.clone();
        tokio::spawn(async move { aggregator.start().await })
    };
    for _ in 0..100 {
        if aggregator.state().await == SubscriptionState::Initializing {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(aggregator.state().await, SubscriptionState::Initializing);

    aggregator.stop().await;
    gateway.release_subscriptions();

    let result = starting.await.unwrap();
    assert!(matches!(result, Err(AggregatorError::Stopped)));
    assert_eq!(gateway.subscriber_count(), 0);
    assert_eq!(aggregator.state().await, SubscriptionState::Stopped);
}

/// **Test:** Teardown clears state and ignores later events
///
/// **Reason:** After stop no row may survive and no late event may recreate one.
///
/// **Expectation:** No rows after stop, the subscription is cancelled, and a late event changes
/// nothing.
#[tokio::test]
async fn test_stop_clears_rows() {
    let gateway = create_cluster(vec![element(1, 1, true)]);
    let aggregator = create_aggregator(&gateway, elements_config());
    aggregator.start().await.unwrap();

    aggregator.stop().await;

    assert!(aggregator.get_all_rows().await.is_empty());
    assert_eq!(gateway.subscriber_count(), 0);

    gateway.upsert_item(element(2, 1, true));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(aggregator.get_all_rows().await.is_empty());
    assert!(matches!(
        aggregator.start().await,
        Err(AggregatorError::InvalidState(SubscriptionState::Stopped))
    ));
}

/// **Test:** Incremental booking counts
///
/// **Reason:** Without debounce every booking event adjusts the counters on its own.
///
/// **Expectation:** The snapshot booking is counted and a deleted booking is uncounted right away.
#[tokio::test]
async fn test_incremental_bookings() {
    let first = booking(1);
    let gateway = create_cluster(vec![first.clone()]);
    let config = AggregatorConfig {
        track_elements: false,
        bookings: BookingTracking::Incremental,
        ..Default::default()
    };
    let aggregator = create_aggregator(&gateway, config);

    let rows = aggregator.start().await.unwrap();
    assert_eq!(count(&rows, 1, CounterKind::Bookings), 1);

    gateway.upsert_item(booking(2));
    gateway.delete_item(first.id);
    wait_for_count(&aggregator, 2, CounterKind::Bookings, 1).await;
    wait_for_count(&aggregator, 1, CounterKind::Bookings, 0).await;
}

/// **Test:** Debounced booking recount
///
/// **Reason:** Booking events come in bursts; counts are refreshed once the burst is over
/// instead of on every event.
///
/// **Expectation:** No count query happens during the burst; one query per agent happens three
/// seconds after the last event, and only the changed row is published.
#[tokio::test(start_paused = true)]
async fn test_debounced_booking_recount() {
    let gateway = create_cluster(vec![booking(1)]);
    let config = AggregatorConfig {
        track_elements: false,
        bookings: BookingTracking::Debounced,
        recount_delay_ms: 3000,
        ..Default::default()
    };
    let aggregator = create_aggregator(&gateway, config);

    let rows = aggregator.start().await.unwrap();
    assert_eq!(count(&rows, 1, CounterKind::Bookings), 1);
    assert_eq!(count(&rows, 2, CounterKind::Bookings), 0);
    let mut changes = aggregator.subscribe_changes();

    for _ in 0..3 {
        gateway.upsert_item(booking(2));
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(gateway.count_calls(), 0);
    assert_eq!(count(&aggregator.get_all_rows().await, 2, CounterKind::Bookings), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(gateway.count_calls(), 2);
    assert_eq!(count(&aggregator.get_all_rows().await, 2, CounterKind::Bookings), 3);

    assert_eq!(
        changes.try_recv().unwrap(),
        RowChange::CellUpdated {
            agent_id: 2,
            counter: CounterKind::Bookings,
            value: 3
        }
    );
    assert!(changes.try_recv().is_err());
}

/// **Test:** Stop with a recount pending
///
/// **Reason:** A booking event arms the recount timer; once the cache is torn down the timer
/// must not query the platform or publish anything.
///
/// **Expectation:** No count query and no change, even well after the recount delay.
#[tokio::test(start_paused = true)]
async fn test_stop_cancels_pending_recount() {
    let gateway = create_cluster(vec![booking(1)]);
    let config = AggregatorConfig {
        track_elements: false,
        bookings: BookingTracking::Debounced,
        recount_delay_ms: 3000,
        ..Default::default()
    };
    let aggregator = create_aggregator(&gateway, config);
    aggregator.start().await.unwrap();
    let mut changes = aggregator.subscribe_changes();

    gateway.upsert_item(booking(2));
    tokio::time::sleep(Duration::from_millis(500)).await;
    aggregator.stop().await;

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(gateway.count_calls(), 0);
    assert!(changes.try_recv().is_err());
    assert!(aggregator.get_all_rows().await.is_empty());
}
