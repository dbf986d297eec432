//! Unit Tests for move plans, plan execution and home snapshots

use crate::errors::{MoveFailure, MoveFailureSummary, PlannerError};
use crate::home_snapshot::HomeSnapshot;
use crate::partition::Partition;
use crate::plan::{execute_plan, MovePlan};
use swarming_core::{Agent, AgentHealth, Item, ItemId, MemoryGateway};

fn element(id: u32, host: u64) -> Item {
    Item::element(1, id, format!("element-{}", id), host, true)
}

/// **Test:** Plans Only Target Healthy Agents
///
/// **Reason:** The planned partition keeps the fixed items of unhealthy agents in their bucket;
/// those must not turn into moves, and items already at their target are not re-sent.
///
/// **Expectation:** Only the relocated item of the healthy agent is planned.
#[test]
fn test_move_plan_from_partition() {
    let mut partition = Partition::new();
    partition.insert_agent(Agent::healthy(1, "dma-1"));
    partition.insert_agent(Agent::new(2, "dma-2", AgentHealth::Unhealthy));
    partition.push(1, element(1, 1)).unwrap();
    partition.push(1, element(2, 2)).unwrap();
    partition.push(2, element(3, 1)).unwrap();

    let plan = MovePlan::from_partition(&partition);

    assert_eq!(plan.len(), 1);
    assert_eq!(plan.items_for(1), &[ItemId::element(1, 2)]);
    assert!(plan.items_for(2).is_empty());
}

/// **Test:** Failure Summary Format
///
/// **Reason:** Operators read the summary to find which items stayed behind.
///
/// **Expectation:** A header with the failure count followed by one line per item.
#[test]
fn test_move_failure_summary_display() {
    let summary = MoveFailureSummary {
        failures: vec![
            MoveFailure {
                item_id: ItemId::element(1, 7),
                target: 2,
                message: "element is locked".to_string(),
            },
            MoveFailure {
                item_id: ItemId::element(1, 8),
                target: 3,
                message: "timeout".to_string(),
            },
        ],
    };

    assert_eq!(
        summary.to_string(),
        "Swarming failed for 2 item(s):\n\t- 1/7: element is locked\n\t- 1/8: timeout"
    );
}

/// **Test:** Executing A Plan Moves Items
///
/// **Reason:** Each target gets its items through the gateway.
///
/// **Expectation:** Every planned item ends on its target and the moved count is returned.
#[tokio::test]
async fn test_execute_plan_moves_items() {
    let gateway = MemoryGateway::with_cluster(
        vec![Agent::healthy(1, "dma-1"), Agent::healthy(2, "dma-2")],
        vec![element(1, 1), element(2, 1), element(3, 1)],
    );
    let mut plan = MovePlan::new();
    plan.add(2, ItemId::element(1, 2));
    plan.add(2, ItemId::element(1, 3));

    let moved = execute_plan(&gateway, &plan).await.unwrap();

    assert_eq!(moved, 2);
    assert_eq!(gateway.items_on(2).len(), 2);
    assert_eq!(gateway.items_on(1).len(), 1);
}

/// **Test:** Failures Are Collected Across Targets
///
/// **Reason:** A rejected item on one target must not hide failures on another, and a failed
/// request fails every item it carried.
///
/// **Expectation:** One rejected item plus both items sent to an unknown agent are reported;
/// the accepted item still moves.
#[tokio::test]
async fn test_execute_plan_aggregates_failures() {
    let gateway = MemoryGateway::with_cluster(
        vec![Agent::healthy(1, "dma-1"), Agent::healthy(2, "dma-2")],
        vec![element(1, 1), element(2, 1), element(3, 1), element(4, 1)],
    );
    gateway.fail_move(ItemId::element(1, 2), "element is locked");

    let mut plan = MovePlan::new();
    plan.add(2, ItemId::element(1, 1));
    plan.add(2, ItemId::element(1, 2));
    plan.add(7, ItemId::element(1, 3));
    plan.add(7, ItemId::element(1, 4));

    let err = execute_plan(&gateway, &plan).await.unwrap_err();
    let summary = match err {
        PlannerError::MoveFailures(summary) => summary,
        other => panic!("unexpected error {:?}", other),
    };

    assert_eq!(summary.len(), 3);
    assert!(summary
        .failures
        .iter()
        .any(|f| f.item_id == ItemId::element(1, 2) && f.message == "element is locked"));
    assert_eq!(summary.failures.iter().filter(|f| f.target == 7).count(), 2);
    assert_eq!(gateway.item(&ItemId::element(1, 1)).unwrap().host_agent_id, 2);
}

/// **Test:** Unanswered Items Count As Failed
///
/// **Reason:** The platform may answer a move request without mentioning every item; such an
/// item cannot be reported as moved.
///
/// **Expectation:** The unmentioned item is a failure with "no acknowledgement", the answered
/// one is not.
#[tokio::test]
async fn test_execute_plan_reports_unanswered_items() {
    let gateway = MemoryGateway::with_cluster(
        vec![Agent::healthy(1, "dma-1"), Agent::healthy(2, "dma-2")],
        vec![element(1, 1), element(2, 1)],
    );
    gateway.skip_move_result(ItemId::element(1, 2));

    let mut plan = MovePlan::new();
    plan.add(2, ItemId::element(1, 1));
    plan.add(2, ItemId::element(1, 2));

    let err = execute_plan(&gateway, &plan).await.unwrap_err();
    let summary = match err {
        PlannerError::MoveFailures(summary) => summary,
        other => panic!("unexpected error {:?}", other),
    };

    assert_eq!(summary.len(), 1);
    assert_eq!(summary.failures[0].item_id, ItemId::element(1, 2));
    assert_eq!(summary.failures[0].target, 2);
    assert_eq!(summary.failures[0].message, "no acknowledgement");
}

/// **Test:** Home Snapshot Records Only Changes
///
/// **Reason:** Saving the snapshot twice must not rewrite unchanged entries, and only swarmable
/// elements have a home.
///
/// **Expectation:** The first record stores 2 entries, the second only the moved element.
#[test]
fn test_home_snapshot_record() {
    let mut snapshot = HomeSnapshot::new();
    let fixed = Item::element(1, 3, "fixed", 1, false);

    assert_eq!(snapshot.record(&[element(1, 1), element(2, 2), fixed]), 2);
    assert_eq!(snapshot.record(&[element(1, 1), element(2, 1)]), 1);
    assert_eq!(snapshot.home_of(&ItemId::element(1, 2)), Some(1));
    assert_eq!(snapshot.len(), 2);
}

/// **Test:** Return-Home Planning
///
/// **Reason:** Only elements whose home is one of the requested agents go back, and the
/// requested agents must exist.
///
/// **Expectation:** The element away from agent 1 is planned back; the one from agent 2 stays
/// because agent 2 was not requested; an unknown target is rejected.
#[test]
fn test_home_snapshot_plan_return_home() {
    let agents = vec![
        Agent::healthy(1, "dma-1"),
        Agent::healthy(2, "dma-2"),
        Agent::healthy(3, "dma-3"),
    ];
    let mut snapshot = HomeSnapshot::new();
    snapshot.record(&[element(1, 1), element(2, 2), element(3, 1)]);

    let current = vec![element(1, 3), element(2, 3), element(3, 1)];
    let plan = snapshot.plan_return_home(&agents, &current, &[1]).unwrap();

    assert_eq!(plan.len(), 1);
    assert_eq!(plan.items_for(1), &[ItemId::element(1, 1)]);

    assert!(matches!(
        snapshot.plan_return_home(&agents, &current, &[1, 5]),
        Err(PlannerError::UnknownAgents(ids)) if ids == vec![5]
    ));
}

/// **Test:** Home Snapshot Serialization
///
/// **Reason:** Snapshots are stored between the save and the return request.
///
/// **Expectation:** A snapshot read back from JSON equals the saved one.
#[test]
fn test_home_snapshot_json() {
    let mut snapshot = HomeSnapshot::new();
    snapshot.record(&[element(1, 1), element(2, 3)]);

    let raw = snapshot.to_json().unwrap();
    let restored = HomeSnapshot::from_json(&raw).unwrap();

    assert_eq!(restored, snapshot);
}
