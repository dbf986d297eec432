use futures::future::join_all;
use metrics::counter;
use std::collections::{BTreeMap, BTreeSet};
use swarming_core::{AgentId, ClusterGateway, Item, ItemId};
use tracing::{info, warn};

use crate::errors::{MoveFailure, MoveFailureSummary, PlannerError, Result};
use crate::partition::Partition;
use crate::planner_metrics::{MOVES_FAILED_TOTAL, MOVES_SUCCEEDED_TOTAL};

/// Move commands grouped by target agent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MovePlan {
    moves: BTreeMap<AgentId, Vec<ItemId>>,
}

impl MovePlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every item of a healthy agent's bucket that is not hosted there yet.
    pub fn from_partition(partition: &Partition<Item>) -> Self {
        let mut plan = MovePlan::new();
        for bucket in partition.buckets() {
            if !bucket.agent.is_healthy() {
                continue;
            }
            for item in &bucket.items {
                if item.host_agent_id != bucket.agent.id {
                    plan.add(bucket.agent.id, item.id);
                }
            }
        }
        plan
    }

    pub fn add(&mut self, target: AgentId, item_id: ItemId) {
        self.moves.entry(target).or_default().push(item_id);
    }

    pub fn items_for(&self, target: AgentId) -> &[ItemId] {
        self.moves.get(&target).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn targets(&self) -> impl Iterator<Item = (&AgentId, &Vec<ItemId>)> {
        self.moves.iter()
    }

    /// Total number of items to move.
    pub fn len(&self) -> usize {
        self.moves.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Issue the moves of `plan`, one call per target agent, all targets concurrently.
///
/// ## Process:
/// - every target gets a single `move_items` call with all its items
/// - a failed call marks all items of that target as failed with the call's error
/// - rejected items, and items the answer does not mention, are collected across targets
///
/// Returns the number of moved items, or every failure at once in
/// [`PlannerError::MoveFailures`]. Nothing is retried.
pub async fn execute_plan<G>(gateway: &G, plan: &MovePlan) -> Result<usize>
where
    G: ClusterGateway + ?Sized,
{
    if plan.is_empty() {
        return Ok(0);
    }

    let calls = plan.targets().map(|(target, items)| async move {
        let outcome = gateway.move_items(items, *target).await;
        (*target, items, outcome)
    });
    let outcomes = join_all(calls).await;

    let mut moved = 0usize;
    let mut summary = MoveFailureSummary::default();

    for (target, items, outcome) in outcomes {
        match outcome {
            Ok(results) => {
                let mut unanswered: BTreeSet<ItemId> = items.iter().copied().collect();
                for result in results {
                    unanswered.remove(&result.item_id);
                    if result.success {
                        moved += 1;
                    } else {
                        summary.failures.push(MoveFailure {
                            item_id: result.item_id,
                            target,
                            message: result
                                .message
                                .unwrap_or_else(|| "no reason given".to_string()),
                        });
                    }
                }
                for item_id in unanswered {
                    summary.failures.push(MoveFailure {
                        item_id,
                        target,
                        message: "no acknowledgement".to_string(),
                    });
                }
            }
            Err(e) => {
                warn!(target_agent = target, error = %e, "move request failed");
                for item_id in items {
                    summary.failures.push(MoveFailure {
                        item_id: *item_id,
                        target,
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    counter!(MOVES_SUCCEEDED_TOTAL.name).increment(moved as u64);
    counter!(MOVES_FAILED_TOTAL.name).increment(summary.len() as u64);

    if summary.is_empty() {
        info!(moved, "all planned moves succeeded");
        Ok(moved)
    } else {
        warn!(moved, failed = summary.len(), "some planned moves failed");
        Err(PlannerError::MoveFailures(summary))
    }
}
