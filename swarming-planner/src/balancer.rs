use std::collections::{BTreeMap, BTreeSet, VecDeque};
use swarming_core::AgentId;
use tracing::debug;

use crate::errors::{PlannerError, Result};
use crate::partition::{Bucket, Partition};

/// Equalize bucket sizes across healthy agents, moving as few items as possible.
///
/// ## Purpose:
/// Given the current placement of items and a classifier telling which items may move,
/// compute the placement where every healthy agent holds the same number of items
/// (difference of at most one), while keeping items on their current agent whenever
/// that agent can take them.
///
/// ## Process:
/// 1. Split every bucket into fixed items (they seed the result) and a pool of movable items.
/// 2. Repeatedly pick the healthy agent with the smallest result bucket. On ties, prefer one
///    that still has its own movable pool, then the lowest agent id.
/// 3. The target takes from its own pool if it has one. Otherwise it takes from the agent with
///    the largest projected size (result bucket plus remaining pool), lowest id on ties.
/// 4. Stop when every pool is empty.
///
/// Movable items of unhealthy agents are redistributed; unhealthy agents never receive items.
/// A single-agent partition, or one without movable items, is returned unchanged.
pub fn balance_by_count<T, F>(partition: Partition<T>, is_movable: F) -> Result<Partition<T>>
where
    F: Fn(&T) -> bool,
{
    if partition.agent_count() <= 1 {
        return Ok(partition);
    }

    let healthy: Vec<AgentId> = partition
        .agents()
        .filter(|agent| agent.is_healthy())
        .map(|agent| agent.id)
        .collect();

    let (mut result, mut pools) = split(partition, &is_movable);
    if !pools.is_empty() && healthy.is_empty() {
        return Err(PlannerError::NoHealthyTarget);
    }

    while !pools.is_empty() {
        let target = smallest_healthy(&result, &healthy, &pools)?;
        let source = if pools.contains_key(&target) {
            target
        } else {
            largest_projected(&result, &pools)?
        };

        let item = take_first(&mut pools, source)?;
        if source != target {
            debug!(from = source, to = target, "item relocated");
        }
        place(&mut result, target, item)?;
    }

    Ok(result)
}

/// Move every movable item off `source_agent_ids` onto the remaining healthy agents.
///
/// ## Process:
/// 1. Targets are the healthy agents outside `source_agent_ids`, seeded with their full bucket.
/// 2. Movable items of the source agents form the pools; their fixed items are dropped.
/// 3. Each item of the first non-empty pool (ascending agent id) goes to the smallest
///    target, lowest id on ties.
///
/// Only the target buckets are returned. Missing targets are an error only when there is
/// something to move.
pub fn balance_away_from<T, F>(
    partition: Partition<T>,
    source_agent_ids: &[AgentId],
    is_movable: F,
) -> Result<Partition<T>>
where
    F: Fn(&T) -> bool,
{
    let sources: BTreeSet<AgentId> = source_agent_ids.iter().copied().collect();

    let mut targets = Partition::new();
    let mut pools: BTreeMap<AgentId, VecDeque<T>> = BTreeMap::new();

    for bucket in partition.into_buckets() {
        let agent_id = bucket.agent.id;
        if sources.contains(&agent_id) {
            let pool: VecDeque<T> = bucket.items.into_iter().filter(|i| is_movable(i)).collect();
            if !pool.is_empty() {
                pools.insert(agent_id, pool);
            }
        } else if bucket.agent.is_healthy() {
            let Bucket { agent, items } = bucket;
            targets.insert_agent(agent);
            for item in items {
                place(&mut targets, agent_id, item)?;
            }
        }
    }

    let target_ids: Vec<AgentId> = targets.agents().map(|agent| agent.id).collect();
    if !pools.is_empty() && target_ids.is_empty() {
        return Err(PlannerError::NoHealthyTarget);
    }

    for (source, pool) in pools {
        for item in pool {
            let target = smallest(&targets, &target_ids)?;
            debug!(from = source, to = target, "item evacuated");
            place(&mut targets, target, item)?;
        }
    }

    Ok(targets)
}

type Pools<T> = BTreeMap<AgentId, VecDeque<T>>;

fn split<T, F>(partition: Partition<T>, is_movable: &F) -> (Partition<T>, Pools<T>)
where
    F: Fn(&T) -> bool,
{
    let mut fixed = Partition::new();
    let mut pools = BTreeMap::new();

    for Bucket { agent, items } in partition.into_buckets() {
        let agent_id = agent.id;
        let (movable, kept): (Vec<T>, Vec<T>) = items.into_iter().partition(|i| is_movable(i));

        fixed.insert_agent(agent);
        for item in kept {
            // the agent was inserted just above
            let _ = fixed.push(agent_id, item);
        }
        if !movable.is_empty() {
            pools.insert(agent_id, VecDeque::from(movable));
        }
    }

    (fixed, pools)
}

fn size_of<T>(partition: &Partition<T>, agent_id: AgentId) -> usize {
    partition
        .bucket(agent_id)
        .map(|bucket| bucket.items.len())
        .unwrap_or(0)
}

fn smallest_healthy<T>(
    result: &Partition<T>,
    healthy: &[AgentId],
    pools: &Pools<T>,
) -> Result<AgentId> {
    let min = healthy
        .iter()
        .map(|id| size_of(result, *id))
        .min()
        .ok_or(PlannerError::NoHealthyTarget)?;

    let mut tied = healthy.iter().filter(|id| size_of(result, **id) == min);
    let first = tied.clone().next().copied();

    tied.find(|id| pools.contains_key(*id))
        .copied()
        .or(first)
        .ok_or(PlannerError::NoHealthyTarget)
}

fn smallest<T>(targets: &Partition<T>, ids: &[AgentId]) -> Result<AgentId> {
    // min_by_key keeps the first minimum, ids are ascending
    ids.iter()
        .copied()
        .min_by_key(|id| size_of(targets, *id))
        .ok_or(PlannerError::NoHealthyTarget)
}

fn largest_projected<T>(result: &Partition<T>, pools: &Pools<T>) -> Result<AgentId> {
    let mut best: Option<(AgentId, usize)> = None;
    for (agent_id, pool) in pools {
        let projected = size_of(result, *agent_id) + pool.len();
        match best {
            Some((_, size)) if size >= projected => {}
            _ => best = Some((*agent_id, projected)),
        }
    }
    best.map(|(agent_id, _)| agent_id)
        .ok_or(PlannerError::NoHealthyTarget)
}

fn take_first<T>(pools: &mut Pools<T>, source: AgentId) -> Result<T> {
    let pool = pools
        .get_mut(&source)
        .ok_or(PlannerError::NoHealthyTarget)?;
    let item = pool.pop_front().ok_or(PlannerError::NoHealthyTarget)?;
    if pool.is_empty() {
        pools.remove(&source);
    }
    Ok(item)
}

fn place<T>(partition: &mut Partition<T>, agent_id: AgentId, item: T) -> Result<()> {
    partition
        .push(agent_id, item)
        .map_err(|_| PlannerError::NoHealthyTarget)
}
