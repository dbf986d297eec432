use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use swarming_core::{Agent, AgentId, Item, ItemId, ItemKind};
use tracing::info;

use crate::errors::{PlannerError, Result};
use crate::plan::MovePlan;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HomeEntry {
    pub item_id: ItemId,
    pub home_agent_id: AgentId,
}

/// The agent each swarmable element was living on when the snapshot was taken.
///
/// Used to send elements back after an evacuation or a rebalance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<HomeEntry>", into = "Vec<HomeEntry>")]
pub struct HomeSnapshot {
    homes: BTreeMap<ItemId, AgentId>,
}

impl From<Vec<HomeEntry>> for HomeSnapshot {
    fn from(entries: Vec<HomeEntry>) -> Self {
        HomeSnapshot {
            homes: entries
                .into_iter()
                .map(|entry| (entry.item_id, entry.home_agent_id))
                .collect(),
        }
    }
}

impl From<HomeSnapshot> for Vec<HomeEntry> {
    fn from(snapshot: HomeSnapshot) -> Self {
        snapshot
            .homes
            .into_iter()
            .map(|(item_id, home_agent_id)| HomeEntry {
                item_id,
                home_agent_id,
            })
            .collect()
    }
}

impl HomeSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the current host of every swarmable element as its home.
    ///
    /// Returns how many entries were added or changed.
    pub fn record(&mut self, items: &[Item]) -> usize {
        let mut changed = 0;
        for item in items {
            if item.kind() != ItemKind::Element || !item.swarmable {
                continue;
            }
            if self.homes.get(&item.id) != Some(&item.host_agent_id) {
                self.homes.insert(item.id, item.host_agent_id);
                changed += 1;
            }
        }
        changed
    }

    pub fn home_of(&self, item_id: &ItemId) -> Option<AgentId> {
        self.homes.get(item_id).copied()
    }

    pub fn len(&self) -> usize {
        self.homes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.homes.is_empty()
    }

    /// Plan the return of swarmable elements whose home is one of `targets`.
    ///
    /// Every target must be part of `agents`. Elements already at home, or without a
    /// recorded home, stay where they are.
    pub fn plan_return_home(
        &self,
        agents: &[Agent],
        items: &[Item],
        targets: &[AgentId],
    ) -> Result<MovePlan> {
        let known: BTreeSet<AgentId> = agents.iter().map(|agent| agent.id).collect();
        let unknown: Vec<AgentId> = targets
            .iter()
            .copied()
            .filter(|id| !known.contains(id))
            .collect();
        if !unknown.is_empty() {
            return Err(PlannerError::UnknownAgents(unknown));
        }

        let targets: BTreeSet<AgentId> = targets.iter().copied().collect();
        let mut plan = MovePlan::new();
        for item in items {
            if item.kind() != ItemKind::Element || !item.swarmable {
                continue;
            }
            match self.home_of(&item.id) {
                Some(home) if targets.contains(&home) && home != item.host_agent_id => {
                    plan.add(home, item.id);
                }
                _ => {}
            }
        }

        info!(moves = plan.len(), "return-home plan built");
        Ok(plan)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}
