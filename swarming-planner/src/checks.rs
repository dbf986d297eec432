use std::collections::BTreeSet;
use swarming_core::{Agent, AgentId};

use crate::errors::{PlannerError, Result};

/// Every agent of the cluster must allow swarming before items are moved around.
pub fn ensure_swarming_enabled(agents: &[Agent]) -> Result<()> {
    let disabled: Vec<AgentId> = agents
        .iter()
        .filter(|agent| !agent.swarming_enabled)
        .map(|agent| agent.id)
        .collect();

    if disabled.is_empty() {
        Ok(())
    } else {
        Err(PlannerError::SwarmingDisabled(disabled))
    }
}

/// Validate an evacuation request before fetching any item.
///
/// The sources must be known cluster members, must not cover the whole cluster, and
/// at least one healthy agent has to remain to receive the items.
pub fn validate_evacuation(agents: &[Agent], sources: &[AgentId]) -> Result<()> {
    if sources.is_empty() {
        return Err(PlannerError::InvalidEvacuation(
            "no source agent given".to_string(),
        ));
    }

    let known: BTreeSet<AgentId> = agents.iter().map(|agent| agent.id).collect();
    let unknown: Vec<AgentId> = sources
        .iter()
        .copied()
        .filter(|id| !known.contains(id))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if !unknown.is_empty() {
        return Err(PlannerError::UnknownAgents(unknown));
    }

    let sources: BTreeSet<AgentId> = sources.iter().copied().collect();
    if known.is_subset(&sources) {
        return Err(PlannerError::InvalidEvacuation(
            "cannot evacuate every agent of the cluster".to_string(),
        ));
    }

    let has_target = agents
        .iter()
        .any(|agent| agent.is_healthy() && !sources.contains(&agent.id));
    if !has_target {
        return Err(PlannerError::NoHealthyTarget);
    }

    Ok(())
}
