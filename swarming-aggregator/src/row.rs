use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use swarming_core::{Agent, AgentHealth, AgentId, CounterKind};

/// Display state of an agent row. `Unknown` until the agent itself has been seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Healthy,
    Unhealthy,
    Unknown,
}

impl From<AgentHealth> for AgentState {
    fn from(health: AgentHealth) -> Self {
        match health {
            AgentHealth::Healthy => AgentState::Healthy,
            AgentHealth::Unhealthy => AgentState::Unhealthy,
        }
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentState::Healthy => write!(f, "Healthy"),
            AgentState::Unhealthy => write!(f, "Unhealthy"),
            AgentState::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Per-agent counters as shown to the consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRow {
    pub agent_id: AgentId,
    pub agent_name: String,
    pub agent_state: AgentState,
    pub counters: BTreeMap<CounterKind, u64>,
}

impl AgentRow {
    pub fn new(agent: &Agent, counters: &[CounterKind]) -> Self {
        AgentRow {
            agent_id: agent.id,
            agent_name: agent.name.clone(),
            agent_state: agent.health.into(),
            counters: counters.iter().map(|kind| (*kind, 0)).collect(),
        }
    }

    /// Row for an agent only known from an item hosted on it.
    pub fn placeholder(agent_id: AgentId, counters: &[CounterKind]) -> Self {
        AgentRow {
            agent_id,
            agent_name: format!("Agent {}", agent_id),
            agent_state: AgentState::Unknown,
            counters: counters.iter().map(|kind| (*kind, 0)).collect(),
        }
    }

    pub fn count(&self, kind: CounterKind) -> u64 {
        self.counters.get(&kind).copied().unwrap_or(0)
    }

    pub fn total_elements(&self) -> u64 {
        self.count(CounterKind::SwarmableElements) + self.count(CounterKind::NonSwarmableElements)
    }
}

/// A change to the published rows. Consumers keep the last value per agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowChange {
    Added(AgentRow),
    Updated(AgentRow),
    CellUpdated {
        agent_id: AgentId,
        counter: CounterKind,
        value: u64,
    },
}

