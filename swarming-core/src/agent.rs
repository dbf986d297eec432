use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Numeric identity of a cluster agent.
pub type AgentId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentHealth {
    Healthy,
    Unhealthy,
}

impl fmt::Display for AgentHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentHealth::Healthy => write!(f, "Healthy"),
            AgentHealth::Unhealthy => write!(f, "Unhealthy"),
        }
    }
}

/// A cluster node able to host items.
///
/// Identity, equality and ordering are defined by `id` only, so an agent can be used
/// as an ordered map key while its name or health change between snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    pub health: AgentHealth,
    #[serde(default = "default_swarming_enabled")]
    pub swarming_enabled: bool,
}

fn default_swarming_enabled() -> bool {
    true
}

impl Agent {
    pub fn new(id: AgentId, name: impl Into<String>, health: AgentHealth) -> Self {
        Agent {
            id,
            name: name.into(),
            health,
            swarming_enabled: true,
        }
    }

    pub fn healthy(id: AgentId, name: impl Into<String>) -> Self {
        Self::new(id, name, AgentHealth::Healthy)
    }

    pub fn is_healthy(&self) -> bool {
        self.health == AgentHealth::Healthy
    }
}

impl PartialEq for Agent {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Agent {}

impl Hash for Agent {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for Agent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Agent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Display for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}
