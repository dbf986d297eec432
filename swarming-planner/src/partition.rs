use std::collections::BTreeMap;
use swarming_core::{Agent, AgentId, Item};
use tracing::warn;

/// Anything placed on an agent.
pub trait Hosted {
    fn host_agent_id(&self) -> AgentId;
}

impl Hosted for Item {
    fn host_agent_id(&self) -> AgentId {
        self.host_agent_id
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bucket<T> {
    pub agent: Agent,
    pub items: Vec<T>,
}

/// Items grouped per agent, iterated in ascending agent id order.
///
/// Every agent of the partition owns a bucket, possibly empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition<T> {
    buckets: BTreeMap<AgentId, Bucket<T>>,
}

impl<T> Default for Partition<T> {
    fn default() -> Self {
        Partition {
            buckets: BTreeMap::new(),
        }
    }
}

impl<T> Partition<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an agent with an empty bucket. An existing bucket keeps its items.
    pub fn insert_agent(&mut self, agent: Agent) {
        self.buckets
            .entry(agent.id)
            .and_modify(|bucket| bucket.agent = agent.clone())
            .or_insert_with(|| Bucket {
                agent,
                items: Vec::new(),
            });
    }

    /// Append `item` to the bucket of `agent_id`. Returns the item back if the agent is unknown.
    pub fn push(&mut self, agent_id: AgentId, item: T) -> std::result::Result<(), T> {
        match self.buckets.get_mut(&agent_id) {
            Some(bucket) => {
                bucket.items.push(item);
                Ok(())
            }
            None => Err(item),
        }
    }

    pub fn bucket(&self, agent_id: AgentId) -> Option<&Bucket<T>> {
        self.buckets.get(&agent_id)
    }

    pub fn buckets(&self) -> impl Iterator<Item = &Bucket<T>> {
        self.buckets.values()
    }

    pub fn into_buckets(self) -> impl Iterator<Item = Bucket<T>> {
        self.buckets.into_values()
    }

    pub fn agents(&self) -> impl Iterator<Item = &Agent> {
        self.buckets.values().map(|bucket| &bucket.agent)
    }

    pub fn agent_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn item_count(&self) -> usize {
        self.buckets.values().map(|bucket| bucket.items.len()).sum()
    }

    /// Bucket sizes keyed by agent id.
    pub fn sizes(&self) -> BTreeMap<AgentId, usize> {
        self.buckets
            .iter()
            .map(|(id, bucket)| (*id, bucket.items.len()))
            .collect()
    }
}

impl<T: Hosted> Partition<T> {
    /// Group `items` under their host agent.
    ///
    /// Every agent gets a bucket. Items hosted on an agent that is not listed cannot be
    /// placed and are dropped.
    pub fn from_items(agents: impl IntoIterator<Item = Agent>, items: Vec<T>) -> Self {
        let mut partition = Partition::new();
        for agent in agents {
            partition.insert_agent(agent);
        }

        let mut dropped = 0usize;
        for item in items {
            let host = item.host_agent_id();
            if partition.push(host, item).is_err() {
                dropped += 1;
            }
        }
        if dropped > 0 {
            warn!(dropped, "items hosted on unknown agents were left out of the partition");
        }
        partition
    }
}
