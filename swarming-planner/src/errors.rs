use std::fmt;
use swarming_core::{AgentId, GatewayError, ItemId};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PlannerError>;

#[derive(Error, Debug)]
pub enum PlannerError {
    #[error("No healthy agent available to receive items")]
    NoHealthyTarget,

    #[error("Swarming is disabled on agent(s) {0:?}")]
    SwarmingDisabled(Vec<AgentId>),

    #[error("Agent(s) {0:?} are not part of the cluster")]
    UnknownAgents(Vec<AgentId>),

    #[error("Invalid evacuation request: {0}")]
    InvalidEvacuation(String),

    #[error("{0}")]
    MoveFailures(MoveFailureSummary),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// One item that could not be moved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveFailure {
    pub item_id: ItemId,
    pub target: AgentId,
    pub message: String,
}

/// Every failed move of one execution, reported together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MoveFailureSummary {
    pub failures: Vec<MoveFailure>,
}

impl MoveFailureSummary {
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for MoveFailureSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Swarming failed for {} item(s):", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "\n\t- {}: {}", failure.item_id, failure.message)?;
        }
        Ok(())
    }
}
