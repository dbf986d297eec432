use thiserror::Error;

use crate::agent::AgentId;

pub type Result<T> = std::result::Result<T, GatewayError>;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Empty response: {0}")]
    EmptyResponse(String),

    #[error("Unknown agent: {0}")]
    UnknownAgent(AgentId),
}
