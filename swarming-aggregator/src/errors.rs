use swarming_core::GatewayError;
use thiserror::Error;

use crate::aggregator::SubscriptionState;

pub type Result<T> = std::result::Result<T, AggregatorError>;

#[derive(Error, Debug)]
pub enum AggregatorError {
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Snapshot returned no agents")]
    EmptySnapshot,

    #[error("Operation not allowed while the subscription is {0}")]
    InvalidState(SubscriptionState),

    #[error("Subscription was stopped")]
    Stopped,

    #[error("Invalid configuration: {0}")]
    Configuration(#[from] serde_yaml::Error),
}
