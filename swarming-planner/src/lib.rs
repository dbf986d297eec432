//! Redistribution of movable items across cluster agents.
//!
//! The planner itself ([`balance_by_count`], [`balance_away_from`]) is a pure function
//! over a [`Partition`]. [`MovePlan`] turns a planned partition into move commands and
//! [`execute_plan`] issues them through a [`swarming_core::ClusterGateway`].
//! [`Rebalancer`] ties fetching, planning and execution together.

mod errors;
pub use errors::{MoveFailure, MoveFailureSummary, PlannerError, Result};

mod partition;
pub use partition::{Bucket, Hosted, Partition};

mod balancer;
pub use balancer::{balance_away_from, balance_by_count};

mod checks;
pub use checks::{ensure_swarming_enabled, validate_evacuation};

mod plan;
pub use plan::{execute_plan, MovePlan};

mod home_snapshot;
pub use home_snapshot::HomeSnapshot;

mod rebalancer;
pub use rebalancer::{RebalanceOptions, RebalanceReport, Rebalancer};

pub mod planner_metrics;

#[cfg(test)]
mod plan_test;
