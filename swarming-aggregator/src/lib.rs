//! Live per-agent counts of elements and bookings.
//!
//! An [`Aggregator`] subscribes to cluster events, fetches a snapshot, replays the events
//! that arrived in between, and from then on keeps one [`AgentRow`] per agent up to date.
//! Every row change is published as a [`RowChange`].

mod errors;
pub use errors::{AggregatorError, Result};

mod config;
pub use config::{AggregatorConfig, BookingTracking};

mod row;
pub use row::{AgentRow, AgentState, RowChange};

mod cache_state;

mod recount;

mod aggregator;
pub use aggregator::{Aggregator, SubscriptionState};

pub mod aggregator_metrics;
