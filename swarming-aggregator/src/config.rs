use serde::{Deserialize, Serialize};
use std::time::Duration;
use swarming_core::{CounterKind, EventKind};

use crate::errors::Result;

/// How booking counts are kept up to date.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingTracking {
    /// Bookings are not counted
    Disabled,
    /// Every booking event adjusts the counters directly
    Incremental,
    /// Booking events only mark the counts stale; a delayed recount queries the platform
    Debounced,
}

impl Default for BookingTracking {
    fn default() -> Self {
        Self::Debounced
    }
}

/// Aggregation cache configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Count swarmable and non-swarmable elements per agent
    pub track_elements: bool,
    /// Booking counting mode (disabled, incremental, debounced)
    pub bookings: BookingTracking,
    /// Quiet period after the last booking event before recounting (milliseconds)
    pub recount_delay_ms: u64,
    /// Capacity of the row change channel
    pub change_channel_capacity: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            track_elements: true,
            bookings: BookingTracking::default(),
            recount_delay_ms: 3000,
            change_channel_capacity: 1024,
        }
    }
}

impl AggregatorConfig {
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn recount_delay(&self) -> Duration {
        Duration::from_millis(self.recount_delay_ms)
    }

    pub fn tracks_bookings(&self) -> bool {
        self.bookings != BookingTracking::Disabled
    }

    pub fn debounces_bookings(&self) -> bool {
        self.bookings == BookingTracking::Debounced
    }

    /// Counter columns of every row.
    pub fn counters(&self) -> Vec<CounterKind> {
        let mut counters = Vec::new();
        if self.tracks_bookings() {
            counters.push(CounterKind::Bookings);
        }
        if self.track_elements {
            counters.push(CounterKind::SwarmableElements);
            counters.push(CounterKind::NonSwarmableElements);
        }
        counters
    }

    /// Event kinds the subscription has to ask for.
    pub fn event_kinds(&self) -> Vec<EventKind> {
        let mut kinds = vec![EventKind::AgentInfo];
        if self.track_elements {
            kinds.push(EventKind::Elements);
        }
        if self.tracks_bookings() {
            kinds.push(EventKind::Bookings);
        }
        kinds
    }
}
