// Centralized metric name constants for the aggregation cache.

#[derive(Debug, Clone, Copy)]
pub struct Metric {
    pub name: &'static str,
    #[allow(dead_code)]
    pub description: &'static str,
}

pub const EVENTS_APPLIED_TOTAL: Metric = Metric {
    name: "swarming_cache_events_applied_total",
    description: "Total cluster events applied to the per-agent counters",
};

pub const EVENTS_QUEUED_TOTAL: Metric = Metric {
    name: "swarming_cache_events_queued_total",
    description: "Total cluster events buffered while the snapshot was being fetched",
};

pub const EVENTS_DISCARDED_TOTAL: Metric = Metric {
    name: "swarming_cache_events_discarded_total",
    description: "Total cluster events dropped because the cache was not running",
};

pub const SNAPSHOT_FAILURES_TOTAL: Metric = Metric {
    name: "swarming_cache_snapshot_failures_total",
    description: "Total snapshot fetches that failed or returned no agents",
};

pub const RECOUNTS_TOTAL: Metric = Metric {
    name: "swarming_cache_recounts_total",
    description: "Total debounced booking recounts committed",
};

pub const COUNTER_UNDERFLOW_TOTAL: Metric = Metric {
    name: "swarming_cache_counter_underflow_total",
    description: "Total decrements ignored because the counter was already zero",
};
