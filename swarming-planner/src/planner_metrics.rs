// Centralized metric name constants for the swarming planner.

#[derive(Debug, Clone, Copy)]
pub struct Metric {
    pub name: &'static str,
    #[allow(dead_code)]
    pub description: &'static str,
}

pub const REBALANCE_RUNS_TOTAL: Metric = Metric {
    name: "swarming_rebalance_runs_total",
    description: "Total rebalancing runs (mode={by_count,evacuate,return_home})",
};

pub const MOVES_PLANNED_TOTAL: Metric = Metric {
    name: "swarming_moves_planned_total",
    description: "Total item moves produced by the planner",
};

pub const MOVES_SUCCEEDED_TOTAL: Metric = Metric {
    name: "swarming_moves_succeeded_total",
    description: "Total item moves acknowledged by the platform",
};

pub const MOVES_FAILED_TOTAL: Metric = Metric {
    name: "swarming_moves_failed_total",
    description: "Total item moves rejected by the platform or lost to transport errors",
};
