use metrics::counter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use swarming_core::{Agent, AgentId, ClusterGateway, GatewayError, Item, ItemFilter};
use tracing::info;

use crate::balancer::{balance_away_from, balance_by_count};
use crate::checks::{ensure_swarming_enabled, validate_evacuation};
use crate::errors::Result;
use crate::home_snapshot::HomeSnapshot;
use crate::partition::Partition;
use crate::plan::{execute_plan, MovePlan};
use crate::planner_metrics::{MOVES_PLANNED_TOTAL, REBALANCE_RUNS_TOTAL};

/// Which item kinds a rebalancing run touches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RebalanceOptions {
    pub elements: bool,
    pub bookings: bool,
}

impl Default for RebalanceOptions {
    fn default() -> Self {
        Self {
            elements: true,
            bookings: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebalanceReport {
    pub bookings_moved: usize,
    pub elements_moved: usize,
}

impl RebalanceReport {
    pub fn total(&self) -> usize {
        self.bookings_moved + self.elements_moved
    }
}

enum Mode<'a> {
    ByCount,
    AwayFrom(&'a [AgentId]),
}

impl Mode<'_> {
    fn label(&self) -> &'static str {
        match self {
            Mode::ByCount => "by_count",
            Mode::AwayFrom(_) => "evacuate",
        }
    }
}

/// Runs rebalancing requests against the cluster.
///
/// Elements are handled before bookings; each kind is fetched, planned and executed on
/// its own, so a failure on elements stops the run before any booking moves.
pub struct Rebalancer<G: ClusterGateway> {
    gateway: Arc<G>,
}

impl<G: ClusterGateway> Rebalancer<G> {
    pub fn new(gateway: Arc<G>) -> Self {
        Rebalancer { gateway }
    }

    /// Spread items evenly over the healthy agents.
    pub async fn balance_by_count(&self, options: &RebalanceOptions) -> Result<RebalanceReport> {
        let agents = self.fetch_agents().await?;
        ensure_swarming_enabled(&agents)?;
        self.run(&agents, options, Mode::ByCount).await
    }

    /// Move every movable item off `sources` onto the remaining healthy agents.
    pub async fn evacuate(
        &self,
        sources: &[AgentId],
        options: &RebalanceOptions,
    ) -> Result<RebalanceReport> {
        let agents = self.fetch_agents().await?;
        ensure_swarming_enabled(&agents)?;
        validate_evacuation(&agents, sources)?;
        self.run(&agents, options, Mode::AwayFrom(sources)).await
    }

    /// Record the current host of every swarmable element in `snapshot`.
    pub async fn save_homes(&self, snapshot: &mut HomeSnapshot) -> Result<usize> {
        let items = self.gateway.fetch_items(ItemFilter::elements()).await?;
        let changed = snapshot.record(&items);
        info!(changed, recorded = snapshot.len(), "home snapshot saved");
        Ok(changed)
    }

    /// Send swarmable elements back to their recorded home when it is one of `targets`.
    pub async fn return_home(
        &self,
        snapshot: &HomeSnapshot,
        targets: &[AgentId],
    ) -> Result<RebalanceReport> {
        let agents = self.fetch_agents().await?;
        ensure_swarming_enabled(&agents)?;

        let items = self.gateway.fetch_items(ItemFilter::elements()).await?;
        let plan = snapshot.plan_return_home(&agents, &items, targets)?;

        counter!(REBALANCE_RUNS_TOTAL.name, "mode" => "return_home").increment(1);
        counter!(MOVES_PLANNED_TOTAL.name).increment(plan.len() as u64);

        let elements_moved = execute_plan(self.gateway.as_ref(), &plan).await?;
        Ok(RebalanceReport {
            bookings_moved: 0,
            elements_moved,
        })
    }

    async fn fetch_agents(&self) -> Result<Vec<Agent>> {
        let agents = self.gateway.fetch_agents().await?;
        if agents.is_empty() {
            return Err(
                GatewayError::EmptyResponse("no agents in the cluster".to_string()).into(),
            );
        }
        Ok(agents)
    }

    async fn run(
        &self,
        agents: &[Agent],
        options: &RebalanceOptions,
        mode: Mode<'_>,
    ) -> Result<RebalanceReport> {
        counter!(REBALANCE_RUNS_TOTAL.name, "mode" => mode.label()).increment(1);
        let mut report = RebalanceReport::default();

        if options.elements {
            let elements = self.gateway.fetch_items(ItemFilter::elements()).await?;
            let plan = plan_for(agents, elements, &mode, |item| item.swarmable)?;
            info!(mode = mode.label(), moves = plan.len(), "element moves planned");
            report.elements_moved = execute_plan(self.gateway.as_ref(), &plan).await?;
        }

        if options.bookings {
            let bookings = self
                .gateway
                .fetch_items(ItemFilter::active_bookings())
                .await?;
            // a running booking stays on its agent
            let plan = plan_for(agents, bookings, &mode, |item| !item.is_ongoing())?;
            info!(mode = mode.label(), moves = plan.len(), "booking moves planned");
            report.bookings_moved = execute_plan(self.gateway.as_ref(), &plan).await?;
        }

        Ok(report)
    }
}

fn plan_for<F>(
    agents: &[Agent],
    items: Vec<Item>,
    mode: &Mode<'_>,
    is_movable: F,
) -> Result<MovePlan>
where
    F: Fn(&Item) -> bool,
{
    let partition = Partition::from_items(agents.iter().cloned(), items);
    let planned = match mode {
        Mode::ByCount => balance_by_count(partition, is_movable)?,
        Mode::AwayFrom(sources) => balance_away_from(partition, sources, is_movable)?,
    };

    let plan = MovePlan::from_partition(&planned);
    counter!(MOVES_PLANNED_TOTAL.name).increment(plan.len() as u64);
    Ok(plan)
}
