use chrono::Utc;
use metrics::counter;
use std::collections::{BTreeMap, HashMap};
use swarming_core::{Agent, AgentId, ClusterEvent, CounterKind, Item, ItemId, ItemKind};
use tracing::{trace, warn};

use crate::aggregator_metrics::COUNTER_UNDERFLOW_TOTAL;
use crate::config::{AggregatorConfig, BookingTracking};
use crate::row::{AgentRow, AgentState, RowChange};

/// Where an item was last counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ItemSighting {
    pub(crate) host_agent_id: AgentId,
    pub(crate) counter: CounterKind,
}

/// Rows and item sightings of one cache, without any locking or I/O.
///
/// Applying the same item state twice is a no-op, which is what makes replaying events
/// over a snapshot that already reflects them safe.
#[derive(Debug)]
pub(crate) struct CacheState {
    rows: BTreeMap<AgentId, AgentRow>,
    sightings: HashMap<ItemId, ItemSighting>,
    columns: Vec<CounterKind>,
    track_elements: bool,
    bookings: BookingTracking,
}

impl CacheState {
    pub(crate) fn new(config: &AggregatorConfig) -> Self {
        CacheState {
            rows: BTreeMap::new(),
            sightings: HashMap::new(),
            columns: config.counters(),
            track_elements: config.track_elements,
            bookings: config.bookings,
        }
    }

    pub(crate) fn row(&self, agent_id: AgentId) -> Option<&AgentRow> {
        self.rows.get(&agent_id)
    }

    pub(crate) fn rows(&self) -> Vec<AgentRow> {
        self.rows.values().cloned().collect()
    }

    pub(crate) fn agent_ids(&self) -> Vec<AgentId> {
        self.rows.keys().copied().collect()
    }

    #[cfg(test)]
    pub(crate) fn sighting(&self, item_id: &ItemId) -> Option<ItemSighting> {
        self.sightings.get(item_id).copied()
    }

    pub(crate) fn clear(&mut self) {
        self.rows.clear();
        self.sightings.clear();
    }

    /// Apply a fetched snapshot: rows for every agent first, then every item as a sighting.
    pub(crate) fn apply_snapshot(&mut self, agents: &[Agent], items: &[Item]) -> Vec<RowChange> {
        let mut changes = Vec::new();
        for agent in agents {
            self.apply_agent(agent, &mut changes);
        }
        for item in items {
            self.apply_upsert(item, &mut changes);
        }
        changes
    }

    pub(crate) fn apply_event(&mut self, event: &ClusterEvent) -> Vec<RowChange> {
        let mut changes = Vec::new();
        match event {
            ClusterEvent::AgentInfo(agent) => self.apply_agent(agent, &mut changes),
            ClusterEvent::ItemUpserted(item) => self.apply_upsert(item, &mut changes),
            ClusterEvent::ItemDeleted(item_id) => self.apply_delete(item_id, &mut changes),
        }
        changes
    }

    /// Overwrite the booking column with freshly queried counts.
    ///
    /// Agents without a row are skipped; only rows whose value changed are reported.
    pub(crate) fn apply_booking_counts(&mut self, counts: &[(AgentId, u64)]) -> Vec<RowChange> {
        let mut changes = Vec::new();
        for (agent_id, value) in counts {
            let Some(row) = self.rows.get_mut(agent_id) else {
                continue;
            };
            let cell = row.counters.entry(CounterKind::Bookings).or_insert(0);
            if *cell != *value {
                *cell = *value;
                changes.push(RowChange::CellUpdated {
                    agent_id: *agent_id,
                    counter: CounterKind::Bookings,
                    value: *value,
                });
            }
        }
        changes
    }

    /// Whether item events of this kind adjust counters directly.
    pub(crate) fn counts_incrementally(&self, kind: ItemKind) -> bool {
        match kind {
            ItemKind::Element => self.track_elements,
            ItemKind::Booking => self.bookings == BookingTracking::Incremental,
        }
    }

    fn apply_agent(&mut self, agent: &Agent, changes: &mut Vec<RowChange>) {
        let state = AgentState::from(agent.health);
        match self.rows.get_mut(&agent.id) {
            Some(row) => {
                if row.agent_name != agent.name || row.agent_state != state {
                    row.agent_name = agent.name.clone();
                    row.agent_state = state;
                    changes.push(RowChange::Updated(row.clone()));
                }
            }
            None => {
                let row = AgentRow::new(agent, &self.columns);
                changes.push(RowChange::Added(row.clone()));
                self.rows.insert(agent.id, row);
            }
        }
    }

    fn apply_upsert(&mut self, item: &Item, changes: &mut Vec<RowChange>) {
        if !self.counts_incrementally(item.kind()) {
            return;
        }

        // a booking that ended or was canceled no longer counts
        if item.kind() == ItemKind::Booking && !item.is_active(Utc::now()) {
            self.apply_delete(&item.id, changes);
            return;
        }

        let seen = ItemSighting {
            host_agent_id: item.host_agent_id,
            counter: item.counter(),
        };
        match self.sightings.insert(item.id, seen) {
            None => self.increment(seen, changes),
            Some(previous) if previous == seen => {
                trace!(item_id = %item.id, "item already counted");
            }
            Some(previous) => {
                self.decrement(previous, changes);
                self.increment(seen, changes);
            }
        }
    }

    fn apply_delete(&mut self, item_id: &ItemId, changes: &mut Vec<RowChange>) {
        if let Some(previous) = self.sightings.remove(item_id) {
            self.decrement(previous, changes);
        }
    }

    fn increment(&mut self, at: ItemSighting, changes: &mut Vec<RowChange>) {
        if !self.rows.contains_key(&at.host_agent_id) {
            let row = AgentRow::placeholder(at.host_agent_id, &self.columns);
            changes.push(RowChange::Added(row.clone()));
            self.rows.insert(at.host_agent_id, row);
        }
        if let Some(row) = self.rows.get_mut(&at.host_agent_id) {
            let cell = row.counters.entry(at.counter).or_insert(0);
            *cell += 1;
            changes.push(RowChange::CellUpdated {
                agent_id: at.host_agent_id,
                counter: at.counter,
                value: *cell,
            });
        }
    }

    fn decrement(&mut self, at: ItemSighting, changes: &mut Vec<RowChange>) {
        let Some(row) = self.rows.get_mut(&at.host_agent_id) else {
            warn!(agent_id = at.host_agent_id, counter = %at.counter, "decrement on a missing row");
            return;
        };
        let cell = row.counters.entry(at.counter).or_insert(0);
        if *cell == 0 {
            warn!(agent_id = at.host_agent_id, counter = %at.counter, "counter already at zero");
            counter!(COUNTER_UNDERFLOW_TOTAL.name).increment(1);
            return;
        }
        *cell -= 1;
        changes.push(RowChange::CellUpdated {
            agent_id: at.host_agent_id,
            counter: at.counter,
            value: *cell,
        });
    }
}
