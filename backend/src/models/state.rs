//! Simulation State
//!
//! Mutable runtime state owned exclusively by the engine: casualties, the
//! ambulance/hospital fleet and the metrics accumulator.
//!
//! # Critical Invariants
//!
//! 1. A casualty's `assigned_ambulance` points at an ambulance whose
//!    `casualty_id` points back at it, and vice versa
//! 2. Health stays within [0, 1000] and `alive` agrees with status
//! 3. Casualty and ambulance maps are ordered by ID, so iteration order is
//!    deterministic

use crate::fleet::ResourceFleet;
use crate::models::casualty::{Casualty, CasualtyId, CasualtyStatus, Triage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Running totals accumulated over an episode
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// Deaths during the simulation (excludes dead on arrival)
    pub deaths: u32,
    /// BLACK casualties at the scene
    pub dead_on_arrival: u32,
    pub transported: u32,
    pub pickups: u32,
    /// Minute of each delivery, measured from injury
    pub response_times: Vec<u32>,
    /// Minute of each pickup, measured from injury
    pub pickup_times: Vec<u32>,
    pub trauma_matches: u32,
    pub golden_hour_deliveries: u32,
    pub escalations: u32,
    pub aborted_transports: u32,
    pub over_capacity_deliveries: u32,
    pub invalid_actions: u32,
    pub policy_errors: u32,
    pub listener_errors: u32,
    /// Casualties still WAITING or ENROUTE when the horizon expired
    pub incomplete: u32,
    pub total_reward: f64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn avg_response_time(&self) -> Option<f64> {
        mean_of(&self.response_times)
    }

    pub fn avg_pickup_time(&self) -> Option<f64> {
        mean_of(&self.pickup_times)
    }

    /// Condense into a serializable summary
    pub fn summary(&self, total_casualties: u32, final_minute: u32) -> MetricsSummary {
        let golden_hour_rate = if self.transported == 0 {
            0.0
        } else {
            self.golden_hour_deliveries as f64 / self.transported as f64
        };
        MetricsSummary {
            total_casualties,
            final_minute,
            deaths: self.deaths,
            dead_on_arrival: self.dead_on_arrival,
            transported: self.transported,
            pickups: self.pickups,
            incomplete: self.incomplete,
            avg_response_time: self.avg_response_time(),
            avg_pickup_time: self.avg_pickup_time(),
            trauma_matches: self.trauma_matches,
            golden_hour_deliveries: self.golden_hour_deliveries,
            golden_hour_rate,
            escalations: self.escalations,
            aborted_transports: self.aborted_transports,
            over_capacity_deliveries: self.over_capacity_deliveries,
            invalid_actions: self.invalid_actions,
            policy_errors: self.policy_errors,
            listener_errors: self.listener_errors,
            total_reward: self.total_reward,
        }
    }
}

/// End-of-episode figures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub total_casualties: u32,
    pub final_minute: u32,
    pub deaths: u32,
    pub dead_on_arrival: u32,
    pub transported: u32,
    pub pickups: u32,
    pub incomplete: u32,
    pub avg_response_time: Option<f64>,
    pub avg_pickup_time: Option<f64>,
    pub trauma_matches: u32,
    pub golden_hour_deliveries: u32,
    pub golden_hour_rate: f64,
    pub escalations: u32,
    pub aborted_transports: u32,
    pub over_capacity_deliveries: u32,
    pub invalid_actions: u32,
    pub policy_errors: u32,
    pub listener_errors: u32,
    pub total_reward: f64,
}

fn mean_of(samples: &[u32]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    Some(samples.iter().map(|s| *s as f64).sum::<f64>() / samples.len() as f64)
}

/// Complete runtime state
#[derive(Debug, Clone)]
pub struct SimulationState {
    casualties: BTreeMap<CasualtyId, Casualty>,
    fleet: ResourceFleet,
    metrics: Metrics,
}

impl SimulationState {
    pub fn new(casualties: Vec<Casualty>, fleet: ResourceFleet) -> Self {
        let mut metrics = Metrics::new();
        metrics.dead_on_arrival = casualties.iter().filter(|c| c.is_dead_on_arrival()).count() as u32;
        Self {
            casualties: casualties.into_iter().map(|c| (c.id(), c)).collect(),
            fleet,
            metrics,
        }
    }

    pub fn casualty(&self, id: CasualtyId) -> Option<&Casualty> {
        self.casualties.get(&id)
    }

    pub fn casualty_mut(&mut self, id: CasualtyId) -> Option<&mut Casualty> {
        self.casualties.get_mut(&id)
    }

    pub fn casualties(&self) -> impl Iterator<Item = &Casualty> {
        self.casualties.values()
    }

    pub fn casualties_mut(&mut self) -> impl Iterator<Item = &mut Casualty> {
        self.casualties.values_mut()
    }

    pub fn num_casualties(&self) -> usize {
        self.casualties.len()
    }

    pub fn fleet(&self) -> &ResourceFleet {
        &self.fleet
    }

    pub fn fleet_mut(&mut self) -> &mut ResourceFleet {
        &mut self.fleet
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn metrics_mut(&mut self) -> &mut Metrics {
        &mut self.metrics
    }

    /// Alive, WAITING and unclaimed casualties in ID order
    pub fn dispatchable_casualties(&self) -> Vec<CasualtyId> {
        self.casualties
            .values()
            .filter(|c| c.is_dispatchable())
            .map(|c| c.id())
            .collect()
    }

    /// (unclaimed waiting, unclaimed RED waiting)
    pub fn waiting_counts(&self) -> (u32, u32) {
        let mut waiting = 0;
        let mut red = 0;
        for c in self.casualties.values().filter(|c| c.is_dispatchable()) {
            waiting += 1;
            if c.triage() == Triage::Red {
                red += 1;
            }
        }
        (waiting, red)
    }

    /// Every casualty DELIVERED or DECEASED
    pub fn all_resolved(&self) -> bool {
        self.casualties.values().all(|c| c.status().is_terminal())
    }

    /// Casualties still WAITING or ENROUTE
    pub fn unresolved_count(&self) -> u32 {
        self.casualties
            .values()
            .filter(|c| matches!(c.status(), CasualtyStatus::Waiting | CasualtyStatus::Enroute))
            .count() as u32
    }
}
