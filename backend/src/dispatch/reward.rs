//! Per-minute reward signal
//!
//! The reward for a minute depends only on what happened in that minute, so
//! it can be rebuilt from the event log with [`replay_rewards`] without
//! calling the policy again.

use crate::models::event::{Event, EventLog};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Term weights; signs are part of the weight
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardWeights {
    pub death: f64,
    pub delivery: f64,
    pub trauma_match: f64,
    pub golden_hour: f64,
    pub red_waiting: f64,
    pub waiting: f64,
    pub idle_ambulance: f64,
}

impl Default for RewardWeights {
    fn default() -> Self {
        Self {
            death: -1000.0,
            delivery: 500.0,
            trauma_match: 200.0,
            golden_hour: 100.0,
            red_waiting: -100.0,
            waiting: -10.0,
            idle_ambulance: -5.0,
        }
    }
}

/// Counts that drive one minute's reward
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickOutcome {
    pub deaths: u32,
    pub deliveries: u32,
    pub trauma_matches: u32,
    pub golden_hour_deliveries: u32,
    /// Unclaimed WAITING casualties at the end of the minute
    pub waiting: u32,
    pub red_waiting: u32,
    pub idle_ambulances: u32,
}

impl TickOutcome {
    pub fn reward(&self, weights: &RewardWeights) -> f64 {
        let mut reward = weights.death * f64::from(self.deaths)
            + weights.delivery * f64::from(self.deliveries)
            + weights.trauma_match * f64::from(self.trauma_matches)
            + weights.golden_hour * f64::from(self.golden_hour_deliveries)
            + weights.red_waiting * f64::from(self.red_waiting)
            + weights.waiting * f64::from(self.waiting);

        if self.waiting > 0 {
            reward += weights.idle_ambulance * f64::from(self.idle_ambulances);
        }
        reward
    }
}

/// Rebuild `(minute, reward)` pairs from a log
///
/// Deaths and deliveries are grouped by minute; waiting and idle counts come
/// from the minute's timestep record.
pub fn replay_rewards(log: &EventLog, weights: &RewardWeights) -> Vec<(u32, f64)> {
    let mut outcomes: BTreeMap<u32, TickOutcome> = BTreeMap::new();
    let mut rewards = Vec::new();

    for event in log.events() {
        match event {
            Event::Death { minute, .. } => {
                outcomes.entry(*minute).or_default().deaths += 1;
            }
            Event::Delivery {
                minute,
                trauma_match,
                golden_hour,
                ..
            } => {
                let outcome = outcomes.entry(*minute).or_default();
                outcome.deliveries += 1;
                if *trauma_match {
                    outcome.trauma_matches += 1;
                }
                if *golden_hour {
                    outcome.golden_hour_deliveries += 1;
                }
            }
            Event::Timestep {
                minute,
                waiting,
                red_waiting,
                idle_ambulances,
                ..
            } => {
                let mut outcome = outcomes.remove(minute).unwrap_or_default();
                outcome.waiting = *waiting;
                outcome.red_waiting = *red_waiting;
                outcome.idle_ambulances = *idle_ambulances;
                rewards.push((*minute, outcome.reward(weights)));
            }
            _ => {}
        }
    }

    rewards
}
