//! Seeded random baseline
//!
//! Each idle ambulance takes a uniformly chosen eligible casualty, routed to
//! the nearest hospital. The generator is reseeded per policy instance, so
//! the same seed replays the same choices.

use super::{any_hospital, idle_units, nearest_hospital, ClaimPool, DispatchPolicy, PolicyError};
use crate::dispatch::{ActionMask, DispatchAction, Observation};
use crate::rng::RngManager;

pub struct RandomPolicy {
    rng: RngManager,
}

impl RandomPolicy {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: RngManager::new(seed),
        }
    }
}

impl DispatchPolicy for RandomPolicy {
    fn name(&self) -> &str {
        "random"
    }

    fn decide(
        &mut self,
        observation: &Observation,
        mask: &ActionMask,
    ) -> Result<DispatchAction, PolicyError> {
        let mut action = DispatchAction::wait();
        let mut pool = ClaimPool::new(observation, mask);

        for (ambulance_id, _) in idle_units(observation, mask) {
            let Some(casualty) = self.rng.index(pool.len()).and_then(|idx| pool.take_at(idx)) else {
                break;
            };
            if let Some(hospital) = nearest_hospital(observation, mask, casualty.location, any_hospital) {
                action.dispatch(ambulance_id, casualty.id, hospital.id.clone());
            }
        }

        Ok(action)
    }
}
