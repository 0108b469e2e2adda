//! Triage-priority baseline: RED, then YELLOW, then GREEN; distance breaks ties

use super::{
    any_hospital, idle_units, nearest_hospital, triage_then_distance, ClaimPool, DispatchPolicy,
    PolicyError,
};
use crate::dispatch::{ActionMask, DispatchAction, Observation};

pub struct TriagePriorityPolicy;

impl DispatchPolicy for TriagePriorityPolicy {
    fn name(&self) -> &str {
        "triage"
    }

    fn decide(
        &mut self,
        observation: &Observation,
        mask: &ActionMask,
    ) -> Result<DispatchAction, PolicyError> {
        let mut action = DispatchAction::wait();
        let mut pool = ClaimPool::new(observation, mask);

        for (ambulance_id, position) in idle_units(observation, mask) {
            let Some(casualty) = pool.take_min_by(triage_then_distance(position)) else {
                break;
            };
            if let Some(hospital) = nearest_hospital(observation, mask, casualty.location, any_hospital) {
                action.dispatch(ambulance_id, casualty.id, hospital.id.clone());
            }
        }

        Ok(action)
    }
}
