//! Load-balancing baseline
//!
//! Same casualty order and trauma filter as trauma matching, but the
//! destination is the least-loaded candidate. Load counts deliveries already
//! made plus assignments handed out earlier in the same decision; travel time
//! breaks load ties.

use super::{
    candidate_hospitals, idle_units, min_hospital_by, trauma_preference, triage_then_distance,
    ClaimPool, DispatchPolicy, PolicyError,
};
use crate::dispatch::{ActionMask, DispatchAction, Observation};
use crate::models::hospital::HospitalId;
use crate::routing::travel_time_minutes;
use std::collections::BTreeMap;

pub struct LoadBalancingPolicy;

impl DispatchPolicy for LoadBalancingPolicy {
    fn name(&self) -> &str {
        "load_balancing"
    }

    fn decide(
        &mut self,
        observation: &Observation,
        mask: &ActionMask,
    ) -> Result<DispatchAction, PolicyError> {
        let mut action = DispatchAction::wait();
        let mut pool = ClaimPool::new(observation, mask);
        let mut assigned: BTreeMap<HospitalId, u32> = BTreeMap::new();
        let speed = observation.ambulance_speed_kmh;

        for (ambulance_id, position) in idle_units(observation, mask) {
            let Some(casualty) = pool.take_min_by(triage_then_distance(position)) else {
                break;
            };
            let candidates = candidate_hospitals(observation, mask, trauma_preference(casualty));
            let chosen = min_hospital_by(&candidates, |h| {
                let pending = assigned.get(&h.id).copied().unwrap_or(0);
                (
                    h.current_load + pending,
                    travel_time_minutes(casualty.location, h.location, speed),
                )
            });
            if let Some(hospital) = chosen {
                *assigned.entry(hospital.id.clone()).or_insert(0) += 1;
                action.dispatch(ambulance_id, casualty.id, hospital.id.clone());
            }
        }

        Ok(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::AmbulanceCommand;
    use crate::models::casualty::Triage;
    use crate::policy::test_support::*;

    #[test]
    fn test_spreads_patients_across_centres() {
        let obs = observation(
            vec![
                casualty(0, 34.0, -118.0, Triage::Red),
                casualty(1, 34.0, -118.0, Triage::Red),
            ],
            vec![idle_ambulance(0, 34.0, -118.0), idle_ambulance(1, 34.0, -118.0)],
            vec![
                hospital("A", 34.1, -118.0, 1, 0),
                hospital("B", 34.3, -118.0, 2, 0),
                hospital("C", 34.0, -118.0, 5, 0),
            ],
        );
        let action = LoadBalancingPolicy.decide(&obs, &mask_for(&obs)).unwrap();
        assert_eq!(
            action.command_for(0),
            &AmbulanceCommand::Dispatch {
                casualty_id: 0,
                hospital_id: "A".into()
            }
        );
        assert_eq!(
            action.command_for(1),
            &AmbulanceCommand::Dispatch {
                casualty_id: 1,
                hospital_id: "B".into()
            }
        );
    }

    #[test]
    fn test_existing_load_counts() {
        let obs = observation(
            vec![casualty(0, 34.0, -118.0, Triage::Red)],
            vec![idle_ambulance(0, 34.0, -118.0)],
            vec![hospital("A", 34.1, -118.0, 1, 3), hospital("B", 34.3, -118.0, 2, 1)],
        );
        let action = LoadBalancingPolicy.decide(&obs, &mask_for(&obs)).unwrap();
        assert!(matches!(
            action.command_for(0),
            AmbulanceCommand::Dispatch { hospital_id, .. } if hospital_id == "B"
        ));
    }
}
