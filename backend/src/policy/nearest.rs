//! Nearest-first baseline
//!
//! Each idle ambulance takes the closest eligible casualty; the casualty goes
//! to the hospital with the shortest travel time.

use super::{any_hospital, idle_units, nearest_hospital, ClaimPool, DispatchPolicy, PolicyError};
use crate::dispatch::{ActionMask, DispatchAction, Observation};
use crate::routing::distance_km;

pub struct NearestPolicy;

impl DispatchPolicy for NearestPolicy {
    fn name(&self) -> &str {
        "nearest"
    }

    fn decide(
        &mut self,
        observation: &Observation,
        mask: &ActionMask,
    ) -> Result<DispatchAction, PolicyError> {
        let mut action = DispatchAction::wait();
        let mut pool = ClaimPool::new(observation, mask);

        for (ambulance_id, position) in idle_units(observation, mask) {
            let Some(casualty) = pool.take_min_by(|c| distance_km(position, c.location)) else {
                break;
            };
            if let Some(hospital) = nearest_hospital(observation, mask, casualty.location, any_hospital) {
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
    fn test_picks_closest_casualty_and_hospital() {
        let obs = observation(
            vec![
                casualty(0, 34.5, -118.0, Triage::Red),
                casualty(1, 34.01, -118.0, Triage::Green),
            ],
            vec![idle_ambulance(0, 34.0, -118.0)],
            vec![
                hospital("FAR", 33.0, -118.0, 1, 0),
                hospital("NEAR", 34.02, -118.0, 4, 0),
            ],
        );
        let mask = mask_for(&obs);
        let action = NearestPolicy.decide(&obs, &mask).unwrap();
        assert_eq!(
            action.command_for(0),
            &AmbulanceCommand::Dispatch {
                casualty_id: 1,
                hospital_id: "NEAR".into()
            }
        );
    }

    #[test]
    fn test_no_duplicate_claims() {
        let obs = observation(
            vec![casualty(0, 34.0, -118.0, Triage::Red)],
            vec![idle_ambulance(0, 34.0, -118.0), idle_ambulance(1, 34.0, -118.0)],
            vec![hospital("H", 34.1, -118.0, 1, 0)],
        );
        let mask = mask_for(&obs);
        let action = NearestPolicy.decide(&obs, &mask).unwrap();
        assert!(matches!(action.command_for(0), AmbulanceCommand::Dispatch { .. }));
        assert_eq!(action.command_for(1), &AmbulanceCommand::Wait);
    }
}
