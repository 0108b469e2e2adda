//! Trauma-matching baseline
//!
//! Casualties are taken in triage order. RED patients go to the nearest
//! level I/II centre, YELLOW to the nearest level II/III centre, everyone
//! else to the nearest hospital. With no matching centre the nearest hospital
//! is used.

use super::{
    idle_units, nearest_hospital, trauma_preference, triage_then_distance, ClaimPool,
    DispatchPolicy, PolicyError,
};
use crate::dispatch::{ActionMask, DispatchAction, Observation};

pub struct TraumaMatchingPolicy;

impl DispatchPolicy for TraumaMatchingPolicy {
    fn name(&self) -> &str {
        "trauma"
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
            let prefer = trauma_preference(casualty);
            if let Some(hospital) = nearest_hospital(observation, mask, casualty.location, prefer) {
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

    fn hospitals() -> Vec<crate::dispatch::HospitalView> {
        vec![
            hospital("COMMUNITY", 34.01, -118.0, 4, 0),
            hospital("LEVEL3", 34.3, -118.0, 3, 0),
            hospital("LEVEL1", 34.5, -118.0, 1, 0),
        ]
    }

    #[test]
    fn test_red_goes_to_trauma_centre() {
        let obs = observation(
            vec![casualty(0, 34.0, -118.0, Triage::Red)],
            vec![idle_ambulance(0, 34.0, -118.0)],
            hospitals(),
        );
        let action = TraumaMatchingPolicy.decide(&obs, &mask_for(&obs)).unwrap();
        assert_eq!(
            action.command_for(0),
            &AmbulanceCommand::Dispatch {
                casualty_id: 0,
                hospital_id: "LEVEL1".into()
            }
        );
    }

    #[test]
    fn test_yellow_goes_to_level_two_or_three() {
        let obs = observation(
            vec![casualty(0, 34.0, -118.0, Triage::Yellow)],
            vec![idle_ambulance(0, 34.0, -118.0)],
            hospitals(),
        );
        let action = TraumaMatchingPolicy.decide(&obs, &mask_for(&obs)).unwrap();
        assert!(matches!(
            action.command_for(0),
            AmbulanceCommand::Dispatch { hospital_id, .. } if hospital_id == "LEVEL3"
        ));
    }

    #[test]
    fn test_green_goes_nearest() {
        let obs = observation(
            vec![casualty(0, 34.0, -118.0, Triage::Green)],
            vec![idle_ambulance(0, 34.0, -118.0)],
            hospitals(),
        );
        let action = TraumaMatchingPolicy.decide(&obs, &mask_for(&obs)).unwrap();
        assert!(matches!(
            action.command_for(0),
            AmbulanceCommand::Dispatch { hospital_id, .. } if hospital_id == "COMMUNITY"
        ));
    }

    #[test]
    fn test_falls_back_without_trauma_centre() {
        let obs = observation(
            vec![casualty(0, 34.0, -118.0, Triage::Yellow)],
            vec![idle_ambulance(0, 34.0, -118.0)],
            vec![hospital("ONLY", 34.2, -118.0, 5, 0)],
        );
        let action = TraumaMatchingPolicy.decide(&obs, &mask_for(&obs)).unwrap();
        assert!(matches!(
            action.command_for(0),
            AmbulanceCommand::Dispatch { hospital_id, .. } if hospital_id == "ONLY"
        ));
    }
}
