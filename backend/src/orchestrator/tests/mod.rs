//! Engine lifecycle tests that need crate-internal access


use crate::models::casualty::{CasualtySeed, Triage};
use crate::models::hospital::Hospital;
use crate::routing::{offset_point, GeoPoint, RegionBounds};
use crate::scenario::{AmbulanceConfig, Scenario, ScenarioMetadata};
use uuid::Uuid;

pub(crate) fn incident() -> GeoPoint {
    GeoPoint::new(34.05, -118.25)
}

/// Scenario with field units parked exactly at the incident
pub(crate) fn scenario(casualties: Vec<(u32, Triage)>, field_units: u32) -> Scenario {
    let incident = incident();
    Scenario {
        metadata: ScenarioMetadata {
            id: Uuid::nil(),
            name: "lifecycle".to_string(),
            region: "TEST".to_string(),
        },
        seed: 1,
        incident_location: incident,
        region_bounds: RegionBounds::new(33.5, 34.5, -118.75, -117.75),
        casualties: casualties
            .into_iter()
            .map(|(id, triage)| CasualtySeed {
                id,
                location: incident,
                triage,
                initial_health: if triage == Triage::Black { 0.0 } else { 1.0 },
            })
            .collect(),
        ambulance_config: AmbulanceConfig {
            ambulances_per_hospital: 0,
            ambulances_per_hospital_variation: 0,
            field_ambulances: field_units,
            field_ambulance_radius_km: 0.0,
            seed: 1,
        },
        hospitals: vec![Hospital::new("H1", offset_point(incident, 6.5, 0.0), 1).with_beds(10)],
    }
}
