//! Baseline dispatchers driven through the full engine
//!
//! Critical invariants tested:
//! - Baselines never produce a refused command
//! - Same seed → same episode for every baseline, including random
//! - Triage ordering and trauma matching are visible in the event log

use mci_simulator_core_rs::hospitals::{CsvHospitalSource, HospitalSource};
use mci_simulator_core_rs::models::casualty::CasualtySeed;
use mci_simulator_core_rs::models::{Event, Hospital, Triage};
use mci_simulator_core_rs::policy::{DispatchPolicy, PolicyConfig, PolicyError};
use mci_simulator_core_rs::routing::{offset_point, GeoPoint, RegionBounds};
use mci_simulator_core_rs::scenario::{
    AmbulanceConfig, Scenario, ScenarioGenerator, ScenarioMetadata, ScenarioRequest,
};
use mci_simulator_core_rs::{EngineConfig, SimulationEngine};
use uuid::Uuid;

// ============================================================================
// Test Helpers
// ============================================================================

fn ca_scenario(casualties: u32, seed: u64) -> Scenario {
    let path = format!("{}/tests/data/ca_hospitals.csv", env!("CARGO_MANIFEST_DIR"));
    let hospitals = CsvHospitalSource::new(path).get_hospitals("CA").unwrap();
    ScenarioGenerator::new("CA", hospitals)
        .unwrap()
        .generate(&ScenarioRequest::new(casualties, seed))
        .unwrap()
}

fn all_policies(seed: u64) -> Vec<PolicyConfig> {
    PolicyConfig::NAMES
        .iter()
        .map(|name| PolicyConfig::from_name(name, seed).unwrap())
        .collect()
}

fn incident() -> GeoPoint {
    GeoPoint::new(34.05, -118.25)
}

/// One field unit at the incident; casualties placed `(triage, km north)`
fn line_scenario(casualties: &[(Triage, f64)], hospitals: Vec<Hospital>) -> Scenario {
    Scenario {
        metadata: ScenarioMetadata {
            id: Uuid::nil(),
            name: "line".to_string(),
            region: "CA".to_string(),
        },
        seed: 0,
        incident_location: incident(),
        region_bounds: RegionBounds::new(33.5, 34.5, -118.75, -117.75),
        casualties: casualties
            .iter()
            .enumerate()
            .map(|(i, (triage, km))| CasualtySeed {
                id: i as u32,
                location: offset_point(incident(), *km, 0.0),
                triage: *triage,
                initial_health: 1.0,
            })
            .collect(),
        ambulance_config: AmbulanceConfig {
            ambulances_per_hospital: 0,
            ambulances_per_hospital_variation: 0,
            field_ambulances: 1,
            field_ambulance_radius_km: 0.0,
            seed: 0,
        },
        hospitals,
    }
}

fn first_dispatch(scenario: &Scenario, policy: PolicyConfig) -> (u32, String) {
    let mut engine =
        SimulationEngine::with_policy_config(scenario, EngineConfig::default(), &policy).unwrap();
    engine.step().unwrap();
    engine
        .event_log()
        .events()
        .iter()
        .find_map(|e| match e {
            Event::Dispatch {
                casualty_id,
                hospital_id,
                ..
            } => Some((*casualty_id, hospital_id.clone())),
            _ => None,
        })
        .expect("a dispatch at minute 0")
}

// ============================================================================
// Whole-episode behaviour
// ============================================================================

#[test]
fn test_baselines_stay_inside_the_mask() {
    for seed in [11, 12] {
        let scenario = ca_scenario(60, seed);
        for policy in all_policies(seed) {
            let mut engine =
                SimulationEngine::with_policy_config(&scenario, EngineConfig::default(), &policy)
                    .unwrap();
            let s = engine.run().unwrap();

            assert_eq!(s.invalid_actions, 0, "{} refused on seed {seed}", policy.name());
            assert_eq!(s.policy_errors, 0);
            assert!(s.transported > 0, "{} transported nobody", policy.name());
            assert_eq!(
                s.deaths + s.dead_on_arrival + s.transported + s.incomplete,
                s.total_casualties
            );
        }
    }
}

#[test]
fn test_baselines_are_deterministic() {
    let scenario = ca_scenario(50, 77);
    for policy in all_policies(5) {
        let digest = || {
            let mut engine =
                SimulationEngine::with_policy_config(&scenario, EngineConfig::default(), &policy)
                    .unwrap();
            engine.run().unwrap();
            engine.event_log().digest()
        };
        assert_eq!(digest(), digest(), "{} diverged", policy.name());
    }
}

#[test]
fn test_every_dispatch_targets_a_scenario_hospital() {
    let scenario = ca_scenario(40, 21);
    for policy in all_policies(21) {
        let mut engine =
            SimulationEngine::with_policy_config(&scenario, EngineConfig::default(), &policy).unwrap();
        engine.run().unwrap();
        for event in engine.event_log().events_of_type("Dispatch") {
            if let Event::Dispatch { hospital_id, .. } = event {
                assert!(scenario.hospitals.iter().any(|h| &h.id == hospital_id));
            }
        }
    }
}

// ============================================================================
// Ordering and matching
// ============================================================================

#[test]
fn test_nearest_and_triage_disagree_on_priority() {
    let scenario = line_scenario(
        &[(Triage::Green, 0.5), (Triage::Red, 4.0)],
        vec![Hospital::new("H1", offset_point(incident(), 8.0, 0.0), 1)],
    );

    assert_eq!(first_dispatch(&scenario, PolicyConfig::Nearest).0, 0);
    assert_eq!(first_dispatch(&scenario, PolicyConfig::Triage).0, 1);
    assert_eq!(first_dispatch(&scenario, PolicyConfig::Trauma).0, 1);
}

#[test]
fn test_trauma_matching_passes_community_hospital() {
    let hospitals = vec![
        Hospital::new("COMMUNITY", offset_point(incident(), 1.0, 0.0), 4),
        Hospital::new("TRAUMA1", offset_point(incident(), 15.0, 0.0), 1),
    ];
    let scenario = line_scenario(&[(Triage::Red, 0.0)], hospitals);

    assert_eq!(first_dispatch(&scenario, PolicyConfig::Nearest).1, "COMMUNITY");
    assert_eq!(first_dispatch(&scenario, PolicyConfig::Triage).1, "COMMUNITY");
    assert_eq!(first_dispatch(&scenario, PolicyConfig::Trauma).1, "TRAUMA1");
    assert_eq!(first_dispatch(&scenario, PolicyConfig::LoadBalancing).1, "TRAUMA1");

    let mut engine =
        SimulationEngine::with_policy_config(&scenario, EngineConfig::default(), &PolicyConfig::Trauma)
            .unwrap();
    let summary = engine.run().unwrap();
    assert_eq!(summary.trauma_matches, 1);
}

#[test]
fn test_load_balancing_spreads_same_minute_assignments() {
    let mut scenario = line_scenario(
        &[(Triage::Green, 0.0), (Triage::Green, 0.0)],
        vec![
            Hospital::new("A", offset_point(incident(), 5.0, 0.0), 3),
            Hospital::new("B", offset_point(incident(), 6.0, 0.0), 3),
        ],
    );
    scenario.ambulance_config.field_ambulances = 2;

    let mut engine = SimulationEngine::with_policy_config(
        &scenario,
        EngineConfig::default(),
        &PolicyConfig::LoadBalancing,
    )
    .unwrap();
    engine.step().unwrap();

    let mut destinations: Vec<String> = engine
        .event_log()
        .events_of_type("Dispatch")
        .into_iter()
        .filter_map(|e| match e {
            Event::Dispatch { hospital_id, .. } => Some(hospital_id.clone()),
            _ => None,
        })
        .collect();
    destinations.sort();
    assert_eq!(destinations, vec!["A".to_string(), "B".to_string()]);
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_policy_config_from_names() {
    for name in PolicyConfig::NAMES {
        let config = PolicyConfig::from_name(name, 9).unwrap();
        let policy: Box<dyn DispatchPolicy> = config.build();
        assert_eq!(policy.name(), name);
    }
    assert_eq!(
        PolicyConfig::from_name("fifo", 0),
        Err(PolicyError::UnknownPolicy("fifo".to_string()))
    );
}

#[test]
fn test_policy_config_json() {
    let parsed: PolicyConfig = serde_json::from_str(r#"{"type":"random","seed":7}"#).unwrap();
    assert_eq!(parsed, PolicyConfig::Random { seed: 7 });

    for config in all_policies(7) {
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["type"], config.name());
    }
    assert!(serde_json::from_str::<PolicyConfig>(r#"{"type":"greedy"}"#).is_err());
}
