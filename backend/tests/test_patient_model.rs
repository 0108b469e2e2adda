//! Patient deterioration model
//!
//! Critical invariants tested:
//! - RED untreated dies at exactly minute 20
//! - YELLOW escalates to RED one-way, at minute 251
//! - DECEASED is absorbing; DELIVERED freezes health
//! - Health always stays in [0, 1]

use mci_simulator_core_rs::models::casualty::{
    survival_probability, Casualty, CasualtyStatus, PatientError, Triage, TreatmentKind,
};
use mci_simulator_core_rs::routing::GeoPoint;
use proptest::prelude::*;

fn casualty(triage: Triage) -> Casualty {
    Casualty::new(0, GeoPoint::new(34.05, -118.25), triage, 1.0)
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

// ============================================================================
// Deterioration
// ============================================================================

#[test]
fn test_red_waiting_dies_at_minute_twenty() {
    let mut c = casualty(Triage::Red);

    for minute in 1..20 {
        let update = c.update(1);
        assert!(!update.died, "died early at minute {}", minute);
        assert!(approx(c.health(), 1.0 - 0.05 * minute as f64));
    }
    assert!(approx(c.health(), 0.05));

    let update = c.update(1);
    assert!(update.died);
    assert_eq!(c.time_since_injury(), 20);
    assert_eq!(c.health(), 0.0);
    assert!(!c.is_alive());
    assert_eq!(c.status(), CasualtyStatus::Deceased);
}

#[test]
fn test_red_enroute_decays_slower() {
    let mut c = casualty(Triage::Red);
    c.apply_treatment(TreatmentKind::Pickup).unwrap();
    c.update(10);
    assert!(approx(c.health(), 0.8));
    c.update(40);
    assert!(!c.is_alive());
    assert_eq!(c.time_since_injury(), 50);
}

#[test]
fn test_yellow_escalates_to_red_at_minute_251() {
    let mut c = casualty(Triage::Yellow);

    c.update(250);
    assert!(approx(c.health(), 0.5));
    assert_eq!(c.triage(), Triage::Yellow);

    let update = c.update(1);
    assert!(update.escalated);
    assert_eq!(c.triage(), Triage::Red);
    assert!(approx(c.health(), 0.498));
    assert_eq!(c.initial_triage(), Triage::Yellow);
}

#[test]
fn test_escalated_casualty_uses_red_rate_and_never_reverts() {
    let mut c = casualty(Triage::Yellow);
    c.update(251);

    let update = c.update(1);
    assert!(!update.escalated);
    assert!(approx(c.health(), 0.448));
    assert_eq!(c.triage(), Triage::Red);

    c.update(100);
    assert_eq!(c.triage(), Triage::Red);
    assert!(!c.is_alive());
}

#[test]
fn test_green_never_deteriorates() {
    let mut c = casualty(Triage::Green);
    c.update(1000);
    assert_eq!(c.health(), 1.0);
    assert_eq!(c.status(), CasualtyStatus::Waiting);
    assert_eq!(c.time_since_injury(), 1000);
}

#[test]
fn test_black_is_deceased_at_spawn() {
    let c = Casualty::new(3, GeoPoint::new(0.0, 0.0), Triage::Black, 1.0);
    assert!(!c.is_alive());
    assert_eq!(c.health(), 0.0);
    assert_eq!(c.status(), CasualtyStatus::Deceased);
    assert!(c.is_dead_on_arrival());
}

#[test]
fn test_update_on_dead_casualty_is_noop() {
    let mut c = casualty(Triage::Red);
    c.update(20);
    let before = c.clone();
    let update = c.update(5);
    assert!(!update.died);
    assert_eq!(c, before);
}

// ============================================================================
// Treatment
// ============================================================================

#[test]
fn test_delivery_freezes_health() {
    let mut c = casualty(Triage::Red);
    c.update(3);
    c.apply_treatment(TreatmentKind::Pickup).unwrap();
    c.update(2);
    c.apply_treatment(TreatmentKind::HospitalDelivery).unwrap();
    let frozen = c.health();
    assert!(approx(frozen, 0.81));

    c.update(100);
    assert_eq!(c.health(), frozen);
    assert_eq!(c.status(), CasualtyStatus::Delivered);
    assert!(c.is_alive());
}

#[test]
fn test_treatment_on_deceased_rejected() {
    let mut c = casualty(Triage::Red);
    c.update(20);
    assert_eq!(
        c.apply_treatment(TreatmentKind::Pickup),
        Err(PatientError::Deceased(0))
    );
}

#[test]
fn test_out_of_order_treatment_rejected() {
    let mut c = casualty(Triage::Yellow);
    let err = c.apply_treatment(TreatmentKind::HospitalDelivery).unwrap_err();
    assert!(matches!(
        err,
        PatientError::InvalidTransition {
            status: CasualtyStatus::Waiting,
            ..
        }
    ));

    c.apply_treatment(TreatmentKind::Pickup).unwrap();
    assert!(c.apply_treatment(TreatmentKind::Pickup).is_err());
}

// ============================================================================
// Survival probability (reporting only)
// ============================================================================

#[test]
fn test_survival_probability_table() {
    assert!(approx(survival_probability(Triage::Red, 30.0, 3), 0.70));
    assert!(approx(survival_probability(Triage::Red, 30.0, 2), 0.80));
    assert!(approx(survival_probability(Triage::Yellow, 60.0, 5), 0.90));
    assert!(approx(survival_probability(Triage::Yellow, 61.0, 5), 0.80));
    assert!(approx(survival_probability(Triage::Yellow, 90.0, 5), 0.75));
    assert!(approx(survival_probability(Triage::Green, 200.0, 1), 0.98 - 0.10 - 0.05 * 4.0));
    assert_eq!(survival_probability(Triage::Black, 0.0, 1), 0.0);
}

#[test]
fn test_survival_probability_clamped() {
    assert_eq!(survival_probability(Triage::Red, 10_000.0, 5), 0.0);
}

proptest! {
    #[test]
    fn prop_health_stays_in_unit_interval(
        triage in prop_oneof![Just(Triage::Red), Just(Triage::Yellow), Just(Triage::Green)],
        initial in 0.0f64..=1.0,
        steps in proptest::collection::vec(0u32..40, 0..20),
        pickup_at in 0usize..20,
    ) {
        let mut c = Casualty::new(1, GeoPoint::new(0.0, 0.0), triage, initial);
        for (i, minutes) in steps.iter().enumerate() {
            if i == pickup_at && c.status() == CasualtyStatus::Waiting {
                let _ = c.apply_treatment(TreatmentKind::Pickup);
            }
            c.update(*minutes);
            prop_assert!((0.0..=1.0).contains(&c.health()));
            prop_assert_eq!(c.is_alive(), c.status() != CasualtyStatus::Deceased);
            prop_assert_eq!(c.is_alive(), c.health() > 0.0);
        }
    }

    #[test]
    fn prop_escalation_is_one_way(minutes in proptest::collection::vec(1u32..30, 1..40)) {
        let mut c = Casualty::new(1, GeoPoint::new(0.0, 0.0), Triage::Yellow, 0.6);
        let mut seen_red = false;
        for m in minutes {
            c.update(m);
            if seen_red {
                prop_assert_eq!(c.triage(), Triage::Red);
            }
            seen_red |= c.triage() == Triage::Red;
        }
    }
}
