//! Casualty model
//!
//! Each casualty carries a triage category and a health value that
//! deteriorates minute by minute according to a fixed per-triage rate table:
//!
//! | Triage | WAITING | ENROUTE | Special rule                       |
//! |--------|---------|---------|------------------------------------|
//! | RED    | −5%/min | −2%/min | dies at minute 20 untreated        |
//! | YELLOW | −0.2%   | −0.1%   | becomes RED once health < 0.5      |
//! | GREEN  | 0       | 0       | never deteriorates                 |
//! | BLACK  | n/a     | n/a     | DECEASED at spawn                  |
//!
//! # Critical Invariants
//!
//! 1. Health is stored as integer thousandths (0..=1000) so decay is exact
//! 2. health == 0 ⇔ alive == false ⇔ status == DECEASED, and DECEASED is absorbing
//! 3. Status moves WAITING → ENROUTE → DELIVERED only
//! 4. YELLOW → RED is one-way
//! 5. Life and death depend only on health; survival probability is reporting-only

use crate::models::ambulance::AmbulanceId;
use crate::routing::GeoPoint;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Casualty identifier, sequential from 0 within a scenario
pub type CasualtyId = u32;

/// Full health in stored units
pub const HEALTH_SCALE: u32 = 1000;

/// YELLOW casualties below this health are re-labelled RED
pub const YELLOW_TO_RED_THRESHOLD: u32 = 500;

/// Golden-hour window in minutes
pub const GOLDEN_HOUR_MINUTES: u32 = 60;

/// START triage category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Triage {
    Red,
    Yellow,
    Green,
    Black,
}

impl Triage {
    /// Dispatch priority rank: RED first, BLACK last
    pub fn priority_rank(self) -> u8 {
        match self {
            Triage::Red => 0,
            Triage::Yellow => 1,
            Triage::Green => 2,
            Triage::Black => 3,
        }
    }

    /// Health lost per minute in the given status, in stored units
    pub fn decay_per_minute(self, status: CasualtyStatus) -> u32 {
        match (self, status) {
            (Triage::Red, CasualtyStatus::Waiting) => 50,
            (Triage::Red, CasualtyStatus::Enroute) => 20,
            (Triage::Yellow, CasualtyStatus::Waiting) => 2,
            (Triage::Yellow, CasualtyStatus::Enroute) => 1,
            _ => 0,
        }
    }

    /// RED or YELLOW
    pub fn is_urgent(self) -> bool {
        matches!(self, Triage::Red | Triage::Yellow)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Triage::Red => "RED",
            Triage::Yellow => "YELLOW",
            Triage::Green => "GREEN",
            Triage::Black => "BLACK",
        }
    }
}

/// Casualty lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CasualtyStatus {
    Waiting,
    Enroute,
    Delivered,
    Deceased,
}

impl CasualtyStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, CasualtyStatus::Delivered | CasualtyStatus::Deceased)
    }
}

/// Treatment applied to a casualty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TreatmentKind {
    /// Picked up by an ambulance; switches to the ENROUTE rate
    Pickup,
    /// Handed over at a hospital; health freezes
    HospitalDelivery,
}

/// Errors from casualty transitions
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PatientError {
    #[error("casualty {0} is deceased")]
    Deceased(CasualtyId),

    #[error("casualty {id} cannot receive {treatment:?} while {status:?}")]
    InvalidTransition {
        id: CasualtyId,
        treatment: TreatmentKind,
        status: CasualtyStatus,
    },
}

/// What changed during a health update
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthUpdate {
    /// Casualty died during this update
    pub died: bool,
    /// YELLOW was re-labelled RED during this update
    pub escalated: bool,
}

/// Casualty as written into a scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CasualtySeed {
    pub id: CasualtyId,
    pub location: GeoPoint,
    pub triage: Triage,
    /// Initial health in [0, 1]
    pub initial_health: f64,
}

/// Runtime casualty state
///
/// # Example
/// ```
/// use mci_simulator_core_rs::models::casualty::{Casualty, CasualtyStatus, Triage};
/// use mci_simulator_core_rs::routing::GeoPoint;
///
/// let mut c = Casualty::new(0, GeoPoint::new(37.0, -122.0), Triage::Red, 1.0);
/// c.update(10);
/// assert!((c.health() - 0.5).abs() < 1e-12);
/// c.update(10);
/// assert_eq!(c.status(), CasualtyStatus::Deceased);
/// assert!(!c.is_alive());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Casualty {
    id: CasualtyId,
    location: GeoPoint,
    triage: Triage,
    /// Triage assigned at the scene, before any escalation
    initial_triage: Triage,
    health: u32,
    alive: bool,
    status: CasualtyStatus,
    time_since_injury: u32,
    /// Ambulance committed to this casualty (back-reference only)
    assigned_ambulance: Option<AmbulanceId>,
}

impl Casualty {
    /// Create a casualty; BLACK casualties start deceased with zero health
    pub fn new(id: CasualtyId, location: GeoPoint, triage: Triage, initial_health: f64) -> Self {
        let health = if triage == Triage::Black {
            0
        } else {
            to_units(initial_health)
        };
        let alive = health > 0;
        Self {
            id,
            location,
            triage,
            initial_triage: triage,
            health,
            alive,
            status: if alive {
                CasualtyStatus::Waiting
            } else {
                CasualtyStatus::Deceased
            },
            time_since_injury: 0,
            assigned_ambulance: None,
        }
    }

    pub fn from_seed(seed: &CasualtySeed) -> Self {
        Self::new(seed.id, seed.location, seed.triage, seed.initial_health)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn id(&self) -> CasualtyId {
        self.id
    }

    pub fn location(&self) -> GeoPoint {
        self.location
    }

    pub fn triage(&self) -> Triage {
        self.triage
    }

    pub fn initial_triage(&self) -> Triage {
        self.initial_triage
    }

    /// Health in [0, 1]
    pub fn health(&self) -> f64 {
        self.health as f64 / HEALTH_SCALE as f64
    }

    /// Health in stored thousandths
    pub fn health_units(&self) -> u32 {
        self.health
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn status(&self) -> CasualtyStatus {
        self.status
    }

    pub fn time_since_injury(&self) -> u32 {
        self.time_since_injury
    }

    pub fn assigned_ambulance(&self) -> Option<AmbulanceId> {
        self.assigned_ambulance
    }

    /// Alive, WAITING and not yet claimed by an ambulance
    pub fn is_dispatchable(&self) -> bool {
        self.alive && self.status == CasualtyStatus::Waiting && self.assigned_ambulance.is_none()
    }

    /// Dead on arrival (BLACK at the scene)
    pub fn is_dead_on_arrival(&self) -> bool {
        self.initial_triage == Triage::Black
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    /// Advance the casualty by `delta_minutes`
    ///
    /// Decay is applied one minute at a time so that a YELLOW → RED escalation
    /// switches the rate from the following minute onwards.
    pub fn update(&mut self, delta_minutes: u32) -> HealthUpdate {
        let mut outcome = HealthUpdate::default();
        if !self.alive {
            return outcome;
        }

        for _ in 0..delta_minutes {
            self.time_since_injury += 1;
            if self.status == CasualtyStatus::Delivered {
                continue;
            }

            let rate = self.triage.decay_per_minute(self.status);
            self.health = self.health.saturating_sub(rate);

            if self.triage == Triage::Yellow && self.health < YELLOW_TO_RED_THRESHOLD {
                self.triage = Triage::Red;
                outcome.escalated = true;
            }

            if self.health == 0 {
                self.alive = false;
                self.status = CasualtyStatus::Deceased;
                outcome.died = true;
                break;
            }
        }

        outcome
    }

    /// Apply a treatment transition
    pub fn apply_treatment(&mut self, treatment: TreatmentKind) -> Result<(), PatientError> {
        if !self.alive {
            return Err(PatientError::Deceased(self.id));
        }

        let next = match (treatment, self.status) {
            (TreatmentKind::Pickup, CasualtyStatus::Waiting) => CasualtyStatus::Enroute,
            (TreatmentKind::HospitalDelivery, CasualtyStatus::Enroute) => {
                CasualtyStatus::Delivered
            }
            (treatment, status) => {
                return Err(PatientError::InvalidTransition {
                    id: self.id,
                    treatment,
                    status,
                })
            }
        };
        self.status = next;
        Ok(())
    }

    /// Record the ambulance committed to this casualty
    pub fn assign(&mut self, ambulance: AmbulanceId) {
        self.assigned_ambulance = Some(ambulance);
    }

    /// Clear the ambulance back-reference
    pub fn unassign(&mut self) {
        self.assigned_ambulance = None;
    }

    /// Survival estimate for reporting
    ///
    /// Never used to decide life or death.
    pub fn survival_probability(&self, time_to_hospital_minutes: f64, trauma_level: u8) -> f64 {
        survival_probability(self.triage, time_to_hospital_minutes, trauma_level)
    }
}

/// Survival estimate by triage, time to definitive care and hospital capability
///
/// Base RED 0.70, YELLOW 0.90, GREEN 0.98, BLACK 0. Past 60 minutes subtract
/// 0.10 plus 0.05 per further full 30-minute block. RED/YELLOW reaching a
/// level 1 or 2 centre gain 0.10. Clamped to [0, 1].
///
/// # Example
/// ```
/// use mci_simulator_core_rs::models::casualty::{survival_probability, Triage};
///
/// assert!((survival_probability(Triage::Red, 30.0, 1) - 0.8).abs() < 1e-12);
/// assert!((survival_probability(Triage::Yellow, 95.0, 5) - 0.75).abs() < 1e-12);
/// ```
pub fn survival_probability(triage: Triage, time_to_hospital_minutes: f64, trauma_level: u8) -> f64 {
    let base: f64 = match triage {
        Triage::Red => 0.70,
        Triage::Yellow => 0.90,
        Triage::Green => 0.98,
        Triage::Black => return 0.0,
    };

    let mut probability = base;
    let golden = GOLDEN_HOUR_MINUTES as f64;
    if time_to_hospital_minutes > golden {
        let extra_blocks = ((time_to_hospital_minutes - golden) / 30.0).floor();
        probability -= 0.10 + 0.05 * extra_blocks;
    }
    if triage.is_urgent() && (1..=2).contains(&trauma_level) {
        probability += 0.10;
    }
    probability.clamp(0.0, 1.0)
}

fn to_units(health: f64) -> u32 {
    if !health.is_finite() {
        return 0;
    }
    (health.clamp(0.0, 1.0) * HEALTH_SCALE as f64).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at_origin(triage: Triage) -> Casualty {
        Casualty::new(1, GeoPoint::new(0.0, 0.0), triage, 1.0)
    }

    #[test]
    fn test_black_starts_deceased() {
        let c = at_origin(Triage::Black);
        assert!(!c.is_alive());
        assert_eq!(c.status(), CasualtyStatus::Deceased);
        assert_eq!(c.health(), 0.0);
        assert!(c.is_dead_on_arrival());
    }

    #[test]
    fn test_green_never_deteriorates() {
        let mut c = at_origin(Triage::Green);
        c.update(500);
        assert_eq!(c.health_units(), HEALTH_SCALE);
        assert_eq!(c.time_since_injury(), 500);
    }

    #[test]
    fn test_enroute_rate_is_lower() {
        let mut c = at_origin(Triage::Red);
        c.apply_treatment(TreatmentKind::Pickup).unwrap();
        c.update(10);
        assert_eq!(c.health_units(), 800);
    }

    #[test]
    fn test_delivery_freezes_health() {
        let mut c = at_origin(Triage::Red);
        c.update(3);
        c.apply_treatment(TreatmentKind::Pickup).unwrap();
        c.apply_treatment(TreatmentKind::HospitalDelivery).unwrap();
        let frozen = c.health_units();
        c.update(100);
        assert_eq!(c.health_units(), frozen);
        assert_eq!(c.status(), CasualtyStatus::Delivered);
        assert_eq!(c.time_since_injury(), 103);
    }

    #[test]
    fn test_treatment_rejected_when_deceased() {
        let mut c = at_origin(Triage::Red);
        c.update(20);
        assert_eq!(
            c.apply_treatment(TreatmentKind::Pickup),
            Err(PatientError::Deceased(1))
        );
    }

    #[test]
    fn test_delivery_requires_pickup() {
        let mut c = at_origin(Triage::Yellow);
        assert!(matches!(
            c.apply_treatment(TreatmentKind::HospitalDelivery),
            Err(PatientError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_escalated_yellow_uses_red_rate() {
        let mut c = Casualty::new(2, GeoPoint::new(0.0, 0.0), Triage::Yellow, 0.502);
        let first = c.update(1);
        assert!(!first.escalated);
        assert_eq!(c.health_units(), 500);
        let second = c.update(1);
        assert!(second.escalated);
        assert_eq!(c.triage(), Triage::Red);
        assert_eq!(c.health_units(), 498);
        c.update(1);
        assert_eq!(c.health_units(), 448);
        assert_eq!(c.initial_triage(), Triage::Yellow);
    }

    #[test]
    fn test_survival_probability_late_arrival() {
        assert!((survival_probability(Triage::Green, 60.0, 5) - 0.98).abs() < 1e-12);
        assert!((survival_probability(Triage::Green, 61.0, 5) - 0.88).abs() < 1e-12);
        assert!((survival_probability(Triage::Red, 150.0, 5) - 0.45).abs() < 1e-12);
        assert_eq!(survival_probability(Triage::Black, 0.0, 1), 0.0);
    }
}
