//! Snapshot - serializable view of the full engine state
//!
//! Used for the final state dump on fatal errors, for replay comparisons and
//! for the per-tick integrity check.
//!
//! # Critical Invariants
//!
//! - **Health range**: every casualty's health is in [0, 1]
//! - **Life status**: `alive` ⇔ status ≠ DECEASED, and dead means zero health
//! - **Claim integrity**: casualty and ambulance back-references agree
//! - **Load conservation**: hospital loads sum to the delivered count

use crate::models::ambulance::{Ambulance, AmbulanceId, AmbulanceKind, AmbulanceStatus};
use crate::models::casualty::{Casualty, CasualtyId, CasualtyStatus, Triage};
use crate::models::hospital::HospitalId;
use crate::models::state::{Metrics, SimulationState};
use crate::orchestrator::engine::{EnginePhase, SimulationError};
use crate::routing::GeoPoint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

// ============================================================================
// Snapshot Structures
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub scenario_id: Uuid,
    /// Next minute to execute
    pub minute: u32,
    pub horizon: u32,
    pub phase: EnginePhase,
    pub casualties: Vec<CasualtySnapshot>,
    pub ambulances: Vec<AmbulanceSnapshot>,
    /// Delivered patients per hospital, scenario order
    pub hospital_loads: Vec<(HospitalId, u32)>,
    pub metrics: Metrics,
    /// SHA-256 of the engine configuration
    pub config_hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CasualtySnapshot {
    pub id: CasualtyId,
    pub location: GeoPoint,
    pub triage: Triage,
    pub initial_triage: Triage,
    pub health: f64,
    pub alive: bool,
    pub status: CasualtyStatus,
    pub time_since_injury: u32,
    pub assigned_ambulance: Option<AmbulanceId>,
}

impl From<&Casualty> for CasualtySnapshot {
    fn from(c: &Casualty) -> Self {
        CasualtySnapshot {
            id: c.id(),
            location: c.location(),
            triage: c.triage(),
            initial_triage: c.initial_triage(),
            health: c.health(),
            alive: c.is_alive(),
            status: c.status(),
            time_since_injury: c.time_since_injury(),
            assigned_ambulance: c.assigned_ambulance(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmbulanceSnapshot {
    pub id: AmbulanceId,
    pub location: GeoPoint,
    pub status: AmbulanceStatus,
    pub kind: AmbulanceKind,
    pub base_hospital_id: Option<HospitalId>,
    pub casualty_id: Option<CasualtyId>,
    pub destination_hospital_id: Option<HospitalId>,
    pub eta_minutes: u32,
}

impl From<&Ambulance> for AmbulanceSnapshot {
    fn from(a: &Ambulance) -> Self {
        AmbulanceSnapshot {
            id: a.id(),
            location: a.location(),
            status: a.status(),
            kind: a.kind(),
            base_hospital_id: a.base_hospital_id().map(str::to_string),
            casualty_id: a.casualty_id(),
            destination_hospital_id: a.destination_hospital_id().map(str::to_string),
            eta_minutes: a.eta_minutes(),
        }
    }
}

/// Capture the runtime state
pub(crate) fn capture(
    state: &SimulationState,
    scenario_id: Uuid,
    minute: u32,
    horizon: u32,
    phase: EnginePhase,
    config_hash: &str,
) -> StateSnapshot {
    let fleet = state.fleet();
    StateSnapshot {
        scenario_id,
        minute,
        horizon,
        phase,
        casualties: state.casualties().map(CasualtySnapshot::from).collect(),
        ambulances: fleet.ambulances().map(AmbulanceSnapshot::from).collect(),
        hospital_loads: fleet
            .hospitals()
            .iter()
            .map(|h| (h.id.clone(), fleet.load(&h.id)))
            .collect(),
        metrics: state.metrics().clone(),
        config_hash: config_hash.to_string(),
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Check the snapshot's internal consistency
pub fn validate_snapshot(snapshot: &StateSnapshot) -> Result<(), SimulationError> {
    let violation = |message: String| SimulationError::DeterminismViolation {
        minute: snapshot.minute,
        message,
    };

    let ambulances: BTreeMap<AmbulanceId, &AmbulanceSnapshot> =
        snapshot.ambulances.iter().map(|a| (a.id, a)).collect();
    let casualties: BTreeMap<CasualtyId, &CasualtySnapshot> =
        snapshot.casualties.iter().map(|c| (c.id, c)).collect();

    // 1. Health and life status
    for c in &snapshot.casualties {
        if !(0.0..=1.0).contains(&c.health) {
            return Err(violation(format!(
                "casualty {} health {} out of range",
                c.id, c.health
            )));
        }
        if c.alive == (c.status == CasualtyStatus::Deceased) {
            return Err(violation(format!(
                "casualty {} alive={} but status {:?}",
                c.id, c.alive, c.status
            )));
        }
        if !c.alive && c.health > 0.0 {
            return Err(violation(format!(
                "casualty {} deceased with health {}",
                c.id, c.health
            )));
        }
    }

    // 2. Claim integrity, casualty side
    for c in &snapshot.casualties {
        let Some(amb_id) = c.assigned_ambulance else {
            continue;
        };
        let amb = ambulances.get(&amb_id).ok_or_else(|| {
            violation(format!("casualty {} claimed by unknown ambulance {}", c.id, amb_id))
        })?;
        if amb.casualty_id != Some(c.id) {
            return Err(violation(format!(
                "casualty {} claimed by ambulance {} which holds {:?}",
                c.id, amb_id, amb.casualty_id
            )));
        }
    }

    // 3. Claim integrity, ambulance side
    for a in &snapshot.ambulances {
        match (a.status, a.casualty_id) {
            (AmbulanceStatus::Idle, Some(cas))
            | (AmbulanceStatus::Returning, Some(cas))
            | (AmbulanceStatus::Repositioning, Some(cas)) => {
                return Err(violation(format!(
                    "ambulance {} is {:?} but holds casualty {}",
                    a.id, a.status, cas
                )));
            }
            (AmbulanceStatus::EnrouteToCasualty, None) | (AmbulanceStatus::Transporting, None) => {
                return Err(violation(format!(
                    "ambulance {} is {:?} without a casualty",
                    a.id, a.status
                )));
            }
            (status, Some(cas_id)) => {
                let cas = casualties.get(&cas_id).ok_or_else(|| {
                    violation(format!("ambulance {} holds unknown casualty {}", a.id, cas_id))
                })?;
                if cas.assigned_ambulance != Some(a.id) {
                    return Err(violation(format!(
                        "ambulance {} holds casualty {} assigned to {:?}",
                        a.id, cas_id, cas.assigned_ambulance
                    )));
                }
                let expected = if status == AmbulanceStatus::Transporting {
                    CasualtyStatus::Enroute
                } else {
                    CasualtyStatus::Waiting
                };
                if cas.status != expected && cas.status != CasualtyStatus::Deceased {
                    return Err(violation(format!(
                        "ambulance {} is {:?} but casualty {} is {:?}",
                        a.id, status, cas_id, cas.status
                    )));
                }
            }
            (AmbulanceStatus::Idle, None) => {
                if a.eta_minutes != 0 {
                    return Err(violation(format!(
                        "idle ambulance {} has eta {}",
                        a.id, a.eta_minutes
                    )));
                }
            }
            (AmbulanceStatus::Returning, None) | (AmbulanceStatus::Repositioning, None) => {}
        }
    }

    // 4. Load conservation
    let total_load: u32 = snapshot.hospital_loads.iter().map(|(_, load)| *load).sum();
    let delivered = snapshot
        .casualties
        .iter()
        .filter(|c| c.status == CasualtyStatus::Delivered)
        .count() as u32;
    if total_load != delivered || delivered != snapshot.metrics.transported {
        return Err(violation(format!(
            "hospital loads {} / delivered casualties {} / transported {} disagree",
            total_load, delivered, snapshot.metrics.transported
        )));
    }

    Ok(())
}
