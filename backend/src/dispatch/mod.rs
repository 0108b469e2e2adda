//! Dispatch contract between the engine and a decision-maker
//!
//! Each minute the engine hands the decision-maker an [`Observation`] and an
//! [`ActionMask`], and receives a [`DispatchAction`] back. The engine then
//! validates every command against the mask before touching state.
//!
//! # Critical Invariants
//!
//! 1. Only IDLE ambulances appear in the mask; WAIT is always legal
//! 2. Eligible casualties are alive, WAITING and unclaimed
//! 3. Commands are resolved in ascending ambulance ID; the first valid claim
//!    on a casualty wins and later claims fall back to WAIT

pub mod encoding;
pub mod reward;

use crate::models::ambulance::{AmbulanceId, AmbulanceKind, AmbulanceStatus};
use crate::models::casualty::{CasualtyId, CasualtyStatus, Triage};
use crate::models::hospital::HospitalId;
use crate::routing::{GeoPoint, RegionBounds};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

pub use encoding::{EncodedMask, EncodedObservation, ObservationEncoder};
pub use reward::{replay_rewards, RewardWeights, TickOutcome};

// ============================================================================
// Observation
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CasualtyView {
    pub id: CasualtyId,
    pub location: GeoPoint,
    pub triage: Triage,
    pub health: f64,
    pub alive: bool,
    pub status: CasualtyStatus,
    pub assigned_ambulance: Option<AmbulanceId>,
    pub time_since_injury: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmbulanceView {
    pub id: AmbulanceId,
    pub location: GeoPoint,
    pub status: AmbulanceStatus,
    pub kind: AmbulanceKind,
    /// Patient on board
    pub carrying: bool,
    pub base_hospital_id: Option<HospitalId>,
    pub eta_minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HospitalView {
    pub id: HospitalId,
    pub location: GeoPoint,
    pub trauma_level: u8,
    pub beds: Option<u32>,
    pub current_load: u32,
    pub helipad: bool,
}

/// Everything a decision-maker may look at for one minute
///
/// Casualties and ambulances are sorted by ID; hospitals keep scenario order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub minute: u32,
    pub horizon: u32,
    /// `minute / horizon`, clamped to [0, 1]
    pub elapsed_fraction: f64,
    pub incident_location: GeoPoint,
    pub region_bounds: RegionBounds,
    pub ambulance_speed_kmh: f64,
    pub casualties: Vec<CasualtyView>,
    pub ambulances: Vec<AmbulanceView>,
    pub hospitals: Vec<HospitalView>,
}

impl Observation {
    pub fn casualty(&self, id: CasualtyId) -> Option<&CasualtyView> {
        self.casualties
            .binary_search_by_key(&id, |c| c.id)
            .ok()
            .map(|i| &self.casualties[i])
    }

    pub fn ambulance(&self, id: AmbulanceId) -> Option<&AmbulanceView> {
        self.ambulances
            .binary_search_by_key(&id, |a| a.id)
            .ok()
            .map(|i| &self.ambulances[i])
    }

    pub fn hospital(&self, id: &str) -> Option<&HospitalView> {
        self.hospitals.iter().find(|h| h.id == id)
    }
}

// ============================================================================
// Action
// ============================================================================

/// What one ambulance should do this minute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum AmbulanceCommand {
    Wait,
    Dispatch {
        casualty_id: CasualtyId,
        hospital_id: HospitalId,
    },
    ReturnToBase,
    /// Stand by at a point inside the region
    MoveToLocation {
        target: GeoPoint,
    },
}

/// Commands keyed by ambulance; unmapped ambulances wait
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatchAction {
    commands: BTreeMap<AmbulanceId, AmbulanceCommand>,
}

impl DispatchAction {
    /// Every ambulance waits
    pub fn wait() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, ambulance_id: AmbulanceId, command: AmbulanceCommand) {
        self.commands.insert(ambulance_id, command);
    }

    pub fn dispatch(
        &mut self,
        ambulance_id: AmbulanceId,
        casualty_id: CasualtyId,
        hospital_id: impl Into<HospitalId>,
    ) {
        self.insert(
            ambulance_id,
            AmbulanceCommand::Dispatch {
                casualty_id,
                hospital_id: hospital_id.into(),
            },
        );
    }

    pub fn return_to_base(&mut self, ambulance_id: AmbulanceId) {
        self.insert(ambulance_id, AmbulanceCommand::ReturnToBase);
    }

    pub fn move_to(&mut self, ambulance_id: AmbulanceId, target: GeoPoint) {
        self.insert(ambulance_id, AmbulanceCommand::MoveToLocation { target });
    }

    pub fn command_for(&self, ambulance_id: AmbulanceId) -> &AmbulanceCommand {
        self.commands
            .get(&ambulance_id)
            .unwrap_or(&AmbulanceCommand::Wait)
    }

    /// Commands in ascending ambulance ID
    pub fn iter(&self) -> impl Iterator<Item = (AmbulanceId, &AmbulanceCommand)> {
        self.commands.iter().map(|(id, c)| (*id, c))
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

// ============================================================================
// Mask
// ============================================================================

/// Reason a command was refused
#[derive(Debug, Error, Clone, PartialEq, Serialize, Deserialize)]
pub enum InvalidActionError {
    #[error("ambulance {0} is not idle")]
    AmbulanceNotIdle(AmbulanceId),

    #[error("ambulance {ambulance_id} cannot take casualty {casualty_id}: not alive, waiting and unclaimed")]
    CasualtyNotEligible {
        ambulance_id: AmbulanceId,
        casualty_id: CasualtyId,
    },

    #[error("casualty {casualty_id} already claimed this minute; ambulance {ambulance_id} waits")]
    DuplicateClaim {
        ambulance_id: AmbulanceId,
        casualty_id: CasualtyId,
    },

    #[error("ambulance {ambulance_id} routed to unknown hospital {hospital_id:?}")]
    UnknownHospital {
        ambulance_id: AmbulanceId,
        hospital_id: HospitalId,
    },

    #[error("ambulance {0} has no base to return to")]
    NoBase(AmbulanceId),

    #[error("ambulance {ambulance_id} sent to ({}, {}), which is not a valid point in the region", target.lat, target.lon)]
    InvalidTarget {
        ambulance_id: AmbulanceId,
        target: GeoPoint,
    },
}

/// Legal commands for the current minute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionMask {
    pub minute: u32,
    /// IDLE ambulances, with whether they may return to base
    idle: BTreeMap<AmbulanceId, bool>,
    casualties: BTreeSet<CasualtyId>,
    hospitals: BTreeSet<HospitalId>,
    /// Standby targets must fall inside this box when set
    region_bounds: Option<RegionBounds>,
}

impl ActionMask {
    pub fn new(
        minute: u32,
        idle: BTreeMap<AmbulanceId, bool>,
        casualties: BTreeSet<CasualtyId>,
        hospitals: BTreeSet<HospitalId>,
    ) -> Self {
        Self {
            minute,
            idle,
            casualties,
            hospitals,
            region_bounds: None,
        }
    }

    pub fn with_region_bounds(mut self, bounds: RegionBounds) -> Self {
        self.region_bounds = Some(bounds);
        self
    }

    /// IDLE ambulances in ID order
    pub fn idle_ambulances(&self) -> impl Iterator<Item = AmbulanceId> + '_ {
        self.idle.keys().copied()
    }

    pub fn is_idle(&self, ambulance_id: AmbulanceId) -> bool {
        self.idle.contains_key(&ambulance_id)
    }

    /// Casualties this ambulance may be sent to; `None` if it is not idle
    pub fn eligible_casualties(&self, ambulance_id: AmbulanceId) -> Option<&BTreeSet<CasualtyId>> {
        if self.is_idle(ambulance_id) {
            Some(&self.casualties)
        } else {
            None
        }
    }

    /// Legal destination hospitals
    pub fn hospitals(&self) -> &BTreeSet<HospitalId> {
        &self.hospitals
    }

    pub fn can_return_to_base(&self, ambulance_id: AmbulanceId) -> bool {
        self.idle.get(&ambulance_id).copied().unwrap_or(false)
    }

    /// Finite, on the globe, and inside the region when bounds are set
    pub fn is_valid_target(&self, target: GeoPoint) -> bool {
        target.validate().is_ok() && self.region_bounds.map_or(true, |b| b.contains(target))
    }

    /// Check one command against the mask
    pub fn check(
        &self,
        ambulance_id: AmbulanceId,
        command: &AmbulanceCommand,
    ) -> Result<(), InvalidActionError> {
        match command {
            AmbulanceCommand::Wait => Ok(()),
            AmbulanceCommand::Dispatch {
                casualty_id,
                hospital_id,
            } => {
                if !self.is_idle(ambulance_id) {
                    return Err(InvalidActionError::AmbulanceNotIdle(ambulance_id));
                }
                if !self.casualties.contains(casualty_id) {
                    return Err(InvalidActionError::CasualtyNotEligible {
                        ambulance_id,
                        casualty_id: *casualty_id,
                    });
                }
                if !self.hospitals.contains(hospital_id) {
                    return Err(InvalidActionError::UnknownHospital {
                        ambulance_id,
                        hospital_id: hospital_id.clone(),
                    });
                }
                Ok(())
            }
            AmbulanceCommand::ReturnToBase => {
                if !self.is_idle(ambulance_id) {
                    return Err(InvalidActionError::AmbulanceNotIdle(ambulance_id));
                }
                if !self.can_return_to_base(ambulance_id) {
                    return Err(InvalidActionError::NoBase(ambulance_id));
                }
                Ok(())
            }
            AmbulanceCommand::MoveToLocation { target } => {
                if !self.is_idle(ambulance_id) {
                    return Err(InvalidActionError::AmbulanceNotIdle(ambulance_id));
                }
                if !self.is_valid_target(*target) {
                    return Err(InvalidActionError::InvalidTarget {
                        ambulance_id,
                        target: *target,
                    });
                }
                Ok(())
            }
        }
    }
}
