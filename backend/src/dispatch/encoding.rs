//! Fixed-size numeric encoding of observations and masks
//!
//! Learned policies expect tensors of constant shape. Entity lists are padded
//! with zero rows up to configured maxima and truncated beyond them. Slots
//! follow observation order: casualties and ambulances by ID, hospitals in
//! scenario order.

use crate::dispatch::{ActionMask, AmbulanceCommand, DispatchAction, Observation};
use crate::models::ambulance::{AmbulanceKind, AmbulanceStatus};
use crate::models::casualty::{CasualtyStatus, Triage};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_CASUALTIES: usize = 100;
pub const DEFAULT_MAX_AMBULANCES: usize = 50;
pub const DEFAULT_MAX_HOSPITALS: usize = 200;

pub const CASUALTY_FEATURES: usize = 6;
pub const AMBULANCE_FEATURES: usize = 7;
pub const HOSPITAL_FEATURES: usize = 5;

const MAX_ETA_MINUTES: f32 = 180.0;
const MAX_BEDS: f32 = 500.0;
const LOWEST_TRAUMA_LEVEL: f32 = 5.0;

/// Zero-padded feature rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedObservation {
    /// `[lat, lon, triage, health, alive, status]`
    pub casualties: Vec<[f32; CASUALTY_FEATURES]>,
    /// `[lat, lon, status, kind, onboard, base, eta]`
    pub ambulances: Vec<[f32; AMBULANCE_FEATURES]>,
    /// `[lat, lon, trauma, beds, helipad]`
    pub hospitals: Vec<[f32; HOSPITAL_FEATURES]>,
    pub incident: [f32; 2],
    pub time: f32,
}

/// Per-ambulance-slot masks
///
/// `casualties[slot][0]` is WAIT; `casualties[slot][k + 1]` is casualty slot `k`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedMask {
    pub casualties: Vec<Vec<bool>>,
    pub hospitals: Vec<Vec<bool>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationEncoder {
    pub max_casualties: usize,
    pub max_ambulances: usize,
    pub max_hospitals: usize,
}

impl Default for ObservationEncoder {
    fn default() -> Self {
        Self {
            max_casualties: DEFAULT_MAX_CASUALTIES,
            max_ambulances: DEFAULT_MAX_AMBULANCES,
            max_hospitals: DEFAULT_MAX_HOSPITALS,
        }
    }
}

fn triage_code(triage: Triage) -> f32 {
    match triage {
        Triage::Red => 0.0,
        Triage::Yellow => 0.33,
        Triage::Green => 0.67,
        Triage::Black => 1.0,
    }
}

fn casualty_status_code(status: CasualtyStatus, claimed: bool) -> f32 {
    match status {
        CasualtyStatus::Waiting if claimed => 0.25,
        CasualtyStatus::Waiting => 0.0,
        CasualtyStatus::Enroute => 0.5,
        CasualtyStatus::Delivered => 0.75,
        CasualtyStatus::Deceased => 1.0,
    }
}

fn ambulance_status_code(status: AmbulanceStatus) -> f32 {
    match status {
        AmbulanceStatus::Idle => 0.0,
        AmbulanceStatus::EnrouteToCasualty => 0.25,
        AmbulanceStatus::Transporting => 0.5,
        AmbulanceStatus::Repositioning => 0.75,
        AmbulanceStatus::Returning => 1.0,
    }
}

fn flag(value: bool) -> f32 {
    if value {
        1.0
    } else {
        0.0
    }
}

impl ObservationEncoder {
    pub fn new(max_casualties: usize, max_ambulances: usize, max_hospitals: usize) -> Self {
        Self {
            max_casualties,
            max_ambulances,
            max_hospitals,
        }
    }

    pub fn encode(&self, obs: &Observation) -> EncodedObservation {
        let bounds = &obs.region_bounds;

        let mut casualties = vec![[0.0; CASUALTY_FEATURES]; self.max_casualties];
        for (row, c) in casualties.iter_mut().zip(&obs.casualties) {
            let (lat, lon) = bounds.normalize(c.location);
            *row = [
                lat as f32,
                lon as f32,
                triage_code(c.triage),
                c.health as f32,
                flag(c.alive),
                casualty_status_code(c.status, c.assigned_ambulance.is_some()),
            ];
        }

        let mut ambulances = vec![[0.0; AMBULANCE_FEATURES]; self.max_ambulances];
        for (row, a) in ambulances.iter_mut().zip(&obs.ambulances) {
            let (lat, lon) = bounds.normalize(a.location);
            let base = a
                .base_hospital_id
                .as_deref()
                .and_then(|id| obs.hospitals.iter().position(|h| h.id == id))
                .filter(|idx| *idx < self.max_hospitals)
                .map(|idx| (idx + 1) as f32 / self.max_hospitals as f32)
                .unwrap_or(0.0);
            *row = [
                lat as f32,
                lon as f32,
                ambulance_status_code(a.status),
                flag(a.kind == AmbulanceKind::FieldUnit),
                flag(a.carrying),
                base,
                (a.eta_minutes as f32 / MAX_ETA_MINUTES).min(1.0),
            ];
        }

        let mut hospitals = vec![[0.0; HOSPITAL_FEATURES]; self.max_hospitals];
        for (row, h) in hospitals.iter_mut().zip(&obs.hospitals) {
            let (lat, lon) = bounds.normalize(h.location);
            *row = [
                lat as f32,
                lon as f32,
                f32::from(h.trauma_level) / LOWEST_TRAUMA_LEVEL,
                h.beds.map_or(0.0, |b| (b as f32 / MAX_BEDS).min(1.0)),
                flag(h.helipad),
            ];
        }

        let (inc_lat, inc_lon) = bounds.normalize(obs.incident_location);

        EncodedObservation {
            casualties,
            ambulances,
            hospitals,
            incident: [inc_lat as f32, inc_lon as f32],
            time: obs.elapsed_fraction as f32,
        }
    }

    pub fn encode_mask(&self, obs: &Observation, mask: &ActionMask) -> EncodedMask {
        let mut casualties = vec![vec![false; self.max_casualties + 1]; self.max_ambulances];
        let mut hospitals = vec![vec![false; self.max_hospitals]; self.max_ambulances];

        for (slot, amb) in obs.ambulances.iter().take(self.max_ambulances).enumerate() {
            let Some(eligible) = mask.eligible_casualties(amb.id) else {
                continue;
            };
            casualties[slot][0] = true;
            for (k, c) in obs.casualties.iter().take(self.max_casualties).enumerate() {
                casualties[slot][k + 1] = eligible.contains(&c.id);
            }
            for (k, h) in obs.hospitals.iter().take(self.max_hospitals).enumerate() {
                hospitals[slot][k] = mask.hospitals().contains(&h.id);
            }
        }

        EncodedMask {
            casualties,
            hospitals,
        }
    }

    /// Turn `[casualty_choice, hospital_choice]` pairs per ambulance slot
    /// into an action
    ///
    /// A casualty choice of 0 means WAIT. Choices pointing at empty slots
    /// decode as WAIT; the engine still validates the result.
    pub fn decode_action(&self, obs: &Observation, choices: &[[usize; 2]]) -> DispatchAction {
        let mut action = DispatchAction::wait();
        for (slot, [casualty_choice, hospital_choice]) in
            choices.iter().take(self.max_ambulances).enumerate()
        {
            let Some(amb) = obs.ambulances.get(slot) else {
                break;
            };
            if *casualty_choice == 0 || *casualty_choice > self.max_casualties {
                continue;
            }
            let casualty = obs.casualties.get(casualty_choice - 1);
            let hospital = obs
                .hospitals
                .get(*hospital_choice)
                .filter(|_| *hospital_choice < self.max_hospitals);
            if let (Some(c), Some(h)) = (casualty, hospital) {
                action.insert(
                    amb.id,
                    AmbulanceCommand::Dispatch {
                        casualty_id: c.id,
                        hospital_id: h.id.clone(),
                    },
                );
            }
        }
        action
    }
}
