//! Dispatch Policy Module
//!
//! A decision-maker looks at the minute's [`Observation`] and [`ActionMask`]
//! and answers with a [`DispatchAction`]. Baselines and externally driven
//! (learned, remote) policies share the one [`DispatchPolicy`] trait.
//!
//! # Available policies
//!
//! 1. **Random**: seeded uniform choice among eligible casualties
//! 2. **Nearest**: closest casualty to each idle ambulance
//! 3. **Triage**: RED before YELLOW before GREEN, then distance
//! 4. **Trauma**: triage order, patients matched to trauma centre level
//! 5. **LoadBalancing**: trauma matching, then least-loaded hospital
//! 6. **External**: caller-supplied closure
//!
//! # Determinism
//!
//! Idle ambulances are served in ascending ID. Every choice breaks ties by
//! lowest casualty ID, then lowest hospital ID. A casualty handed to one
//! ambulance is removed from the pool before the next ambulance chooses, so
//! baselines never duplicate-claim and never leave the mask.
//!
//! ```rust
//! use mci_simulator_core_rs::policy::PolicyConfig;
//!
//! let policy = PolicyConfig::from_name("triage", 7).unwrap().build();
//! assert_eq!(policy.name(), "triage");
//! ```

mod external;
mod load_balancing;
mod nearest;
mod random;
mod trauma;
mod triage;

pub use external::ExternalPolicy;
pub use load_balancing::LoadBalancingPolicy;
pub use nearest::NearestPolicy;
pub use random::RandomPolicy;
pub use trauma::TraumaMatchingPolicy;
pub use triage::TriagePriorityPolicy;

use crate::dispatch::{ActionMask, CasualtyView, DispatchAction, HospitalView, Observation};
use crate::models::ambulance::AmbulanceId;
use crate::models::casualty::Triage;
use crate::routing::{distance_km, travel_time_minutes, GeoPoint};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use thiserror::Error;

/// Failure raised by a decision-maker
///
/// The engine never aborts on these: every ambulance waits for the minute and
/// the failure is counted.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PolicyError {
    #[error("policy failed: {0}")]
    Failed(String),

    #[error("policy unavailable: {0}")]
    Unavailable(String),

    #[error("unknown policy {0:?}")]
    UnknownPolicy(String),
}

/// Decision-maker seam between the engine and a dispatcher
pub trait DispatchPolicy: Send {
    fn name(&self) -> &str;

    fn decide(
        &mut self,
        observation: &Observation,
        mask: &ActionMask,
    ) -> Result<DispatchAction, PolicyError>;
}

/// Serializable policy selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PolicyConfig {
    Random { seed: u64 },
    Nearest,
    Triage,
    Trauma,
    LoadBalancing,
}

impl PolicyConfig {
    /// Names accepted by [`PolicyConfig::from_name`]
    pub const NAMES: [&'static str; 5] = ["random", "nearest", "triage", "trauma", "load_balancing"];

    /// Parse a policy name; `seed` only matters for `random`
    pub fn from_name(name: &str, seed: u64) -> Result<Self, PolicyError> {
        match name {
            "random" => Ok(PolicyConfig::Random { seed }),
            "nearest" => Ok(PolicyConfig::Nearest),
            "triage" => Ok(PolicyConfig::Triage),
            "trauma" => Ok(PolicyConfig::Trauma),
            "load_balancing" => Ok(PolicyConfig::LoadBalancing),
            other => Err(PolicyError::UnknownPolicy(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PolicyConfig::Random { .. } => "random",
            PolicyConfig::Nearest => "nearest",
            PolicyConfig::Triage => "triage",
            PolicyConfig::Trauma => "trauma",
            PolicyConfig::LoadBalancing => "load_balancing",
        }
    }

    pub fn build(&self) -> Box<dyn DispatchPolicy> {
        match self {
            PolicyConfig::Random { seed } => Box::new(RandomPolicy::new(*seed)),
            PolicyConfig::Nearest => Box::new(NearestPolicy),
            PolicyConfig::Triage => Box::new(TriagePriorityPolicy),
            PolicyConfig::Trauma => Box::new(TraumaMatchingPolicy),
            PolicyConfig::LoadBalancing => Box::new(LoadBalancingPolicy),
        }
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

/// Casualties still unclaimed during one `decide` call, in ID order
pub(crate) struct ClaimPool<'a> {
    remaining: Vec<&'a CasualtyView>,
}

impl<'a> ClaimPool<'a> {
    pub(crate) fn new(observation: &'a Observation, mask: &ActionMask) -> Self {
        let remaining = match mask.idle_ambulances().next() {
            Some(first) => mask
                .eligible_casualties(first)
                .map(|ids| {
                    observation
                        .casualties
                        .iter()
                        .filter(|c| ids.contains(&c.id))
                        .collect()
                })
                .unwrap_or_default(),
            None => Vec::new(),
        };
        Self { remaining }
    }

    pub(crate) fn len(&self) -> usize {
        self.remaining.len()
    }

    /// Remove and return the casualty minimising `key`; ties go to lowest ID
    pub(crate) fn take_min_by<K: PartialOrd>(
        &mut self,
        key: impl Fn(&CasualtyView) -> K,
    ) -> Option<&'a CasualtyView> {
        let mut best: Option<(usize, K)> = None;
        for (idx, c) in self.remaining.iter().enumerate() {
            let k = key(c);
            let better = match &best {
                None => true,
                Some((best_idx, best_key)) => match k.partial_cmp(best_key) {
                    Some(Ordering::Less) => true,
                    Some(Ordering::Equal) => c.id < self.remaining[*best_idx].id,
                    _ => false,
                },
            };
            if better {
                best = Some((idx, k));
            }
        }
        best.map(|(idx, _)| self.remaining.remove(idx))
    }

    pub(crate) fn take_at(&mut self, idx: usize) -> Option<&'a CasualtyView> {
        if idx < self.remaining.len() {
            Some(self.remaining.remove(idx))
        } else {
            None
        }
    }
}

/// Ambulance positions for the idle units in the mask
pub(crate) fn idle_units(observation: &Observation, mask: &ActionMask) -> Vec<(AmbulanceId, GeoPoint)> {
    mask.idle_ambulances()
        .filter_map(|id| observation.ambulance(id).map(|a| (id, a.location)))
        .collect()
}

/// Triage rank first, then distance from the ambulance
pub(crate) fn triage_then_distance(from: GeoPoint) -> impl Fn(&CasualtyView) -> (u8, f64) {
    move |c| (c.triage.priority_rank(), distance_km(from, c.location))
}

/// Legal hospitals, optionally restricted by `prefer`; falls back to every
/// legal hospital when none qualify
pub(crate) fn candidate_hospitals<'a>(
    observation: &'a Observation,
    mask: &ActionMask,
    prefer: impl Fn(&HospitalView) -> bool,
) -> Vec<&'a HospitalView> {
    let legal: Vec<&HospitalView> = observation
        .hospitals
        .iter()
        .filter(|h| mask.hospitals().contains(&h.id))
        .collect();
    let preferred: Vec<&HospitalView> = legal.iter().copied().filter(|h| prefer(h)).collect();
    if preferred.is_empty() {
        legal
    } else {
        preferred
    }
}

/// Hospital minimising `key`, ties to lowest hospital ID
pub(crate) fn min_hospital_by<'a, K: PartialOrd>(
    hospitals: &[&'a HospitalView],
    key: impl Fn(&HospitalView) -> K,
) -> Option<&'a HospitalView> {
    let mut best: Option<(&'a HospitalView, K)> = None;
    for h in hospitals {
        let k = key(h);
        let better = match &best {
            None => true,
            Some((best_h, best_key)) => match k.partial_cmp(best_key) {
                Some(Ordering::Less) => true,
                Some(Ordering::Equal) => h.id < best_h.id,
                _ => false,
            },
        };
        if better {
            best = Some((h, k));
        }
    }
    best.map(|(h, _)| h)
}

/// Closest legal hospital to `from` by travel time
pub(crate) fn nearest_hospital<'a>(
    observation: &'a Observation,
    mask: &ActionMask,
    from: GeoPoint,
    prefer: impl Fn(&HospitalView) -> bool,
) -> Option<&'a HospitalView> {
    let speed = observation.ambulance_speed_kmh;
    let candidates = candidate_hospitals(observation, mask, prefer);
    min_hospital_by(&candidates, |h| travel_time_minutes(from, h.location, speed))
}

/// Matching trauma levels: RED to I/II, YELLOW to II/III, anyone else anywhere
pub(crate) fn trauma_preference(casualty: &CasualtyView) -> impl Fn(&HospitalView) -> bool {
    let levels = match casualty.triage {
        Triage::Red => 1..=2,
        Triage::Yellow => 2..=3,
        Triage::Green | Triage::Black => 1..=u8::MAX,
    };
    move |h| levels.contains(&h.trauma_level)
}

pub(crate) fn any_hospital(_: &HospitalView) -> bool {
    true
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::dispatch::{ActionMask, AmbulanceView, CasualtyView, HospitalView, Observation};
    use crate::models::ambulance::{AmbulanceKind, AmbulanceStatus};
    use crate::models::casualty::{CasualtyStatus, Triage};
    use crate::routing::{GeoPoint, RegionBounds};
    use std::collections::{BTreeMap, BTreeSet};

    pub fn casualty(id: u32, lat: f64, lon: f64, triage: Triage) -> CasualtyView {
        CasualtyView {
            id,
            location: GeoPoint::new(lat, lon),
            triage,
            health: 1.0,
            alive: true,
            status: CasualtyStatus::Waiting,
            assigned_ambulance: None,
            time_since_injury: 0,
        }
    }

    pub fn idle_ambulance(id: u32, lat: f64, lon: f64) -> AmbulanceView {
        AmbulanceView {
            id,
            location: GeoPoint::new(lat, lon),
            status: AmbulanceStatus::Idle,
            kind: AmbulanceKind::FieldUnit,
            carrying: false,
            base_hospital_id: None,
            eta_minutes: 0,
        }
    }

    pub fn hospital(id: &str, lat: f64, lon: f64, level: u8, load: u32) -> HospitalView {
        HospitalView {
            id: id.to_string(),
            location: GeoPoint::new(lat, lon),
            trauma_level: level,
            beds: Some(100),
            current_load: load,
            helipad: false,
        }
    }

    pub fn observation(
        casualties: Vec<CasualtyView>,
        ambulances: Vec<AmbulanceView>,
        hospitals: Vec<HospitalView>,
    ) -> Observation {
        Observation {
            minute: 0,
            horizon: 180,
            elapsed_fraction: 0.0,
            incident_location: GeoPoint::new(34.0, -118.0),
            region_bounds: RegionBounds::new(33.0, 35.0, -119.0, -117.0),
            ambulance_speed_kmh: 80.0,
            casualties,
            ambulances,
            hospitals,
        }
    }

    /// Mask treating every idle ambulance and WAITING casualty as eligible
    pub fn mask_for(obs: &Observation) -> ActionMask {
        let idle: BTreeMap<u32, bool> = obs
            .ambulances
            .iter()
            .filter(|a| a.status == AmbulanceStatus::Idle)
            .map(|a| (a.id, a.base_hospital_id.is_some()))
            .collect();
        let casualties: BTreeSet<u32> = obs
            .casualties
            .iter()
            .filter(|c| c.alive && c.status == CasualtyStatus::Waiting && c.assigned_ambulance.is_none())
            .map(|c| c.id)
            .collect();
        let hospitals: BTreeSet<String> = obs.hospitals.iter().map(|h| h.id.clone()).collect();
        ActionMask::new(obs.minute, idle, casualties, hospitals)
    }
}
