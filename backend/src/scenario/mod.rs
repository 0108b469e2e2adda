//! Scenario generation
//!
//! A [`Scenario`] is an immutable description of one incident: where it
//! happened, who was hurt, which hospitals can receive patients, and how the
//! ambulance fleet should be spawned. Ambulances themselves are never stored;
//! [`spawn_ambulances`] rebuilds the same roster from the compact
//! [`AmbulanceConfig`] whenever an engine is constructed.
//!
//! # Critical Invariants
//!
//! 1. Same request and seed → identical scenario, including its ID
//! 2. `spawn_ambulances` is a pure function of (incident, config, hospitals);
//!    it owns its RNG, so call order never matters
//! 3. Casualties are clipped to the region bounds

pub mod persistence;

use crate::hospitals::{region_bounds, HospitalSource, HospitalSourceError, DEFAULT_REGION_PADDING_DEG};
use crate::models::ambulance::Ambulance;
use crate::models::casualty::{CasualtySeed, Triage};
use crate::models::hospital::Hospital;
use crate::rng::RngManager;
use crate::routing::{CoordinateError, GeoPoint, RegionBounds, KM_PER_DEGREE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;
use uuid::Uuid;

/// Standard deviation of casualty offsets from the incident, in degrees (~500 m)
pub const CASUALTY_SPREAD_DEG: f64 = 0.0045;

/// Target triage proportions in RED, YELLOW, GREEN, BLACK order
pub const TRIAGE_PROPORTIONS: [f64; 4] = [0.25, 0.40, 0.30, 0.05];

const TRIAGE_ORDER: [Triage; 4] = [Triage::Red, Triage::Yellow, Triage::Green, Triage::Black];

/// Invalid scenario or engine parameters; always fatal at construction
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("no hospitals available for region {0:?}")]
    EmptyHospitalSet(String),

    #[error("invalid region bounds: {0:?}")]
    InvalidBounds(RegionBounds),

    #[error("invalid coordinate: {0}")]
    InvalidCoordinate(#[from] CoordinateError),

    #[error("incident location ({lat}, {lon}) lies outside the region bounds")]
    IncidentOutsideBounds { lat: f64, lon: f64 },

    #[error("field ambulance radius must be finite and non-negative, got {0}")]
    InvalidFieldRadius(f64),

    #[error("duplicate hospital id {0:?}")]
    DuplicateHospitalId(String),

    #[error("duplicate casualty id {0}")]
    DuplicateCasualtyId(u32),

    #[error("casualty {id} has initial health {health} outside [0, 1]")]
    InvalidInitialHealth { id: u32, health: f64 },

    #[error("invalid engine setting: {0}")]
    InvalidSetting(String),
}

/// Compact description of the ambulance fleet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmbulanceConfig {
    /// Base number of units stationed at each hospital
    pub ambulances_per_hospital: u32,
    /// Per-hospital count varies uniformly in ±this range
    pub ambulances_per_hospital_variation: u32,
    /// Units already in the field near the incident
    pub field_ambulances: u32,
    pub field_ambulance_radius_km: f64,
    /// Seed for the spawning stream
    pub seed: u64,
}

impl Default for AmbulanceConfig {
    fn default() -> Self {
        Self {
            ambulances_per_hospital: 2,
            ambulances_per_hospital_variation: 1,
            field_ambulances: 3,
            field_ambulance_radius_km: 10.0,
            seed: 0,
        }
    }
}

impl AmbulanceConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let r = self.field_ambulance_radius_km;
        if !r.is_finite() || r < 0.0 {
            return Err(ConfigurationError::InvalidFieldRadius(r));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioMetadata {
    pub id: Uuid,
    pub name: String,
    pub region: String,
}

/// Immutable incident description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub metadata: ScenarioMetadata,
    /// Seed the scenario was generated from
    pub seed: u64,
    pub incident_location: GeoPoint,
    pub region_bounds: RegionBounds,
    pub casualties: Vec<CasualtySeed>,
    pub ambulance_config: AmbulanceConfig,
    pub hospitals: Vec<Hospital>,
}

impl Scenario {
    /// Check everything an engine relies on
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        validate_hospitals(&self.hospitals, &self.metadata.region)?;
        if !self.region_bounds.is_valid() {
            return Err(ConfigurationError::InvalidBounds(self.region_bounds));
        }
        self.incident_location.validate()?;
        self.ambulance_config.validate()?;

        let mut ids = BTreeSet::new();
        for c in &self.casualties {
            if !ids.insert(c.id) {
                return Err(ConfigurationError::DuplicateCasualtyId(c.id));
            }
            c.location.validate()?;
            if !(0.0..=1.0).contains(&c.initial_health) {
                return Err(ConfigurationError::InvalidInitialHealth {
                    id: c.id,
                    health: c.initial_health,
                });
            }
        }
        Ok(())
    }

    /// Spawn this scenario's ambulance roster
    pub fn spawn_ambulances(&self) -> Result<Vec<Ambulance>, ConfigurationError> {
        spawn_ambulances(self.incident_location, &self.ambulance_config, &self.hospitals)
    }

    pub fn num_casualties(&self) -> usize {
        self.casualties.len()
    }
}

fn validate_hospitals(hospitals: &[Hospital], region: &str) -> Result<(), ConfigurationError> {
    if hospitals.is_empty() {
        return Err(ConfigurationError::EmptyHospitalSet(region.to_string()));
    }
    let mut ids = BTreeSet::new();
    for h in hospitals {
        if !ids.insert(h.id.as_str()) {
            return Err(ConfigurationError::DuplicateHospitalId(h.id.clone()));
        }
        h.location.validate()?;
    }
    Ok(())
}

/// Parameters for one generated scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioRequest {
    pub num_casualties: u32,
    pub ambulance_config: AmbulanceConfig,
    /// Bounds to place the incident in; derived from the hospitals when absent
    pub region_bounds: Option<RegionBounds>,
    pub seed: u64,
    /// Fixed incident location instead of a random draw
    pub incident_location: Option<GeoPoint>,
    pub name: Option<String>,
}

impl ScenarioRequest {
    pub fn new(num_casualties: u32, seed: u64) -> Self {
        Self {
            num_casualties,
            ambulance_config: AmbulanceConfig {
                seed,
                ..AmbulanceConfig::default()
            },
            region_bounds: None,
            seed,
            incident_location: None,
            name: None,
        }
    }
}

/// Builds scenarios over a fixed hospital set
///
/// # Example
/// ```
/// use mci_simulator_core_rs::models::Hospital;
/// use mci_simulator_core_rs::routing::GeoPoint;
/// use mci_simulator_core_rs::scenario::{ScenarioGenerator, ScenarioRequest};
///
/// let hospitals = vec![
///     Hospital::new("H1", GeoPoint::new(37.77, -122.42), 1),
///     Hospital::new("H2", GeoPoint::new(37.80, -122.27), 3),
/// ];
/// let generator = ScenarioGenerator::new("CA", hospitals).unwrap();
/// let scenario = generator.generate(&ScenarioRequest::new(20, 7)).unwrap();
///
/// assert_eq!(scenario.casualties.len(), 20);
/// assert_eq!(scenario, generator.generate(&ScenarioRequest::new(20, 7)).unwrap());
/// ```
#[derive(Debug, Clone)]
pub struct ScenarioGenerator {
    region: String,
    hospitals: Vec<Hospital>,
    bounds: RegionBounds,
}

impl ScenarioGenerator {
    /// Generator over `hospitals`, with bounds padded 0.1° around them
    pub fn new(region: impl Into<String>, hospitals: Vec<Hospital>) -> Result<Self, ConfigurationError> {
        let region = region.into();
        validate_hospitals(&hospitals, &region)?;
        let bounds = region_bounds(&hospitals, DEFAULT_REGION_PADDING_DEG)
            .ok_or_else(|| ConfigurationError::EmptyHospitalSet(region.clone()))?;
        Ok(Self {
            region,
            hospitals,
            bounds,
        })
    }

    /// Generator over the hospitals a source reports for `region`
    pub fn from_source(
        source: &dyn HospitalSource,
        region: &str,
    ) -> Result<Self, ScenarioSourceError> {
        let hospitals = source.get_hospitals(region)?;
        Ok(Self::new(region, hospitals)?)
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn hospitals(&self) -> &[Hospital] {
        &self.hospitals
    }

    /// Bounds derived from the hospital set
    pub fn bounds(&self) -> RegionBounds {
        self.bounds
    }

    /// Generate a scenario
    ///
    /// Draw order is fixed: incident latitude, incident longitude, then for
    /// each casualty its latitude offset, longitude offset and triage, then
    /// the scenario ID.
    pub fn generate(&self, request: &ScenarioRequest) -> Result<Scenario, ConfigurationError> {
        let bounds = request.region_bounds.unwrap_or(self.bounds);
        if !bounds.is_valid() {
            return Err(ConfigurationError::InvalidBounds(bounds));
        }
        request.ambulance_config.validate()?;

        let mut rng = RngManager::new(request.seed);

        let incident_location = match request.incident_location {
            Some(point) => {
                point.validate()?;
                if !bounds.contains(point) {
                    return Err(ConfigurationError::IncidentOutsideBounds {
                        lat: point.lat,
                        lon: point.lon,
                    });
                }
                point
            }
            None => {
                let lat = rng.uniform(bounds.min_lat, bounds.max_lat);
                let lon = rng.uniform(bounds.min_lon, bounds.max_lon);
                GeoPoint::new(lat, lon)
            }
        };

        let casualties = (0..request.num_casualties)
            .map(|id| {
                let raw = GeoPoint::new(
                    rng.normal(incident_location.lat, CASUALTY_SPREAD_DEG),
                    rng.normal(incident_location.lon, CASUALTY_SPREAD_DEG),
                );
                let triage = rng
                    .choose_weighted(&TRIAGE_PROPORTIONS)
                    .map(|i| TRIAGE_ORDER[i])
                    .unwrap_or(Triage::Green);
                CasualtySeed {
                    id,
                    location: bounds.clamp(raw),
                    triage,
                    initial_health: if triage == Triage::Black { 0.0 } else { 1.0 },
                }
            })
            .collect();

        let mut id_bytes = [0u8; 16];
        id_bytes[..8].copy_from_slice(&rng.next().to_le_bytes());
        id_bytes[8..].copy_from_slice(&rng.next().to_le_bytes());
        let id = uuid::Builder::from_random_bytes(id_bytes).into_uuid();

        let name = request
            .name
            .clone()
            .unwrap_or_else(|| format!("{}-{}-seed{}", self.region, request.num_casualties, request.seed));

        Ok(Scenario {
            metadata: ScenarioMetadata {
                id,
                name,
                region: self.region.clone(),
            },
            seed: request.seed,
            incident_location,
            region_bounds: bounds,
            casualties,
            ambulance_config: request.ambulance_config.clone(),
            hospitals: self.hospitals.clone(),
        })
    }
}

/// Failure to build a generator from a hospital source
#[derive(Debug, Error)]
pub enum ScenarioSourceError {
    #[error(transparent)]
    Source(#[from] HospitalSourceError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

/// Build the ambulance roster for an incident
///
/// Hospitals are visited in the given order; each receives
/// `max(0, base + U[-v, v])` HOSPITAL_BASED units at its coordinates. Then
/// `field_ambulances` FIELD_UNIT units are placed uniformly within the field
/// radius of the incident (sqrt-radius polar sampling). IDs run from 0.
pub fn spawn_ambulances(
    incident_location: GeoPoint,
    config: &AmbulanceConfig,
    hospitals: &[Hospital],
) -> Result<Vec<Ambulance>, ConfigurationError> {
    incident_location.validate()?;
    config.validate()?;

    let mut rng = RngManager::new(config.seed);
    let mut ambulances = Vec::new();
    let mut next_id = 0u32;

    let base = config.ambulances_per_hospital as i64;
    let variation = config.ambulances_per_hospital_variation as i64;
    for hospital in hospitals {
        let count = (base + rng.range_inclusive(-variation, variation).unwrap_or(0)).max(0);
        for _ in 0..count {
            ambulances.push(Ambulance::hospital_based(
                next_id,
                hospital.location,
                hospital.id.clone(),
            ));
            next_id += 1;
        }
    }

    let radius_deg = config.field_ambulance_radius_km / KM_PER_DEGREE;
    for _ in 0..config.field_ambulances {
        let r = radius_deg * rng.next_f64().sqrt();
        let theta = rng.uniform(0.0, std::f64::consts::TAU);
        let location = GeoPoint::new(
            incident_location.lat + r * theta.cos(),
            incident_location.lon + r * theta.sin(),
        );
        ambulances.push(Ambulance::field_unit(next_id, location));
        next_id += 1;
    }

    Ok(ambulances)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ambulance::AmbulanceKind;

    fn hospitals() -> Vec<Hospital> {
        vec![
            Hospital::new("H1", GeoPoint::new(37.77, -122.42), 1),
            Hospital::new("H2", GeoPoint::new(37.80, -122.27), 2),
            Hospital::new("H3", GeoPoint::new(37.55, -122.30), 4),
        ]
    }

    #[test]
    fn test_empty_hospital_set_rejected() {
        let err = ScenarioGenerator::new("ZZ", vec![]).unwrap_err();
        assert_eq!(err, ConfigurationError::EmptyHospitalSet("ZZ".to_string()));
    }

    #[test]
    fn test_casualties_stay_inside_bounds() {
        let gen = ScenarioGenerator::new("CA", hospitals()).unwrap();
        let mut request = ScenarioRequest::new(200, 11);
        // Pin the incident on the edge so clipping is exercised
        let b = gen.bounds();
        request.incident_location = Some(GeoPoint::new(b.max_lat, b.min_lon));
        let scenario = gen.generate(&request).unwrap();
        assert!(scenario.casualties.iter().all(|c| b.contains(c.location)));
    }

    #[test]
    fn test_incident_outside_bounds_rejected() {
        let gen = ScenarioGenerator::new("CA", hospitals()).unwrap();
        let mut request = ScenarioRequest::new(5, 1);
        request.incident_location = Some(GeoPoint::new(10.0, 10.0));
        assert!(matches!(
            gen.generate(&request),
            Err(ConfigurationError::IncidentOutsideBounds { .. })
        ));
    }

    #[test]
    fn test_black_casualties_have_zero_health() {
        let gen = ScenarioGenerator::new("CA", hospitals()).unwrap();
        let scenario = gen.generate(&ScenarioRequest::new(300, 5)).unwrap();
        for c in &scenario.casualties {
            if c.triage == Triage::Black {
                assert_eq!(c.initial_health, 0.0);
            } else {
                assert_eq!(c.initial_health, 1.0);
            }
        }
    }

    #[test]
    fn test_spawn_without_variation_is_exact() {
        let config = AmbulanceConfig {
            ambulances_per_hospital: 2,
            ambulances_per_hospital_variation: 0,
            field_ambulances: 4,
            field_ambulance_radius_km: 5.0,
            seed: 9,
        };
        let incident = GeoPoint::new(37.7, -122.4);
        let roster = spawn_ambulances(incident, &config, &hospitals()).unwrap();
        assert_eq!(roster.len(), 10);
        assert_eq!(roster[0].base_hospital_id(), Some("H1"));
        assert_eq!(roster[5].base_hospital_id(), Some("H3"));
        for (i, amb) in roster.iter().enumerate() {
            assert_eq!(amb.id(), i as u32);
        }
        let field: Vec<_> = roster
            .iter()
            .filter(|a| a.kind() == AmbulanceKind::FieldUnit)
            .collect();
        assert_eq!(field.len(), 4);
        for amb in field {
            let d = crate::routing::distance_km(incident, amb.location());
            // 111 km per degree is slightly short of the Haversine figure
            assert!(d <= 5.0 * 1.01, "field unit {} km from incident", d);
        }
    }

    #[test]
    fn test_negative_radius_rejected() {
        let config = AmbulanceConfig {
            field_ambulance_radius_km: -1.0,
            ..AmbulanceConfig::default()
        };
        assert!(matches!(
            spawn_ambulances(GeoPoint::new(0.0, 0.0), &config, &hospitals()),
            Err(ConfigurationError::InvalidFieldRadius(_))
        ));
    }
}
