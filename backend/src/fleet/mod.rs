//! Ambulance and hospital bookkeeping
//!
//! The fleet owns every ambulance and the per-hospital load counters. Bed
//! capacity is informational: deliveries beyond it are accepted and flagged.

use crate::models::ambulance::{Ambulance, AmbulanceError, AmbulanceId};
use crate::models::casualty::CasualtyId;
use crate::models::hospital::{Hospital, HospitalId};
use crate::routing::GeoPoint;
use crate::scenario::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FleetError {
    #[error("unknown ambulance {0}")]
    UnknownAmbulance(AmbulanceId),

    #[error("unknown hospital {0:?}")]
    UnknownHospital(String),

    #[error("ambulance {0} has no destination hospital")]
    NoDestination(AmbulanceId),

    #[error(transparent)]
    Ambulance(#[from] AmbulanceError),
}

/// Hospital load after a delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryLoad {
    pub load: u32,
    pub over_capacity: bool,
}

#[derive(Debug, Clone)]
pub struct ResourceFleet {
    /// Hospitals in scenario order
    hospitals: Vec<Hospital>,
    hospital_index: BTreeMap<HospitalId, usize>,
    loads: Vec<u32>,
    ambulances: BTreeMap<AmbulanceId, Ambulance>,
}

impl ResourceFleet {
    pub fn new(hospitals: Vec<Hospital>, ambulances: Vec<Ambulance>) -> Result<Self, ConfigurationError> {
        let mut hospital_index = BTreeMap::new();
        for (i, h) in hospitals.iter().enumerate() {
            if hospital_index.insert(h.id.clone(), i).is_some() {
                return Err(ConfigurationError::DuplicateHospitalId(h.id.clone()));
            }
        }

        let mut by_id = BTreeMap::new();
        for amb in ambulances {
            if let Some(base) = amb.base_hospital_id() {
                if !hospital_index.contains_key(base) {
                    return Err(ConfigurationError::InvalidSetting(format!(
                        "ambulance {} based at unknown hospital {:?}",
                        amb.id(),
                        base
                    )));
                }
            }
            let id = amb.id();
            if by_id.insert(id, amb).is_some() {
                return Err(ConfigurationError::InvalidSetting(format!(
                    "duplicate ambulance id {}",
                    id
                )));
            }
        }

        Ok(Self {
            loads: vec![0; hospitals.len()],
            hospitals,
            hospital_index,
            ambulances: by_id,
        })
    }

    // ========================================================================
    // Hospitals
    // ========================================================================

    pub fn hospitals(&self) -> &[Hospital] {
        &self.hospitals
    }

    pub fn hospital(&self, id: &str) -> Option<&Hospital> {
        self.hospital_index.get(id).map(|i| &self.hospitals[*i])
    }

    /// Position of the hospital in scenario order
    pub fn hospital_index(&self, id: &str) -> Option<usize> {
        self.hospital_index.get(id).copied()
    }

    /// Patients delivered to this hospital so far
    pub fn load(&self, id: &str) -> u32 {
        self.hospital_index
            .get(id)
            .map(|i| self.loads[*i])
            .unwrap_or(0)
    }

    /// Count a delivery against a hospital
    pub fn record_delivery(&mut self, hospital_id: &str) -> Result<DeliveryLoad, FleetError> {
        let index = self
            .hospital_index(hospital_id)
            .ok_or_else(|| FleetError::UnknownHospital(hospital_id.to_string()))?;
        self.loads[index] += 1;
        let load = self.loads[index];
        let over_capacity = self.hospitals[index].beds.is_some_and(|beds| load > beds);
        Ok(DeliveryLoad {
            load,
            over_capacity,
        })
    }

    /// Count a delivery against the ambulance's destination hospital
    pub fn complete_delivery(
        &mut self,
        ambulance_id: AmbulanceId,
    ) -> Result<(HospitalId, DeliveryLoad), FleetError> {
        let hospital_id = self
            .ambulance(ambulance_id)
            .ok_or(FleetError::UnknownAmbulance(ambulance_id))?
            .destination_hospital_id()
            .map(str::to_string)
            .ok_or(FleetError::NoDestination(ambulance_id))?;
        let load = self.record_delivery(&hospital_id)?;
        Ok((hospital_id, load))
    }

    // ========================================================================
    // Ambulances
    // ========================================================================

    pub fn ambulances(&self) -> impl Iterator<Item = &Ambulance> {
        self.ambulances.values()
    }

    pub fn num_ambulances(&self) -> usize {
        self.ambulances.len()
    }

    pub fn ambulance(&self, id: AmbulanceId) -> Option<&Ambulance> {
        self.ambulances.get(&id)
    }

    fn ambulance_mut(&mut self, id: AmbulanceId) -> Result<&mut Ambulance, FleetError> {
        self.ambulances
            .get_mut(&id)
            .ok_or(FleetError::UnknownAmbulance(id))
    }

    /// IDLE ambulances in ID order
    pub fn idle_ambulances(&self) -> Vec<AmbulanceId> {
        self.ambulances
            .values()
            .filter(|a| a.is_idle())
            .map(|a| a.id())
            .collect()
    }

    pub fn dispatch(
        &mut self,
        ambulance_id: AmbulanceId,
        casualty_id: CasualtyId,
        casualty_location: GeoPoint,
        hospital_id: &str,
        eta_minutes: u32,
    ) -> Result<(), FleetError> {
        if !self.hospital_index.contains_key(hospital_id) {
            return Err(FleetError::UnknownHospital(hospital_id.to_string()));
        }
        self.ambulance_mut(ambulance_id)?.dispatch(
            casualty_id,
            casualty_location,
            hospital_id.to_string(),
            eta_minutes,
        )?;
        Ok(())
    }

    pub fn begin_transport(
        &mut self,
        ambulance_id: AmbulanceId,
        hospital_location: GeoPoint,
        eta_minutes: u32,
    ) -> Result<(), FleetError> {
        self.ambulance_mut(ambulance_id)?
            .begin_transport(hospital_location, eta_minutes)?;
        Ok(())
    }

    /// Free an ambulance at `location`
    pub fn release(&mut self, ambulance_id: AmbulanceId, location: GeoPoint) -> Result<(), FleetError> {
        self.ambulance_mut(ambulance_id)?.release(location);
        Ok(())
    }

    /// Location of an ambulance's base hospital
    pub fn base_location(&self, ambulance_id: AmbulanceId) -> Option<GeoPoint> {
        let base = self.ambulances.get(&ambulance_id)?.base_hospital_id()?;
        self.hospital(base).map(|h| h.location)
    }

    pub fn send_to_base(&mut self, ambulance_id: AmbulanceId, eta_minutes: u32) -> Result<(), FleetError> {
        let base = self
            .base_location(ambulance_id)
            .ok_or(FleetError::Ambulance(AmbulanceError::NoBase(ambulance_id)))?;
        self.ambulance_mut(ambulance_id)?
            .return_to_base(base, eta_minutes)?;
        Ok(())
    }

    /// Send an idle ambulance to stand by at `target`
    pub fn reposition(
        &mut self,
        ambulance_id: AmbulanceId,
        target: GeoPoint,
        eta_minutes: u32,
    ) -> Result<(), FleetError> {
        self.ambulance_mut(ambulance_id)?.reposition(target, eta_minutes)?;
        Ok(())
    }

    /// Count one minute for every moving ambulance; returns arrivals in ID order
    pub fn advance_etas(&mut self) -> Vec<AmbulanceId> {
        self.ambulances
            .values_mut()
            .filter_map(|a| if a.tick_eta() { Some(a.id()) } else { None })
            .collect()
    }
}
