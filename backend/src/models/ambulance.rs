//! Ambulance model
//!
//! Ambulances are never persisted. They are spawned from an
//! [`crate::scenario::AmbulanceConfig`] at engine construction.
//!
//! ```text
//! IDLE ──dispatch──▶ ENROUTE_TO_CASUALTY ──pickup──▶ TRANSPORTING ──delivery──▶ IDLE
//!   │                                                                 └────────▶ RETURNING ──▶ IDLE
//!   ├──return to base──▶ RETURNING ──arrive──▶ IDLE
//!   └──move to location──▶ REPOSITIONING ──arrive──▶ IDLE
//! ```

use crate::models::casualty::CasualtyId;
use crate::models::hospital::HospitalId;
use crate::routing::GeoPoint;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Ambulance identifier, sequential from 0 in spawn order
pub type AmbulanceId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AmbulanceStatus {
    Idle,
    EnrouteToCasualty,
    Transporting,
    Returning,
    /// Driving to a standby point, no patient
    Repositioning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AmbulanceKind {
    /// Stationed at a hospital
    HospitalBased,
    /// Already in the field near the incident
    FieldUnit,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AmbulanceError {
    #[error("ambulance {id} is {status:?}, expected {expected:?}")]
    WrongStatus {
        id: AmbulanceId,
        status: AmbulanceStatus,
        expected: AmbulanceStatus,
    },

    #[error("ambulance {0} has no base hospital")]
    NoBase(AmbulanceId),
}

/// Runtime ambulance state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ambulance {
    id: AmbulanceId,
    location: GeoPoint,
    status: AmbulanceStatus,
    kind: AmbulanceKind,
    base_hospital_id: Option<HospitalId>,
    /// Casualty this unit is committed to: the target while en route, the
    /// patient while transporting
    casualty_id: Option<CasualtyId>,
    destination_hospital_id: Option<HospitalId>,
    /// Where the unit will be when `eta_minutes` reaches zero
    target: Option<GeoPoint>,
    eta_minutes: u32,
}

impl Ambulance {
    pub fn hospital_based(id: AmbulanceId, location: GeoPoint, base: HospitalId) -> Self {
        Self::new(id, location, AmbulanceKind::HospitalBased, Some(base))
    }

    pub fn field_unit(id: AmbulanceId, location: GeoPoint) -> Self {
        Self::new(id, location, AmbulanceKind::FieldUnit, None)
    }

    fn new(
        id: AmbulanceId,
        location: GeoPoint,
        kind: AmbulanceKind,
        base_hospital_id: Option<HospitalId>,
    ) -> Self {
        Self {
            id,
            location,
            status: AmbulanceStatus::Idle,
            kind,
            base_hospital_id,
            casualty_id: None,
            destination_hospital_id: None,
            target: None,
            eta_minutes: 0,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn id(&self) -> AmbulanceId {
        self.id
    }

    pub fn location(&self) -> GeoPoint {
        self.location
    }

    pub fn status(&self) -> AmbulanceStatus {
        self.status
    }

    pub fn kind(&self) -> AmbulanceKind {
        self.kind
    }

    pub fn base_hospital_id(&self) -> Option<&str> {
        self.base_hospital_id.as_deref()
    }

    /// Casualty this unit is committed to, en route or on board
    pub fn casualty_id(&self) -> Option<CasualtyId> {
        self.casualty_id
    }

    /// Casualty on board, only while transporting
    pub fn carried_casualty_id(&self) -> Option<CasualtyId> {
        match self.status {
            AmbulanceStatus::Transporting => self.casualty_id,
            _ => None,
        }
    }

    pub fn destination_hospital_id(&self) -> Option<&str> {
        self.destination_hospital_id.as_deref()
    }

    pub fn target(&self) -> Option<GeoPoint> {
        self.target
    }

    pub fn eta_minutes(&self) -> u32 {
        self.eta_minutes
    }

    pub fn is_idle(&self) -> bool {
        self.status == AmbulanceStatus::Idle
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    fn expect_status(&self, expected: AmbulanceStatus) -> Result<(), AmbulanceError> {
        if self.status != expected {
            return Err(AmbulanceError::WrongStatus {
                id: self.id,
                status: self.status,
                expected,
            });
        }
        Ok(())
    }

    /// IDLE → ENROUTE_TO_CASUALTY
    pub fn dispatch(
        &mut self,
        casualty_id: CasualtyId,
        casualty_location: GeoPoint,
        hospital_id: HospitalId,
        eta_minutes: u32,
    ) -> Result<(), AmbulanceError> {
        self.expect_status(AmbulanceStatus::Idle)?;
        self.status = AmbulanceStatus::EnrouteToCasualty;
        self.casualty_id = Some(casualty_id);
        self.destination_hospital_id = Some(hospital_id);
        self.target = Some(casualty_location);
        self.eta_minutes = eta_minutes;
        Ok(())
    }

    /// ENROUTE_TO_CASUALTY → TRANSPORTING, from the casualty's position
    pub fn begin_transport(
        &mut self,
        hospital_location: GeoPoint,
        eta_minutes: u32,
    ) -> Result<(), AmbulanceError> {
        self.expect_status(AmbulanceStatus::EnrouteToCasualty)?;
        if let Some(scene) = self.target {
            self.location = scene;
        }
        self.status = AmbulanceStatus::Transporting;
        self.target = Some(hospital_location);
        self.eta_minutes = eta_minutes;
        Ok(())
    }

    /// Drop all commitments and stand idle at `location`
    pub fn release(&mut self, location: GeoPoint) {
        self.location = location;
        self.status = AmbulanceStatus::Idle;
        self.casualty_id = None;
        self.destination_hospital_id = None;
        self.target = None;
        self.eta_minutes = 0;
    }

    /// Head back to base; the caller supplies the base location
    pub fn return_to_base(
        &mut self,
        base_location: GeoPoint,
        eta_minutes: u32,
    ) -> Result<(), AmbulanceError> {
        if self.base_hospital_id.is_none() {
            return Err(AmbulanceError::NoBase(self.id));
        }
        self.casualty_id = None;
        self.destination_hospital_id = None;
        self.status = AmbulanceStatus::Returning;
        self.target = Some(base_location);
        self.eta_minutes = eta_minutes;
        Ok(())
    }

    /// IDLE → REPOSITIONING towards `target`
    pub fn reposition(&mut self, target: GeoPoint, eta_minutes: u32) -> Result<(), AmbulanceError> {
        self.expect_status(AmbulanceStatus::Idle)?;
        self.status = AmbulanceStatus::Repositioning;
        self.target = Some(target);
        self.eta_minutes = eta_minutes;
        Ok(())
    }

    /// Count one minute of travel; true when the unit has just arrived
    pub fn tick_eta(&mut self) -> bool {
        if self.status == AmbulanceStatus::Idle {
            return false;
        }
        self.eta_minutes = self.eta_minutes.saturating_sub(1);
        self.eta_minutes == 0
    }
}
