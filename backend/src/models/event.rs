//! Event logging for replay, reward recomputation and determinism checks.
//!
//! Every state change the engine makes is recorded as an [`Event`] in the
//! order it happens within a minute. The log is append-only. Two runs with the
//! same scenario, configuration and policy produce identical logs.
//!
//! # Event Kinds
//!
//! Observers receive each event with a coarse [`EventKind`]:
//! - **Dispatch**: unit assignments, return-to-base and standby moves, aborted runs
//! - **Pickup** / **Delivery**: patient handovers
//! - **Death**: a casualty died during the simulation
//! - **Timestep**: end-of-minute summary with the minute's reward
//! - **Completed**: episode finished or was stopped
//! - **Error**: rejected actions, policy failures, invariant violations
//!
//! # Example
//!
//! ```rust
//! use mci_simulator_core_rs::models::event::{Event, EventLog};
//!
//! let mut log = EventLog::new();
//! log.log(Event::Dispatch {
//!     minute: 0,
//!     ambulance_id: 3,
//!     casualty_id: 12,
//!     hospital_id: "H7".to_string(),
//!     eta_minutes: 4,
//! });
//!
//! assert_eq!(log.events_at_minute(0).len(), 1);
//! assert_eq!(log.events()[0].event_type(), "Dispatch");
//! ```

use crate::models::ambulance::AmbulanceId;
use crate::models::casualty::{CasualtyId, CasualtyStatus, Triage};
use crate::models::hospital::HospitalId;
use crate::models::state::MetricsSummary;
use crate::orchestrator::snapshot::StateSnapshot;
use crate::routing::GeoPoint;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Coarse event category delivered to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Timestep,
    Dispatch,
    Pickup,
    Delivery,
    Death,
    Completed,
    Error,
}

/// Error taxonomy carried by error events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Action violated the mask; the ambulance waited instead
    InvalidAction,
    /// Decision-maker failed; every ambulance waited this minute
    PolicyError,
    /// Internal invariant broken; the engine stopped
    DeterminismViolation,
}

/// Why an episode ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    /// Every casualty delivered or deceased
    AllResolved,
    /// Horizon reached with casualties outstanding
    HorizonReached,
    /// External stop request
    Stopped,
}

/// Simulation event capturing a state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// IDLE ambulance sent to a casualty
    Dispatch {
        minute: u32,
        ambulance_id: AmbulanceId,
        casualty_id: CasualtyId,
        hospital_id: HospitalId,
        eta_minutes: u32,
    },

    /// IDLE ambulance sent back to its base hospital
    ReturnToBase {
        minute: u32,
        ambulance_id: AmbulanceId,
        hospital_id: HospitalId,
        eta_minutes: u32,
    },

    /// Ambulance reached its base and is available again
    ArrivedAtBase {
        minute: u32,
        ambulance_id: AmbulanceId,
        hospital_id: HospitalId,
    },

    /// IDLE ambulance sent to stand by at a point in the region
    MoveToLocation {
        minute: u32,
        ambulance_id: AmbulanceId,
        target: GeoPoint,
        eta_minutes: u32,
    },

    /// Ambulance reached its standby point and is available again
    Repositioned {
        minute: u32,
        ambulance_id: AmbulanceId,
        location: GeoPoint,
    },

    /// Committed casualty died before handover; the ambulance is free again
    TransportAborted {
        minute: u32,
        ambulance_id: AmbulanceId,
        casualty_id: CasualtyId,
    },

    Pickup {
        minute: u32,
        ambulance_id: AmbulanceId,
        casualty_id: CasualtyId,
        triage: Triage,
        hospital_id: HospitalId,
        transport_eta_minutes: u32,
    },

    Delivery {
        minute: u32,
        ambulance_id: AmbulanceId,
        casualty_id: CasualtyId,
        hospital_id: HospitalId,
        triage: Triage,
        trauma_level: u8,
        health: f64,
        response_time: u32,
        /// RED/YELLOW delivered to a level 1 or 2 centre
        trauma_match: bool,
        golden_hour: bool,
        over_capacity: bool,
        survival_probability: f64,
    },

    Death {
        minute: u32,
        casualty_id: CasualtyId,
        triage: Triage,
        /// Status the casualty died in
        status: CasualtyStatus,
    },

    /// End-of-minute counts and the minute's reward
    Timestep {
        minute: u32,
        waiting: u32,
        red_waiting: u32,
        idle_ambulances: u32,
        escalated: Vec<CasualtyId>,
        reward: f64,
    },

    Completed {
        minute: u32,
        reason: CompletionReason,
        summary: MetricsSummary,
    },

    Error {
        minute: u32,
        kind: ErrorKind,
        fatal: bool,
        message: String,
        ambulance_id: Option<AmbulanceId>,
        snapshot: Option<Box<StateSnapshot>>,
    },
}

impl Event {
    /// Minute at which this event occurred
    pub fn minute(&self) -> u32 {
        match self {
            Event::Dispatch { minute, .. } => *minute,
            Event::ReturnToBase { minute, .. } => *minute,
            Event::ArrivedAtBase { minute, .. } => *minute,
            Event::MoveToLocation { minute, .. } => *minute,
            Event::Repositioned { minute, .. } => *minute,
            Event::TransportAborted { minute, .. } => *minute,
            Event::Pickup { minute, .. } => *minute,
            Event::Delivery { minute, .. } => *minute,
            Event::Death { minute, .. } => *minute,
            Event::Timestep { minute, .. } => *minute,
            Event::Completed { minute, .. } => *minute,
            Event::Error { minute, .. } => *minute,
        }
    }

    /// Short name of the event variant
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::Dispatch { .. } => "Dispatch",
            Event::ReturnToBase { .. } => "ReturnToBase",
            Event::ArrivedAtBase { .. } => "ArrivedAtBase",
            Event::MoveToLocation { .. } => "MoveToLocation",
            Event::Repositioned { .. } => "Repositioned",
            Event::TransportAborted { .. } => "TransportAborted",
            Event::Pickup { .. } => "Pickup",
            Event::Delivery { .. } => "Delivery",
            Event::Death { .. } => "Death",
            Event::Timestep { .. } => "Timestep",
            Event::Completed { .. } => "Completed",
            Event::Error { .. } => "Error",
        }
    }

    /// Category delivered to observers
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Dispatch { .. }
            | Event::ReturnToBase { .. }
            | Event::ArrivedAtBase { .. }
            | Event::MoveToLocation { .. }
            | Event::Repositioned { .. }
            | Event::TransportAborted { .. } => EventKind::Dispatch,
            Event::Pickup { .. } => EventKind::Pickup,
            Event::Delivery { .. } => EventKind::Delivery,
            Event::Death { .. } => EventKind::Death,
            Event::Timestep { .. } => EventKind::Timestep,
            Event::Completed { .. } => EventKind::Completed,
            Event::Error { .. } => EventKind::Error,
        }
    }

    /// Casualty ID if the event concerns one casualty
    pub fn casualty_id(&self) -> Option<CasualtyId> {
        match self {
            Event::Dispatch { casualty_id, .. }
            | Event::TransportAborted { casualty_id, .. }
            | Event::Pickup { casualty_id, .. }
            | Event::Delivery { casualty_id, .. }
            | Event::Death { casualty_id, .. } => Some(*casualty_id),
            _ => None,
        }
    }

    /// Ambulance ID if the event concerns one ambulance
    pub fn ambulance_id(&self) -> Option<AmbulanceId> {
        match self {
            Event::Dispatch { ambulance_id, .. }
            | Event::ReturnToBase { ambulance_id, .. }
            | Event::ArrivedAtBase { ambulance_id, .. }
            | Event::MoveToLocation { ambulance_id, .. }
            | Event::Repositioned { ambulance_id, .. }
            | Event::TransportAborted { ambulance_id, .. }
            | Event::Pickup { ambulance_id, .. }
            | Event::Delivery { ambulance_id, .. } => Some(*ambulance_id),
            Event::Error { ambulance_id, .. } => *ambulance_id,
            _ => None,
        }
    }
}

/// Append-only event log
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event
    pub fn log(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// All events in order
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Events appended at or after `index`
    pub fn events_since(&self, index: usize) -> &[Event] {
        self.events.get(index..).unwrap_or(&[])
    }

    pub fn events_at_minute(&self, minute: u32) -> Vec<&Event> {
        self.events.iter().filter(|e| e.minute() == minute).collect()
    }

    pub fn events_of_type(&self, event_type: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    pub fn events_for_casualty(&self, casualty_id: CasualtyId) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.casualty_id() == Some(casualty_id))
            .collect()
    }

    pub fn events_for_ambulance(&self, ambulance_id: AmbulanceId) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.ambulance_id() == Some(ambulance_id))
            .collect()
    }

    /// SHA-256 over the JSON encoding of every event, hex encoded
    ///
    /// Equal logs give equal digests, so episode results can be compared
    /// without shipping the whole log.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for event in &self.events {
            // Serializing plain data with string keys cannot fail
            if let Ok(bytes) = serde_json::to_vec(event) {
                hasher.update(&bytes);
            }
            hasher.update(b"\n");
        }
        format!("{:x}", hasher.finalize())
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
