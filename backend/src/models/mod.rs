//! Domain models for the MCI simulator

pub mod ambulance;
pub mod casualty;
pub mod event;
pub mod hospital;
pub mod state;

// Re-exports
pub use ambulance::{Ambulance, AmbulanceError, AmbulanceId, AmbulanceKind, AmbulanceStatus};
pub use casualty::{
    Casualty, CasualtyId, CasualtySeed, CasualtyStatus, PatientError, Triage, TreatmentKind,
};
pub use event::{CompletionReason, ErrorKind, Event, EventKind, EventLog};
pub use hospital::{Hospital, HospitalId};
pub use state::{Metrics, MetricsSummary, SimulationState};
