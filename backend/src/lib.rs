//! MCI Simulator Core - Rust Engine
//!
//! Deterministic mass-casualty-incident response simulator: casualties
//! deteriorate minute by minute while ambulances are dispatched, pick them up
//! and deliver them to hospitals.
//!
//! # Architecture
//!
//! - **core**: Simulated clock and horizon
//! - **models**: Domain types (Casualty, Ambulance, Hospital, Event, State)
//! - **routing**: Haversine distances and travel times
//! - **hospitals**: Hospital data sources (CSV, in-memory)
//! - **scenario**: Scenario generation, ambulance spawning, persistence
//! - **fleet**: Ambulance and hospital load bookkeeping
//! - **dispatch**: Observation / action / mask / reward contract
//! - **policy**: Baseline dispatchers and the external-policy adapter
//! - **orchestrator**: Main simulation loop
//! - **evaluation**: Parallel multi-episode runs
//! - **rng**: Deterministic random number generation
//!
//! # Critical Invariants
//!
//! 1. Health is integer thousandths; deterioration is exact
//! 2. All randomness is deterministic (seeded RNG)
//! 3. Invalid dispatch commands never reach simulation state

// Module declarations
pub mod core;
pub mod dispatch;
pub mod evaluation;
pub mod fleet;
pub mod hospitals;
pub mod models;
pub mod orchestrator;
pub mod policy;
pub mod rng;
pub mod routing;
pub mod scenario;

// Re-exports for convenience
pub use core::time::SimClock;
pub use dispatch::{
    ActionMask, AmbulanceCommand, DispatchAction, InvalidActionError, Observation,
    ObservationEncoder, RewardWeights,
};
pub use evaluation::{
    compare_policies, evaluate_policy, EpisodeResult, EvaluationError, EvaluationRequest,
    PolicyEvaluation, SummaryStats,
};
pub use fleet::{FleetError, ResourceFleet};
pub use hospitals::{CsvHospitalSource, HospitalSource, HospitalSourceError, InMemoryHospitalSource};
pub use models::{
    ambulance::{Ambulance, AmbulanceId, AmbulanceStatus},
    casualty::{Casualty, CasualtyId, CasualtyStatus, Triage},
    event::{Event, EventKind, EventLog},
    hospital::{Hospital, HospitalId},
    state::{Metrics, MetricsSummary, SimulationState},
};
pub use orchestrator::{
    EngineConfig, EnginePhase, SimulationEngine, SimulationError, SimulationObserver, StateSnapshot,
    TickResult,
};
pub use policy::{DispatchPolicy, ExternalPolicy, PolicyConfig, PolicyError};
pub use rng::RngManager;
pub use routing::{distance_km, travel_time_minutes, GeoPoint, RegionBounds};
pub use scenario::{AmbulanceConfig, ConfigurationError, Scenario, ScenarioGenerator, ScenarioRequest};
