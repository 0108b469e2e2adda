//! Orchestrator - the simulation loop
//!
//! See `engine.rs` for the tick loop, `observer.rs` for event fan-out and
//! `snapshot.rs` for state dumps and integrity checks.

pub mod engine;
pub mod observer;
pub mod snapshot;

#[cfg(test)]
mod tests;

pub use engine::{
    EngineConfig, EnginePhase, SimulationEngine, SimulationError, StopHandle, TickResult,
};
pub use observer::{ListenerError, ListenerFn, SimulationObserver};
pub use snapshot::{validate_snapshot, AmbulanceSnapshot, CasualtySnapshot, StateSnapshot};
