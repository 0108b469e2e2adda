//! Simulation Engine
//!
//! Discrete one-minute loop over a single scenario:
//! - Casualty deterioration (deterministic, per minute)
//! - Ambulance movement and arrivals (pickup, delivery, base)
//! - Dispatch decisions (policy → validated action)
//! - Reward, event logging and observer notification
//!
//! # Architecture
//!
//! ```text
//! For each minute t:
//! 1. Advance every living casualty one minute; record deaths
//! 2. Count down ambulance ETAs; process arrivals in ambulance-ID order
//! 3. Build observation + mask, ask the policy, validate, apply
//! 4. Compute reward, log the timestep, advance the clock,
//!    check completion, notify observers
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use mci_simulator_core_rs::orchestrator::{EngineConfig, SimulationEngine};
//! use mci_simulator_core_rs::policy::PolicyConfig;
//!
//! let mut engine = SimulationEngine::with_policy_config(
//!     &scenario,
//!     EngineConfig::default(),
//!     &PolicyConfig::Nearest,
//! )?;
//! let summary = engine.run()?;
//! println!("deaths={} transported={}", summary.deaths, summary.transported);
//! ```

use crate::core::time::{SimClock, DEFAULT_HORIZON_MINUTES};
use crate::dispatch::{
    ActionMask, AmbulanceCommand, AmbulanceView, CasualtyView, DispatchAction, HospitalView,
    InvalidActionError, Observation, RewardWeights, TickOutcome,
};
use crate::fleet::{FleetError, ResourceFleet};
use crate::models::ambulance::{AmbulanceId, AmbulanceStatus};
use crate::models::casualty::{
    survival_probability, Casualty, CasualtyId, PatientError, TreatmentKind, GOLDEN_HOUR_MINUTES,
};
use crate::models::event::{CompletionReason, ErrorKind, Event, EventKind, EventLog};
use crate::models::hospital::HospitalId;
use crate::models::state::{Metrics, MetricsSummary, SimulationState};
use crate::orchestrator::observer::{ListenerError, ListenerFn, ObserverSet, SimulationObserver};
use crate::orchestrator::snapshot::{self, validate_snapshot, StateSnapshot};
use crate::policy::{DispatchPolicy, PolicyConfig};
use crate::routing::{eta_minutes, travel_time_minutes, GeoPoint, RegionBounds, DEFAULT_AMBULANCE_SPEED_KMH};
use crate::scenario::persistence::canonical_hash;
use crate::scenario::{ConfigurationError, Scenario};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Configuration Types
// ============================================================================

/// Engine parameters that are not part of the scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Minutes before the episode is cut off
    pub horizon_minutes: u32,

    /// Emergency driving speed used for every ETA
    pub ambulance_speed_kmh: f64,

    /// Send hospital-based units back to base after each delivery
    pub return_to_base_after_delivery: bool,

    pub reward_weights: RewardWeights,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            horizon_minutes: DEFAULT_HORIZON_MINUTES,
            ambulance_speed_kmh: DEFAULT_AMBULANCE_SPEED_KMH,
            return_to_base_after_delivery: false,
            reward_weights: RewardWeights::default(),
        }
    }
}

/// Engine lifecycle
///
/// ```text
/// CREATED → RUNNING ⇄ PAUSED
///              │
///              ├─▶ COMPLETED
///              └─▶ STOPPED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnginePhase {
    Created,
    Running,
    Paused,
    Completed,
    Stopped,
}

impl EnginePhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, EnginePhase::Completed | EnginePhase::Stopped)
    }
}

/// Result of a single step
#[derive(Debug, Clone, PartialEq)]
pub struct TickResult {
    /// Minute the step executed (or would have executed)
    pub minute: u32,

    /// False when the step only finalised the engine
    pub executed: bool,

    pub deaths: u32,
    pub dispatches: u32,
    pub pickups: u32,
    pub deliveries: u32,
    pub trauma_matches: u32,
    pub golden_hour_deliveries: u32,
    pub invalid_actions: u32,
    pub policy_error: bool,
    pub reward: f64,

    /// Phase after the step
    pub phase: EnginePhase,
}

impl TickResult {
    fn new(minute: u32) -> Self {
        Self {
            minute,
            executed: true,
            deaths: 0,
            dispatches: 0,
            pickups: 0,
            deliveries: 0,
            trauma_matches: 0,
            golden_hour_deliveries: 0,
            invalid_actions: 0,
            policy_error: false,
            reward: 0.0,
            phase: EnginePhase::Running,
        }
    }

    fn finalised(minute: u32, phase: EnginePhase) -> Self {
        Self {
            executed: false,
            phase,
            ..Self::new(minute)
        }
    }
}

/// Simulation error types
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimulationError {
    #[error("invalid scenario: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("invalid engine config: {0}")]
    InvalidConfig(String),

    #[error("engine is paused")]
    Paused,

    #[error("cannot {action} while {phase:?}")]
    InvalidPhase {
        action: &'static str,
        phase: EnginePhase,
    },

    #[error("engine already finished ({0:?})")]
    Finished(EnginePhase),

    #[error("determinism violation at minute {minute}: {message}")]
    DeterminismViolation { minute: u32, message: String },
}

fn violation(minute: u32, err: impl std::fmt::Display) -> SimulationError {
    SimulationError::DeterminismViolation {
        minute,
        message: err.to_string(),
    }
}

/// Cross-thread stop request, honoured between minutes
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Owns all runtime state for one episode
///
/// # Determinism
///
/// The engine itself draws no random numbers. Casualty and ambulance maps are
/// ordered by ID and every loop walks them in that order, so the same
/// scenario, config and policy always produce the same event log.
pub struct SimulationEngine {
    scenario_id: Uuid,
    incident_location: GeoPoint,
    region_bounds: RegionBounds,

    config: EngineConfig,
    config_hash: String,

    clock: SimClock,
    phase: EnginePhase,
    state: SimulationState,
    policy: Box<dyn DispatchPolicy>,

    event_log: EventLog,
    /// Events already delivered to observers
    flushed: usize,
    observers: ObserverSet,
    stop: StopHandle,

    /// Most recent snapshot that passed validation
    last_valid: StateSnapshot,
}

impl SimulationEngine {
    /// Build an engine from a scenario
    ///
    /// Ambulances are spawned here from the scenario's `AmbulanceConfig`.
    pub fn new(
        scenario: &Scenario,
        config: EngineConfig,
        policy: Box<dyn DispatchPolicy>,
    ) -> Result<Self, SimulationError> {
        Self::validate_config(&config)?;
        scenario.validate()?;

        let ambulances = scenario.spawn_ambulances()?;
        let fleet = ResourceFleet::new(scenario.hospitals.clone(), ambulances)?;
        let casualties = scenario.casualties.iter().map(Casualty::from_seed).collect();
        let state = SimulationState::new(casualties, fleet);

        let config_hash =
            canonical_hash(&config).map_err(|e| SimulationError::InvalidConfig(e.to_string()))?;
        let clock = SimClock::new(config.horizon_minutes);

        let last_valid = snapshot::capture(
            &state,
            scenario.metadata.id,
            clock.current_minute(),
            clock.horizon(),
            EnginePhase::Created,
            &config_hash,
        );
        validate_snapshot(&last_valid)?;

        tracing::debug!(
            scenario = %scenario.metadata.id,
            casualties = state.num_casualties(),
            ambulances = state.fleet().num_ambulances(),
            hospitals = state.fleet().hospitals().len(),
            policy = policy.name(),
            "engine created"
        );

        Ok(Self {
            scenario_id: scenario.metadata.id,
            incident_location: scenario.incident_location,
            region_bounds: scenario.region_bounds,
            config,
            config_hash,
            clock,
            phase: EnginePhase::Created,
            state,
            policy,
            event_log: EventLog::new(),
            flushed: 0,
            observers: ObserverSet::new(),
            stop: StopHandle::default(),
            last_valid,
        })
    }

    /// Build an engine with one of the named baseline policies
    pub fn with_policy_config(
        scenario: &Scenario,
        config: EngineConfig,
        policy: &PolicyConfig,
    ) -> Result<Self, SimulationError> {
        Self::new(scenario, config, policy.build())
    }

    fn validate_config(config: &EngineConfig) -> Result<(), SimulationError> {
        if config.horizon_minutes == 0 {
            return Err(SimulationError::InvalidConfig(
                "horizon_minutes must be > 0".to_string(),
            ));
        }
        if !config.ambulance_speed_kmh.is_finite() || config.ambulance_speed_kmh <= 0.0 {
            return Err(SimulationError::InvalidConfig(format!(
                "ambulance_speed_kmh must be positive, got {}",
                config.ambulance_speed_kmh
            )));
        }
        Ok(())
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Next minute to execute
    pub fn current_minute(&self) -> u32 {
        self.clock.current_minute()
    }

    pub fn horizon(&self) -> u32 {
        self.clock.horizon()
    }

    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    pub fn scenario_id(&self) -> Uuid {
        self.scenario_id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn policy_name(&self) -> &str {
        self.policy.name()
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    /// Mutable state access for tooling and tests
    ///
    /// Changes are checked by the integrity validation at the end of the
    /// next step.
    pub fn state_mut(&mut self) -> &mut SimulationState {
        &mut self.state
    }

    pub fn metrics(&self) -> &Metrics {
        self.state.metrics()
    }

    pub fn summary(&self) -> MetricsSummary {
        self.state
            .metrics()
            .summary(self.state.num_casualties() as u32, self.clock.current_minute())
    }

    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    pub fn snapshot(&self) -> StateSnapshot {
        snapshot::capture(
            &self.state,
            self.scenario_id,
            self.clock.current_minute(),
            self.clock.horizon(),
            self.phase,
            &self.config_hash,
        )
    }

    /// Every casualty resolved, horizon reached, or engine finished
    pub fn is_done(&self) -> bool {
        self.phase.is_terminal() || self.state.all_resolved() || self.clock.is_expired()
    }

    // ========================================================================
    // Observers and control
    // ========================================================================

    pub fn register_observer(&mut self, observer: Box<dyn SimulationObserver>) {
        self.observers.register(observer);
    }

    pub fn register_listener<F>(&mut self, listener: F)
    where
        F: FnMut(EventKind, &Event) -> Result<(), ListenerError> + Send + 'static,
    {
        self.observers.register(Box::new(ListenerFn(listener)));
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn pause(&mut self) -> Result<(), SimulationError> {
        match self.phase {
            EnginePhase::Created | EnginePhase::Running => {
                self.phase = EnginePhase::Paused;
                Ok(())
            }
            phase => Err(SimulationError::InvalidPhase {
                action: "pause",
                phase,
            }),
        }
    }

    pub fn resume(&mut self) -> Result<(), SimulationError> {
        match self.phase {
            EnginePhase::Paused => {
                self.phase = EnginePhase::Running;
                Ok(())
            }
            phase => Err(SimulationError::InvalidPhase {
                action: "resume",
                phase,
            }),
        }
    }

    /// Stop now, keeping whatever metrics were accumulated
    ///
    /// No-op once the engine has finished.
    pub fn stop(&mut self) {
        if self.phase.is_terminal() {
            return;
        }
        self.phase = EnginePhase::Stopped;
        self.log_completion(CompletionReason::Stopped);
        self.flush_events();
    }

    // ========================================================================
    // Dispatch contract
    // ========================================================================

    pub fn observation(&self) -> Observation {
        let fleet = self.state.fleet();
        Observation {
            minute: self.clock.current_minute(),
            horizon: self.clock.horizon(),
            elapsed_fraction: self.clock.elapsed_fraction(),
            incident_location: self.incident_location,
            region_bounds: self.region_bounds,
            ambulance_speed_kmh: self.config.ambulance_speed_kmh,
            casualties: self
                .state
                .casualties()
                .map(|c| CasualtyView {
                    id: c.id(),
                    location: c.location(),
                    triage: c.triage(),
                    health: c.health(),
                    alive: c.is_alive(),
                    status: c.status(),
                    assigned_ambulance: c.assigned_ambulance(),
                    time_since_injury: c.time_since_injury(),
                })
                .collect(),
            ambulances: fleet
                .ambulances()
                .map(|a| AmbulanceView {
                    id: a.id(),
                    location: a.location(),
                    status: a.status(),
                    kind: a.kind(),
                    carrying: a.carried_casualty_id().is_some(),
                    base_hospital_id: a.base_hospital_id().map(str::to_string),
                    eta_minutes: a.eta_minutes(),
                })
                .collect(),
            hospitals: fleet
                .hospitals()
                .iter()
                .map(|h| HospitalView {
                    id: h.id.clone(),
                    location: h.location,
                    trauma_level: h.trauma_level,
                    beds: h.beds,
                    current_load: fleet.load(&h.id),
                    helipad: h.helipad,
                })
                .collect(),
        }
    }

    pub fn action_mask(&self) -> ActionMask {
        let fleet = self.state.fleet();
        let idle: BTreeMap<AmbulanceId, bool> = fleet
            .ambulances()
            .filter(|a| a.is_idle())
            .map(|a| {
                let can_return = fleet
                    .base_location(a.id())
                    .is_some_and(|base| base != a.location());
                (a.id(), can_return)
            })
            .collect();
        let casualties: BTreeSet<CasualtyId> =
            self.state.dispatchable_casualties().into_iter().collect();
        let hospitals: BTreeSet<HospitalId> =
            fleet.hospitals().iter().map(|h| h.id.clone()).collect();
        ActionMask::new(self.clock.current_minute(), idle, casualties, hospitals)
            .with_region_bounds(self.region_bounds)
    }

    // ========================================================================
    // Tick Loop Implementation
    // ========================================================================

    /// Execute one simulated minute
    ///
    /// The first call moves the engine from CREATED to RUNNING. If a stop was
    /// requested, or the episode is already over, the engine is finalised
    /// instead and the result has `executed == false`.
    ///
    /// # Errors
    ///
    /// * `Paused` / `Finished` when the phase does not allow stepping
    /// * `DeterminismViolation` when the state fails its integrity check;
    ///   the engine is STOPPED and a fatal error event carries the last
    ///   valid snapshot
    pub fn step(&mut self) -> Result<TickResult, SimulationError> {
        match self.phase {
            EnginePhase::Paused => return Err(SimulationError::Paused),
            EnginePhase::Completed | EnginePhase::Stopped => {
                return Err(SimulationError::Finished(self.phase))
            }
            EnginePhase::Created => self.phase = EnginePhase::Running,
            EnginePhase::Running => {}
        }

        let minute = self.clock.current_minute();
        if self.stop.is_stop_requested() {
            self.stop();
            return Ok(TickResult::finalised(minute, self.phase));
        }
        if self.is_done() {
            self.complete()?;
            self.flush_events();
            return Ok(TickResult::finalised(minute, self.phase));
        }

        let outcome = self.execute_minute(minute);
        let outcome = outcome.and_then(|result| {
            self.check_invariants()?;
            Ok(result)
        });

        match outcome {
            Ok(mut result) => {
                result.phase = self.phase;
                self.flush_events();
                Ok(result)
            }
            Err(err) => Err(self.halt(err)),
        }
    }

    /// Step until the episode ends, a stop is requested or the engine is paused
    pub fn run(&mut self) -> Result<MetricsSummary, SimulationError> {
        while !self.phase.is_terminal() && self.phase != EnginePhase::Paused {
            self.step()?;
        }
        Ok(self.summary())
    }

    /// Step at most `minutes` times; stops early at the end of the episode
    pub fn run_for(&mut self, minutes: u32) -> Result<Vec<TickResult>, SimulationError> {
        let mut results = Vec::new();
        for _ in 0..minutes {
            if self.phase.is_terminal() || self.phase == EnginePhase::Paused {
                break;
            }
            let result = self.step()?;
            let executed = result.executed;
            results.push(result);
            if !executed {
                break;
            }
        }
        Ok(results)
    }

    fn execute_minute(&mut self, minute: u32) -> Result<TickResult, SimulationError> {
        let mut result = TickResult::new(minute);

        // STEP 1: DETERIORATION
        let escalated = self.advance_casualties(minute, &mut result);

        // STEP 2: ARRIVALS
        let arrived = self.state.fleet_mut().advance_etas();
        for ambulance_id in arrived {
            self.handle_arrival(minute, ambulance_id, &mut result)?;
        }

        // STEP 3: DECISIONS
        let mask = self.action_mask();
        let observation = self.observation();
        let action = match self.policy.decide(&observation, &mask) {
            Ok(action) => action,
            Err(err) => {
                result.policy_error = true;
                self.state.metrics_mut().policy_errors += 1;
                tracing::warn!(minute, policy = self.policy.name(), error = %err, "policy failed; all ambulances wait");
                self.log_event(Event::Error {
                    minute,
                    kind: ErrorKind::PolicyError,
                    fatal: false,
                    message: err.to_string(),
                    ambulance_id: None,
                    snapshot: None,
                });
                DispatchAction::wait()
            }
        };
        self.apply_action(minute, &mask, &action, &mut result)?;

        // STEP 4: REWARD, TIMESTEP, CLOCK
        let (waiting, red_waiting) = self.state.waiting_counts();
        let idle_ambulances = self.state.fleet().idle_ambulances().len() as u32;
        let reward = TickOutcome {
            deaths: result.deaths,
            deliveries: result.deliveries,
            trauma_matches: result.trauma_matches,
            golden_hour_deliveries: result.golden_hour_deliveries,
            waiting,
            red_waiting,
            idle_ambulances,
        }
        .reward(&self.config.reward_weights);

        result.reward = reward;
        self.state.metrics_mut().total_reward += reward;
        self.log_event(Event::Timestep {
            minute,
            waiting,
            red_waiting,
            idle_ambulances,
            escalated,
            reward,
        });

        self.clock.advance();
        if self.is_done() {
            self.complete()?;
        }

        Ok(result)
    }

    /// Deterioration for every living casualty; returns the escalated IDs
    fn advance_casualties(&mut self, minute: u32, result: &mut TickResult) -> Vec<CasualtyId> {
        let mut escalated = Vec::new();
        let mut deaths = Vec::new();

        for casualty in self.state.casualties_mut() {
            if !casualty.is_alive() {
                continue;
            }
            let status = casualty.status();
            let update = casualty.update(1);
            if update.escalated {
                escalated.push(casualty.id());
            }
            if update.died {
                deaths.push(Event::Death {
                    minute,
                    casualty_id: casualty.id(),
                    triage: casualty.triage(),
                    status,
                });
            }
        }

        let metrics = self.state.metrics_mut();
        metrics.escalations += escalated.len() as u32;
        metrics.deaths += deaths.len() as u32;
        result.deaths += deaths.len() as u32;
        for event in deaths {
            self.log_event(event);
        }
        escalated
    }

    fn handle_arrival(
        &mut self,
        minute: u32,
        ambulance_id: AmbulanceId,
        result: &mut TickResult,
    ) -> Result<(), SimulationError> {
        let status = self
            .state
            .fleet()
            .ambulance(ambulance_id)
            .map(|a| a.status())
            .ok_or_else(|| violation(minute, FleetError::UnknownAmbulance(ambulance_id)))?;

        match status {
            AmbulanceStatus::EnrouteToCasualty => self.arrive_at_scene(minute, ambulance_id, result),
            AmbulanceStatus::Transporting => self.arrive_at_hospital(minute, ambulance_id, result),
            AmbulanceStatus::Returning => self.arrive_at_base(minute, ambulance_id),
            AmbulanceStatus::Repositioning => self.arrive_at_location(minute, ambulance_id),
            AmbulanceStatus::Idle => Err(violation(
                minute,
                format!("idle ambulance {} reported an arrival", ambulance_id),
            )),
        }
    }

    /// Committed casualty, destination hospital and target of a moving unit
    fn assignment(
        &self,
        minute: u32,
        ambulance_id: AmbulanceId,
    ) -> Result<(CasualtyId, HospitalId, GeoPoint), SimulationError> {
        let ambulance = self
            .state
            .fleet()
            .ambulance(ambulance_id)
            .ok_or_else(|| violation(minute, FleetError::UnknownAmbulance(ambulance_id)))?;
        let casualty_id = ambulance.casualty_id().ok_or_else(|| {
            violation(minute, format!("ambulance {} has no casualty", ambulance_id))
        })?;
        let hospital_id = ambulance
            .destination_hospital_id()
            .map(str::to_string)
            .ok_or_else(|| violation(minute, FleetError::NoDestination(ambulance_id)))?;
        let target = ambulance.target().unwrap_or_else(|| ambulance.location());
        Ok((casualty_id, hospital_id, target))
    }

    fn casualty_mut(&mut self, minute: u32, id: CasualtyId) -> Result<&mut Casualty, SimulationError> {
        self.state
            .casualty_mut(id)
            .ok_or_else(|| violation(minute, format!("unknown casualty {}", id)))
    }

    /// Casualty died before the crew reached them: free the unit where it is
    fn abort_transport(
        &mut self,
        minute: u32,
        ambulance_id: AmbulanceId,
        casualty_id: CasualtyId,
        location: GeoPoint,
    ) -> Result<(), SimulationError> {
        self.state
            .fleet_mut()
            .release(ambulance_id, location)
            .map_err(|e| violation(minute, e))?;
        self.casualty_mut(minute, casualty_id)?.unassign();
        self.state.metrics_mut().aborted_transports += 1;
        tracing::debug!(minute, ambulance_id, casualty_id, "transport aborted");
        self.log_event(Event::TransportAborted {
            minute,
            ambulance_id,
            casualty_id,
        });
        Ok(())
    }

    fn arrive_at_scene(
        &mut self,
        minute: u32,
        ambulance_id: AmbulanceId,
        result: &mut TickResult,
    ) -> Result<(), SimulationError> {
        let (casualty_id, hospital_id, scene) = self.assignment(minute, ambulance_id)?;

        let casualty = self.casualty_mut(minute, casualty_id)?;
        if !casualty.is_alive() {
            return self.abort_transport(minute, ambulance_id, casualty_id, scene);
        }
        casualty
            .apply_treatment(TreatmentKind::Pickup)
            .map_err(|e: PatientError| violation(minute, e))?;
        let triage = casualty.triage();

        let hospital_location = self
            .state
            .fleet()
            .hospital(&hospital_id)
            .map(|h| h.location)
            .ok_or_else(|| violation(minute, FleetError::UnknownHospital(hospital_id.clone())))?;
        let eta = eta_minutes(travel_time_minutes(
            scene,
            hospital_location,
            self.config.ambulance_speed_kmh,
        ));
        self.state
            .fleet_mut()
            .begin_transport(ambulance_id, hospital_location, eta)
            .map_err(|e| violation(minute, e))?;

        let metrics = self.state.metrics_mut();
        metrics.pickups += 1;
        metrics.pickup_times.push(minute);
        result.pickups += 1;

        tracing::debug!(minute, ambulance_id, casualty_id, hospital = %hospital_id, eta, "pickup");
        self.log_event(Event::Pickup {
            minute,
            ambulance_id,
            casualty_id,
            triage,
            hospital_id,
            transport_eta_minutes: eta,
        });

        if eta == 0 {
            self.arrive_at_hospital(minute, ambulance_id, result)?;
        }
        Ok(())
    }

    fn arrive_at_hospital(
        &mut self,
        minute: u32,
        ambulance_id: AmbulanceId,
        result: &mut TickResult,
    ) -> Result<(), SimulationError> {
        let (casualty_id, _, hospital_location) = self.assignment(minute, ambulance_id)?;

        let casualty = self.casualty_mut(minute, casualty_id)?;
        if !casualty.is_alive() {
            return self.abort_transport(minute, ambulance_id, casualty_id, hospital_location);
        }
        casualty
            .apply_treatment(TreatmentKind::HospitalDelivery)
            .map_err(|e| violation(minute, e))?;
        casualty.unassign();
        let triage = casualty.triage();
        let health = casualty.health();

        let (hospital_id, load) = self
            .state
            .fleet_mut()
            .complete_delivery(ambulance_id)
            .map_err(|e| violation(minute, e))?;
        let trauma_level = self
            .state
            .fleet()
            .hospital(&hospital_id)
            .map(|h| h.trauma_level)
            .ok_or_else(|| violation(minute, FleetError::UnknownHospital(hospital_id.clone())))?;

        let response_time = minute;
        let golden_hour = response_time <= GOLDEN_HOUR_MINUTES;
        let trauma_match = triage.is_urgent() && (1..=2).contains(&trauma_level);
        let survival = survival_probability(triage, f64::from(response_time), trauma_level);

        let metrics = self.state.metrics_mut();
        metrics.transported += 1;
        metrics.response_times.push(response_time);
        if trauma_match {
            metrics.trauma_matches += 1;
            result.trauma_matches += 1;
        }
        if golden_hour {
            metrics.golden_hour_deliveries += 1;
            result.golden_hour_deliveries += 1;
        }
        if load.over_capacity {
            metrics.over_capacity_deliveries += 1;
        }
        result.deliveries += 1;

        tracing::debug!(minute, ambulance_id, casualty_id, hospital = %hospital_id, golden_hour, "delivery");
        self.log_event(Event::Delivery {
            minute,
            ambulance_id,
            casualty_id,
            hospital_id,
            triage,
            trauma_level,
            health,
            response_time,
            trauma_match,
            golden_hour,
            over_capacity: load.over_capacity,
            survival_probability: survival,
        });

        self.state
            .fleet_mut()
            .release(ambulance_id, hospital_location)
            .map_err(|e| violation(minute, e))?;
        if self.config.return_to_base_after_delivery {
            let can_return = self
                .state
                .fleet()
                .base_location(ambulance_id)
                .is_some_and(|base| base != hospital_location);
            if can_return {
                self.send_to_base(minute, ambulance_id)?;
            }
        }
        Ok(())
    }

    fn arrive_at_base(&mut self, minute: u32, ambulance_id: AmbulanceId) -> Result<(), SimulationError> {
        let ambulance = self
            .state
            .fleet()
            .ambulance(ambulance_id)
            .ok_or_else(|| violation(minute, FleetError::UnknownAmbulance(ambulance_id)))?;
        let hospital_id = ambulance
            .base_hospital_id()
            .map(str::to_string)
            .ok_or_else(|| violation(minute, format!("ambulance {} has no base", ambulance_id)))?;
        let base = ambulance.target().unwrap_or_else(|| ambulance.location());

        self.state
            .fleet_mut()
            .release(ambulance_id, base)
            .map_err(|e| violation(minute, e))?;
        self.log_event(Event::ArrivedAtBase {
            minute,
            ambulance_id,
            hospital_id,
        });
        Ok(())
    }

    fn arrive_at_location(&mut self, minute: u32, ambulance_id: AmbulanceId) -> Result<(), SimulationError> {
        let ambulance = self
            .state
            .fleet()
            .ambulance(ambulance_id)
            .ok_or_else(|| violation(minute, FleetError::UnknownAmbulance(ambulance_id)))?;
        let location = ambulance.target().unwrap_or_else(|| ambulance.location());

        self.state
            .fleet_mut()
            .release(ambulance_id, location)
            .map_err(|e| violation(minute, e))?;
        self.log_event(Event::Repositioned {
            minute,
            ambulance_id,
            location,
        });
        Ok(())
    }

    fn apply_action(
        &mut self,
        minute: u32,
        mask: &ActionMask,
        action: &DispatchAction,
        result: &mut TickResult,
    ) -> Result<(), SimulationError> {
        let mut claimed: BTreeSet<CasualtyId> = BTreeSet::new();

        for (ambulance_id, command) in action.iter() {
            let checked = mask.check(ambulance_id, command).and_then(|()| match command {
                AmbulanceCommand::Dispatch { casualty_id, .. } if claimed.contains(casualty_id) => {
                    Err(InvalidActionError::DuplicateClaim {
                        ambulance_id,
                        casualty_id: *casualty_id,
                    })
                }
                _ => Ok(()),
            });
            if let Err(err) = checked {
                self.reject(minute, ambulance_id, err, result);
                continue;
            }

            match command {
                AmbulanceCommand::Wait => {}
                AmbulanceCommand::Dispatch {
                    casualty_id,
                    hospital_id,
                } => {
                    claimed.insert(*casualty_id);
                    self.dispatch(minute, ambulance_id, *casualty_id, hospital_id, result)?;
                }
                AmbulanceCommand::ReturnToBase => self.send_to_base(minute, ambulance_id)?,
                AmbulanceCommand::MoveToLocation { target } => {
                    self.move_to_location(minute, ambulance_id, *target)?
                }
            }
        }
        Ok(())
    }

    /// Refused command: the ambulance waits, the refusal is logged and counted
    fn reject(
        &mut self,
        minute: u32,
        ambulance_id: AmbulanceId,
        err: InvalidActionError,
        result: &mut TickResult,
    ) {
        self.state.metrics_mut().invalid_actions += 1;
        result.invalid_actions += 1;
        tracing::warn!(minute, ambulance_id, error = %err, "invalid action; ambulance waits");
        self.log_event(Event::Error {
            minute,
            kind: ErrorKind::InvalidAction,
            fatal: false,
            message: err.to_string(),
            ambulance_id: Some(ambulance_id),
            snapshot: None,
        });
    }

    fn dispatch(
        &mut self,
        minute: u32,
        ambulance_id: AmbulanceId,
        casualty_id: CasualtyId,
        hospital_id: &str,
        result: &mut TickResult,
    ) -> Result<(), SimulationError> {
        let from = self
            .state
            .fleet()
            .ambulance(ambulance_id)
            .map(|a| a.location())
            .ok_or_else(|| violation(minute, FleetError::UnknownAmbulance(ambulance_id)))?;
        let scene = self.casualty_mut(minute, casualty_id)?.location();
        let eta = eta_minutes(travel_time_minutes(from, scene, self.config.ambulance_speed_kmh));

        self.state
            .fleet_mut()
            .dispatch(ambulance_id, casualty_id, scene, hospital_id, eta)
            .map_err(|e| violation(minute, e))?;
        self.casualty_mut(minute, casualty_id)?.assign(ambulance_id);
        result.dispatches += 1;

        tracing::debug!(minute, ambulance_id, casualty_id, hospital = hospital_id, eta, "dispatch");
        self.log_event(Event::Dispatch {
            minute,
            ambulance_id,
            casualty_id,
            hospital_id: hospital_id.to_string(),
            eta_minutes: eta,
        });

        if eta == 0 {
            self.arrive_at_scene(minute, ambulance_id, result)?;
        }
        Ok(())
    }

    fn send_to_base(&mut self, minute: u32, ambulance_id: AmbulanceId) -> Result<(), SimulationError> {
        let fleet = self.state.fleet();
        let ambulance = fleet
            .ambulance(ambulance_id)
            .ok_or_else(|| violation(minute, FleetError::UnknownAmbulance(ambulance_id)))?;
        let hospital_id = ambulance.base_hospital_id().map(str::to_string);
        let (Some(hospital_id), Some(base)) = (hospital_id, fleet.base_location(ambulance_id)) else {
            return Err(violation(minute, format!("ambulance {} has no base", ambulance_id)));
        };
        let eta = eta_minutes(travel_time_minutes(
            ambulance.location(),
            base,
            self.config.ambulance_speed_kmh,
        ));

        self.state
            .fleet_mut()
            .send_to_base(ambulance_id, eta)
            .map_err(|e| violation(minute, e))?;
        self.log_event(Event::ReturnToBase {
            minute,
            ambulance_id,
            hospital_id,
            eta_minutes: eta,
        });

        if eta == 0 {
            self.arrive_at_base(minute, ambulance_id)?;
        }
        Ok(())
    }

    fn move_to_location(
        &mut self,
        minute: u32,
        ambulance_id: AmbulanceId,
        target: GeoPoint,
    ) -> Result<(), SimulationError> {
        let from = self
            .state
            .fleet()
            .ambulance(ambulance_id)
            .map(|a| a.location())
            .ok_or_else(|| violation(minute, FleetError::UnknownAmbulance(ambulance_id)))?;
        let eta = eta_minutes(travel_time_minutes(from, target, self.config.ambulance_speed_kmh));

        self.state
            .fleet_mut()
            .reposition(ambulance_id, target, eta)
            .map_err(|e| violation(minute, e))?;
        tracing::debug!(minute, ambulance_id, lat = target.lat, lon = target.lon, eta, "reposition");
        self.log_event(Event::MoveToLocation {
            minute,
            ambulance_id,
            target,
            eta_minutes: eta,
        });

        if eta == 0 {
            self.arrive_at_location(minute, ambulance_id)?;
        }
        Ok(())
    }

    // ========================================================================
    // Completion and failure
    // ========================================================================

    /// Finish the episode
    ///
    /// Units still carrying or driving to a casualty who has died are
    /// released where they are, so the final snapshot has no unit tied to a
    /// dead patient.
    fn complete(&mut self) -> Result<(), SimulationError> {
        let minute = self.clock.current_minute();
        let stranded: Vec<(AmbulanceId, CasualtyId, GeoPoint)> = self
            .state
            .fleet()
            .ambulances()
            .filter_map(|a| {
                let casualty_id = a.casualty_id()?;
                let dead = self
                    .state
                    .casualty(casualty_id)
                    .is_some_and(|c| !c.is_alive());
                dead.then(|| (a.id(), casualty_id, a.location()))
            })
            .collect();
        for (ambulance_id, casualty_id, location) in stranded {
            self.abort_transport(minute, ambulance_id, casualty_id, location)?;
        }

        let reason = if self.state.all_resolved() {
            CompletionReason::AllResolved
        } else {
            CompletionReason::HorizonReached
        };
        self.phase = EnginePhase::Completed;
        self.log_completion(reason);
        Ok(())
    }

    fn log_completion(&mut self, reason: CompletionReason) {
        let incomplete = self.state.unresolved_count();
        self.state.metrics_mut().incomplete = incomplete;
        let summary = self.summary();
        tracing::info!(
            minute = self.clock.current_minute(),
            ?reason,
            deaths = summary.deaths,
            transported = summary.transported,
            incomplete = summary.incomplete,
            total_reward = summary.total_reward,
            "simulation finished"
        );
        self.log_event(Event::Completed {
            minute: self.clock.current_minute(),
            reason,
            summary,
        });
    }

    fn check_invariants(&mut self) -> Result<(), SimulationError> {
        let snapshot = self.snapshot();
        validate_snapshot(&snapshot)?;
        self.last_valid = snapshot;
        Ok(())
    }

    /// Fatal failure: stop, record the last valid state, notify observers
    fn halt(&mut self, err: SimulationError) -> SimulationError {
        self.phase = EnginePhase::Stopped;
        tracing::error!(minute = self.clock.current_minute(), error = %err, "simulation halted");
        self.log_event(Event::Error {
            minute: self.clock.current_minute(),
            kind: ErrorKind::DeterminismViolation,
            fatal: true,
            message: err.to_string(),
            ambulance_id: None,
            snapshot: Some(Box::new(self.last_valid.clone())),
        });
        self.flush_events();
        err
    }

    fn log_event(&mut self, event: Event) {
        self.event_log.log(event);
    }

    fn flush_events(&mut self) {
        let failures = self
            .observers
            .notify(self.event_log.events_since(self.flushed));
        self.flushed = self.event_log.len();
        self.state.metrics_mut().listener_errors += failures;
    }
}

impl std::fmt::Debug for SimulationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationEngine")
            .field("scenario_id", &self.scenario_id)
            .field("minute", &self.clock.current_minute())
            .field("phase", &self.phase)
            .field("policy", &self.policy.name())
            .field("casualties", &self.state.num_casualties())
            .field("ambulances", &self.state.fleet().num_ambulances())
            .field("events", &self.event_log.len())
            .finish()
    }
}
