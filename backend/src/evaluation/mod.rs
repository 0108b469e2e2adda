//! Batch evaluation
//!
//! Runs many independent episodes of one or more policies and condenses them
//! into per-episode results and summary statistics. Episodes run in parallel
//! on a rayon pool; each owns its own engine, so nothing is shared between
//! threads.
//!
//! # Critical Invariants
//!
//! 1. Episode `i` always uses scenario seed `base_seed + i`
//! 2. Results come back in episode order whatever the thread count
//! 3. Every policy in [`compare_policies`] sees the same scenarios

use crate::orchestrator::{EngineConfig, SimulationEngine, SimulationError};
use crate::policy::PolicyConfig;
use crate::scenario::{persistence, ConfigurationError, ScenarioGenerator, ScenarioRequest};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::io::Write;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("episode {episode}: {source}")]
    Configuration {
        episode: u32,
        #[source]
        source: ConfigurationError,
    },

    #[error("episode {episode}: {source}")]
    Simulation {
        episode: u32,
        #[source]
        source: SimulationError,
    },

    #[error("failed to build thread pool: {0}")]
    ThreadPool(String),

    #[error("csv export failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// What to evaluate and over which scenarios
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationRequest {
    pub policy: PolicyConfig,
    pub episodes: u32,
    pub base_seed: u64,
    /// Template request; its seeds are replaced per episode
    pub scenario: ScenarioRequest,
    #[serde(default)]
    pub engine: EngineConfig,
    /// Worker threads; rayon's global pool when absent
    #[serde(default)]
    pub num_threads: Option<usize>,
}

impl EvaluationRequest {
    pub fn new(policy: PolicyConfig, episodes: u32, base_seed: u64, num_casualties: u32) -> Self {
        Self {
            policy,
            episodes,
            base_seed,
            scenario: ScenarioRequest::new(num_casualties, base_seed),
            engine: EngineConfig::default(),
            num_threads: None,
        }
    }

    /// Scenario request for one episode
    pub fn scenario_for(&self, episode: u32) -> ScenarioRequest {
        let seed = self.base_seed.wrapping_add(episode as u64);
        let mut request = self.scenario.clone();
        request.seed = seed;
        request.ambulance_config.seed = seed;
        request
    }
}

/// Outcome of one episode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeResult {
    pub episode: u32,
    pub seed: u64,
    pub scenario_id: Uuid,
    pub policy: String,
    pub total_casualties: u32,
    pub deaths: u32,
    pub dead_on_arrival: u32,
    pub transported: u32,
    pub incomplete: u32,
    pub avg_response_time: Option<f64>,
    pub golden_hour_rate: f64,
    pub trauma_matches: u32,
    pub invalid_actions: u32,
    pub total_reward: f64,
    pub final_minute: u32,
    /// SHA-256 of the event log
    pub event_digest: String,
    /// SHA-256 of the scenario's canonical JSON
    pub scenario_fingerprint: String,
}

/// Mean, population standard deviation and range of a sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

impl SummaryStats {
    /// Statistics over `values`; `None` for an empty sample
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let count = values.len();
        let mean = values.iter().sum::<f64>() / count as f64;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some(Self {
            count,
            mean,
            std: variance.sqrt(),
            min,
            max,
        })
    }
}

/// All episodes of one policy plus their aggregates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyEvaluation {
    pub policy: String,
    pub episodes: Vec<EpisodeResult>,
    pub deaths: Option<SummaryStats>,
    pub transported: Option<SummaryStats>,
    pub incomplete: Option<SummaryStats>,
    /// Over episodes with at least one delivery
    pub avg_response_time: Option<SummaryStats>,
    pub golden_hour_rate: Option<SummaryStats>,
    pub total_reward: Option<SummaryStats>,
}

impl PolicyEvaluation {
    fn from_episodes(policy: String, episodes: Vec<EpisodeResult>) -> Self {
        let stat = |f: fn(&EpisodeResult) -> f64| {
            SummaryStats::from_values(&episodes.iter().map(f).collect::<Vec<_>>())
        };
        let response: Vec<f64> = episodes.iter().filter_map(|e| e.avg_response_time).collect();
        Self {
            deaths: stat(|e| e.deaths as f64),
            transported: stat(|e| e.transported as f64),
            incomplete: stat(|e| e.incomplete as f64),
            avg_response_time: SummaryStats::from_values(&response),
            golden_hour_rate: stat(|e| e.golden_hour_rate),
            total_reward: stat(|e| e.total_reward),
            policy,
            episodes,
        }
    }
}

/// Run a single episode to completion
pub fn run_episode(
    generator: &ScenarioGenerator,
    request: &EvaluationRequest,
    episode: u32,
) -> Result<EpisodeResult, EvaluationError> {
    let scenario_request = request.scenario_for(episode);
    let scenario = generator
        .generate(&scenario_request)
        .map_err(|source| EvaluationError::Configuration { episode, source })?;

    let mut engine = SimulationEngine::with_policy_config(&scenario, request.engine.clone(), &request.policy)
        .map_err(|source| EvaluationError::Simulation { episode, source })?;
    let summary = engine
        .run()
        .map_err(|source| EvaluationError::Simulation { episode, source })?;

    // Hashing a validated scenario only fails on non-finite floats
    let scenario_fingerprint = persistence::fingerprint(&scenario).unwrap_or_default();

    tracing::debug!(
        episode,
        seed = scenario_request.seed,
        policy = request.policy.name(),
        deaths = summary.deaths,
        transported = summary.transported,
        "episode finished"
    );

    Ok(EpisodeResult {
        episode,
        seed: scenario_request.seed,
        scenario_id: scenario.metadata.id,
        policy: request.policy.name().to_string(),
        total_casualties: summary.total_casualties,
        deaths: summary.deaths,
        dead_on_arrival: summary.dead_on_arrival,
        transported: summary.transported,
        incomplete: summary.incomplete,
        avg_response_time: summary.avg_response_time,
        golden_hour_rate: summary.golden_hour_rate,
        trauma_matches: summary.trauma_matches,
        invalid_actions: summary.invalid_actions,
        total_reward: summary.total_reward,
        final_minute: summary.final_minute,
        event_digest: engine.event_log().digest(),
        scenario_fingerprint,
    })
}

/// Run every episode of `request` in parallel
pub fn evaluate_policy(
    generator: &ScenarioGenerator,
    request: &EvaluationRequest,
) -> Result<PolicyEvaluation, EvaluationError> {
    tracing::info!(
        policy = request.policy.name(),
        episodes = request.episodes,
        base_seed = request.base_seed,
        "evaluating policy"
    );

    let run_all = || {
        (0..request.episodes)
            .into_par_iter()
            .map(|episode| run_episode(generator, request, episode))
            .collect::<Result<Vec<_>, _>>()
    };

    let episodes = match request.num_threads {
        Some(threads) => rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| EvaluationError::ThreadPool(e.to_string()))?
            .install(run_all)?,
        None => run_all()?,
    };

    Ok(PolicyEvaluation::from_episodes(
        request.policy.name().to_string(),
        episodes,
    ))
}

/// Evaluate several policies over the same scenarios
pub fn compare_policies(
    generator: &ScenarioGenerator,
    request: &EvaluationRequest,
    policies: &[PolicyConfig],
) -> Result<Vec<PolicyEvaluation>, EvaluationError> {
    policies
        .iter()
        .map(|policy| {
            let request = EvaluationRequest {
                policy: policy.clone(),
                ..request.clone()
            };
            evaluate_policy(generator, &request)
        })
        .collect()
}

/// One CSV row per episode, policies in the given order
pub fn write_episodes_csv<W: Write>(
    evaluations: &[PolicyEvaluation],
    writer: W,
) -> Result<(), EvaluationError> {
    let mut wtr = csv::Writer::from_writer(writer);

    wtr.write_record([
        "policy",
        "episode",
        "seed",
        "scenario_id",
        "total_casualties",
        "deaths",
        "dead_on_arrival",
        "transported",
        "incomplete",
        "avg_response_time",
        "golden_hour_rate",
        "trauma_matches",
        "invalid_actions",
        "total_reward",
        "final_minute",
        "event_digest",
    ])?;

    for evaluation in evaluations {
        for e in &evaluation.episodes {
            wtr.write_record([
                e.policy.clone(),
                e.episode.to_string(),
                e.seed.to_string(),
                e.scenario_id.to_string(),
                e.total_casualties.to_string(),
                e.deaths.to_string(),
                e.dead_on_arrival.to_string(),
                e.transported.to_string(),
                e.incomplete.to_string(),
                e.avg_response_time.map(|v| v.to_string()).unwrap_or_default(),
                e.golden_hour_rate.to_string(),
                e.trauma_matches.to_string(),
                e.invalid_actions.to_string(),
                e.total_reward.to_string(),
                e.final_minute.to_string(),
                e.event_digest.clone(),
            ])?;
        }
    }

    wtr.flush()?;
    Ok(())
}
