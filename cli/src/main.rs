//! `mci-sim` - command-line driver for the MCI simulator
//!
//! ```text
//! mci-sim run --hospitals data/hospitals.csv --region CA --casualties 60 --policy nearest
//! mci-sim generate --hospitals data/hospitals.csv --output scenario.json
//! mci-sim evaluate --hospitals data/hospitals.csv --episodes 20 --policies nearest,trauma
//! ```
//!
//! Logging goes to stderr; set `RUST_LOG` to change the level (default `info`).

use clap::{Args, Parser, Subcommand};
use mci_simulator_core_rs::evaluation::{self, EvaluationRequest, PolicyEvaluation};
use mci_simulator_core_rs::hospitals::CsvHospitalSource;
use mci_simulator_core_rs::models::{Event, MetricsSummary};
use mci_simulator_core_rs::scenario::persistence::{self, PersistenceError};
use mci_simulator_core_rs::scenario::{ScenarioGenerator, ScenarioSourceError};
use mci_simulator_core_rs::{
    AmbulanceConfig, ConfigurationError, EngineConfig, PolicyConfig, PolicyError, Scenario,
    ScenarioRequest, SimulationEngine, SimulationError,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use thiserror::Error;

// ── CLI definition ─────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "mci-sim",
    version,
    about = "Mass casualty incident response simulator"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate one or more scenarios with a single policy
    Run(RunArgs),
    /// Generate a scenario and write it to disk
    Generate(GenerateArgs),
    /// Compare policies over many seeded episodes
    Evaluate(EvaluateArgs),
}

#[derive(Args, Clone)]
struct ScenarioArgs {
    /// Hospital dataset (US hospital-locations CSV layout)
    #[arg(long, env = "MCI_HOSPITALS_CSV")]
    hospitals: PathBuf,

    /// State code used to filter hospitals
    #[arg(long, default_value = "CA")]
    region: String,

    #[arg(long, default_value_t = 60)]
    casualties: u32,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    #[arg(long, default_value_t = 2)]
    ambulances_per_hospital: u32,

    #[arg(long, default_value_t = 1)]
    ambulance_variation: u32,

    #[arg(long, default_value_t = 3)]
    field_ambulances: u32,

    #[arg(long, default_value_t = 10.0)]
    field_radius_km: f64,
}

impl ScenarioArgs {
    fn request(&self) -> ScenarioRequest {
        ScenarioRequest {
            ambulance_config: AmbulanceConfig {
                ambulances_per_hospital: self.ambulances_per_hospital,
                ambulances_per_hospital_variation: self.ambulance_variation,
                field_ambulances: self.field_ambulances,
                field_ambulance_radius_km: self.field_radius_km,
                seed: self.seed,
            },
            ..ScenarioRequest::new(self.casualties, self.seed)
        }
    }

    fn generator(&self) -> Result<ScenarioGenerator, CliError> {
        let source = CsvHospitalSource::new(&self.hospitals);
        let generator = ScenarioGenerator::from_source(&source, &self.region)?;
        tracing::info!(
            region = %self.region,
            hospitals = generator.hospitals().len(),
            "loaded hospitals"
        );
        Ok(generator)
    }
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    scenario: ScenarioArgs,

    /// Load this scenario file instead of generating one
    #[arg(long, conflicts_with = "num_scenarios")]
    scenario_file: Option<PathBuf>,

    /// random, nearest, triage, trauma or load_balancing
    #[arg(long, default_value = "nearest")]
    policy: String,

    /// Horizon in minutes
    #[arg(long, default_value_t = 180)]
    max_time: u32,

    /// Consecutive seeds starting at --seed
    #[arg(long, default_value_t = 1)]
    num_scenarios: u32,

    /// Send hospital-based units home after each delivery
    #[arg(long)]
    return_to_base: bool,

    /// Write results as JSON
    #[arg(long)]
    output: Option<PathBuf>,

    /// Include the full event log in the JSON output
    #[arg(long)]
    include_events: bool,
}

#[derive(Args)]
struct GenerateArgs {
    #[command(flatten)]
    scenario: ScenarioArgs,

    #[arg(long, short)]
    output: PathBuf,
}

#[derive(Args)]
struct EvaluateArgs {
    #[command(flatten)]
    scenario: ScenarioArgs,

    /// Comma-separated policy names
    #[arg(long, value_delimiter = ',', default_value = "random,nearest,triage,trauma,load_balancing")]
    policies: Vec<String>,

    #[arg(long, default_value_t = 10)]
    episodes: u32,

    #[arg(long, default_value_t = 180)]
    max_time: u32,

    /// Worker threads (defaults to one per core)
    #[arg(long)]
    threads: Option<usize>,

    /// Write the full evaluation as JSON
    #[arg(long)]
    output: Option<PathBuf>,

    /// Write one row per episode as CSV
    #[arg(long)]
    csv: Option<PathBuf>,
}

// ── errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Source(#[from] ScenarioSourceError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Simulation(#[from] SimulationError),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Evaluation(#[from] evaluation::EvaluationError),

    #[error("failed to write {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode results: {0}")]
    Json(#[from] serde_json::Error),
}

// ── commands ───────────────────────────────────────────────────────

#[derive(Serialize)]
struct RunReport {
    scenario_id: String,
    scenario_name: String,
    seed: u64,
    policy: String,
    summary: MetricsSummary,
    event_digest: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    events: Option<Vec<Event>>,
}

fn run(args: RunArgs) -> Result<(), CliError> {
    let scenarios: Vec<Scenario> = match &args.scenario_file {
        Some(path) => vec![persistence::load_from_path(path)?],
        None => {
            let generator = args.scenario.generator()?;
            let base = args.scenario.request();
            (0..args.num_scenarios)
                .map(|i| {
                    let seed = base.seed.wrapping_add(i as u64);
                    let mut request = base.clone();
                    request.seed = seed;
                    request.ambulance_config.seed = seed;
                    generator.generate(&request)
                })
                .collect::<Result<_, _>>()?
        }
    };

    let config = EngineConfig {
        horizon_minutes: args.max_time,
        return_to_base_after_delivery: args.return_to_base,
        ..EngineConfig::default()
    };

    let mut reports = Vec::with_capacity(scenarios.len());
    for scenario in &scenarios {
        let policy = PolicyConfig::from_name(&args.policy, scenario.seed)?;
        let mut engine = SimulationEngine::with_policy_config(scenario, config.clone(), &policy)?;
        let summary = engine.run()?;

        println!(
            "{:<28} deaths={:<3} transported={:<3} incomplete={:<3} golden_hour={:>5.1}% reward={:.0}",
            scenario.metadata.name,
            summary.deaths,
            summary.transported,
            summary.incomplete,
            summary.golden_hour_rate * 100.0,
            summary.total_reward,
        );

        reports.push(RunReport {
            scenario_id: scenario.metadata.id.to_string(),
            scenario_name: scenario.metadata.name.clone(),
            seed: scenario.seed,
            policy: policy.name().to_string(),
            summary,
            event_digest: engine.event_log().digest(),
            events: args
                .include_events
                .then(|| engine.event_log().events().to_vec()),
        });
    }

    if let Some(path) = &args.output {
        write_json(path, &reports)?;
    }
    Ok(())
}

fn generate(args: GenerateArgs) -> Result<(), CliError> {
    let generator = args.scenario.generator()?;
    let scenario = generator.generate(&args.scenario.request())?;
    persistence::save_to_path(&scenario, &args.output)?;
    tracing::info!(
        path = %args.output.display(),
        id = %scenario.metadata.id,
        casualties = scenario.num_casualties(),
        "scenario written"
    );
    Ok(())
}

fn evaluate(args: EvaluateArgs) -> Result<(), CliError> {
    let generator = args.scenario.generator()?;
    let policies = args
        .policies
        .iter()
        .map(|name| PolicyConfig::from_name(name.trim(), args.scenario.seed))
        .collect::<Result<Vec<_>, _>>()?;

    let mut request = EvaluationRequest::new(
        PolicyConfig::Nearest,
        args.episodes,
        args.scenario.seed,
        args.scenario.casualties,
    );
    request.scenario = args.scenario.request();
    request.engine.horizon_minutes = args.max_time;
    request.num_threads = args.threads;

    let evaluations = evaluation::compare_policies(&generator, &request, &policies)?;
    print_comparison(&evaluations);

    if let Some(path) = &args.output {
        write_json(path, &evaluations)?;
    }
    if let Some(path) = &args.csv {
        let file = std::fs::File::create(path).map_err(|source| CliError::Output {
            path: path.clone(),
            source,
        })?;
        evaluation::write_episodes_csv(&evaluations, file)?;
    }
    Ok(())
}

fn print_comparison(evaluations: &[PolicyEvaluation]) {
    println!(
        "{:<16} {:>14} {:>14} {:>14} {:>16}",
        "policy", "deaths", "transported", "golden hour", "reward"
    );
    let fmt = |s: Option<evaluation::SummaryStats>, scale: f64| match s {
        Some(s) => format!("{:.1} ± {:.1}", s.mean * scale, s.std * scale),
        None => "-".to_string(),
    };
    for e in evaluations {
        println!(
            "{:<16} {:>14} {:>14} {:>14} {:>16}",
            e.policy,
            fmt(e.deaths, 1.0),
            fmt(e.transported, 1.0),
            fmt(e.golden_hour_rate, 100.0),
            fmt(e.total_reward, 1.0),
        );
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), CliError> {
    let json = serde_json::to_vec_pretty(value)?;
    std::fs::write(path, json).map_err(|source| CliError::Output {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!(path = %path.display(), "results written");
    Ok(())
}

fn main() -> ExitCode {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run(args) => run(args),
        Commands::Generate(args) => generate(args),
        Commands::Evaluate(args) => evaluate(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "mci-sim failed");
            ExitCode::FAILURE
        }
    }
}
