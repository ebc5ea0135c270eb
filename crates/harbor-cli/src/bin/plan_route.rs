//! Plan a single vessel passage against a harbor definition and committed traffic.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, ValueEnum};
use harbor_cli::config::Config;
use harbor_cli::harbor::{load_committed_routes, HarborDefinition, PlanReport};
use harbor_core::{Coordinate, PlanRequest, PlanningMode};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// Shift the departure inside the window to avoid traffic
    Flexible,
    /// Keep the departure and reroute around traffic
    Fixed,
}

impl From<Mode> for PlanningMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Flexible => PlanningMode::Flexible,
            Mode::Fixed => PlanningMode::Fixed,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Harbor definition JSON (overrides HARBOR_DEFINITION)
    #[arg(long)]
    harbor: Option<PathBuf>,

    /// Committed routes JSON (overrides HARBOR_COMMITTED_ROUTES)
    #[arg(long)]
    committed: Option<PathBuf>,

    #[arg(long, default_value = "VESSEL-1")]
    vessel_id: String,

    #[arg(long, default_value = "")]
    name: String,

    #[arg(long, allow_hyphen_values = true)]
    start_lat: f64,

    #[arg(long, allow_hyphen_values = true)]
    start_lng: f64,

    #[arg(long, allow_hyphen_values = true)]
    goal_lat: f64,

    #[arg(long, allow_hyphen_values = true)]
    goal_lng: f64,

    /// Requested departure, RFC 3339 (defaults to now)
    #[arg(long)]
    departure: Option<DateTime<Utc>>,

    /// Cruise speed in knots
    #[arg(long, default_value_t = harbor_core::DEFAULT_SPEED_KNOTS)]
    speed: f64,

    #[arg(long, value_enum, default_value_t = Mode::Flexible)]
    mode: Mode,

    /// Log filter directive (overrides HARBOR_LOG / RUST_LOG)
    #[arg(long)]
    log: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Pretty-print the report
    #[arg(long)]
    pretty: bool,
}

fn init_tracing(filter: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_new(filter)
        .with_context(|| format!("Invalid log filter '{}'", filter))?;
    let layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed()
    };
    tracing_subscriber::registry().with(layer).with(filter).init();
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::from_env().with_overrides(
        args.harbor.clone(),
        args.committed.clone(),
        args.log.clone(),
    );
    init_tracing(&config.log_filter, args.json_logs)?;

    let definition = match &config.definition_path {
        Some(path) => HarborDefinition::load(path)?,
        None => {
            tracing::warn!("No harbor definition given, planning in open water");
            HarborDefinition::default()
        }
    };
    let harbor_name = definition.name.clone();
    let engine = definition.into_engine()?;

    let committed = match &config.committed_routes_path {
        Some(path) => load_committed_routes(path)?,
        None => Vec::new(),
    };

    let request = PlanRequest {
        vessel_id: args.vessel_id,
        name: args.name,
        start: Coordinate::new(args.start_lat, args.start_lng),
        goal: Coordinate::new(args.goal_lat, args.goal_lng),
        departure: args.departure.unwrap_or_else(Utc::now),
        speed_knots: args.speed,
        mode: args.mode.into(),
    };
    tracing::info!(
        vessel_id = %request.vessel_id,
        committed = committed.len(),
        mode = ?request.mode,
        "Planning route"
    );

    let plan = engine
        .plan(&request, &committed)
        .with_context(|| format!("Failed to plan route for {}", request.vessel_id))?;
    let report = PlanReport::new(harbor_name, &engine, plan);

    let output = if args.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{}", output);
    Ok(())
}
