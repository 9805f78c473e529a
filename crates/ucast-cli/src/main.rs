//! ucast CLI entry point.
//!
//! Urban congestion forecasting: zone raw observations, train the three
//! model variants, rank them, and serve adjusted predictions from the
//! winning artifact set.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use std::path::Path;
use ucast_pipeline::{PipelineConfig, TrainingPipeline};
use ucast_serving::{PointRequest, RouteRequest, ServingContext, Waypoint};

/// ucast version from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "ucast")]
#[command(version = VERSION)]
#[command(about = "Urban congestion forecasting pipeline and serving tools", long_about = None)]
struct Args {
    /// Execution mode: train, predict, route, info, health
    ///
    /// - train: run the full pipeline on a CSV dataset and persist the
    ///   best servable artifact set
    /// - predict: one adjusted prediction for a coordinate + timestamp
    /// - route: per-waypoint predictions along a route
    /// - info: print the loaded artifact metadata
    /// - health: report serving readiness
    #[arg(long, default_value = "train")]
    mode: String,

    /// Input observation CSV (train mode)
    ///
    /// Required columns: timestamp, latitude, longitude; every remaining
    /// numeric column is a model feature.
    #[arg(short, long)]
    input: Option<String>,

    /// Artifact directory written by train mode and read by the rest
    #[arg(short, long, default_value = "artifacts")]
    artifacts: String,

    /// Number of spatial zones
    #[arg(long, default_value = "30")]
    zones: usize,

    /// Outgoing K-NN edges per zone
    #[arg(long, default_value = "4")]
    neighbors: usize,

    /// Input window length (timesteps)
    #[arg(long, default_value = "24")]
    sequence_length: usize,

    /// Forecast horizon (timesteps)
    #[arg(long, default_value = "12")]
    horizon: usize,

    /// Feature column index to forecast
    #[arg(long, default_value = "0")]
    target_feature: usize,

    /// Training epochs per variant
    #[arg(long, default_value = "50")]
    epochs: usize,

    /// Samples per gradient update
    #[arg(long, default_value = "32")]
    batch_size: usize,

    /// Latitude (predict mode)
    #[arg(long)]
    lat: Option<f64>,

    /// Longitude (predict mode)
    #[arg(long)]
    lon: Option<f64>,

    /// ISO-8601 timestamp (predict mode; defaults to now)
    #[arg(long)]
    time: Option<String>,

    /// Route waypoints as "lat,lon;lat,lon;..." (route mode)
    #[arg(long)]
    waypoints: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    match args.mode.as_str() {
        "train" => run_train(&args),
        "predict" => run_predict(&args),
        "route" => run_route(&args),
        "info" => run_info(&args),
        "health" => run_health(&args),
        other => bail!("Unknown mode: {other} (expected train, predict, route, info or health)"),
    }
}

fn run_train(args: &Args) -> Result<()> {
    let input = args
        .input
        .as_deref()
        .context("train mode requires --input <csv>")?;
    let dataset = ucast_io::load_csv(Path::new(input))
        .with_context(|| format!("Failed to load dataset from {input}"))?;

    let config = PipelineConfig {
        num_zones: args.zones,
        neighbors: args.neighbors,
        sequence_length: args.sequence_length,
        horizon: args.horizon,
        target_feature: args.target_feature,
        epochs: args.epochs,
        batch_size: args.batch_size,
        output_dir: args.artifacts.clone(),
        ..Default::default()
    };

    let pipeline = TrainingPipeline::new(config).context("Invalid pipeline configuration")?;
    let report = pipeline.run(&dataset).context("Pipeline run failed")?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn load_context(args: &Args) -> Result<ServingContext> {
    ServingContext::load(Path::new(&args.artifacts))
        .with_context(|| format!("Failed to load artifacts from {}", args.artifacts))
}

fn run_predict(args: &Args) -> Result<()> {
    let context = load_context(args)?;
    let request = PointRequest {
        latitude: args.lat.context("predict mode requires --lat")?,
        longitude: args.lon.context("predict mode requires --lon")?,
        timestamp: args
            .time
            .clone()
            .unwrap_or_else(|| Utc::now().to_rfc3339()),
    };
    let response = context.predict_point(&request)?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn run_route(args: &Args) -> Result<()> {
    let context = load_context(args)?;
    let route_arg = args
        .waypoints
        .as_deref()
        .context("route mode requires --waypoints \"lat,lon;lat,lon;...\"")?;

    let mut waypoints = Vec::new();
    for (i, pair) in route_arg.split(';').enumerate() {
        let (lat, lon) = pair
            .split_once(',')
            .with_context(|| format!("Waypoint {i} is not \"lat,lon\": {pair}"))?;
        waypoints.push(Waypoint {
            latitude: lat.trim().parse().with_context(|| format!("Waypoint {i}: bad latitude"))?,
            longitude: lon
                .trim()
                .parse()
                .with_context(|| format!("Waypoint {i}: bad longitude"))?,
        });
    }

    let response = context.predict_route(&RouteRequest { waypoints }, Utc::now())?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn run_info(args: &Args) -> Result<()> {
    let context = load_context(args)?;
    println!("{}", serde_json::to_string_pretty(context.model_info()?)?);
    Ok(())
}

fn run_health(args: &Args) -> Result<()> {
    // Health must answer even when artifacts are missing or corrupt.
    let context = ServingContext::initialize(Path::new(&args.artifacts));
    println!(
        "{}",
        serde_json::to_string_pretty(&context.health(Utc::now()))?
    );
    Ok(())
}
