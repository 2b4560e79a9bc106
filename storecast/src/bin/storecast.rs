//! Storecast CLI - run the forecasting pipeline one stage at a time or end to end.
//!
//! ```bash
//! storecast etl
//! storecast features
//! storecast train
//! storecast predict --days 14
//! storecast report --days 14 --store 1 --export out/
//! storecast run --days 7 --config storecast.json
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use storecast::config::{PipelineConfig, DEFAULT_HORIZON};
use storecast::dashboard::{available_horizons, DashboardState, StoreView};
use storecast::pipeline;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Storecast - per-store daily demand forecasting
#[derive(Parser, Debug)]
#[command(name = "storecast")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// JSON configuration file; defaults apply to anything it leaves out
    #[arg(long, short = 'c', global = true, env = "STORECAST_CONFIG")]
    config: Option<PathBuf>,

    /// Log debug detail
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Clean train.csv and store.csv into daily_sales.parquet
    Etl,

    /// Build features.parquet from daily_sales.parquet
    Features,

    /// Train the model and write its artifacts and metrics
    Train,

    /// Forecast the next N days for every store
    Predict(PredictArgs),

    /// Show the dashboard data for one horizon
    Report(ReportArgs),

    /// Run every stage in order
    Run(HorizonArgs),
}

#[derive(Args, Debug, Clone)]
struct HorizonArgs {
    /// Number of days to forecast
    #[arg(long, short = 'd', default_value_t = DEFAULT_HORIZON, value_parser = parse_horizon)]
    days: usize,
}

#[derive(Args, Debug, Clone)]
struct PredictArgs {
    #[command(flatten)]
    horizon: HorizonArgs,

    /// Derive category codes from the latest rows instead of the saved codes
    #[arg(long)]
    rederive_categories: bool,
}

#[derive(Args, Debug, Clone)]
struct ReportArgs {
    #[command(flatten)]
    horizon: HorizonArgs,

    /// Store to show; defaults to the first store
    #[arg(long, short = 's')]
    store: Option<String>,

    /// Directory to write store_<id>_forecast.csv into
    #[arg(long, short = 'e')]
    export: Option<PathBuf>,
}

fn parse_horizon(value: &str) -> std::result::Result<usize, String> {
    match value.parse::<usize>() {
        Ok(days) if days >= 1 => Ok(days),
        _ => Err(format!("'{}' is not a positive number of days", value)),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        "storecast=debug"
    } else {
        "storecast=info"
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?)
        .init();

    let config = match &cli.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    match cli.command {
        Commands::Etl => {
            pipeline::run_etl(&config).context("ETL failed")?;
        }
        Commands::Features => {
            pipeline::run_features(&config).context("feature engineering failed")?;
        }
        Commands::Train => {
            let outcome = pipeline::run_training(&config).context("training failed")?;
            println!("Validation RMSE: {:.2}", outcome.metrics.rmse);
            println!("Validation MAPE: {:.2}%", outcome.metrics.mape);
        }
        Commands::Predict(args) => {
            let path = pipeline::run_prediction(&config, args.horizon.days, args.rederive_categories)
                .context("prediction failed")?;
            println!("Saved predictions to {}", path.display());
        }
        Commands::Report(args) => report(&config, &args)?,
        Commands::Run(args) => {
            let path = pipeline::run_all(&config, args.days).context("pipeline failed")?;
            println!("Saved predictions to {}", path.display());
        }
    }

    info!("done");
    Ok(())
}

fn report(config: &PipelineConfig, args: &ReportArgs) -> Result<()> {
    let horizons = available_horizons(&config.model_dir)?;
    if !horizons.is_empty() {
        let listed: Vec<String> = horizons.iter().map(|h| h.to_string()).collect();
        println!("Available horizons: {}", listed.join(", "));
    }

    let state = DashboardState::load(config, args.horizon.days).context("failed to load dashboard data")?;
    if let Some(metrics) = state.metrics() {
        println!("Validation RMSE: {:.2}", metrics.rmse);
        println!("Validation MAPE: {:.2}%", metrics.mape);
    }

    let dashboard = match state {
        DashboardState::Ready(dashboard) => dashboard,
        DashboardState::Unavailable { warning, .. } => {
            eprintln!("WARNING: {}", warning);
            return Ok(());
        }
    };

    let store = match &args.store {
        Some(store) => store.clone(),
        None => match dashboard.stores()?.into_iter().next() {
            Some(store) => store.to_string(),
            None => {
                eprintln!("WARNING: the feature table has no stores");
                return Ok(());
            }
        },
    };

    let view = dashboard.store_view(&store)?;
    print_view(&view);

    if let Some(dir) = &args.export {
        let path = view
            .export_tidy_csv(dir)
            .with_context(|| format!("failed to export forecast for store {}", store))?;
        println!("Saved {}", path.display());
    }
    Ok(())
}

fn print_view(view: &StoreView) {
    println!();
    println!("Store {}: historical vs forecast", view.store);
    if let (Some(first), Some(last)) = (view.history.first(), view.history.last()) {
        println!(
            "History: {} days, {} to {}, last sales {:.2}",
            view.history.len(),
            first.0,
            last.0,
            last.1
        );
    }
    for (date, value) in &view.forecast {
        println!("  {}  {:>12.2}", date, value);
    }

    if view.tidy.is_empty() {
        println!("No forecast for this store");
        return;
    }
    println!();
    println!("{:<12} {:>15}", "Day", "Predicted Sales");
    for row in &view.tidy {
        println!("{:<12} {:>15.2}", row.day, row.predicted_sales);
    }
}
