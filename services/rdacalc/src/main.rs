//! Reverse density altitude calculator.
//!
//! Finds the altitude MSL at which density altitude reaches a given value
//! under the conditions forecast by the HRRR or RAP model. With the
//! density altitude of an aircraft's service ceiling as input, the result
//! is its effective ceiling for the day.
//!
//! Subcommands:
//! - `calc` single lookup from a local or freshly downloaded model file
//! - `download` fetch a model file
//! - `update` keep only the current model file in a directory
//! - `serve` HTTP API over the most recent model run
//! - `models` list the model catalog

mod cache;
mod config;
mod download;
mod model;
mod output;
mod server;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use density_altitude::{AltitudeUnit, DaQuery, HeightKind};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use config::{IssueTime, ModelCatalog, DEFAULT_BASE_URL};
use download::{DownloadConfig, DownloadManager};
use output::OutputFormat;
use server::{AppState, LoadedModel};

#[derive(Parser, Debug)]
#[command(name = "rdacalc", version)]
#[command(about = "Reverse density altitude calculator: the altitude MSL at which density altitude equals a given value in current model conditions")]
struct Cli {
    /// Log level or filter directive; RUST_LOG takes precedence
    #[arg(long, env = "RDACALC_LOG_LEVEL", default_value = "warn", global = true)]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    /// YAML file extending the built-in model catalog
    #[arg(long, env = "RDACALC_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Root URL model directories are fetched from
    #[arg(long, env = "RDACALC_BASE_URL", default_value = DEFAULT_BASE_URL, global = true)]
    base_url: String,

    /// Download retries after the first attempt
    #[arg(long, default_value = "3", global = true)]
    max_retries: u32,

    /// Initial delay between download attempts, doubled each retry
    #[arg(long, default_value = "2", global = true)]
    retry_delay_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Find the altitude at which density altitude equals DA
    Calc(CalcArgs),
    /// Download a model file
    Download(DownloadArgs),
    /// Keep the current model file in a directory and delete older ones
    Update(UpdateArgs),
    /// Serve lookups over HTTP
    Serve(ServeArgs),
    /// List known model products
    Models,
}

/// Model run selection. Defaults to one hour ago, truncated to the hour.
#[derive(Args, Debug, Clone)]
struct IssueArgs {
    /// Model run as YYYYMMDDHH (UTC)
    #[arg(long, conflicts_with_all = ["date", "hour"])]
    issue_time: Option<IssueTime>,

    /// UTC date of the model run, YYYYMMDD
    #[arg(long)]
    date: Option<String>,

    /// UTC hour of the model run
    #[arg(long, value_parser = clap::value_parser!(u32).range(0..24))]
    hour: Option<u32>,
}

impl IssueArgs {
    fn resolve(&self, now: DateTime<Utc>) -> Result<IssueTime> {
        if let Some(issue) = self.issue_time {
            return Ok(issue);
        }
        let latest = IssueTime::latest(now);
        let date = match &self.date {
            Some(date) => IssueTime::parse_date(date)?,
            None => latest.date(),
        };
        IssueTime::from_date_hour(date, self.hour.unwrap_or(latest.hour()))
    }
}

#[derive(Args, Debug)]
struct CalcArgs {
    /// Target density altitude, in --unit
    #[arg(allow_negative_numbers = true)]
    da: f64,

    /// Latitude
    #[arg(allow_negative_numbers = true)]
    lat: f64,

    /// Longitude
    #[arg(allow_negative_numbers = true)]
    lon: f64,

    /// GRIB2 file to use instead of downloading the latest model run
    #[arg(long)]
    grib_file: Option<PathBuf>,

    /// Model to download
    #[arg(short, long, default_value = "hrrr")]
    model: String,

    /// Forecast hour
    #[arg(long, default_value = "1")]
    fh: u32,

    #[command(flatten)]
    issue: IssueArgs,

    /// Unit of DA and of the result: km, m, ft, gpkm, gpm or gpft
    #[arg(short, long, default_value = "ft")]
    unit: AltitudeUnit,

    /// Report geopotential instead of geometric altitude
    #[arg(long)]
    geopotential: bool,

    /// Print every model level
    #[arg(short, long)]
    verbose: bool,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct DownloadArgs {
    /// Directory to save files
    #[arg(short, long, default_value = ".")]
    dir: PathBuf,

    /// Product to download
    #[arg(short, long, default_value = "hrrr")]
    product: String,

    #[command(flatten)]
    issue: IssueArgs,

    /// Forecast hour
    #[arg(long, default_value = "1")]
    fh: u32,
}

#[derive(Args, Debug)]
struct UpdateArgs {
    /// Directory holding the model files
    #[arg(short, long, default_value = ".")]
    dir: PathBuf,

    #[arg(short, long, default_value = "rap")]
    product: String,

    #[command(flatten)]
    issue: IssueArgs,

    /// Forecast hour
    #[arg(long, default_value = "1")]
    fh: u32,

    /// Print the path of the kept file
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Listen address
    #[arg(long, env = "RDACALC_BIND", default_value = "0.0.0.0:8080")]
    bind: SocketAddr,

    /// Directory the current model file is kept in
    #[arg(long, env = "RDACALC_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    #[arg(short, long, default_value = "rap")]
    model: String,

    /// Forecast hour
    #[arg(long, default_value = "1")]
    fh: u32,

    /// Seconds between checks for a newer model run
    #[arg(long, default_value = "300")]
    refresh_secs: u64,

    /// Serve a fixed GRIB2 file and never refresh
    #[arg(long)]
    grib_file: Option<PathBuf>,
}

fn init_tracing(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("Invalid log level '{}'", level))?;

    // stdout carries results; logs go to stderr
    let builder = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);
    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| anyhow!("Failed to initialise logging: {}", e))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_json)?;

    // One clock reading per process so every step agrees on the model run
    let now = Utc::now();

    let catalog = ModelCatalog::load(cli.config.as_deref())?;
    let downloader = DownloadManager::new(DownloadConfig {
        base_url: cli.base_url.clone(),
        max_retries: cli.max_retries,
        initial_retry_delay: Duration::from_secs(cli.retry_delay_secs),
        ..DownloadConfig::default()
    })?;

    match cli.command {
        Command::Calc(args) => run_calc(args, &catalog, &downloader, now).await,
        Command::Download(args) => {
            let product = catalog.get(&args.product)?;
            let issue = args.issue.resolve(now)?;
            let name = product.file_name(issue, args.fh)?;
            let path = downloader
                .fetch_product(product, issue, args.fh, &args.dir, &name)
                .await?;
            println!("{}", path.display());
            Ok(())
        }
        Command::Update(args) => {
            let product = catalog.get(&args.product)?;
            let issue = args.issue.resolve(now)?;
            let path = cache::rotate(&downloader, &args.dir, product, issue, args.fh).await?;
            if args.verbose {
                println!("{}", path.display());
            }
            Ok(())
        }
        Command::Serve(args) => run_serve(args, &catalog, downloader).await,
        Command::Models => {
            for product in catalog.products() {
                println!("{:<6} {} ({})", product.id, product.full_name, product.available);
            }
            Ok(())
        }
    }
}

async fn run_calc(
    args: CalcArgs,
    catalog: &ModelCatalog,
    downloader: &DownloadManager,
    now: DateTime<Utc>,
) -> Result<()> {
    let mut query = DaQuery::new(args.da, args.lat, args.lon, args.unit).verbose(args.verbose);
    if args.geopotential {
        query = query.with_height_kind(HeightKind::Geopotential);
    }
    let format = OutputFormat::from_flags(args.json, args.verbose);

    // A user-supplied file is never deleted
    let fields = match &args.grib_file {
        Some(path) => model::load_fields(path).await?,
        None => {
            let product = catalog.get(&args.model)?;
            let issue = args.issue.resolve(now)?;
            model::fetch_fields(downloader, product, issue, args.fh).await?
        }
    };

    match query.evaluate(&fields) {
        Ok(report) => {
            println!("{}", output::render(&report, format)?);
            Ok(())
        }
        Err(err) => {
            if format == OutputFormat::Verbose {
                if let Ok(levels) = query.diagnose(&fields) {
                    print!(
                        "{}",
                        output::level_table(&levels, query.unit.with_height_kind(query.height_kind))
                    );
                }
            }
            Err(err).context("No altitude found")
        }
    }
}

async fn run_serve(args: ServeArgs, catalog: &ModelCatalog, downloader: DownloadManager) -> Result<()> {
    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;
    info!("Prometheus metrics exporter initialized");

    let product = catalog.get(&args.model)?.clone();
    let state = Arc::new(AppState::new(
        product,
        args.fh,
        args.data_dir.clone(),
        downloader,
        prometheus,
    ));

    match args.grib_file {
        Some(path) => {
            let fields = model::load_fields(&path).await?;
            state
                .install(LoadedModel {
                    path,
                    issue: None,
                    fields,
                })
                .await;
        }
        None => {
            tokio::spawn(server::refresh_loop(
                state.clone(),
                Duration::from_secs(args.refresh_secs.max(1)),
            ));
        }
    }

    server::run_server(state, args.bind).await
}
