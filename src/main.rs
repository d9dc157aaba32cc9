use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};

use get_it_done::config::Config;
use get_it_done::error::PipelineError;
use get_it_done::infra::http_client::ReqwestHttp;
use get_it_done::logging;
use get_it_done::metrics::{self, METRICS_SNAPSHOT_FILE};
use get_it_done::pipeline::ingestion::fetch::{self, FetchOutcome};
use get_it_done::pipeline::processing::quality_gate::Validator;
use get_it_done::pipeline::Pipeline;
use get_it_done::query::{self, QueryFilter};

#[derive(Parser)]
#[command(name = "get_it_done")]
#[command(about = "San Diego Get It Done 311 requests: fetch, transform, validate and query")]
#[command(version = "0.1.0")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Root holding raw/, processed/ and aggregated/ (overrides the config)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// Print the metrics snapshot when the command finishes
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download the raw CSV exports
    Fetch {
        /// Re-download files that already exist
        #[arg(long)]
        force: bool,
    },
    /// Build the canonical dataset and all aggregation views
    Transform,
    /// Run the data-quality checks
    Validate {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Transform then validate, optionally fetching first
    Run {
        /// Fetch missing raw files before transforming
        #[arg(long)]
        fetch: bool,
        /// Re-download files that already exist
        #[arg(long, requires = "fetch")]
        force: bool,
    },
    /// Read one aggregation view, or the overview / filter options
    Query(QueryArgs),
}

#[derive(Args)]
struct QueryArgs {
    /// View name, `overview`, `filters` or `districts`
    view: String,
    #[arg(long)]
    year_min: Option<i32>,
    #[arg(long)]
    year_max: Option<i32>,
    #[arg(long)]
    service_name: Option<String>,
    #[arg(long)]
    district: Option<i32>,
    #[arg(long)]
    neighborhood: Option<String>,
    /// Maximum number of rows to print
    #[arg(long)]
    limit: Option<usize>,
}

impl QueryArgs {
    fn filter(&self) -> QueryFilter {
        QueryFilter {
            year_min: self.year_min,
            year_max: self.year_max,
            service_name: self.service_name.clone(),
            district: self.district,
            neighborhood: self.neighborhood.clone(),
        }
    }
}

fn load_config(path: Option<&Path>, data_dir: Option<&Path>) -> anyhow::Result<Config> {
    let mut config = Config::load(path).context("loading configuration")?;
    if let Some(root) = data_dir {
        config.paths = Config::with_data_dir(root).paths;
    }
    Ok(config)
}

async fn run_fetch(config: &Config, force: bool) -> anyhow::Result<()> {
    let http = ReqwestHttp::new().context("building HTTP client")?;
    let sources = fetch::raw_sources(&config.sources);
    println!("Fetching {} source file(s) into {} ...", sources.len(), config.paths.raw_dir.display());

    let outcomes = fetch::fetch_all(&http, &sources, &config.paths.raw_dir, force).await?;
    let mut downloaded = 0;
    for outcome in &outcomes {
        match outcome {
            FetchOutcome::Downloaded { path, bytes, .. } => {
                downloaded += 1;
                println!("  [done] {} ({} bytes)", path.display(), bytes);
            }
            FetchOutcome::Skipped { path, .. } => println!("  [skip] {} (already exists)", path.display()),
            FetchOutcome::Forbidden { name } => println!("  [warn] {}: 403 forbidden, skipped", name),
        }
    }
    info!("Fetch finished: {} downloaded of {}", downloaded, outcomes.len());
    Ok(())
}

fn run_transform(config: &Config) -> anyhow::Result<()> {
    let result = Pipeline::run(config).context("transform failed")?;
    println!("\nPipeline results:");
    println!("   Raw files: {}", result.raw_files);
    println!("   Raw rows: {}", result.raw_rows);
    println!("   Malformed rows skipped: {}", result.malformed_rows);
    println!("   Dropped (bad date_requested): {}", result.dropped_rows);
    println!("   Canonical rows: {}", result.canonical_rows);
    println!("   Views written: {}", result.views.len());
    Ok(())
}

const EXIT_CLEAN: u8 = 0;
const EXIT_ISSUES: u8 = 1;
const EXIT_MISSING_CANONICAL: u8 = 2;
const EXIT_ERROR: u8 = 3;

/// Exit 0 when clean, 1 with issues, 2 when there is nothing to validate
fn run_validate(config: &Config, json: bool) -> anyhow::Result<u8> {
    let validator = Validator::from_config(config);
    let report = match validator.validate_file(&config.paths.canonical_path()) {
        Ok(report) => report,
        Err(e @ PipelineError::MissingCanonical(_)) => {
            error!("{}", e);
            eprintln!("ERROR: {}", e);
            return Ok(EXIT_MISSING_CANONICAL);
        }
        Err(e) => return Err(e).context("validation failed"),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report);
    }
    if report.passed() {
        Ok(EXIT_CLEAN)
    } else {
        warn!("{} data-quality issue(s) found", report.issues);
        Ok(EXIT_ISSUES)
    }
}

fn run_query(config: &Config, args: &QueryArgs) -> anyhow::Result<()> {
    let dir = &config.paths.aggregated_dir;
    let filter = args.filter();
    let output = match args.view.as_str() {
        "overview" => serde_json::to_value(query::overview(dir, &filter)?)?,
        "filters" => serde_json::to_value(query::filter_options(dir)?)?,
        "districts" => serde_json::to_value(query::district_rollup(dir, &filter)?)?,
        view => {
            let mut rows = query::load_view(dir, view, &filter)?.to_json_rows();
            if let Some(limit) = args.limit {
                rows.truncate(limit);
            }
            serde_json::Value::Array(rows)
        }
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<u8> {
    let config = load_config(cli.config.as_deref(), cli.data_dir.as_deref())?;

    match cli.command {
        Commands::Fetch { force } => {
            run_fetch(&config, force).await?;
            Ok(EXIT_CLEAN)
        }
        Commands::Transform => {
            run_transform(&config)?;
            Ok(EXIT_CLEAN)
        }
        Commands::Validate { json } => run_validate(&config, json),
        Commands::Run { fetch, force } => {
            if fetch {
                run_fetch(&config, force).await?;
            }
            run_transform(&config)?;
            println!();
            run_validate(&config, false)
        }
        Commands::Query(args) => {
            run_query(&config, &args)?;
            Ok(EXIT_CLEAN)
        }
    }
}

/// Runtime failures get their own code so they never read as data-quality issues
fn exit_code(outcome: anyhow::Result<u8>) -> u8 {
    match outcome {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("ERROR: {:#}", e);
            EXIT_ERROR
        }
    }
}

fn emit_metrics(print: bool) {
    if let Err(e) = metrics::write_snapshot(&Path::new(logging::LOG_DIR).join(METRICS_SNAPSHOT_FILE)) {
        warn!("Failed to write metrics snapshot: {}", e);
    }
    if print {
        if let Some(text) = metrics::render() {
            println!("{}", text);
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    logging::init_logging();
    metrics::init_metrics();

    let cli = Cli::parse();
    let print_metrics = cli.metrics;
    let code = exit_code(run(cli).await);
    emit_metrics(print_metrics);
    ExitCode::from(code)
}
