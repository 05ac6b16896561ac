//! gridsweep CLI
//!
//! Run a grid-partitioned scraping campaign with checkpointed resume.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gridsweep::{build_runtime, campaign_status, run_campaign, CampaignError, Config, WorkerBackend};

#[derive(Parser)]
#[command(name = "gridsweep")]
#[command(about = "Checkpointed batch executor for grid scraping campaigns", long_about = None)]
struct Cli {
    /// Path to configuration file (YAML or JSON); defaults apply when omitted
    #[arg(short, long, global = true, env = "GRIDSWEEP_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Command-line overrides applied on top of the config file.
#[derive(clap::Args, Debug, Default)]
struct Overrides {
    /// Coordinates file, one work unit per line
    #[arg(long, global = true, env = "GRIDSWEEP_COORDS")]
    coords: Option<PathBuf>,

    /// Master CSV output
    #[arg(long, global = true, env = "GRIDSWEEP_OUTPUT")]
    output: Option<PathBuf>,

    /// Progress log
    #[arg(long, global = true, env = "GRIDSWEEP_PROGRESS")]
    progress: Option<PathBuf>,

    /// Worker image or executable
    #[arg(long, global = true, env = "GRIDSWEEP_WORKER")]
    worker: Option<String>,

    /// Worker backend
    #[arg(long, global = true, value_enum, env = "GRIDSWEEP_BACKEND")]
    backend: Option<BackendArg>,

    /// Seconds to wait between units
    #[arg(long, global = true, env = "GRIDSWEEP_DELAY")]
    delay: Option<u64>,

    /// Scroll depth (browser mode)
    #[arg(long, global = true, env = "GRIDSWEEP_DEPTH")]
    depth: Option<u32>,

    /// Attempts per unit, including the first
    #[arg(long, global = true, env = "GRIDSWEEP_MAX_RETRIES")]
    max_retries: Option<u32>,

    /// Use fast mode (radius + short inactivity timeout)
    #[arg(long, global = true, env = "GRIDSWEEP_FAST")]
    fast: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum BackendArg {
    Docker,
    Binary,
}

impl From<BackendArg> for WorkerBackend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Docker => WorkerBackend::Docker,
            BackendArg::Binary => WorkerBackend::Binary,
        }
    }
}

impl Overrides {
    fn apply(&self, config: &mut Config) {
        if let Some(p) = &self.coords {
            config.input.coordinates_path = p.clone();
        }
        if let Some(p) = &self.output {
            config.output.output_path = p.clone();
        }
        if let Some(p) = &self.progress {
            config.output.progress_path = p.clone();
        }
        if let Some(w) = &self.worker {
            config.worker.reference = w.clone();
        }
        if let Some(b) = self.backend {
            config.worker.backend = b.into();
        }
        if let Some(d) = self.delay {
            config.processing.delay_secs = d;
        }
        if let Some(d) = self.depth {
            config.worker.depth = d;
        }
        if let Some(r) = self.max_retries {
            config.processing.retry.max_retries = r;
        }
        if self.fast {
            config.worker.fast_mode = true;
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the campaign (default if no command specified)
    Run,

    /// Show progress and a time estimate without running anything
    Status,

    /// Validate configuration
    Validate,

    /// Generate a sample configuration file
    GenerateConfig {
        /// Output path for configuration file
        #[arg(short, long, default_value = "gridsweep.yaml")]
        output: PathBuf,
    },
}

fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        None | Some(Commands::Run) => run_command(cli.config, &cli.overrides),
        Some(Commands::Status) => status_command(cli.config, &cli.overrides),
        Some(Commands::Validate) => validate_command(cli.config, &cli.overrides),
        Some(Commands::GenerateConfig { output }) => generate_config_command(output),
    };

    if let Err(e) = result {
        let code = e
            .downcast_ref::<CampaignError>()
            .map_or(1, CampaignError::exit_code);
        tracing::error!("{:#}", e);
        std::process::exit(code);
    }
}

fn load_config(config_path: Option<PathBuf>, overrides: &Overrides) -> Result<Config> {
    let mut config = match config_path {
        Some(path) => Config::from_file(&path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::default(),
    };
    overrides.apply(&mut config);
    Ok(config)
}

fn run_command(config_path: Option<PathBuf>, overrides: &Overrides) -> Result<()> {
    let config = load_config(config_path, overrides)?;

    let runtime = build_runtime()?;
    let summary = runtime.block_on(run_campaign(config))?;

    println!("\nDone. {}", summary);
    Ok(())
}

fn status_command(config_path: Option<PathBuf>, overrides: &Overrides) -> Result<()> {
    let config = load_config(config_path, overrides)?;
    config.validate()?;

    let status = campaign_status(&config)?;

    println!("\n=== Campaign Status ===");
    println!("Coordinates: {}", config.input.coordinates_path.display());
    println!("Progress log: {}", config.output.progress_path.display());
    println!("{}", status);
    println!("=======================\n");

    Ok(())
}

fn validate_command(config_path: Option<PathBuf>, overrides: &Overrides) -> Result<()> {
    let config = load_config(config_path, overrides)?;
    config.validate()?;
    println!("Configuration is valid");
    Ok(())
}

fn generate_config_command(output: PathBuf) -> Result<()> {
    // Generate a commented YAML config
    let yaml = r#"# gridsweep campaign configuration

# === INPUT ===
input:
  # One work unit per line: "lat,lng" or "lat,lng,radius_meters"
  coordinates_path: "coordinates.txt"

  # Search query handed to the scraper for every unit
  query: "restaurants"

# === OUTPUT ===
output:
  # Master CSV; the header is written once, rows are appended per unit
  output_path: "results.csv"

  # Append-only log of completed units (delete it to start over)
  progress_path: "progress.log"

  # Units that exhausted their retries are also listed here (optional)
  # failed_path: "failed.log"

  # Scratch directory for the query file and per-unit artifact
  work_dir: ".gridsweep"

  # Worker stdout/stderr (default: <work_dir>/worker-errors.log)
  # error_log_path: "worker-errors.log"

# === WORKER ===
worker:
  # docker: reference is an image run with `docker run --rm`
  # binary: reference is an executable path or a name on PATH
  backend: docker
  reference: "gosom/google-maps-scraper"
  docker_program: "docker"

  # Fast mode searches a radius around each point with a short inactivity timeout.
  # Browser mode scrolls results to `depth`.
  fast_mode: false
  depth: 20
  radius_meters: 150
  fast_inactivity_timeout: "1m"
  browser_inactivity_timeout: "3m"

# === PROCESSING ===
processing:
  # Seconds to wait between units
  delay_secs: 1

  # Kill a worker that runs longer than this many seconds (unset = no limit)
  # unit_timeout_secs: 600

  # Print the run summary block at the end
  enable_metrics: true

  # Save run metrics as JSON (optional)
  # metrics_output_path: "metrics.json"

  retry:
    # Attempts per unit, including the first
    max_retries: 3
    # Seconds between attempts
    backoff_secs: 2
"#;

    std::fs::write(&output, yaml)?;
    println!("Generated sample configuration at: {}", output.display());

    Ok(())
}
