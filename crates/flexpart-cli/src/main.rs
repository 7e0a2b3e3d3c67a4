//! FLEXPART runner CLI
//!
//! The `flexpart` command runs FLEXPART dispersion simulations through Docker.
//!
//! ## Commands
//!
//! - `run`: ERA5 extraction, control files, model run and output validation
//! - `available`: (re)generate the `AVAILABLE` index for a product directory
//! - `validate`: check a FLEXPART output directory

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::Level;

use flexpart_core::config::{DEFAULT_FLEXPART_IMAGE, DEFAULT_FLEX_EXTRACT_IMAGE};
use flexpart_core::{
    create_available_file, init_tracing, parse_cli_datetime, CredPaths, DockerRunner,
    FlexpartPipeline, LogFormat, PathsConfig, ReleaseGeometry, ResultValidator, RuntimeConfig,
    SimulationConfig, SimulationNumerics, SpeciesDefinition, TimeWindow, TracingObserver,
    DEFAULT_PRODUCT_PREFIX,
};

#[derive(Parser)]
#[command(name = "flexpart")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run FLEXPART simulations via Docker", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON log lines and a JSON run summary
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single FLEXPART simulation end-to-end
    Run(RunArgs),

    /// Generate the AVAILABLE index for a directory of meteorological products
    Available {
        /// Directory holding the products
        directory: PathBuf,

        /// Window start (UTC, YYYY-MM-DD[THH:MM[:SS]])
        #[arg(long, value_parser = parse_datetime_arg)]
        start: NaiveDateTime,

        /// Window end (UTC, YYYY-MM-DD[THH:MM[:SS]])
        #[arg(long, value_parser = parse_datetime_arg)]
        end: NaiveDateTime,

        /// Product file name prefix
        #[arg(long, default_value = DEFAULT_PRODUCT_PREFIX)]
        prefix: String,
    },

    /// Check that a FLEXPART output directory holds the expected files
    Validate {
        /// FLEXPART output directory
        output_dir: PathBuf,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Working directory to store inputs/outputs
    #[arg(required_unless_present = "config")]
    workspace: Option<PathBuf>,

    /// JSON run description; replaces every simulation and container flag
    #[arg(
        long,
        conflicts_with_all = [
            "start",
            "end",
            "latitude",
            "longitude",
            "release_bottom",
            "release_top",
            "release_duration_hours",
            "release_mass",
            "particles",
            "species",
            "molecular_weight",
            "cdsapirc",
            "ecmwfapirc",
            "flexpart_image",
            "flex_extract_image",
            "docker_timeout",
            "era5",
        ]
    )]
    config: Option<PathBuf>,

    /// Simulation start (UTC, YYYY-MM-DDTHH:MM)
    #[arg(long, value_parser = parse_datetime_arg, required_unless_present = "config")]
    start: Option<NaiveDateTime>,

    /// Simulation end (UTC, YYYY-MM-DDTHH:MM)
    #[arg(long, value_parser = parse_datetime_arg, required_unless_present = "config")]
    end: Option<NaiveDateTime>,

    /// Release latitude
    #[arg(long, allow_negative_numbers = true, required_unless_present = "config")]
    latitude: Option<f64>,

    /// Release longitude
    #[arg(long, allow_negative_numbers = true, required_unless_present = "config")]
    longitude: Option<f64>,

    /// Release bottom height [m]
    #[arg(long, default_value_t = 0.0)]
    release_bottom: f64,

    /// Release top height [m]
    #[arg(long, default_value_t = 500.0)]
    release_top: f64,

    /// Release duration [h]
    #[arg(long, default_value_t = 6.0)]
    release_duration_hours: f64,

    /// Total release mass [kg]
    #[arg(long, default_value_t = 1.0)]
    release_mass: f64,

    /// Number of particles
    #[arg(long, default_value_t = 20_000)]
    particles: u32,

    /// Species name
    #[arg(long, default_value = "DUST")]
    species: String,

    /// Species molecular weight
    #[arg(long, default_value_t = 100.0)]
    molecular_weight: f64,

    /// Path to .cdsapirc for ERA5
    #[arg(long)]
    cdsapirc: Option<PathBuf>,

    /// Path to .ecmwfapirc
    #[arg(long)]
    ecmwfapirc: Option<PathBuf>,

    /// FLEXPART image
    #[arg(long, default_value = DEFAULT_FLEXPART_IMAGE)]
    flexpart_image: String,

    /// flex_extract image
    #[arg(long, default_value = DEFAULT_FLEX_EXTRACT_IMAGE)]
    flex_extract_image: String,

    /// Docker command timeout [s]
    #[arg(long, default_value_t = 3600)]
    docker_timeout: u64,

    /// Skip the ERA5 download and use existing meteorological inputs
    #[arg(long = "no-era5", action = ArgAction::SetFalse)]
    era5: bool,
}

fn parse_datetime_arg(raw: &str) -> std::result::Result<NaiveDateTime, String> {
    parse_cli_datetime(raw).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let format = if cli.json {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    init_tracing(format, level);

    match cli.command {
        Commands::Run(args) => cmd_run(args, cli.json).await,
        Commands::Available {
            directory,
            start,
            end,
            prefix,
        } => cmd_available(&directory, start, end, &prefix),
        Commands::Validate { output_dir } => cmd_validate(&output_dir),
    }
}

async fn cmd_run(args: RunArgs, json: bool) -> Result<()> {
    let runtime_cfg = runtime_config_from_args(args)?;
    let docker = Arc::new(DockerRunner::new(runtime_cfg.docker_timeout_sec));

    let result = FlexpartPipeline::run(docker, &runtime_cfg)
        .await
        .context("FLEXPART run failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!(
        "FLEXPART run complete. Results in {}",
        result.output_dir.display()
    );
    if let Some(entries) = result.manifest_entries {
        println!("  AVAILABLE entries: {}", entries);
    }
    println!("  Gridded outputs:   {}", result.validation.grids.len());
    println!("  Run ID:            {}", result.run_id);
    Ok(())
}

fn runtime_config_from_args(args: RunArgs) -> Result<RuntimeConfig> {
    if let Some(path) = &args.config {
        let mut cfg = RuntimeConfig::from_json_file(path)
            .with_context(|| format!("Failed to load run config {:?}", path))?;
        if let Some(workspace) = args.workspace {
            cfg.paths = PathsConfig::new(absolute(&workspace)?);
        }
        return Ok(cfg);
    }

    // clap enforces these when --config is absent.
    let (Some(workspace), Some(start), Some(end), Some(latitude), Some(longitude)) = (
        args.workspace,
        args.start,
        args.end,
        args.latitude,
        args.longitude,
    ) else {
        anyhow::bail!("workspace, --start, --end, --latitude and --longitude are required");
    };

    let window = TimeWindow::new(start, end)?;
    let release = ReleaseGeometry {
        latitude,
        longitude,
        height_bottom_m: args.release_bottom,
        height_top_m: args.release_top,
        duration_hours: args.release_duration_hours,
    };
    let species = SpeciesDefinition::new(args.species.to_uppercase(), args.molecular_weight);

    let mut simulation = SimulationConfig::new(window, release, species);
    simulation.numerics = SimulationNumerics {
        particles: args.particles,
        ..SimulationNumerics::default()
    };
    simulation.release_mass_kg = args.release_mass;
    simulation.use_era5 = args.era5;

    let mut cfg = RuntimeConfig::new(
        simulation,
        PathsConfig::new(absolute(&workspace)?),
        CredPaths::new(args.cdsapirc, args.ecmwfapirc),
    );
    cfg.flexpart_image = args.flexpart_image;
    cfg.flex_extract_image = args.flex_extract_image;
    cfg.docker_timeout_sec = args.docker_timeout;
    cfg.validate()?;
    Ok(cfg)
}

fn cmd_available(
    directory: &Path,
    start: NaiveDateTime,
    end: NaiveDateTime,
    prefix: &str,
) -> Result<()> {
    let window = TimeWindow::new(start, end)?;
    let count = create_available_file(directory, prefix, &window, &TracingObserver)
        .with_context(|| format!("Failed to build AVAILABLE in {:?}", directory))?;
    println!(
        "Generated {} with {} entries",
        directory.join(flexpart_core::AVAILABLE_FILE_NAME).display(),
        count
    );
    Ok(())
}

fn cmd_validate(output_dir: &Path) -> Result<()> {
    let report = ResultValidator
        .validate(output_dir)
        .context("FLEXPART output validation failed")?;
    println!("Validation passed: {}", report.required.join(", "));
    println!("  Gridded outputs: {}", report.grids.len());
    Ok(())
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("Failed to resolve {:?}", path))
}
