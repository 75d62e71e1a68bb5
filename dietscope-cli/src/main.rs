//! dietscope CLI - calibrated dietary emissions, gap and sensitivity analysis

#![deny(warnings)]

// Global invariants enforced:
// - Deterministic output ordering
// - Logs go to stderr; stdout carries only the rendered report

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use dietscope_core::config::{self, ResolvedConfig};
use dietscope_core::report;
use dietscope_core::{BatchOptions, Direction, Metric, ReferenceDataStore};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dietscope")]
#[command(about = "Calibrated multi-scope dietary emissions model (Scope 1+2 / Scope 3)")]
#[command(version)]
struct Cli {
    /// Enable debug logging on stderr (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CommonArgs {
    /// Reference data file (factors, diets, neighborhoods)
    #[arg(long, default_value = "data/amsterdam.json")]
    reference: PathBuf,

    /// Path to config file (default: auto-discover from current directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "text")]
    format: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Full batch: calibrate, all diets, goal deltas, neighborhoods, sensitivity
    Run {
        #[command(flatten)]
        common: CommonArgs,

        /// Metric used for goal deltas
        #[arg(long, default_value = "co2")]
        metric: Metric,

        /// Direction of the cumulative waterfall
        #[arg(long, default_value = "decrease")]
        waterfall_direction: WaterfallDirection,
    },
    /// Per-category emissions of one diet
    Emissions {
        #[command(flatten)]
        common: CommonArgs,

        /// Diet name as it appears in the reference data
        #[arg(long)]
        diet: String,
    },
    /// Category deltas between a baseline and a goal diet
    Delta {
        #[command(flatten)]
        common: CommonArgs,

        /// Goal diet
        #[arg(long)]
        goal: String,

        /// Baseline diet (default: configured baseline)
        #[arg(long)]
        baseline: Option<String>,

        /// scope12, scope3, co2, land, water or mass
        #[arg(long, default_value = "co2")]
        metric: Metric,
    },
    /// Tornado ranking and waterfall of the baseline total
    Sensitivity {
        #[command(flatten)]
        common: CommonArgs,

        #[arg(long, default_value = "decrease")]
        waterfall_direction: WaterfallDirection,
    },
    /// Calibrate Scope 1+2 fractions and print the report
    Calibrate {
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Validate or show configuration
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate a config file without running the model
    Validate {
        /// Path to config file (default: auto-discover from current directory)
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Show the resolved configuration (merged defaults + config file)
    Show {
        /// Path to config file (default: auto-discover from current directory)
        #[arg(long)]
        path: Option<PathBuf>,

        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },
}

#[derive(Clone, Copy, PartialEq, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum WaterfallDirection {
    Increase,
    Decrease,
}

impl From<WaterfallDirection> for Direction {
    fn from(d: WaterfallDirection) -> Self {
        match d {
            WaterfallDirection::Increase => Direction::Increase,
            WaterfallDirection::Decrease => Direction::Decrease,
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Load reference data and resolve config for a model subcommand
fn load_inputs(common: &CommonArgs) -> anyhow::Result<(ReferenceDataStore, ResolvedConfig)> {
    let project_root = std::env::current_dir()?;
    let resolved = config::load_and_resolve(&project_root, common.config.as_deref())
        .context("failed to load configuration")?;
    let store = ReferenceDataStore::load(&common.reference)?;
    tracing::debug!(
        reference = %common.reference.display(),
        diets = store.diet_names().len(),
        neighborhoods = store.neighborhoods().len(),
        "loaded reference data"
    );
    Ok((store, resolved))
}

fn emit(format: OutputFormat, text: String, json: String) {
    match format {
        OutputFormat::Text => print!("{}", text),
        OutputFormat::Json => println!("{}", json),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run {
            common,
            metric,
            waterfall_direction,
        } => {
            let (store, resolved) = load_inputs(&common)?;
            let options = BatchOptions {
                metric,
                waterfall_direction: waterfall_direction.into(),
            };
            let outcome = dietscope_core::run_batch(&store, &resolved, options)
                .context("batch run aborted")?;
            emit(
                common.format,
                report::render_batch_text(&outcome),
                report::render_json(&outcome),
            );
            if !outcome.summary.is_success() {
                std::process::exit(1);
            }
        }
        Commands::Emissions { common, diet } => {
            let (store, resolved) = load_inputs(&common)?;
            let em = dietscope_core::diet_emissions(&store, &resolved, &diet)?;
            emit(
                common.format,
                report::render_emissions_text(&em),
                report::render_json(&em),
            );
        }
        Commands::Delta {
            common,
            goal,
            baseline,
            metric,
        } => {
            let (store, resolved) = load_inputs(&common)?;
            let baseline = baseline.unwrap_or_else(|| resolved.baseline_diet.clone());
            let delta = dietscope_core::diet_delta(&store, &resolved, &baseline, &goal, metric)?;
            emit(
                common.format,
                report::render_delta_text(&delta),
                report::render_json(&delta),
            );
        }
        Commands::Sensitivity {
            common,
            waterfall_direction,
        } => {
            let (store, resolved) = load_inputs(&common)?;
            let direction = waterfall_direction.into();
            let analysis = dietscope_core::baseline_sensitivity(&store, &resolved, direction)?;
            emit(
                common.format,
                report::render_sensitivity_text(&analysis),
                report::render_json(&analysis),
            );
        }
        Commands::Calibrate { common } => {
            let (store, resolved) = load_inputs(&common)?;
            let calibration = dietscope_core::calibrated_factors(&store, &resolved)?;
            emit(
                common.format,
                report::render_calibration_text(&calibration.report),
                report::render_json(&calibration.report),
            );
        }
        Commands::Config { action } => match action {
            ConfigAction::Validate { path } => {
                let project_root = std::env::current_dir()?;
                match config::load_and_resolve(&project_root, path.as_deref()) {
                    Ok(resolved) => {
                        if let Some(ref p) = resolved.config_path {
                            println!("Config valid: {}", p.display());
                        } else {
                            println!("No config file found. Using defaults.");
                        }
                    }
                    Err(e) => {
                        eprintln!("Config validation failed: {:#}", e);
                        std::process::exit(1);
                    }
                }
            }
            ConfigAction::Show { path, format } => {
                let project_root = std::env::current_dir()?;
                let resolved = config::load_and_resolve(&project_root, path.as_deref())
                    .context("failed to load configuration")?;
                emit(format, render_config_text(&resolved), report::render_json(&resolved));
            }
        },
    }

    Ok(())
}

fn render_config_text(resolved: &ResolvedConfig) -> String {
    let mut out = String::from("Configuration:\n");
    out.push_str(&format!("  Source: {}\n", source_label(resolved.config_path.as_deref())));
    out.push_str(&format!("\nPopulation: {}\n", resolved.population));
    out.push_str(&format!("Baseline diet: {}\n", resolved.baseline_diet));
    out.push_str(&format!("Goal diets: {}\n", resolved.goal_diets.join(", ")));
    out.push_str("\nCalibration:\n");
    out.push_str(&format!(
        "  target: {} t ({})\n",
        resolved.target.value_tonnes, resolved.target.version
    ));
    out.push_str(&format!("  tolerance: {}\n", resolved.tolerance));
    out.push_str("\nScope add-ons:\n");
    out.push_str(&format!("  waste_rate: {}\n", resolved.add_ons.waste_rate));
    out.push_str(&format!("  retail_rate: {}\n", resolved.add_ons.retail_rate));
    out.push_str("\nHeterogeneity:\n");
    out.push_str(&format!(
        "  national_avg_income: {}\n",
        resolved.heterogeneity.national_avg_income
    ));
    out.push_str(&format!("  c1: {}\n", resolved.heterogeneity.c1));
    out.push_str(&format!("  c2: {}\n", resolved.heterogeneity.c2));
    out.push_str(&format!(
        "  education_threshold: {}\n",
        resolved.heterogeneity.education_threshold
    ));
    out.push_str("\nSensitivity (waterfall order):\n");
    for p in &resolved.sensitivity {
        out.push_str(&format!("  {}: +/-{}%\n", p.name, p.pct * 100.0));
    }
    out.push_str(&format!("\nOverrides: {}\n", resolved.overrides.len()));
    for rule in &resolved.overrides {
        out.push_str(&format!(
            "  {} {:?}: {}\n",
            rule.item, rule.action, rule.justification
        ));
    }
    out
}

fn source_label(path: Option<&Path>) -> String {
    match path {
        Some(p) => p.display().to_string(),
        None => "defaults (no config file found)".to_string(),
    }
}
