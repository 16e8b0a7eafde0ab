#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{Args, CommandFactory, Parser, Subcommand};
use horizon::artifacts::FittedArtifacts;
use horizon::config::{CurvePolicy, EstimationConfig};
use horizon::estimate::{Estimation, EstimationError, Estimator};
use horizon::report::{render_card, user_message, write_curve_tsv};
use horizon::types::{RawClinicalInput, TumorStage};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(
    name = "horizon",
    about = "Median survival estimation from clinical covariates",
    long_about = "Estimates median survival time and a survival-probability curve for one patient \
                 from age, weight, height and tumor stage, using a pre-fitted Weibull AFT model."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate survival for one patient
    #[command(about = "Estimate median survival and the survival curve for one patient")]
    Estimate(EstimateArgs),

    /// Display version information
    #[command(about = "Display version information")]
    Version,
}

#[derive(Args)]
struct EstimateArgs {
    /// Age of the patient in completed years (38-90)
    #[arg(long, default_value = "60")]
    age: u32,

    /// Weight in kilograms (30.0-200.0)
    #[arg(long, default_value = "70.0")]
    weight: f64,

    /// Height in meters (1.00-2.50)
    #[arg(long, default_value = "1.70")]
    height: f64,

    /// AJCC tumor stage: I, II, III or IV (1-4 also accepted)
    #[arg(long, default_value = "I")]
    stage: TumorStage,

    /// Directory holding weibull_aft_model.toml, standard_scaler.toml and tumor_ordinal_encoder.toml
    #[arg(long, value_name = "DIR", default_value = ".")]
    artifacts_dir: PathBuf,

    /// Optional TOML file with threshold, grid and curve-policy settings
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Survival probability whose crossing time is reported
    #[arg(long, value_name = "P")]
    threshold: Option<f64>,

    /// First time point of the evaluation grid, in months
    #[arg(long, value_name = "MONTHS")]
    grid_start: Option<f64>,

    /// Last time point of the evaluation grid, in months
    #[arg(long, value_name = "MONTHS")]
    grid_end: Option<f64>,

    /// Number of evaluation points on the grid
    #[arg(long, value_name = "N")]
    grid_samples: Option<usize>,

    /// Do not compute the curve when the median is invalid
    #[arg(long)]
    gate_curve_on_median: bool,

    /// Write the survival curve to this TSV file
    #[arg(long, value_name = "FILE")]
    curve_out: Option<PathBuf>,

    /// Print the result as JSON instead of the text card
    #[arg(long)]
    json: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let Cli { command } = Cli::parse();

    let result = match command {
        Some(Commands::Estimate(args)) => run_estimate(args),
        Some(Commands::Version) => {
            println!("horizon {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        None => Cli::command()
            .print_help()
            .map(|()| println!())
            .map_err(|err| Box::new(err) as Box<dyn std::error::Error>),
    };

    if let Err(e) = result {
        match e.downcast_ref::<EstimationError>() {
            Some(estimation_error) => {
                if matches!(estimation_error, EstimationError::ArtifactMismatch(_)) {
                    log::error!("{estimation_error}");
                } else {
                    log::debug!("{estimation_error}");
                }
                eprintln!("{}", user_message(estimation_error));
            }
            None => eprintln!("Error: {e}"),
        }
        process::exit(1);
    }
}

fn resolve_config(args: &EstimateArgs) -> Result<EstimationConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => EstimationConfig::load(path)?,
        None => EstimationConfig::default(),
    };
    if let Some(threshold) = args.threshold {
        config.crossing_threshold = threshold;
    }
    if let Some(start) = args.grid_start {
        config.grid.start = start;
    }
    if let Some(end) = args.grid_end {
        config.grid.end = end;
    }
    if let Some(samples) = args.grid_samples {
        config.grid.samples = samples;
    }
    if args.gate_curve_on_median {
        config.curve_policy = CurvePolicy::GatedOnMedian;
    }
    config.validate()?;
    Ok(config)
}

fn run_estimate(args: EstimateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = resolve_config(&args)?;
    let raw = RawClinicalInput::new(args.age, args.weight, args.height, args.stage)?;

    let artifacts =
        FittedArtifacts::load_dir(&args.artifacts_dir).map_err(EstimationError::from)?;
    let estimator = Estimator::from_artifacts(&artifacts, config)?;
    let estimation = estimator.estimate(&raw)?;

    if let (Some(path), Some(curve)) = (&args.curve_out, &estimation.curve) {
        write_curve_tsv(curve, BufWriter::new(File::create(path)?))?;
        log::info!("Survival curve written to {}", path.display());
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&json_report(&estimation))?);
    } else if let Ok(result) = &estimation.result {
        print!("{}", render_card(result, estimator.config()));
    }

    match estimation.result {
        Ok(_) => Ok(()),
        Err(err) => Err(Box::new(err)),
    }
}

fn json_report(estimation: &Estimation) -> serde_json::Value {
    let curve = estimation.curve.as_ref().map(|curve| {
        serde_json::json!({
            "months": curve.times().to_vec(),
            "survival": curve.probabilities().to_vec(),
        })
    });
    match &estimation.result {
        Ok(result) => serde_json::json!({
            "features": estimation.features,
            "median_survival_time": result.median_survival_time,
            "median_survival_years": result.median_survival_years(),
            "threshold": result.threshold,
            "threshold_crossing_time": result.threshold_crossing_time,
            "curve": curve,
        }),
        Err(err) => serde_json::json!({
            "features": estimation.features,
            "error": user_message(err),
            "curve": curve,
        }),
    }
}
