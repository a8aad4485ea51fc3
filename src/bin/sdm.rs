//! CLI for training and evaluating SDM landmark models.
//!
//! Usage:
//!   sdm train --config sdm.toml                 # Train with a config file
//!   sdm train --images helen/img --annotations helen/ann -o model.bin
//!   sdm evaluate --model model.bin --images ... --annotations ... --json

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use sdm_face::{evaluate, train, HelenDataset, SdmModel, SeetaFaceDetector, TrainingConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sdm")]
#[command(author, version, about = "Supervised Descent Method landmark training", long_about = None)]
struct Cli {
    /// Show debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train a model on an annotated dataset
    Train(TrainArgs),
    /// Report the normalised landmark error of a model on a dataset
    Evaluate(EvaluateArgs),
}

#[derive(Args, Debug)]
struct DatasetArgs {
    /// TOML training configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Image directory (overrides config)
    #[arg(long)]
    images: Option<PathBuf>,

    /// Annotation directory (overrides config)
    #[arg(long)]
    annotations: Option<PathBuf>,

    /// Face detector model path (overrides config)
    #[arg(long)]
    detector: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct TrainArgs {
    #[command(flatten)]
    dataset: DatasetArgs,

    /// Output model file (overrides config)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// RNG seed for perturbations (overrides config)
    #[arg(long)]
    seed: Option<u64>,

    /// Write the training report as JSON to this file
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct EvaluateArgs {
    #[command(flatten)]
    dataset: DatasetArgs,

    /// Trained model file
    #[arg(short, long)]
    model: PathBuf,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli.command) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Train(args) => run_train(args),
        Command::Evaluate(args) => run_evaluate(args),
    }
}

fn load_config(args: &DatasetArgs) -> Result<TrainingConfig> {
    let mut config = match &args.config {
        Some(path) => TrainingConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => TrainingConfig::default(),
    };
    if let Some(images) = &args.images {
        config.image_dir = images.clone();
    }
    if let Some(annotations) = &args.annotations {
        config.annotation_dir = annotations.clone();
    }
    if let Some(detector) = &args.detector {
        config.detector.model_path = detector.clone();
    }
    Ok(config)
}

fn open_inputs(config: &TrainingConfig) -> Result<(HelenDataset, SeetaFaceDetector)> {
    let dataset = HelenDataset::open(&config.image_dir, &config.annotation_dir).with_context(|| {
        format!(
            "opening dataset {} / {}",
            config.image_dir.display(),
            config.annotation_dir.display()
        )
    })?;
    let detector = SeetaFaceDetector::new(&config.detector).context("loading face detector")?;
    Ok((dataset, detector))
}

fn run_train(args: TrainArgs) -> Result<()> {
    let mut config = load_config(&args.dataset)?;
    if let Some(output) = args.output {
        config.output = output;
    }
    if args.seed.is_some() {
        config.perturbation.seed = args.seed;
    }
    config.validate()?;

    let (dataset, mut detector) = open_inputs(&config)?;
    let outcome = train(&dataset, &mut detector, &config).context("training failed")?;

    outcome
        .model
        .save(&config.output)
        .with_context(|| format!("saving model to {}", config.output.display()))?;
    tracing::info!(path = %config.output.display(), "model saved");

    if let Some(path) = args.report {
        std::fs::write(&path, serde_json::to_string_pretty(&outcome.report)?)
            .with_context(|| format!("writing report {}", path.display()))?;
    }
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    let config = load_config(&args.dataset)?;
    let model = SdmModel::load(&args.model)
        .with_context(|| format!("loading model {}", args.model.display()))?;
    let (dataset, mut detector) = open_inputs(&config)?;

    let report = evaluate(&model, &dataset, &mut detector, &config.landmarks.key_landmarks)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Images: {} ({} skipped)", report.total_images, report.skipped);
        for image in &report.images {
            println!("  {}: {:.4}", image.image.display(), image.normalised_error);
        }
        println!("Mean normalised error: {:.4}", report.mean_normalised_error);
    }
    Ok(())
}
