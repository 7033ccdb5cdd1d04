//! Gradient boosting leaf encoder CLI
//!
//! Lists leaf labels of a fitted ensemble, fits an encoder on a CSV dataset
//! and expands new data with a saved encoder state.

mod dataset;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dataset::{write_csv, Dataset};
use gbleaf_core::{EncoderConfig, EncoderState, Ensemble, GradientBoostingEncoder};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "gbleaf")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Encode rows as the leaves they reach in a gradient boosted ensemble", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every leaf with its decision-path label
    Leaves {
        /// Ensemble JSON file
        #[arg(short, long)]
        model: PathBuf,

        /// Comma-separated feature names
        #[arg(long, value_delimiter = ',')]
        feature_names: Option<Vec<String>>,

        /// Leaf name prefix
        #[arg(long, default_value = "gbr")]
        prefix: String,
    },

    /// Fit an encoder on a CSV dataset and save its state
    Fit {
        /// Ensemble JSON file
        #[arg(short, long)]
        model: PathBuf,

        /// Input CSV with the ensemble's feature columns
        #[arg(short, long)]
        input: PathBuf,

        /// Where to write the fitted encoder state
        #[arg(short, long)]
        state: PathBuf,

        /// Encoder configuration (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Also write the encoded training matrix
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Encode a CSV dataset with a previously fitted state
    Transform {
        /// Ensemble JSON file
        #[arg(short, long)]
        model: PathBuf,

        /// Fitted encoder state
        #[arg(short, long)]
        state: PathBuf,

        /// Input CSV with the ensemble's feature columns
        #[arg(short, long)]
        input: PathBuf,

        /// Output CSV for the indicator matrix
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    match args.command {
        Command::Leaves {
            model,
            feature_names,
            prefix,
        } => leaves(&model, feature_names, prefix),
        Command::Fit {
            model,
            input,
            state,
            config,
            output,
        } => fit(&model, &input, &state, config.as_deref(), output.as_deref()),
        Command::Transform {
            model,
            state,
            input,
            output,
        } => transform(&model, &state, &input, &output),
    }
}

fn load_ensemble(path: &Path) -> Result<Ensemble> {
    Ensemble::load_json(path).with_context(|| format!("Failed to load ensemble {}", path.display()))
}

fn leaves(model: &Path, feature_names: Option<Vec<String>>, prefix: String) -> Result<()> {
    for line in leaf_lines(model, feature_names, prefix)? {
        println!("{line}");
    }
    Ok(())
}

/// One `name<TAB>label` line per leaf, in column order
fn leaf_lines(
    model: &Path,
    feature_names: Option<Vec<String>>,
    prefix: String,
) -> Result<Vec<String>> {
    let ensemble = load_ensemble(model)?;
    let x = ndarray::Array2::<f64>::zeros((0, ensemble.num_features()));

    let mut config = EncoderConfig::default().with_prefix(prefix);
    config.feature_names = feature_names;

    let mut encoder = GradientBoostingEncoder::new(ensemble, config)?;
    encoder.fit(x.view())?;

    let labels = encoder.class_maps()?;
    Ok(encoder
        .classes()?
        .iter()
        .map(|name| format!("{}\t{}", name, labels[name]))
        .collect())
}

fn fit(
    model: &Path,
    input: &Path,
    state: &Path,
    config: Option<&Path>,
    output: Option<&Path>,
) -> Result<()> {
    let ensemble = load_ensemble(model)?;

    let mut config = match config {
        Some(path) => EncoderConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EncoderConfig::default(),
    };

    info!("Loading dataset from: {}", input.display());
    let dataset = Dataset::from_csv(input)?;
    info!(
        "Loaded {} samples with {} features",
        dataset.len(),
        dataset.feature_count()
    );

    if config.feature_names.is_none() {
        config.feature_names = dataset.header.clone();
    }

    let mut encoder = GradientBoostingEncoder::new(ensemble, config)?;
    let encoded = encoder.fit_transform(dataset.features.view())?;
    info!(
        "Fitted {} leaves into {} indicator columns",
        encoder.classes()?.len(),
        encoded.ncols()
    );

    encoder
        .save_state(state)
        .with_context(|| format!("Failed to write state {}", state.display()))?;

    if let Some(output) = output {
        write_csv(output, &encoder.output_feature_names()?, &encoded)?;
        info!("Encoded matrix written to: {}", output.display());
    }

    Ok(())
}

fn transform(model: &Path, state: &Path, input: &Path, output: &Path) -> Result<()> {
    let ensemble = load_ensemble(model)?;
    let state = EncoderState::load_json(state)
        .with_context(|| format!("Failed to load state {}", state.display()))?;
    let encoder = GradientBoostingEncoder::from_state(ensemble, state)?;

    let dataset = Dataset::from_csv(input)?;
    let encoded = encoder.transform(dataset.features.view())?;

    write_csv(output, &encoder.output_feature_names()?, &encoded)?;
    info!(
        "Encoded {} rows into {} columns: {}",
        encoded.nrows(),
        encoded.ncols(),
        output.display()
    );
    Ok(())
}
