use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use netequity_io::{DatasetReader, ExperimentName, PredictionEntry, ReportWriter, synthetic_dataset};
use netequity_model::{
    Breakdown, Feature, FeatureDataset, MissingFeaturePolicy, PredictOptions, Preset, Scenario,
    SimulationRow, TrainedModel, TrainingConfig, compare, importances, predict, resolve_scenario,
    simulate, train,
};
use netequity_rf::{MaxFeatures, OobMode, SplitCriterion, SplitMethod};

#[derive(Parser)]
#[command(name = "netequity")]
#[command(about = "Predict web presence from country-level development indicators")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// RNG seed for the held-out split, the forest and synthetic data
    #[arg(long, default_value_t = 42, global = true)]
    seed: u64,

    /// Enable verbose (debug-level) logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Number of threads for parallel computation (defaults to all cores)
    #[arg(long, global = true)]
    threads: Option<usize>,
}

/// Where the records come from.
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
struct DataSource {
    /// Path to the input CSV file
    #[arg(long)]
    data: Option<PathBuf>,

    /// Generate this many synthetic records instead of reading a CSV
    #[arg(long)]
    synthetic: Option<usize>,
}

/// Forest and evaluation hyperparameters.
#[derive(Args, Debug, Clone)]
struct TrainingArgs {
    /// Number of trees in the Random Forest
    #[arg(long, default_value_t = 100)]
    n_trees: usize,

    /// Maximum tree depth (0 = unlimited)
    #[arg(long, default_value_t = 10)]
    max_depth: usize,

    /// Minimum samples required to split an internal node
    #[arg(long, default_value_t = 5)]
    min_samples_split: usize,

    /// Minimum samples required in each leaf
    #[arg(long, default_value_t = 1)]
    min_samples_leaf: usize,

    /// Features tried per split: "all", "sqrt", "log2", a fraction in (0, 1] or a count
    #[arg(long, default_value = "all")]
    max_features: String,

    /// Split criterion: "squared-error" or "poisson"
    #[arg(long, default_value = "squared-error")]
    criterion: String,

    /// Split-finding strategy: "exact" or "extra-trees"
    #[arg(long, default_value = "exact")]
    split_method: String,

    /// Fraction of records held out for evaluation
    #[arg(long, default_value_t = 0.2)]
    test_fraction: f64,

    /// Also compute out-of-bag R² on the training records
    #[arg(long, default_value_t = false)]
    oob: bool,
}

/// Optional report destination.
#[derive(Args, Debug, Clone)]
struct ReportArgs {
    /// Experiment name for report files (must match [a-zA-Z0-9_-]+)
    #[arg(long)]
    experiment: Option<String>,

    /// Output directory for report files
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,
}

#[derive(Subcommand)]
enum Command {
    /// Train a model, evaluate it on held-out records and save the artifact
    Train {
        #[command(flatten)]
        source: DataSource,

        /// Experiment name for output files (must match [a-zA-Z0-9_-]+)
        #[arg(long, default_value = "netequity")]
        experiment: String,

        /// Output directory for the model and reports
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,

        #[command(flatten)]
        training: TrainingArgs,
    },

    /// Rank forest variants and a single-tree baseline by held-out R²
    Compare {
        #[command(flatten)]
        source: DataSource,

        #[command(flatten)]
        training: TrainingArgs,

        #[command(flatten)]
        report: ReportArgs,
    },

    /// Predict web presence for presets or a custom scenario
    Predict {
        /// Path to the trained model binary
        #[arg(long)]
        model: PathBuf,

        /// Preset profile(s): developed, emerging, rural (all three if nothing is given)
        #[arg(long)]
        preset: Vec<Preset>,

        /// Custom scenario value, as feature=value (repeatable)
        #[arg(long = "set", value_parser = parse_assignment)]
        set: Vec<(Feature, f64)>,

        /// Fill for absent scenario features: "reject", "mean", or a preset name
        #[arg(long, default_value = "reject")]
        missing: String,

        /// Skip the per-feature contribution breakdown
        #[arg(long, default_value_t = false)]
        no_contributions: bool,

        #[command(flatten)]
        report: ReportArgs,
    },

    /// Print the ranked feature importances of a trained model
    Importances {
        /// Path to the trained model binary
        #[arg(long)]
        model: PathBuf,
    },

    /// Rank records by how much a relative change in one feature moves their prediction
    Simulate {
        /// Path to the trained model binary
        #[arg(long)]
        model: PathBuf,

        #[command(flatten)]
        source: DataSource,

        /// Feature to change
        #[arg(long)]
        feature: Feature,

        /// Relative change in percent (e.g. 10 or -25)
        #[arg(long, allow_hyphen_values = true)]
        pct_change: f64,

        /// Number of records to report
        #[arg(long, default_value_t = 10)]
        top_n: usize,

        #[command(flatten)]
        report: ReportArgs,
    },
}

// --- JSON stdout output structs ---

#[derive(Serialize)]
struct TrainOutput {
    experiment: String,
    n_records: usize,
    n_train: usize,
    n_test: usize,
    r2: f64,
    mse: f64,
    oob_r2: Option<f64>,
    max_features_resolved: usize,
    mean_depth: f64,
    top_features: Vec<&'static str>,
    model_path: PathBuf,
}

#[derive(Serialize)]
struct PredictOutput {
    label: String,
    value: f64,
    breakdown: Option<Breakdown>,
}

#[derive(Serialize)]
struct ImportanceOutput {
    rank: usize,
    feature: &'static str,
    score: f64,
}

#[derive(Serialize)]
struct SimulateOutput<'a> {
    feature: Feature,
    pct_change: f64,
    rows: &'a [SimulationRow],
}

fn parse_assignment(s: &str) -> Result<(Feature, f64), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected feature=value, got \"{s}\""))?;
    let feature: Feature = name.trim().parse().map_err(|e| format!("{e}"))?;
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid number \"{value}\" for {feature}"))?;
    Ok((feature, value))
}

fn parse_missing_policy(s: &str) -> Result<MissingFeaturePolicy> {
    match s {
        "reject" => Ok(MissingFeaturePolicy::Reject),
        "mean" => Ok(MissingFeaturePolicy::TrainingMean),
        other => {
            let preset: Preset = other.parse().with_context(|| {
                format!("unknown missing-feature policy: {other} (expected reject, mean, or a preset)")
            })?;
            Ok(MissingFeaturePolicy::Preset(preset))
        }
    }
}

fn parse_max_features(s: &str) -> Result<MaxFeatures> {
    match s {
        "all" => Ok(MaxFeatures::All),
        "sqrt" => Ok(MaxFeatures::Sqrt),
        "log2" => Ok(MaxFeatures::Log2),
        other => {
            if let Ok(count) = other.parse::<usize>() {
                Ok(MaxFeatures::Fixed(count))
            } else {
                let fraction: f64 = other
                    .parse()
                    .with_context(|| format!("invalid max-features value: {other}"))?;
                Ok(MaxFeatures::Fraction(fraction))
            }
        }
    }
}

fn parse_criterion(s: &str) -> Result<SplitCriterion> {
    match s {
        "squared-error" => Ok(SplitCriterion::SquaredError),
        "poisson" => Ok(SplitCriterion::Poisson),
        other => anyhow::bail!("unknown criterion: {other} (expected squared-error or poisson)"),
    }
}

fn parse_split_method(s: &str) -> Result<SplitMethod> {
    match s {
        "exact" => Ok(SplitMethod::Exact),
        "extra-trees" => Ok(SplitMethod::ExtraTrees),
        other => anyhow::bail!("unknown split method: {other} (expected exact or extra-trees)"),
    }
}

fn build_config(args: &TrainingArgs, seed: u64) -> Result<TrainingConfig> {
    let oob_mode = if args.oob {
        OobMode::Enabled
    } else {
        OobMode::Disabled
    };
    Ok(TrainingConfig::new()
        .with_n_trees(args.n_trees)
        .with_max_depth((args.max_depth > 0).then_some(args.max_depth))
        .with_min_samples_split(args.min_samples_split)
        .with_min_samples_leaf(args.min_samples_leaf)
        .with_max_features(parse_max_features(&args.max_features)?)
        .with_criterion(parse_criterion(&args.criterion)?)
        .with_split_method(parse_split_method(&args.split_method)?)
        .with_oob_mode(oob_mode)
        .with_test_fraction(args.test_fraction)
        .with_seed(seed))
}

fn load_dataset(source: &DataSource, seed: u64) -> Result<FeatureDataset> {
    match (&source.data, source.synthetic) {
        (Some(path), _) => DatasetReader::new(path)
            .read()
            .with_context(|| format!("failed to read {}", path.display())),
        (None, Some(n)) => {
            synthetic_dataset(n, seed).context("failed to generate synthetic dataset")
        }
        (None, None) => anyhow::bail!("either --data or --synthetic is required"),
    }
}

fn load_model(path: &Path) -> Result<TrainedModel> {
    TrainedModel::load(path).with_context(|| format!("failed to load model {}", path.display()))
}

fn report_writer(report: &ReportArgs) -> Result<Option<ReportWriter>> {
    report
        .experiment
        .as_deref()
        .map(|name| -> Result<ReportWriter> {
            let experiment = ExperimentName::new(name)?;
            ReportWriter::new(&report.output_dir, experiment).context("failed to prepare output")
        })
        .transpose()
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match (cli.verbose, cli.quiet) {
        (true, _) => "debug",
        (_, true) => "error",
        _ => "info",
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("failed to configure thread pool")?;
        info!(threads, "thread pool configured");
    }

    match cli.command {
        Command::Train {
            source,
            experiment,
            output_dir,
            training,
        } => {
            let experiment_name = ExperimentName::new(experiment.clone())?;
            let config = build_config(&training, cli.seed)?;

            let dataset = load_dataset(&source, cli.seed)?;
            info!(n_records = dataset.len(), "dataset ready");

            let report = train(&dataset, &config).context("training failed")?;

            let writer = ReportWriter::new(&output_dir, experiment_name)?;
            writer.write_training(&report)?;
            writer.write_summary(&report)?;
            let model_path = writer.model_path();
            report
                .model()
                .save(&model_path)
                .context("failed to save model")?;

            let evaluation = report.evaluation();
            let output = TrainOutput {
                experiment,
                n_records: dataset.len(),
                n_train: evaluation.n_train,
                n_test: evaluation.n_test,
                r2: evaluation.r2,
                mse: evaluation.mse,
                oob_r2: evaluation.oob_r2,
                max_features_resolved: report.forest_summary().max_features_resolved,
                mean_depth: report.forest_summary().mean_depth,
                top_features: report
                    .importances()
                    .iter()
                    .take(3)
                    .map(|i| i.feature.name())
                    .collect(),
                model_path,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Compare {
            source,
            training,
            report,
        } => {
            let config = build_config(&training, cli.seed)?;
            let dataset = load_dataset(&source, cli.seed)?;
            info!(n_records = dataset.len(), "dataset ready");

            let rows = compare(&dataset, &config).context("comparison failed")?;

            if let Some(writer) = report_writer(&report)? {
                writer.write_comparison(&rows)?;
            }
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }

        Command::Predict {
            model,
            preset,
            set,
            missing,
            no_contributions,
            report,
        } => {
            let trained = load_model(&model)?;
            let options = PredictOptions::new()
                .with_missing_policy(parse_missing_policy(&missing)?)
                .with_contributions(!no_contributions);

            let mut scenarios: Vec<(String, Scenario)> = Vec::new();
            if !set.is_empty() {
                let custom = set
                    .iter()
                    .fold(Scenario::new(), |s, &(feature, value)| s.with_value(feature, value));
                scenarios.push(("custom".to_string(), custom));
            }
            let presets = if preset.is_empty() && set.is_empty() {
                Preset::ALL.to_vec()
            } else {
                preset
            };
            for p in presets {
                scenarios.push((p.to_string(), trained.preset_scenario(p)));
            }

            let mut entries = Vec::with_capacity(scenarios.len());
            for (label, scenario) in scenarios {
                let inputs = resolve_scenario(&trained, &scenario, options.missing_policy())
                    .with_context(|| format!("scenario \"{label}\" is incomplete"))?;
                let prediction = predict(&trained, &scenario, &options)
                    .with_context(|| format!("prediction for \"{label}\" failed"))?;
                entries.push(PredictionEntry {
                    label,
                    inputs,
                    prediction,
                });
            }

            if let Some(writer) = report_writer(&report)? {
                writer.write_predictions(&entries)?;
            }

            let output: Vec<PredictOutput> = entries
                .into_iter()
                .map(|e| PredictOutput {
                    label: e.label,
                    value: e.prediction.value,
                    breakdown: e.prediction.breakdown,
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Importances { model } => {
            let trained = load_model(&model)?;
            let output: Vec<ImportanceOutput> = importances(&trained)
                .into_iter()
                .map(|i| ImportanceOutput {
                    rank: i.rank,
                    feature: i.feature.name(),
                    score: i.score,
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Simulate {
            model,
            source,
            feature,
            pct_change,
            top_n,
            report,
        } => {
            let trained = load_model(&model)?;
            let dataset = load_dataset(&source, cli.seed)?;

            let rows = simulate(&trained, &dataset, feature, pct_change, top_n)
                .context("simulation failed")?;

            if let Some(writer) = report_writer(&report)? {
                writer.write_simulation(feature, pct_change, &rows)?;
            }

            let output = SimulateOutput {
                feature,
                pct_change,
                rows: &rows,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
