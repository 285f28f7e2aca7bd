use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, info};

use coppice_io::{ArtifactWriter, ColumnType, Evaluation, RunName, TableReader, TrainingSummary};
use coppice_tree::{Criterion, ForestConfig, MaxCovariates, Model, Table, TreeConfig};

#[derive(Parser)]
#[command(name = "coppice")]
#[command(about = "Grow, prune and bag CART decision trees from CSV tables")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// RNG seed for reproducibility
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

/// Input table and output location shared by the training commands.
#[derive(Args, Debug, Clone)]
struct DataArgs {
    /// Path to the input CSV file
    #[arg(long)]
    data: PathBuf,

    /// Name of the response column
    #[arg(long)]
    response: String,

    /// Comma-separated covariate columns (defaults to every other column)
    #[arg(long, value_delimiter = ',')]
    covariates: Option<Vec<String>>,

    /// Comma-separated columns to read as categorical regardless of content
    #[arg(long, value_delimiter = ',')]
    categorical: Vec<String>,

    /// Comma-separated columns to read as numeric regardless of content
    #[arg(long, value_delimiter = ',')]
    numeric: Vec<String>,

    /// Run name for output files (must match [a-zA-Z0-9_-]+)
    #[arg(long)]
    run: String,

    /// Output directory for result files
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,
}

#[derive(Subcommand)]
enum Command {
    /// Grow a single tree and prune it by cross-validation
    Tree {
        #[command(flatten)]
        data: DataArgs,

        /// Minimum rows in a node for a split to be attempted
        #[arg(long, default_value_t = 20)]
        min_split: usize,

        /// Minimum rows in each child of a split
        #[arg(long, default_value_t = 7)]
        min_bucket: usize,

        /// Maximum tree depth (unlimited if not set)
        #[arg(long)]
        max_depth: Option<usize>,

        /// Number of cross-validation folds (0 keeps the full tree)
        #[arg(long, default_value_t = 10)]
        folds: usize,

        /// Split-search risk: error, gini, entropy, twoing, sse or sae
        #[arg(long)]
        build_risk: Option<String>,

        /// Pruning risk: error, gini, entropy, sse or sae
        #[arg(long)]
        prune_risk: Option<String>,

        /// Comma-separated class priors in response level order
        #[arg(long, value_delimiter = ',')]
        prior: Option<Vec<f64>>,

        /// Covariates drawn per split (all if not set)
        #[arg(long)]
        max_covariates: Option<usize>,
    },

    /// Train a random forest on bootstrap resamples
    Forest {
        #[command(flatten)]
        data: DataArgs,

        /// Number of trees
        #[arg(long, default_value_t = 100)]
        n_trees: usize,

        /// Covariates drawn per split: "sqrt", "log2", "all", a count, or a fraction in (0, 1)
        #[arg(long, default_value = "sqrt")]
        max_covariates: String,

        /// Minimum rows in a node for a split to be attempted
        #[arg(long, default_value_t = 2)]
        min_split: usize,

        /// Minimum rows in each child of a split
        #[arg(long, default_value_t = 1)]
        min_bucket: usize,

        /// Maximum tree depth (unlimited if not set)
        #[arg(long)]
        max_depth: Option<usize>,

        /// Split-search risk: error, gini, entropy, twoing, sse or sae
        #[arg(long)]
        build_risk: Option<String>,
    },

    /// Predict a CSV table with a saved tree or forest
    Predict {
        /// Path to the trained model binary
        #[arg(long)]
        model: PathBuf,

        /// Path to the CSV file to predict
        #[arg(long)]
        data: PathBuf,

        /// Run name for output files
        #[arg(long)]
        run: String,

        /// Output directory for result files
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },
}

// --- JSON stdout output structs ---

#[derive(Serialize)]
struct PredictOutput<'a> {
    run: String,
    model: &'static str,
    n_rows: usize,
    evaluation: Option<&'a Evaluation>,
}

fn parse_criterion(s: &str) -> Result<Criterion> {
    s.parse::<Criterion>().map_err(anyhow::Error::msg)
}

fn parse_max_covariates(s: &str) -> Result<MaxCovariates> {
    match s {
        "sqrt" => Ok(MaxCovariates::Sqrt),
        "log2" => Ok(MaxCovariates::Log2),
        "all" => Ok(MaxCovariates::All),
        other => {
            if let Ok(k) = other.parse::<usize>() {
                Ok(MaxCovariates::Fixed(k))
            } else if let Ok(f) = other.parse::<f64>()
                && f > 0.0
                && f < 1.0
            {
                Ok(MaxCovariates::Fraction(f))
            } else {
                anyhow::bail!("unknown max covariates: {other} (expected sqrt, log2, all, a count, or a fraction)")
            }
        }
    }
}

fn read_table(args: &DataArgs) -> Result<Table> {
    let mut reader = TableReader::new(&args.data);
    if let Some(covariates) = &args.covariates {
        reader = reader.with_covariates(covariates.clone());
    }
    for column in &args.categorical {
        reader = reader.with_kind(column.clone(), ColumnType::Categorical);
    }
    for column in &args.numeric {
        reader = reader.with_kind(column.clone(), ColumnType::Numeric);
    }
    let table = reader
        .read(&args.response)
        .context("failed to read input CSV")?;
    info!(n_rows = table.n_rows(), n_covariates = table.covariates().len(), "dataset loaded");
    Ok(table)
}

/// Save the model, score it on its training table and write the summary.
fn finish_training(writer: &ArtifactWriter, model: &Model, table: &Table) -> Result<TrainingSummary> {
    model
        .save(writer.model_path())
        .context("failed to save model")?;

    let predictions = model.predict(table).context("prediction failed")?;
    let evaluation = Evaluation::score(table, &predictions)?;
    match &evaluation {
        Evaluation::Classification { accuracy, confusion, .. } => {
            info!(accuracy, "training accuracy");
            debug!("confusion matrix:\n{confusion}");
        }
        Evaluation::Regression { mse, mae } => info!(mse, mae, "training error"),
    }

    let summary = TrainingSummary::describe(writer.run(), model, table.n_rows()).with_training(evaluation);
    writer.write_summary(&summary)?;
    Ok(summary)
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

    // Configure Rayon thread pool
    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("failed to configure thread pool")?;
        info!(threads, "thread pool configured");
    }

    match cli.command {
        Command::Tree {
            data,
            min_split,
            min_bucket,
            max_depth,
            folds,
            build_risk,
            prune_risk,
            prior,
            max_covariates,
        } => {
            let run = RunName::new(data.run.clone())?;
            let table = read_table(&data)?;

            let mut config = TreeConfig::new()
                .with_min_split(min_split)
                .with_min_bucket(min_bucket)
                .with_max_depth(max_depth)
                .with_folds(folds)
                .with_seed(cli.seed)
                .with_prior(prior)
                .with_max_covariates(max_covariates);
            if let Some(risk) = build_risk.as_deref() {
                config = config.with_build_risk(parse_criterion(risk)?);
            }
            if let Some(risk) = prune_risk.as_deref() {
                config = config.with_prune_risk(parse_criterion(risk)?);
            }

            let fit = config.fit(&table).context("tree training failed")?;
            info!(
                cutoff = ?fit.cutoff(),
                n_leaves = fit.tree().n_leaves(),
                "tree trained"
            );

            let writer = ArtifactWriter::new(&data.output_dir, run)?;
            writer.write_tuning(&fit)?;
            let model = Model::from(fit.into_tree());
            let summary = finish_training(&writer, &model, &table)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }

        Command::Forest {
            data,
            n_trees,
            max_covariates,
            min_split,
            min_bucket,
            max_depth,
            build_risk,
        } => {
            let run = RunName::new(data.run.clone())?;
            let table = read_table(&data)?;

            let mut config = ForestConfig::new(n_trees)?
                .with_max_covariates(parse_max_covariates(&max_covariates)?)
                .with_min_split(min_split)
                .with_min_bucket(min_bucket)
                .with_max_depth(max_depth)
                .with_seed(cli.seed);
            if let Some(risk) = build_risk.as_deref() {
                config = config.with_build_risk(parse_criterion(risk)?);
            }

            let forest = config.fit(&table).context("forest training failed")?;
            info!(
                n_trees = forest.n_trees(),
                max_covariates = forest.max_covariates(),
                "forest trained"
            );

            let writer = ArtifactWriter::new(&data.output_dir, run)?;
            let model = Model::from(forest);
            let summary = finish_training(&writer, &model, &table)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }

        Command::Predict {
            model,
            data,
            run,
            output_dir,
        } => {
            let run_name = RunName::new(run.clone())?;

            // 1. Load model
            let model = Model::load(&model).context("failed to load model")?;
            info!(kind = model.kind(), task = %model.schema().task(), "model loaded");

            // 2. Read the table against the model's schema
            let input = TableReader::new(&data)
                .read_with_schema(model.schema())
                .context("failed to read input CSV")?;

            // 3. Predict, scoring only when the response was supplied
            let predictions = model.predict(&input.table).context("prediction failed")?;
            let evaluation = if input.has_response {
                Some(Evaluation::score(&input.table, &predictions)?)
            } else {
                None
            };

            // 4. Write predictions JSON
            let writer = ArtifactWriter::new(&output_dir, run_name)?;
            writer.write_predictions(&model, &predictions, evaluation.as_ref())?;

            // 5. Print summary
            let output = PredictOutput {
                run,
                model: model.kind(),
                n_rows: predictions.len(),
                evaluation: evaluation.as_ref(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_covariates_strategies() {
        assert_eq!(parse_max_covariates("sqrt").unwrap(), MaxCovariates::Sqrt);
        assert_eq!(parse_max_covariates("all").unwrap(), MaxCovariates::All);
        assert_eq!(parse_max_covariates("3").unwrap(), MaxCovariates::Fixed(3));
        assert_eq!(parse_max_covariates("0.5").unwrap(), MaxCovariates::Fraction(0.5));
        assert!(parse_max_covariates("1.5").is_err());
        assert!(parse_max_covariates("most").is_err());
    }

    #[test]
    fn criterion_names() {
        assert_eq!(parse_criterion("twoing").unwrap(), Criterion::Twoing);
        assert!(parse_criterion("variance").is_err());
    }

    #[test]
    fn cli_parses_tree_command() {
        let cli = Cli::try_parse_from([
            "coppice",
            "--seed",
            "7",
            "tree",
            "--data",
            "d.csv",
            "--response",
            "y",
            "--run",
            "r",
            "--covariates",
            "a,b",
            "--prior",
            "0.5,0.5",
        ])
        .unwrap();
        assert_eq!(cli.seed, 7);
        let Command::Tree { data, prior, folds, .. } = cli.command else {
            panic!("expected tree command");
        };
        assert_eq!(data.covariates, Some(vec!["a".to_string(), "b".to_string()]));
        assert_eq!(prior, Some(vec![0.5, 0.5]));
        assert_eq!(folds, 10);
    }
}
