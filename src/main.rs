use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::info;

use simforest_io::{DatasetReader, ExperimentName, ResultWriter};
use simforest_tree::{
    ClusterCut, Criterion, Kernel, OobMode, Outcomes, SimilarityClusterConfig, SimilarityForest,
    SimilarityForestClusterConfig, SimilarityForestConfig, Task,
};

#[derive(Parser)]
#[command(name = "simforest")]
#[command(about = "Similarity Forest classification, regression and clustering")]
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

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SimilarityArg {
    Dot,
    Rbf,
    Cosine,
    NegSqEuclidean,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CriterionArg {
    Gini,
    Entropy,
    Variance,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ClusterMethod {
    /// One divisive cluster tree
    Tree,
    /// Average linkage over forest path similarity
    Forest,
}

/// Tree induction parameters shared by every subcommand that fits trees.
#[derive(Args, Debug, Clone)]
struct TreeArgs {
    /// Maximum tree depth, root = 1 (unlimited if not set)
    #[arg(long)]
    max_depth: Option<usize>,

    /// Minimum samples required to attempt a split
    #[arg(long, default_value_t = 2)]
    min_samples_split: usize,

    /// Minimum samples in each child of a split
    #[arg(long, default_value_t = 1)]
    min_samples_leaf: usize,

    /// Random reference pairs tried per node
    #[arg(long, default_value_t = 1)]
    n_directions: usize,

    /// Similarity function used to project samples
    #[arg(long, value_enum, default_value_t = SimilarityArg::Dot)]
    similarity: SimilarityArg,

    /// RBF inverse length scale (only with --similarity rbf)
    #[arg(long, default_value_t = 1.0)]
    gamma: f64,
}

impl TreeArgs {
    fn kernel(&self) -> Kernel {
        match self.similarity {
            SimilarityArg::Dot => Kernel::Dot,
            SimilarityArg::Rbf => Kernel::Rbf { gamma: self.gamma },
            SimilarityArg::Cosine => Kernel::Cosine,
            SimilarityArg::NegSqEuclidean => Kernel::NegSquaredEuclidean,
        }
    }
}

/// Ensemble parameters for `classify` and `regress`.
#[derive(Args, Debug, Clone)]
struct ForestArgs {
    /// Number of trees in the forest
    #[arg(long, default_value_t = 100)]
    n_trees: usize,

    /// Split criterion (gini for classify, variance for regress if not set)
    #[arg(long, value_enum)]
    criterion: Option<CriterionArg>,

    /// Fit every tree on the full dataset (disables OOB scoring)
    #[arg(long, default_value_t = false)]
    no_bootstrap: bool,

    /// Compute OOB permutation feature importances
    #[arg(long, default_value_t = false)]
    importances: bool,

    #[command(flatten)]
    tree: TreeArgs,
}

/// Input and output locations shared by the training subcommands.
#[derive(Args, Debug, Clone)]
struct TrainIo {
    /// Path to the input CSV file
    #[arg(long)]
    data: PathBuf,

    /// Name of the target column
    #[arg(long)]
    target: String,

    /// Name of the sample id column (row index if not set)
    #[arg(long)]
    id_column: Option<String>,

    /// Experiment name for output files (must match [a-zA-Z0-9_-]+)
    #[arg(long)]
    experiment: String,

    /// Output directory for result files
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,
}

#[derive(Subcommand)]
enum Command {
    /// Train a classification forest, save the model and a fit summary
    Classify {
        #[command(flatten)]
        io: TrainIo,

        #[command(flatten)]
        forest: ForestArgs,
    },

    /// Train a regression forest, save the model and a fit summary
    Regress {
        #[command(flatten)]
        io: TrainIo,

        #[command(flatten)]
        forest: ForestArgs,
    },

    /// Predict a CSV with a saved model
    Predict {
        /// Path to the trained model binary
        #[arg(long)]
        model: PathBuf,

        /// Path to the input CSV file
        #[arg(long)]
        data: PathBuf,

        /// Name of the sample id column (row index if not set)
        #[arg(long)]
        id_column: Option<String>,

        /// Experiment name for output files
        #[arg(long)]
        experiment: String,

        /// Output directory for result files
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },

    /// Cluster samples and write labels with the linkage hierarchy
    Cluster {
        /// Path to the input CSV file
        #[arg(long)]
        data: PathBuf,

        /// Name of the sample id column (row index if not set)
        #[arg(long)]
        id_column: Option<String>,

        /// Experiment name for output files
        #[arg(long)]
        experiment: String,

        /// Output directory for result files
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,

        /// Clustering method
        #[arg(long, value_enum, default_value_t = ClusterMethod::Tree)]
        method: ClusterMethod,

        /// Number of flat clusters
        #[arg(long, default_value_t = 2)]
        n_clusters: usize,

        /// Cut the single tree at this depth instead of by cluster count
        #[arg(long, conflicts_with = "n_clusters")]
        depth: Option<usize>,

        /// Number of trees (forest method only)
        #[arg(long, default_value_t = 20)]
        n_trees: usize,

        /// Fit each tree on a bootstrap sample (forest method only)
        #[arg(long, default_value_t = false)]
        bootstrap: bool,

        #[command(flatten)]
        tree: TreeArgs,
    },
}

// --- JSON stdout output structs ---

#[derive(Serialize)]
struct FitOutput {
    experiment: String,
    task: Task,
    n_samples: usize,
    n_features: usize,
    n_trees: usize,
    oob_score: Option<f64>,
    model_path: PathBuf,
}

#[derive(Serialize)]
struct PredictOutput {
    experiment: String,
    n_samples: usize,
    model_n_trees: usize,
    model_n_features: usize,
    task: Task,
}

#[derive(Serialize)]
struct ClusterOutput {
    experiment: String,
    n_samples: usize,
    n_clusters: usize,
    cluster_sizes: Vec<usize>,
}

fn forest_config(args: &ForestArgs, seed: u64) -> Result<SimilarityForestConfig> {
    let bootstrap = !args.no_bootstrap;
    let mut config = SimilarityForestConfig::new(args.n_trees)?
        .with_similarity(args.tree.kernel())
        .with_max_depth(args.tree.max_depth)
        .with_min_samples_split(args.tree.min_samples_split)
        .with_min_samples_leaf(args.tree.min_samples_leaf)
        .with_n_directions(args.tree.n_directions)
        .with_bootstrap(bootstrap)
        .with_oob_mode(if bootstrap { OobMode::Enabled } else { OobMode::Disabled })
        .with_seed(seed);
    if let Some(criterion) = args.criterion {
        config = config.with_criterion(match criterion {
            CriterionArg::Gini => Criterion::Gini,
            CriterionArg::Entropy => Criterion::Entropy,
            CriterionArg::Variance => Criterion::Variance,
        });
    }
    Ok(config)
}

fn cluster_sizes(labels: &[simforest_tree::ClusterLabel]) -> Vec<usize> {
    let n_clusters = labels.iter().map(|l| l.index() + 1).max().unwrap_or(0);
    let mut sizes = vec![0usize; n_clusters];
    for label in labels {
        sizes[label.index()] += 1;
    }
    sizes
}

fn train(io: TrainIo, forest: &ForestArgs, seed: u64, classify: bool) -> Result<()> {
    let experiment_name = ExperimentName::new(io.experiment.clone())?;

    // 1. Read dataset
    let dataset = DatasetReader::new(&io.data)
        .with_id_column(io.id_column)
        .with_target_column(Some(io.target))
        .read()
        .context("failed to read input CSV")?;
    let target = dataset
        .target()
        .context("dataset has no target column")?;

    // 2. Train with OOB
    let config = forest_config(forest, seed)?;
    let (result, outcomes_labels, outcomes_values, classes) = if classify {
        let (labels, classes) = target.class_labels();
        info!(n_classes = classes.len(), "class labels encoded");
        let result = config
            .fit_classifier(dataset.features(), &labels)
            .context("training failed")?;
        (result, Some(labels), None, Some(classes))
    } else {
        let values = target.values()?;
        let result = config
            .fit_regressor(dataset.features(), &values)
            .context("training failed")?;
        (result, None, Some(values), None)
    };
    let oob_score = result.oob_score().map(|s| s.score).filter(|s| s.is_finite());
    info!(oob_score = ?oob_score, "forest trained");

    // 3. Optional permutation importances
    let importances = if forest.importances {
        let outcomes = match (&outcomes_labels, &outcomes_values) {
            (Some(labels), _) => Outcomes::Classes(labels),
            (None, Some(values)) => Outcomes::Values(values),
            (None, None) => anyhow::bail!("no training outcomes available"),
        };
        Some(
            result
                .permutation_importances(dataset.features(), outcomes, seed)
                .context("permutation importance failed")?,
        )
    } else {
        None
    };

    // 4. Save model and fit summary
    let writer = ResultWriter::new(&io.output_dir, experiment_name)?;
    result
        .forest()
        .save(writer.model_path())
        .context("failed to save model")?;
    writer.write_fit(
        &result,
        dataset.feature_names(),
        classes.as_deref(),
        importances.as_deref(),
    )?;

    // 5. Print summary
    let metadata = result.metadata();
    let output = FitOutput {
        experiment: io.experiment,
        task: metadata.task,
        n_samples: metadata.n_samples,
        n_features: metadata.n_features,
        n_trees: metadata.n_estimators,
        oob_score,
        model_path: writer.model_path(),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
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
        Command::Classify { io, forest } => train(io, &forest, cli.seed, true)?,

        Command::Regress { io, forest } => train(io, &forest, cli.seed, false)?,

        Command::Predict {
            model,
            data,
            id_column,
            experiment,
            output_dir,
        } => {
            let experiment_name = ExperimentName::new(experiment.clone())?;

            // 1. Load model
            let forest: SimilarityForest = SimilarityForest::load(&model)
                .context("failed to load model")?;
            info!(
                n_trees = forest.n_estimators(),
                n_features = forest.n_features(),
                task = ?forest.task(),
                "model loaded"
            );

            // 2. Read dataset
            let dataset = DatasetReader::new(&data)
                .with_id_column(id_column)
                .read()
                .context("failed to read input CSV")?;

            // 3. Predict
            let predictions = forest
                .predict_batch(dataset.features())
                .context("prediction failed")?;
            let probabilities = match forest.task() {
                Task::Classification { .. } => Some(
                    forest
                        .predict_proba_batch(dataset.features())
                        .context("prediction failed")?,
                ),
                _ => None,
            };

            // 4. Write predictions JSON
            let writer = ResultWriter::new(&output_dir, experiment_name)?;
            writer.write_predictions(dataset.ids(), &predictions, probabilities.as_deref(), None)?;

            // 5. Print summary
            let output = PredictOutput {
                experiment,
                n_samples: dataset.n_samples(),
                model_n_trees: forest.n_estimators(),
                model_n_features: forest.n_features(),
                task: forest.task(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Cluster {
            data,
            id_column,
            experiment,
            output_dir,
            method,
            n_clusters,
            depth,
            n_trees,
            bootstrap,
            tree,
        } => {
            let experiment_name = ExperimentName::new(experiment.clone())?;

            // 1. Read dataset
            let dataset = DatasetReader::new(&data)
                .with_id_column(id_column)
                .read()
                .context("failed to read input CSV")?;

            // 2. Cluster
            let (labels, linkage) = match method {
                ClusterMethod::Tree => {
                    let cut = depth.map_or(ClusterCut::NClusters(n_clusters), ClusterCut::Depth);
                    let result = SimilarityClusterConfig::new()
                        .with_similarity(tree.kernel())
                        .with_max_depth(tree.max_depth)
                        .with_min_samples_split(tree.min_samples_split)
                        .with_min_samples_leaf(tree.min_samples_leaf)
                        .with_n_directions(tree.n_directions)
                        .with_cut(cut)
                        .with_seed(cli.seed)
                        .fit(dataset.features())
                        .context("clustering failed")?;
                    (result.labels().to_vec(), result.linkage().clone())
                }
                ClusterMethod::Forest => {
                    if depth.is_some() {
                        anyhow::bail!("--depth only applies to --method tree");
                    }
                    let result = SimilarityForestClusterConfig::new(n_trees)?
                        .with_similarity(tree.kernel())
                        .with_max_depth(tree.max_depth)
                        .with_min_samples_split(tree.min_samples_split)
                        .with_min_samples_leaf(tree.min_samples_leaf)
                        .with_n_directions(tree.n_directions)
                        .with_bootstrap(bootstrap)
                        .with_n_clusters(n_clusters)
                        .with_seed(cli.seed)
                        .fit(dataset.features())
                        .context("clustering failed")?;
                    (result.labels().to_vec(), result.linkage().clone())
                }
            };

            // 3. Write JSON artifact
            let writer = ResultWriter::new(&output_dir, experiment_name)?;
            writer.write_cluster(dataset.ids(), &labels, &linkage)?;

            // 4. Print summary
            let cluster_sizes = cluster_sizes(&labels);
            let output = ClusterOutput {
                experiment,
                n_samples: dataset.n_samples(),
                n_clusters: cluster_sizes.len(),
                cluster_sizes,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
