//! Similarity Forest training with parallel tree construction.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{debug, info, instrument};

use crate::config::{OobMode, SimilarityForestConfig};
use crate::error::SimForestError;
use crate::oob::compute_oob;
use crate::result::{ForestResult, TrainingMetadata};
use crate::similarity::{Kernel, Similarity};
use crate::task::{Outcomes, Target, Task};
use crate::tree::{SimilarityTree, grow};

/// One ensemble member with the sample indices it was trained on.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BaggedTree<S = Kernel> {
    pub(crate) tree: SimilarityTree<S>,
    pub(crate) bootstrap_indices: Vec<usize>,
    pub(crate) oob_indices: Vec<usize>,
}

impl<S> BaggedTree<S> {
    /// Borrow the fitted tree.
    #[must_use]
    pub fn tree(&self) -> &SimilarityTree<S> {
        &self.tree
    }

    /// Return the training indices drawn for this tree, with repeats.
    #[must_use]
    pub fn bootstrap_indices(&self) -> &[usize] {
        &self.bootstrap_indices
    }

    /// Return the sorted indices of training samples this tree never saw.
    #[must_use]
    pub fn oob_indices(&self) -> &[usize] {
        &self.oob_indices
    }
}

/// A fitted Similarity Forest ensemble.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SimilarityForest<S = Kernel> {
    pub(crate) trees: Vec<BaggedTree<S>>,
    pub(crate) n_features: usize,
    pub(crate) task: Task,
}

/// Draw the per-tree training index set and its out-of-bag complement.
///
/// With bootstrap, `n_samples` draws with replacement; otherwise every index
/// once and an empty OOB set.
pub(crate) fn bootstrap_sample(
    n_samples: usize,
    bootstrap: bool,
    rng: &mut impl Rng,
) -> (Vec<usize>, Vec<usize>) {
    if !bootstrap {
        return ((0..n_samples).collect(), Vec::new());
    }
    let mut in_bag = vec![false; n_samples];
    let mut bootstrap_indices = Vec::with_capacity(n_samples);
    for _ in 0..n_samples {
        let idx = rng.gen_range(0..n_samples);
        bootstrap_indices.push(idx);
        in_bag[idx] = true;
    }
    let oob_indices: Vec<usize> = (0..n_samples).filter(|&i| !in_bag[i]).collect();
    (bootstrap_indices, oob_indices)
}

/// Generator for tree `t`: the base seed with stream `t`.
///
/// Depends only on `(seed, t)`, so the ensemble is identical for any thread
/// count and scheduling order.
pub(crate) fn tree_rng(seed: u64, t: usize) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(t as u64);
    rng
}

/// Run `op` on a dedicated pool of `n_jobs` threads, or on the global pool.
pub(crate) fn with_pool<R, OP>(n_jobs: Option<usize>, op: OP) -> Result<R, SimForestError>
where
    OP: FnOnce() -> R + Send,
    R: Send,
{
    match n_jobs {
        Some(n_jobs) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n_jobs)
                .build()
                .map_err(|source| SimForestError::ThreadPool { n_jobs, source })?;
            Ok(pool.install(op))
        }
        None => Ok(op()),
    }
}

/// Train the Similarity Forest ensemble.
#[instrument(skip_all, fields(n_estimators = config.n_estimators, n_samples = features.len()))]
pub(crate) fn train<S: Similarity + Clone>(
    config: &SimilarityForestConfig<S>,
    features: &[Vec<f64>],
    target: Target<'_>,
    n_features: usize,
) -> Result<ForestResult<S>, SimForestError> {
    let n_samples = features.len();
    let task = target.task();

    info!(
        n_estimators = config.n_estimators,
        n_samples,
        n_features,
        n_directions = config.params.n_directions,
        bootstrap = config.bootstrap,
        "training similarity forest"
    );

    let fit_all = || -> Vec<BaggedTree<S>> {
        (0..config.n_estimators)
            .into_par_iter()
            .map(|t| {
                let mut rng = tree_rng(config.seed, t);
                let (bootstrap_indices, oob_indices) =
                    bootstrap_sample(n_samples, config.bootstrap, &mut rng);
                let grown = grow(
                    features,
                    target,
                    bootstrap_indices.clone(),
                    &config.similarity,
                    &config.params,
                    &mut rng,
                );
                let tree = SimilarityTree::from_nodes(
                    grown.nodes,
                    config.similarity.clone(),
                    n_features,
                    task,
                );
                debug!(
                    tree = t,
                    n_nodes = tree.n_nodes(),
                    depth = tree.depth(),
                    n_oob = oob_indices.len(),
                    "tree fitted"
                );
                BaggedTree {
                    tree,
                    bootstrap_indices,
                    oob_indices,
                }
            })
            .collect()
    };
    let trees = with_pool(config.n_jobs, fit_all)?;

    debug!(n_trees_trained = trees.len(), "tree training complete");

    let forest = SimilarityForest {
        trees,
        n_features,
        task,
    };

    // OOB evaluation.
    let oob_score = if config.oob_mode == OobMode::Enabled {
        let outcomes = match target {
            Target::Classes { labels, .. } => Outcomes::Classes(labels),
            Target::Values { values } => Outcomes::Values(values),
            Target::Unsupervised => unreachable!("forests are fitted against a target"),
        };
        Some(compute_oob(&forest, features, outcomes))
    } else {
        None
    };

    let metadata = TrainingMetadata {
        n_estimators: config.n_estimators,
        n_features,
        n_samples,
        task,
        bootstrap: config.bootstrap,
        n_directions: config.params.n_directions,
    };

    info!(
        oob_score = oob_score.as_ref().map(|s| s.score),
        "similarity forest training complete"
    );

    Ok(ForestResult::new(forest, oob_score, metadata))
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::{bootstrap_sample, tree_rng};
    use crate::config::{OobMode, SimilarityForestConfig};
    use crate::task::Prediction;

    /// Generate a simple 3-class separable dataset.
    fn make_separable_data() -> (Vec<Vec<f64>>, Vec<usize>) {
        let mut features = Vec::new();
        let mut labels = Vec::new();
        for class in 0..3 {
            for i in 0..20 {
                features.push(vec![10.0 * class as f64 + i as f64 * 0.15, 0.5]);
                labels.push(class);
            }
        }
        (features, labels)
    }

    #[test]
    fn bootstrap_and_oob_partition_indices() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let (bag, oob) = bootstrap_sample(50, true, &mut rng);
        assert_eq!(bag.len(), 50);
        for i in 0..50 {
            assert_ne!(bag.contains(&i), oob.contains(&i));
        }
        assert!(oob.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn no_bootstrap_uses_every_sample() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let (bag, oob) = bootstrap_sample(5, false, &mut rng);
        assert_eq!(bag, vec![0, 1, 2, 3, 4]);
        assert!(oob.is_empty());
    }

    #[test]
    fn tree_streams_differ() {
        use rand::Rng;
        let a: u64 = tree_rng(7, 0).r#gen();
        let b: u64 = tree_rng(7, 1).r#gen();
        let a2: u64 = tree_rng(7, 0).r#gen();
        assert_ne!(a, b);
        assert_eq!(a, a2);
    }

    #[test]
    fn three_class_separable_accuracy() {
        let (features, labels) = make_separable_data();
        let result = SimilarityForestConfig::new(30)
            .unwrap()
            .with_n_directions(3)
            .with_seed(42)
            .fit_classifier(&features, &labels)
            .unwrap();

        let predictions = result.forest().predict_batch(&features).unwrap();
        let correct = predictions
            .iter()
            .zip(&labels)
            .filter(|&(p, &l)| *p == Prediction::Class(l))
            .count();
        let accuracy = correct as f64 / labels.len() as f64;
        assert!(accuracy > 0.9, "accuracy = {accuracy}");
    }

    #[test]
    fn oob_score_computed() {
        let (features, labels) = make_separable_data();
        let result = SimilarityForestConfig::new(30)
            .unwrap()
            .with_n_directions(3)
            .with_oob_mode(OobMode::Enabled)
            .with_seed(42)
            .fit_classifier(&features, &labels)
            .unwrap();

        let oob = result.oob_score().expect("OOB should be computed");
        assert!(oob.score > 0.8, "oob accuracy = {}", oob.score);
        assert!(oob.n_oob_samples > 0);
        assert_eq!(oob.predictions.len(), features.len());
    }

    #[test]
    fn identical_across_thread_counts() {
        let (features, labels) = make_separable_data();
        let base = SimilarityForestConfig::new(8).unwrap().with_seed(5);
        let one = base.clone().with_n_jobs(Some(1)).fit_classifier(&features, &labels).unwrap();
        let many = base.with_n_jobs(Some(4)).fit_classifier(&features, &labels).unwrap();
        for (a, b) in one.forest().trees().iter().zip(many.forest().trees()) {
            assert_eq!(a.bootstrap_indices(), b.bootstrap_indices());
            assert_eq!(a.tree().n_nodes(), b.tree().n_nodes());
        }
        assert_eq!(
            one.forest().predict_batch(&features).unwrap(),
            many.forest().predict_batch(&features).unwrap()
        );
    }

    #[test]
    fn regression_forest_tracks_targets() {
        let features: Vec<Vec<f64>> = (0..40).map(|i| vec![i as f64 * 0.25]).collect();
        let targets: Vec<f64> = features.iter().map(|x| 2.0 * x[0] + 1.0).collect();
        let result = SimilarityForestConfig::new(20)
            .unwrap()
            .with_similarity(crate::Kernel::NegSquaredEuclidean)
            .with_n_directions(3)
            .with_seed(3)
            .fit_regressor(&features, &targets)
            .unwrap();
        let pred = result.forest().predict(&[5.0]).unwrap().as_f64();
        assert!((pred - 11.0).abs() < 1.5, "pred = {pred}");
    }
}
