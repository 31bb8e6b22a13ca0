//! Clustering with an ensemble of similarity trees.
//!
//! Two points are close when the trees keep them together for long: the
//! similarity of a pair is the mean number of nodes their root-to-leaf paths
//! share, and the distance is its reciprocal. The resulting matrix is
//! agglomerated with average linkage.

use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{debug, info, instrument};

use crate::agglomerate::average_linkage;
use crate::cluster::ClusterCut;
use crate::error::SimForestError;
use crate::forest::{bootstrap_sample, tree_rng, with_pool};
use crate::label::ClusterLabel;
use crate::linkage::Linkage;
use crate::node::NodeId;
use crate::similarity::{Kernel, Similarity};
use crate::task::{Target, Task};
use crate::tree::{SimilarityTree, TreeParams, grow};
use crate::validate::validate_features;

/// Configuration for Similarity Forest clustering.
///
/// Construct via [`SimilarityForestClusterConfig::new`], then chain `with_*`
/// methods.
///
/// # Defaults
///
/// | Parameter           | Default                    |
/// |---------------------|----------------------------|
/// | `similarity`        | [`Kernel::Dot`]            |
/// | `max_depth`         | `None`                     |
/// | `min_samples_split` | 2                          |
/// | `min_samples_leaf`  | 1                          |
/// | `n_directions`      | 1                          |
/// | `bootstrap`         | `false`                    |
/// | `n_clusters`        | 2                          |
/// | `n_jobs`            | `None` (rayon global pool) |
/// | `seed`              | 42                         |
#[derive(Debug, Clone)]
pub struct SimilarityForestClusterConfig<S = Kernel> {
    n_estimators: usize,
    similarity: S,
    params: TreeParams,
    bootstrap: bool,
    n_clusters: usize,
    n_jobs: Option<usize>,
    seed: u64,
}

impl SimilarityForestClusterConfig {
    /// Create a new config with the given number of trees.
    ///
    /// # Errors
    ///
    /// Returns [`SimForestError::InvalidEstimatorCount`] if `n_estimators` is zero.
    pub fn new(n_estimators: usize) -> Result<Self, SimForestError> {
        if n_estimators == 0 {
            return Err(SimForestError::InvalidEstimatorCount { n_estimators });
        }
        Ok(Self {
            n_estimators,
            similarity: Kernel::Dot,
            params: TreeParams::new(),
            bootstrap: false,
            n_clusters: 2,
            n_jobs: None,
            seed: 42,
        })
    }
}

impl<S> SimilarityForestClusterConfig<S> {
    // --- Setters ---

    /// Replace the similarity function used by every tree.
    #[must_use]
    pub fn with_similarity<T: Similarity>(self, similarity: T) -> SimilarityForestClusterConfig<T> {
        SimilarityForestClusterConfig {
            n_estimators: self.n_estimators,
            similarity,
            params: self.params,
            bootstrap: self.bootstrap,
            n_clusters: self.n_clusters,
            n_jobs: self.n_jobs,
            seed: self.seed,
        }
    }

    /// Set the maximum tree depth (root = 1). `None` means unlimited.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.params.max_depth = max_depth;
        self
    }

    /// Set the minimum number of samples required to attempt a split.
    #[must_use]
    pub fn with_min_samples_split(mut self, min_samples_split: usize) -> Self {
        self.params.min_samples_split = min_samples_split;
        self
    }

    /// Set the minimum number of samples required in each leaf after a split.
    #[must_use]
    pub fn with_min_samples_leaf(mut self, min_samples_leaf: usize) -> Self {
        self.params.min_samples_leaf = min_samples_leaf;
        self
    }

    /// Set how many random reference pairs each node tries.
    #[must_use]
    pub fn with_n_directions(mut self, n_directions: usize) -> Self {
        self.params.n_directions = n_directions;
        self
    }

    /// Enable or disable bootstrap sampling of each tree's training set.
    #[must_use]
    pub fn with_bootstrap(mut self, bootstrap: bool) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    /// Set the number of flat clusters cut from the hierarchy.
    #[must_use]
    pub fn with_n_clusters(mut self, n_clusters: usize) -> Self {
        self.n_clusters = n_clusters;
        self
    }

    /// Run on a dedicated pool of `n_jobs` threads (`None` = global pool).
    #[must_use]
    pub fn with_n_jobs(mut self, n_jobs: Option<usize>) -> Self {
        self.n_jobs = n_jobs;
        self
    }

    /// Set the random seed for reproducibility.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    // --- Getters ---

    /// Return the number of trees.
    #[must_use]
    pub fn n_estimators(&self) -> usize {
        self.n_estimators
    }

    /// Return the similarity function.
    #[must_use]
    pub fn similarity(&self) -> &S {
        &self.similarity
    }

    /// Return whether bootstrap sampling is enabled.
    #[must_use]
    pub fn bootstrap(&self) -> bool {
        self.bootstrap
    }

    /// Return the number of flat clusters.
    #[must_use]
    pub fn n_clusters(&self) -> usize {
        self.n_clusters
    }

    /// Return the dedicated thread count, if any.
    #[must_use]
    pub fn n_jobs(&self) -> Option<usize> {
        self.n_jobs
    }

    /// Return the random seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl<S: Similarity + Clone> SimilarityForestClusterConfig<S> {
    /// Grow the cluster trees, build the pairwise distance matrix and
    /// agglomerate it.
    ///
    /// # Errors
    ///
    /// | Variant                                    | When                                   |
    /// |--------------------------------------------|----------------------------------------|
    /// | [`SimForestError::EmptyDataset`]           | `features` is empty                    |
    /// | [`SimForestError::ZeroFeatures`]           | rows have zero feature columns         |
    /// | [`SimForestError::FeatureCountMismatch`]   | rows have inconsistent lengths         |
    /// | [`SimForestError::NonFiniteValue`]         | any value is NaN or infinite           |
    /// | [`SimForestError::InvalidMaxDepth`]        | `max_depth` is `Some(0)`               |
    /// | [`SimForestError::InvalidMinSamplesSplit`] | `min_samples_split` < 2                |
    /// | [`SimForestError::InvalidMinSamplesLeaf`]  | `min_samples_leaf` < 1                 |
    /// | [`SimForestError::InvalidDirectionCount`]  | `n_directions` is zero                 |
    /// | [`SimForestError::InvalidGamma`]           | an RBF gamma is not finite and positive |
    /// | [`SimForestError::InvalidJobCount`]        | `n_jobs` is `Some(0)`                  |
    /// | [`SimForestError::InvalidClusterCount`]    | `n_clusters` is zero or above n        |
    /// | [`SimForestError::ThreadPool`]             | the dedicated pool cannot be built     |
    #[instrument(skip_all, fields(n_estimators = self.n_estimators, n_samples = features.len()))]
    pub fn fit(&self, features: &[Vec<f64>]) -> Result<ForestClusterResult<S>, SimForestError> {
        let n_features = validate_features(features)?;
        self.params.validate()?;
        self.similarity.validate()?;
        if self.n_jobs == Some(0) {
            return Err(SimForestError::InvalidJobCount { n_jobs: 0 });
        }
        let n = features.len();
        ClusterCut::NClusters(self.n_clusters).validate(n)?;

        info!(
            n_estimators = self.n_estimators,
            n_samples = n,
            n_features,
            bootstrap = self.bootstrap,
            "training similarity forest clustering"
        );

        let (trees, shared) = with_pool(self.n_jobs, || {
            let trees: Vec<SimilarityTree<S>> = (0..self.n_estimators)
                .into_par_iter()
                .map(|t| self.grow_tree(features, n_features, t))
                .collect();
            let shared = (0..trees.len())
                .into_par_iter()
                .fold(
                    || vec![vec![0.0f64; n]; n],
                    |mut acc, t| {
                        add_shared_depths(&trees[t], features, &mut acc);
                        acc
                    },
                )
                .reduce(
                    || vec![vec![0.0f64; n]; n],
                    |mut a, b| {
                        for (row_a, row_b) in a.iter_mut().zip(&b) {
                            for (x, y) in row_a.iter_mut().zip(row_b) {
                                *x += y;
                            }
                        }
                        a
                    },
                );
            (trees, shared)
        })?;

        let distances = shared_to_distances(&shared, self.n_estimators);
        let linkage = average_linkage(&distances);
        let labels = linkage.fcluster(self.n_clusters)?;

        info!(
            n_merges = linkage.rows().len(),
            n_clusters = self.n_clusters,
            "forest clustering complete"
        );

        Ok(ForestClusterResult {
            trees,
            distances,
            linkage,
            labels,
        })
    }

    /// Fit and return only the flat labels.
    ///
    /// # Errors
    ///
    /// Same as [`fit`](Self::fit).
    pub fn fit_predict(&self, features: &[Vec<f64>]) -> Result<Vec<ClusterLabel>, SimForestError> {
        Ok(self.fit(features)?.labels)
    }

    fn grow_tree(&self, features: &[Vec<f64>], n_features: usize, t: usize) -> SimilarityTree<S> {
        let mut rng = tree_rng(self.seed, t);
        let (indices, _) = bootstrap_sample(features.len(), self.bootstrap, &mut rng);
        let grown = grow(
            features,
            Target::Unsupervised,
            indices,
            &self.similarity,
            &self.params,
            &mut rng,
        );
        let tree = SimilarityTree::from_nodes(
            grown.nodes,
            self.similarity.clone(),
            n_features,
            Task::Clustering,
        );
        debug!(
            tree = t,
            n_nodes = tree.n_nodes(),
            depth = tree.depth(),
            "cluster tree grown"
        );
        tree
    }
}

/// Add, for every pair, the number of nodes shared by their paths in `tree`.
fn add_shared_depths<S: Similarity>(
    tree: &SimilarityTree<S>,
    features: &[Vec<f64>],
    acc: &mut [Vec<f64>],
) {
    let paths: Vec<Vec<NodeId>> = features.iter().map(|x| tree.path(x)).collect();
    for i in 0..paths.len() {
        for j in i..paths.len() {
            let common = paths[i]
                .iter()
                .zip(&paths[j])
                .take_while(|(a, b)| a == b)
                .count() as f64;
            acc[i][j] += common;
            if i != j {
                acc[j][i] += common;
            }
        }
    }
}

/// Mean shared depth over trees, inverted into a distance. The root is
/// always shared, so off-diagonal similarities are at least 1.
fn shared_to_distances(shared: &[Vec<f64>], n_trees: usize) -> Vec<Vec<f64>> {
    let n_trees = n_trees as f64;
    shared
        .iter()
        .enumerate()
        .map(|(i, row)| {
            row.iter()
                .enumerate()
                .map(|(j, &s)| if i == j { 0.0 } else { n_trees / s })
                .collect()
        })
        .collect()
}

/// Result of Similarity Forest clustering.
#[derive(Debug, Clone)]
pub struct ForestClusterResult<S = Kernel> {
    trees: Vec<SimilarityTree<S>>,
    distances: Vec<Vec<f64>>,
    linkage: Linkage,
    labels: Vec<ClusterLabel>,
}

impl<S> ForestClusterResult<S> {
    /// Borrow the fitted cluster trees.
    #[must_use]
    pub fn trees(&self) -> &[SimilarityTree<S>] {
        &self.trees
    }

    /// Return the pairwise distance matrix (zero diagonal).
    #[must_use]
    pub fn distances(&self) -> &[Vec<f64>] {
        &self.distances
    }

    /// Borrow the average-linkage hierarchy.
    #[must_use]
    pub fn linkage(&self) -> &Linkage {
        &self.linkage
    }

    /// Return the flat labels.
    #[must_use]
    pub fn labels(&self) -> &[ClusterLabel] {
        &self.labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_blobs() -> Vec<Vec<f64>> {
        let mut features = Vec::new();
        for cx in [0.0, 20.0] {
            for i in 0..6 {
                features.push(vec![cx + f64::from(i) * 0.2, f64::from(i % 3) * 0.2]);
            }
        }
        features
    }

    fn config() -> SimilarityForestClusterConfig {
        SimilarityForestClusterConfig::new(8)
            .unwrap()
            .with_similarity(Kernel::NegSquaredEuclidean)
            .with_n_directions(3)
    }

    #[test]
    fn zero_estimators_rejected() {
        assert!(matches!(
            SimilarityForestClusterConfig::new(0),
            Err(SimForestError::InvalidEstimatorCount { n_estimators: 0 })
        ));
    }

    #[test]
    fn distance_matrix_is_symmetric_with_zero_diagonal() {
        let features = two_blobs();
        let result = config().fit(&features).unwrap();
        let d = result.distances();
        for i in 0..d.len() {
            assert_eq!(d[i][i], 0.0);
            for j in 0..d.len() {
                assert_eq!(d[i][j], d[j][i]);
                if i != j {
                    assert!(d[i][j] > 0.0 && d[i][j] <= 1.0);
                }
            }
        }
    }

    #[test]
    fn separated_blobs_get_separate_labels() {
        let features = two_blobs();
        let result = config().fit(&features).unwrap();
        let labels = result.labels();
        assert!(labels[..6].iter().all(|&l| l == labels[0]));
        assert!(labels[6..].iter().all(|&l| l == labels[6]));
        assert_ne!(labels[0], labels[6]);
        assert_eq!(result.linkage().rows().len(), features.len() - 1);
        assert_eq!(result.trees().len(), 8);
    }

    #[test]
    fn thread_count_does_not_change_result() {
        let features = two_blobs();
        let a = config().with_n_jobs(Some(1)).fit(&features).unwrap();
        let b = config().with_n_jobs(Some(3)).fit(&features).unwrap();
        assert_eq!(a.distances(), b.distances());
        assert_eq!(a.linkage(), b.linkage());
    }

    #[test]
    fn invalid_cluster_count_rejected() {
        let features = two_blobs();
        assert!(matches!(
            config().with_n_clusters(0).fit(&features),
            Err(SimForestError::InvalidClusterCount { n_clusters: 0, .. })
        ));
        assert!(matches!(
            config().with_n_jobs(Some(0)).fit(&features),
            Err(SimForestError::InvalidJobCount { n_jobs: 0 })
        ));
    }
}
