//! Divisive clustering with a single similarity tree.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{info, instrument};

use crate::error::SimForestError;
use crate::label::{ClusterLabel, relabel_by_first_appearance};
use crate::linkage::Linkage;
use crate::node::{Node, NodeId};
use crate::similarity::{Kernel, Similarity};
use crate::task::{Target, Task};
use crate::tree::{SimilarityTree, TreeParams, grow};
use crate::validate::validate_features;

/// How a merge hierarchy is turned into flat labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterCut {
    /// Exactly this many clusters, by undoing the top merges of the linkage.
    NClusters(usize),
    /// One cluster per tree node at this depth (root = 1); points in
    /// shallower leaves keep their leaf.
    Depth(usize),
}

impl Default for ClusterCut {
    fn default() -> Self {
        ClusterCut::NClusters(2)
    }
}

impl ClusterCut {
    pub(crate) fn validate(self, n_points: usize) -> Result<(), SimForestError> {
        match self {
            ClusterCut::NClusters(k) if k == 0 || k > n_points => {
                Err(SimForestError::InvalidClusterCount {
                    n_clusters: k,
                    n_points,
                })
            }
            ClusterCut::Depth(0) => Err(SimForestError::InvalidCutDepth { depth: 0 }),
            _ => Ok(()),
        }
    }
}

/// Configuration for similarity-tree clustering.
///
/// Construct via [`SimilarityClusterConfig::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter           | Default            |
/// |---------------------|--------------------|
/// | `similarity`        | [`Kernel::Dot`]    |
/// | `max_depth`         | `None`             |
/// | `min_samples_split` | 2                  |
/// | `min_samples_leaf`  | 1                  |
/// | `n_directions`      | 1                  |
/// | `cut`               | `NClusters(2)`     |
/// | `seed`              | 42                 |
#[derive(Debug, Clone)]
pub struct SimilarityClusterConfig<S = Kernel> {
    pub(crate) similarity: S,
    pub(crate) params: TreeParams,
    pub(crate) cut: ClusterCut,
    pub(crate) seed: u64,
}

impl SimilarityClusterConfig {
    /// Create a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            similarity: Kernel::Dot,
            params: TreeParams::new(),
            cut: ClusterCut::default(),
            seed: 42,
        }
    }
}

impl Default for SimilarityClusterConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> SimilarityClusterConfig<S> {
    /// Replace the similarity function.
    #[must_use]
    pub fn with_similarity<T: Similarity>(self, similarity: T) -> SimilarityClusterConfig<T> {
        SimilarityClusterConfig {
            similarity,
            params: self.params,
            cut: self.cut,
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

    /// Set how flat labels are cut from the hierarchy.
    #[must_use]
    pub fn with_cut(mut self, cut: ClusterCut) -> Self {
        self.cut = cut;
        self
    }

    /// Set the random seed for reproducibility.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Return the similarity function.
    #[must_use]
    pub fn similarity(&self) -> &S {
        &self.similarity
    }

    /// Return the maximum depth limit, if any.
    #[must_use]
    pub fn max_depth(&self) -> Option<usize> {
        self.params.max_depth
    }

    /// Return the number of reference pairs tried per node.
    #[must_use]
    pub fn n_directions(&self) -> usize {
        self.params.n_directions
    }

    /// Return the flat cut.
    #[must_use]
    pub fn cut(&self) -> ClusterCut {
        self.cut
    }

    /// Return the random seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl<S: Similarity + Clone> SimilarityClusterConfig<S> {
    /// Grow a cluster tree over `features` and derive its linkage and labels.
    ///
    /// # Errors
    ///
    /// | Variant                                    | When                                          |
    /// |--------------------------------------------|-----------------------------------------------|
    /// | [`SimForestError::EmptyDataset`]           | `features` is empty                           |
    /// | [`SimForestError::ZeroFeatures`]           | rows have zero feature columns                |
    /// | [`SimForestError::FeatureCountMismatch`]   | rows have inconsistent lengths                |
    /// | [`SimForestError::NonFiniteValue`]         | any value is NaN or infinite                  |
    /// | [`SimForestError::InvalidMaxDepth`]        | `max_depth` is `Some(0)`                      |
    /// | [`SimForestError::InvalidMinSamplesSplit`] | `min_samples_split` < 2                       |
    /// | [`SimForestError::InvalidMinSamplesLeaf`]  | `min_samples_leaf` < 1                        |
    /// | [`SimForestError::InvalidDirectionCount`]  | `n_directions` is zero                        |
    /// | [`SimForestError::InvalidGamma`]           | an RBF kernel's gamma is not finite and positive |
    /// | [`SimForestError::InvalidClusterCount`]    | `NClusters(k)` with `k` zero or above n       |
    /// | [`SimForestError::InvalidCutDepth`]        | `Depth(0)`                                    |
    #[instrument(skip_all, fields(n_samples = features.len()))]
    pub fn fit(&self, features: &[Vec<f64>]) -> Result<ClusterResult<S>, SimForestError> {
        let n_features = validate_features(features)?;
        self.params.validate()?;
        self.similarity.validate()?;
        self.cut.validate(features.len())?;

        let n = features.len();
        info!(n_samples = n, n_features, "growing cluster tree");

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let grown = grow(
            features,
            Target::Unsupervised,
            (0..n).collect(),
            &self.similarity,
            &self.params,
            &mut rng,
        );

        let linkage = Linkage::from_tree(&grown.nodes, &grown.leaf_samples, n);
        let mut leaves = vec![NodeId::new(0); n];
        for (leaf, samples) in &grown.leaf_samples {
            for &i in samples {
                leaves[i] = *leaf;
            }
        }
        let tree = SimilarityTree::from_nodes(
            grown.nodes,
            self.similarity.clone(),
            n_features,
            Task::Clustering,
        );

        let mut result = ClusterResult {
            tree,
            linkage,
            leaves,
            labels: Vec::new(),
        };
        result.labels = result.cut(self.cut)?;

        info!(
            n_leaves = result.tree.n_leaves(),
            depth = result.tree.depth(),
            n_clusters = result.n_clusters(),
            "cluster tree complete"
        );
        Ok(result)
    }

    /// Fit and return only the flat labels.
    ///
    /// # Errors
    ///
    /// Same as [`fit`](Self::fit).
    pub fn fit_predict(&self, features: &[Vec<f64>]) -> Result<Vec<ClusterLabel>, SimForestError> {
        Ok(self.fit(features)?.labels)
    }
}

/// Result of similarity-tree clustering.
#[derive(Debug, Clone)]
pub struct ClusterResult<S = Kernel> {
    tree: SimilarityTree<S>,
    linkage: Linkage,
    leaves: Vec<NodeId>,
    labels: Vec<ClusterLabel>,
}

impl<S> ClusterResult<S> {
    /// Borrow the fitted cluster tree.
    #[must_use]
    pub fn tree(&self) -> &SimilarityTree<S> {
        &self.tree
    }

    /// Borrow the merge hierarchy.
    #[must_use]
    pub fn linkage(&self) -> &Linkage {
        &self.linkage
    }

    /// Return the flat labels from the configured cut.
    #[must_use]
    pub fn labels(&self) -> &[ClusterLabel] {
        &self.labels
    }

    /// Return the leaf each training point ended in.
    #[must_use]
    pub fn leaves(&self) -> &[NodeId] {
        &self.leaves
    }

    /// Return the number of distinct flat clusters.
    #[must_use]
    pub fn n_clusters(&self) -> usize {
        self.labels.iter().map(|l| l.index() + 1).max().unwrap_or(0)
    }

    /// Return the number of points assigned to each flat cluster.
    #[must_use]
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0usize; self.n_clusters()];
        for label in &self.labels {
            sizes[label.index()] += 1;
        }
        sizes
    }

    /// Return the indices of all points assigned to `label`.
    #[must_use]
    pub fn members(&self, label: ClusterLabel) -> Vec<usize> {
        self.labels
            .iter()
            .enumerate()
            .filter_map(|(i, &l)| if l == label { Some(i) } else { None })
            .collect()
    }

    /// Cut the fitted hierarchy differently without refitting.
    ///
    /// # Errors
    ///
    /// [`SimForestError::InvalidClusterCount`] or
    /// [`SimForestError::InvalidCutDepth`] for an invalid cut.
    pub fn cut(&self, cut: ClusterCut) -> Result<Vec<ClusterLabel>, SimForestError> {
        cut.validate(self.leaves.len())?;
        match cut {
            ClusterCut::NClusters(k) => self.linkage.fcluster(k),
            ClusterCut::Depth(depth) => {
                let parents = parent_ids(self.tree.nodes());
                let keys: Vec<usize> = self
                    .leaves
                    .iter()
                    .map(|&leaf| {
                        let mut id = leaf;
                        while self.tree.node(id).depth() > depth {
                            id = parents[id.index()];
                        }
                        id.index()
                    })
                    .collect();
                Ok(relabel_by_first_appearance(&keys))
            }
        }
    }
}

fn parent_ids(nodes: &[Node]) -> Vec<NodeId> {
    let mut parents = vec![NodeId::new(0); nodes.len()];
    for node in nodes {
        if let Some((l, r)) = node.children() {
            parents[l.index()] = node.id();
            parents[r.index()] = node.id();
        }
    }
    parents
}
