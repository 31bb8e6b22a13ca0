use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, instrument};

use crate::{
    SimForestError,
    criterion::{Criterion, centered_variance},
    node::{Impurity, LeafValue, Node, NodeId},
    similarity::{Kernel, Similarity},
    split::{feature_spread, find_best_split},
    task::{Prediction, Target, Task},
    validate::{check_sample, validate_features, validate_labels, validate_targets},
};

/// Growth limits shared by trees, forests and the clustering variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TreeParams {
    pub(crate) max_depth: Option<usize>,
    pub(crate) min_samples_split: usize,
    pub(crate) min_samples_leaf: usize,
    pub(crate) n_directions: usize,
}

impl TreeParams {
    pub(crate) fn new() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            n_directions: 1,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), SimForestError> {
        if let Some(d) = self.max_depth
            && d == 0
        {
            return Err(SimForestError::InvalidMaxDepth { max_depth: 0 });
        }
        if self.min_samples_split < 2 {
            return Err(SimForestError::InvalidMinSamplesSplit {
                min_samples_split: self.min_samples_split,
            });
        }
        if self.min_samples_leaf < 1 {
            return Err(SimForestError::InvalidMinSamplesLeaf {
                min_samples_leaf: self.min_samples_leaf,
            });
        }
        if self.n_directions < 1 {
            return Err(SimForestError::InvalidDirectionCount {
                n_directions: self.n_directions,
            });
        }
        Ok(())
    }
}

/// Resolve the criterion for a task: an explicit choice, or the task default.
pub(crate) fn classification_target<'a>(
    labels: &'a [usize],
    n_classes: usize,
    criterion: Option<Criterion>,
) -> Result<Target<'a>, SimForestError> {
    Target::classes(labels, n_classes, criterion.unwrap_or(Criterion::Gini))
}

pub(crate) fn regression_target(
    targets: &[f64],
    criterion: Option<Criterion>,
) -> Result<Target<'_>, SimForestError> {
    Target::values(targets, criterion.unwrap_or(Criterion::Variance))
}

/// Configuration for a single similarity tree.
///
/// Construct via [`SimilarityTreeConfig::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter           | Default                                   |
/// |---------------------|-------------------------------------------|
/// | `similarity`        | [`Kernel::Dot`]                           |
/// | `criterion`         | `None` (Gini to classify, Variance to regress) |
/// | `max_depth`         | `None` (unlimited)                        |
/// | `min_samples_split` | 2                                         |
/// | `min_samples_leaf`  | 1                                         |
/// | `n_directions`      | 1                                         |
/// | `seed`              | 42                                        |
#[derive(Debug, Clone)]
pub struct SimilarityTreeConfig<S = Kernel> {
    pub(crate) similarity: S,
    pub(crate) criterion: Option<Criterion>,
    pub(crate) params: TreeParams,
    pub(crate) seed: u64,
}

impl SimilarityTreeConfig {
    /// Create a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            similarity: Kernel::Dot,
            criterion: None,
            params: TreeParams::new(),
            seed: 42,
        }
    }
}

impl Default for SimilarityTreeConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> SimilarityTreeConfig<S> {
    /// Replace the similarity function.
    #[must_use]
    pub fn with_similarity<T: Similarity>(self, similarity: T) -> SimilarityTreeConfig<T> {
        SimilarityTreeConfig {
            similarity,
            criterion: self.criterion,
            params: self.params,
            seed: self.seed,
        }
    }

    /// Set the split quality criterion.
    #[must_use]
    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = Some(criterion);
        self
    }

    /// Set the maximum tree depth. The root is at depth 1; `None` means unlimited.
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

    /// Set how many random reference pairs are tried at each node.
    #[must_use]
    pub fn with_n_directions(mut self, n_directions: usize) -> Self {
        self.params.n_directions = n_directions;
        self
    }

    /// Set the random seed for reproducibility.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    // --- Getters ---

    /// Return the similarity function.
    #[must_use]
    pub fn similarity(&self) -> &S {
        &self.similarity
    }

    /// Return the explicitly configured criterion, if any.
    #[must_use]
    pub fn criterion(&self) -> Option<Criterion> {
        self.criterion
    }

    /// Return the maximum depth limit, if any.
    #[must_use]
    pub fn max_depth(&self) -> Option<usize> {
        self.params.max_depth
    }

    /// Return the minimum samples required to split a node.
    #[must_use]
    pub fn min_samples_split(&self) -> usize {
        self.params.min_samples_split
    }

    /// Return the minimum samples required in each leaf.
    #[must_use]
    pub fn min_samples_leaf(&self) -> usize {
        self.params.min_samples_leaf
    }

    /// Return the number of reference pairs tried per node.
    #[must_use]
    pub fn n_directions(&self) -> usize {
        self.params.n_directions
    }

    /// Return the random seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl<S: Similarity + Clone> SimilarityTreeConfig<S> {
    /// Fit a classification tree on the provided row-major dataset.
    ///
    /// `features[sample_idx][feature_idx]`, row-major.
    /// `labels[sample_idx]`: zero-based class labels.
    ///
    /// # Errors
    ///
    /// | Variant                                       | When                                        |
    /// |-----------------------------------------------|---------------------------------------------|
    /// | [`SimForestError::EmptyDataset`]              | `features` is empty                         |
    /// | [`SimForestError::ZeroFeatures`]              | rows have zero feature columns              |
    /// | [`SimForestError::FeatureCountMismatch`]      | rows have inconsistent lengths              |
    /// | [`SimForestError::NonFiniteValue`]            | any feature is NaN or infinite              |
    /// | [`SimForestError::TargetCountMismatch`]       | `labels.len() != features.len()`            |
    /// | [`SimForestError::LabelOutOfRange`]           | a label is not below `features.len()`       |
    /// | [`SimForestError::IncompatibleCriterion`]     | criterion is `Variance`                     |
    /// | [`SimForestError::InvalidMaxDepth`]           | `max_depth` is `Some(0)`                    |
    /// | [`SimForestError::InvalidMinSamplesSplit`]    | `min_samples_split` < 2                     |
    /// | [`SimForestError::InvalidMinSamplesLeaf`]     | `min_samples_leaf` < 1                      |
    /// | [`SimForestError::InvalidDirectionCount`]     | `n_directions` is zero                      |
    /// | [`SimForestError::InvalidGamma`]              | an RBF kernel's gamma is not finite and positive |
    #[instrument(skip_all, fields(n_samples = features.len()))]
    pub fn fit_classifier(
        &self,
        features: &[Vec<f64>],
        labels: &[usize],
    ) -> Result<SimilarityTree<S>, SimForestError> {
        let n_features = validate_features(features)?;
        let n_classes = validate_labels(labels, features.len())?;
        let target = classification_target(labels, n_classes, self.criterion)?;
        self.params.validate()?;
        self.similarity.validate()?;
        Ok(self.fit_target(features, target, n_features))
    }

    /// Fit a regression tree on the provided row-major dataset.
    ///
    /// # Errors
    ///
    /// Same as [`fit_classifier`](Self::fit_classifier), except that
    /// [`SimForestError::IncompatibleCriterion`] is returned for `Gini` and
    /// `Entropy`, and [`SimForestError::NonFiniteTarget`] for a NaN or
    /// infinite target.
    #[instrument(skip_all, fields(n_samples = features.len()))]
    pub fn fit_regressor(
        &self,
        features: &[Vec<f64>],
        targets: &[f64],
    ) -> Result<SimilarityTree<S>, SimForestError> {
        let n_features = validate_features(features)?;
        validate_targets(targets, features.len())?;
        let target = regression_target(targets, self.criterion)?;
        self.params.validate()?;
        self.similarity.validate()?;
        Ok(self.fit_target(features, target, n_features))
    }

    fn fit_target(&self, features: &[Vec<f64>], target: Target<'_>, n_features: usize) -> SimilarityTree<S> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let indices: Vec<usize> = (0..features.len()).collect();
        let grown = grow(features, target, indices, &self.similarity, &self.params, &mut rng);
        let tree = SimilarityTree::from_nodes(grown.nodes, self.similarity.clone(), n_features, target.task());
        debug!(
            n_nodes = tree.n_nodes(),
            n_leaves = tree.n_leaves(),
            depth = tree.depth(),
            "similarity tree built"
        );
        tree
    }
}

/// Output of one induction run.
pub(crate) struct Grown {
    pub(crate) nodes: Vec<Node>,
    /// Training samples (with bootstrap repeats) of every leaf, in leaf creation order.
    pub(crate) leaf_samples: Vec<(NodeId, Vec<usize>)>,
}

/// Grow a tree over `indices` (positions into `features`, repeats allowed).
pub(crate) fn grow<S: Similarity + ?Sized, R: Rng>(
    features: &[Vec<f64>],
    target: Target<'_>,
    indices: Vec<usize>,
    similarity: &S,
    params: &TreeParams,
    rng: &mut R,
) -> Grown {
    let mut grower = Grower {
        features,
        target,
        similarity,
        params,
        n_total: indices.len(),
        rng,
        nodes: Vec::new(),
        leaf_samples: Vec::new(),
    };
    grower.grow_node(indices, 1);
    Grown {
        nodes: grower.nodes,
        leaf_samples: grower.leaf_samples,
    }
}

struct Grower<'a, S: ?Sized, R> {
    features: &'a [Vec<f64>],
    target: Target<'a>,
    similarity: &'a S,
    params: &'a TreeParams,
    n_total: usize,
    rng: &'a mut R,
    nodes: Vec<Node>,
    leaf_samples: Vec<(NodeId, Vec<usize>)>,
}

impl<S: Similarity + ?Sized, R: Rng> Grower<'_, S, R> {
    fn grow_node(&mut self, indices: Vec<usize>, depth: usize) -> NodeId {
        let n_samples = indices.len();
        let impurity = self.impurity(&indices);

        // Stopping conditions → leaf.
        let depth_reached = self.params.max_depth.is_some_and(|max_d| depth >= max_d);
        let too_few = n_samples < self.params.min_samples_split;
        if depth_reached || too_few || self.is_constant(&indices) {
            return self.make_leaf(indices, depth, impurity);
        }

        let Some(split) = find_best_split(
            self.features,
            &self.target,
            &indices,
            self.n_total,
            self.similarity,
            self.params.n_directions,
            self.params.min_samples_leaf,
            &mut *self.rng,
        ) else {
            return self.make_leaf(indices, depth, impurity);
        };
        drop(indices);

        // Arena pattern: reserve the id, recurse, then overwrite with the split.
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(Node::Leaf {
            id,
            depth,
            value: LeafValue::Cluster(0),
            impurity,
            n_samples,
        });

        let left = self.grow_node(split.left_indices, depth + 1);
        let right = self.grow_node(split.right_indices, depth + 1);

        self.nodes[id.index()] = Node::Split {
            id,
            depth,
            direction: split.direction,
            threshold: split.threshold,
            left,
            right,
            impurity,
            n_samples,
            impurity_decrease: split.improvement,
        };
        id
    }

    fn impurity(&self, indices: &[usize]) -> Impurity {
        let value = match self.target {
            Target::Classes {
                labels,
                n_classes,
                criterion,
            } => criterion.impurity(&class_counts(labels, n_classes, indices), indices.len()).value(),
            Target::Values { values } => centered_variance(indices.iter().map(|&si| values[si])),
            Target::Unsupervised => feature_spread(self.features, indices),
        };
        Impurity::new(value)
    }

    fn is_constant(&self, indices: &[usize]) -> bool {
        let Some(&first) = indices.first() else {
            return true;
        };
        match self.target {
            Target::Classes { labels, .. } => indices.iter().all(|&si| labels[si] == labels[first]),
            Target::Values { values } => indices.iter().all(|&si| values[si] == values[first]),
            Target::Unsupervised => false,
        }
    }

    fn make_leaf(&mut self, indices: Vec<usize>, depth: usize, impurity: Impurity) -> NodeId {
        let n_samples = indices.len();
        let value = match self.target {
            Target::Classes {
                labels, n_classes, ..
            } => {
                let counts = class_counts(labels, n_classes, &indices);
                let total = n_samples as f64;
                LeafValue::Class {
                    class: first_argmax(&counts),
                    distribution: counts.iter().map(|&c| c as f64 / total).collect(),
                }
            }
            Target::Values { values } => {
                LeafValue::Mean(indices.iter().map(|&si| values[si]).sum::<f64>() / n_samples as f64)
            }
            Target::Unsupervised => LeafValue::Cluster(self.leaf_samples.len()),
        };
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(Node::Leaf {
            id,
            depth,
            value,
            impurity,
            n_samples,
        });
        self.leaf_samples.push((id, indices));
        id
    }
}

fn class_counts(labels: &[usize], n_classes: usize, indices: &[usize]) -> Vec<usize> {
    let mut counts = vec![0usize; n_classes];
    for &si in indices {
        counts[labels[si]] += 1;
    }
    counts
}

/// Index of the largest count; the lowest index wins ties.
pub(crate) fn first_argmax<T: PartialOrd + Copy>(counts: &[T]) -> usize {
    let mut best = 0;
    for (i, &c) in counts.iter().enumerate().skip(1) {
        if c > counts[best] {
            best = i;
        }
    }
    best
}

/// A fitted similarity tree.
///
/// Stored as an arena-based `Vec<Node>` indexed by [`NodeId`]; the root is
/// node 0.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SimilarityTree<S = Kernel> {
    pub(crate) nodes: Vec<Node>,
    pub(crate) similarity: S,
    pub(crate) n_features: usize,
    pub(crate) task: Task,
}

impl<S> SimilarityTree<S> {
    pub(crate) fn from_nodes(nodes: Vec<Node>, similarity: S, n_features: usize, task: Task) -> Self {
        Self {
            nodes,
            similarity,
            n_features,
            task,
        }
    }

    /// Return the task this tree was fitted for.
    #[must_use]
    pub fn task(&self) -> Task {
        self.task
    }

    /// Return the number of features seen during fit.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Return the similarity function.
    #[must_use]
    pub fn similarity(&self) -> &S {
        &self.similarity
    }

    /// Return all nodes in id order.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Return the node with the given id.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not belong to this tree.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    /// Return the total number of nodes in the tree (both splits and leaves).
    #[must_use]
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Return the number of leaf nodes.
    #[must_use]
    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Return the depth of the deepest leaf. A single-leaf tree has depth 1.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| n.is_leaf())
            .map(Node::depth)
            .max()
            .unwrap_or(0)
    }
}

impl<S: Similarity> SimilarityTree<S> {
    /// Predict a single sample: class, regression value or cluster id.
    ///
    /// # Errors
    ///
    /// Returns [`SimForestError::PredictionFeatureMismatch`] when `sample.len() != n_features`
    /// and [`SimForestError::NonFinitePredictionValue`] when a value is NaN or infinite.
    pub fn predict(&self, sample: &[f64]) -> Result<Prediction, SimForestError> {
        check_sample(sample, self.n_features)?;
        Ok(self.predict_unchecked(sample))
    }

    /// Return the class distribution of the leaf `sample` falls into.
    ///
    /// # Errors
    ///
    /// | Variant                                        | When                              |
    /// |------------------------------------------------|-----------------------------------|
    /// | [`SimForestError::NotAClassifier`]             | the tree is not a classifier      |
    /// | [`SimForestError::PredictionFeatureMismatch`]  | `sample.len() != n_features`      |
    /// | [`SimForestError::NonFinitePredictionValue`]   | a value is NaN or infinite        |
    pub fn predict_proba(&self, sample: &[f64]) -> Result<Vec<f64>, SimForestError> {
        if self.task.n_classes().is_none() {
            return Err(SimForestError::NotAClassifier {
                operation: "predict_proba",
            });
        }
        check_sample(sample, self.n_features)?;
        match self.leaf_value(sample) {
            LeafValue::Class { distribution, .. } => Ok(distribution.clone()),
            _ => Err(SimForestError::NotAClassifier {
                operation: "predict_proba",
            }),
        }
    }

    /// Return the id of the leaf `sample` falls into.
    ///
    /// # Errors
    ///
    /// Returns [`SimForestError::PredictionFeatureMismatch`] when `sample.len() != n_features`
    /// and [`SimForestError::NonFinitePredictionValue`] when a value is NaN or infinite.
    pub fn apply(&self, sample: &[f64]) -> Result<NodeId, SimForestError> {
        check_sample(sample, self.n_features)?;
        Ok(self.leaf_id(sample))
    }

    /// Return the ids of every node visited from the root to `sample`'s leaf.
    ///
    /// # Errors
    ///
    /// Returns [`SimForestError::PredictionFeatureMismatch`] when `sample.len() != n_features`
    /// and [`SimForestError::NonFinitePredictionValue`] when a value is NaN or infinite.
    pub fn decision_path(&self, sample: &[f64]) -> Result<Vec<NodeId>, SimForestError> {
        check_sample(sample, self.n_features)?;
        Ok(self.path(sample))
    }

    pub(crate) fn predict_unchecked(&self, sample: &[f64]) -> Prediction {
        match self.leaf_value(sample) {
            LeafValue::Class { class, .. } => Prediction::Class(*class),
            LeafValue::Mean(v) => Prediction::Value(*v),
            LeafValue::Cluster(c) => Prediction::Cluster(*c),
        }
    }

    pub(crate) fn leaf_value(&self, sample: &[f64]) -> &LeafValue {
        match &self.nodes[self.leaf_id(sample).index()] {
            Node::Leaf { value, .. } => value,
            Node::Split { .. } => unreachable!("traversal always ends at a leaf"),
        }
    }

    /// Traverse from the root and return the id of the leaf reached.
    pub(crate) fn leaf_id(&self, sample: &[f64]) -> NodeId {
        let mut id = NodeId::new(0);
        while let Some(next) = self.step(id, sample) {
            id = next;
        }
        id
    }

    pub(crate) fn path(&self, sample: &[f64]) -> Vec<NodeId> {
        let mut id = NodeId::new(0);
        let mut path = vec![id];
        while let Some(next) = self.step(id, sample) {
            path.push(next);
            id = next;
        }
        path
    }

    fn step(&self, id: NodeId, sample: &[f64]) -> Option<NodeId> {
        match &self.nodes[id.index()] {
            Node::Leaf { .. } => None,
            Node::Split {
                direction,
                threshold,
                left,
                right,
                ..
            } => {
                if direction.project(&self.similarity, sample) <= *threshold {
                    Some(*left)
                } else {
                    Some(*right)
                }
            }
        }
    }
}
