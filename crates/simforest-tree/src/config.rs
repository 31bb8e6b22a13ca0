//! Configuration builder for Similarity Forest training.

use crate::criterion::Criterion;
use crate::error::SimForestError;
use crate::result::ForestResult;
use crate::similarity::{Kernel, Similarity};
use crate::tree::{TreeParams, classification_target, regression_target};
use crate::validate::{validate_features, validate_labels, validate_targets};

/// Whether to compute out-of-bag evaluation during training.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OobMode {
    /// Compute the OOB score and per-sample OOB predictions.
    Enabled,
    /// Skip OOB evaluation.
    Disabled,
}

/// Configuration for Similarity Forest training.
///
/// Construct via [`SimilarityForestConfig::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter            | Default                                        |
/// |----------------------|------------------------------------------------|
/// | `similarity`         | [`Kernel::Dot`]                                |
/// | `criterion`          | `None` (Gini to classify, Variance to regress) |
/// | `max_depth`          | `None`                                         |
/// | `min_samples_split`  | 2                                              |
/// | `min_samples_leaf`   | 1                                              |
/// | `n_directions`       | 1                                              |
/// | `bootstrap`          | `true`                                         |
/// | `oob_mode`           | `Disabled`                                     |
/// | `n_jobs`             | `None` (rayon global pool)                     |
/// | `seed`               | 42                                             |
#[derive(Debug, Clone)]
pub struct SimilarityForestConfig<S = Kernel> {
    pub(crate) n_estimators: usize,
    pub(crate) similarity: S,
    pub(crate) criterion: Option<Criterion>,
    pub(crate) params: TreeParams,
    pub(crate) bootstrap: bool,
    pub(crate) oob_mode: OobMode,
    pub(crate) n_jobs: Option<usize>,
    pub(crate) seed: u64,
}

impl SimilarityForestConfig {
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
            criterion: None,
            params: TreeParams::new(),
            bootstrap: true,
            oob_mode: OobMode::Disabled,
            n_jobs: None,
            seed: 42,
        })
    }
}

impl<S> SimilarityForestConfig<S> {
    // --- Setters ---

    /// Replace the similarity function used by every tree.
    #[must_use]
    pub fn with_similarity<T: Similarity>(self, similarity: T) -> SimilarityForestConfig<T> {
        SimilarityForestConfig {
            n_estimators: self.n_estimators,
            similarity,
            criterion: self.criterion,
            params: self.params,
            bootstrap: self.bootstrap,
            oob_mode: self.oob_mode,
            n_jobs: self.n_jobs,
            seed: self.seed,
        }
    }

    /// Set the split quality criterion.
    #[must_use]
    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = Some(criterion);
        self
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

    /// Enable or disable bootstrap sampling. Without it every tree sees all samples.
    #[must_use]
    pub fn with_bootstrap(mut self, bootstrap: bool) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    /// Set the OOB evaluation mode.
    #[must_use]
    pub fn with_oob_mode(mut self, oob_mode: OobMode) -> Self {
        self.oob_mode = oob_mode;
        self
    }

    /// Set the number of worker threads. `None` uses the rayon global pool.
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

    /// Return whether bootstrap sampling is enabled.
    #[must_use]
    pub fn bootstrap(&self) -> bool {
        self.bootstrap
    }

    /// Return the OOB evaluation mode.
    #[must_use]
    pub fn oob_mode(&self) -> OobMode {
        self.oob_mode
    }

    /// Return the configured thread count, if any.
    #[must_use]
    pub fn n_jobs(&self) -> Option<usize> {
        self.n_jobs
    }

    /// Return the random seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Check the ensemble-level settings shared by every fit entry point.
    pub(crate) fn validate(&self) -> Result<(), SimForestError> {
        self.params.validate()?;
        if self.oob_mode == OobMode::Enabled && !self.bootstrap {
            return Err(SimForestError::OobWithoutBootstrap);
        }
        if self.n_jobs == Some(0) {
            return Err(SimForestError::InvalidJobCount { n_jobs: 0 });
        }
        Ok(())
    }
}

impl<S: Similarity + Clone> SimilarityForestConfig<S> {
    /// Train a classification forest on the provided dataset.
    ///
    /// `features[sample_idx][feature_idx]`, row-major.
    /// `labels[sample_idx]`: zero-based class labels.
    ///
    /// # Errors
    ///
    /// | Variant                                    | When                                            |
    /// |--------------------------------------------|-------------------------------------------------|
    /// | [`SimForestError::EmptyDataset`]           | `features` is empty                             |
    /// | [`SimForestError::ZeroFeatures`]           | rows have zero feature columns                  |
    /// | [`SimForestError::FeatureCountMismatch`]   | rows have inconsistent lengths                  |
    /// | [`SimForestError::NonFiniteValue`]         | any feature is NaN or infinite                  |
    /// | [`SimForestError::TargetCountMismatch`]    | `labels.len() != features.len()`                |
    /// | [`SimForestError::LabelOutOfRange`]        | a label is not below `features.len()`           |
    /// | [`SimForestError::IncompatibleCriterion`]  | criterion is `Variance`                         |
    /// | [`SimForestError::InvalidMaxDepth`]        | `max_depth` is `Some(0)`                        |
    /// | [`SimForestError::InvalidMinSamplesSplit`] | `min_samples_split` < 2                         |
    /// | [`SimForestError::InvalidMinSamplesLeaf`]  | `min_samples_leaf` < 1                          |
    /// | [`SimForestError::InvalidDirectionCount`]  | `n_directions` is zero                          |
    /// | [`SimForestError::InvalidGamma`]           | an RBF kernel's gamma is not finite and positive |
    /// | [`SimForestError::OobWithoutBootstrap`]    | OOB enabled with bootstrap disabled             |
    /// | [`SimForestError::InvalidJobCount`]        | `n_jobs` is `Some(0)`                           |
    /// | [`SimForestError::ThreadPool`]             | the dedicated worker pool could not be built    |
    pub fn fit_classifier(
        &self,
        features: &[Vec<f64>],
        labels: &[usize],
    ) -> Result<ForestResult<S>, SimForestError> {
        let n_features = validate_features(features)?;
        let n_classes = validate_labels(labels, features.len())?;
        let target = classification_target(labels, n_classes, self.criterion)?;
        self.validate()?;
        self.similarity.validate()?;
        crate::forest::train(self, features, target, n_features)
    }

    /// Train a regression forest on the provided dataset.
    ///
    /// # Errors
    ///
    /// Same as [`fit_classifier`](Self::fit_classifier), except that
    /// [`SimForestError::IncompatibleCriterion`] is returned for `Gini` and
    /// `Entropy`, and [`SimForestError::NonFiniteTarget`] for a NaN or
    /// infinite target.
    pub fn fit_regressor(
        &self,
        features: &[Vec<f64>],
        targets: &[f64],
    ) -> Result<ForestResult<S>, SimForestError> {
        let n_features = validate_features(features)?;
        validate_targets(targets, features.len())?;
        let target = regression_target(targets, self.criterion)?;
        self.validate()?;
        self.similarity.validate()?;
        crate::forest::train(self, features, target, n_features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_estimators_rejected() {
        assert!(matches!(
            SimilarityForestConfig::new(0),
            Err(SimForestError::InvalidEstimatorCount { n_estimators: 0 })
        ));
    }

    #[test]
    fn defaults() {
        let config = SimilarityForestConfig::new(10).unwrap();
        assert_eq!(config.n_estimators(), 10);
        assert_eq!(*config.similarity(), Kernel::Dot);
        assert_eq!(config.criterion(), None);
        assert_eq!(config.n_directions(), 1);
        assert!(config.bootstrap());
        assert_eq!(config.oob_mode(), OobMode::Disabled);
        assert_eq!(config.n_jobs(), None);
        assert_eq!(config.seed(), 42);
    }

    #[test]
    fn oob_requires_bootstrap() {
        let err = SimilarityForestConfig::new(3)
            .unwrap()
            .with_bootstrap(false)
            .with_oob_mode(OobMode::Enabled)
            .fit_classifier(&[vec![0.0], vec![1.0]], &[0, 1])
            .unwrap_err();
        assert!(matches!(err, SimForestError::OobWithoutBootstrap));
    }

    #[test]
    fn zero_jobs_rejected() {
        let err = SimilarityForestConfig::new(3)
            .unwrap()
            .with_n_jobs(Some(0))
            .fit_regressor(&[vec![0.0], vec![1.0]], &[0.0, 1.0])
            .unwrap_err();
        assert!(matches!(err, SimForestError::InvalidJobCount { n_jobs: 0 }));
    }

    #[test]
    fn entropy_rejected_for_regression() {
        let err = SimilarityForestConfig::new(3)
            .unwrap()
            .with_criterion(Criterion::Entropy)
            .fit_regressor(&[vec![0.0], vec![1.0]], &[0.0, 1.0])
            .unwrap_err();
        assert!(matches!(
            err,
            SimForestError::IncompatibleCriterion { task: "regression", .. }
        ));
    }
}
