//! Training result types for Similarity Forest.

use crate::error::SimForestError;
use crate::forest::SimilarityForest;
use crate::oob::OobScore;
use crate::perm_importance::{PermutationImportance, compute_permutation_importance};
use crate::similarity::{Kernel, Similarity};
use crate::task::{Outcomes, Task};
use crate::validate::check_sample;

/// Metadata about the training run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TrainingMetadata {
    /// Number of trees trained.
    pub n_estimators: usize,
    /// Number of features in the dataset.
    pub n_features: usize,
    /// Number of training samples.
    pub n_samples: usize,
    /// Task the forest was trained for.
    pub task: Task,
    /// Whether trees were fitted on bootstrap samples.
    pub bootstrap: bool,
    /// Reference pairs tried per node.
    pub n_directions: usize,
}

/// Result of Similarity Forest training.
///
/// Contains the fitted forest (with each tree's bootstrap and OOB indices),
/// the optional OOB score, and training metadata.
#[derive(Debug)]
pub struct ForestResult<S = Kernel> {
    forest: SimilarityForest<S>,
    oob_score: Option<OobScore>,
    metadata: TrainingMetadata,
}

impl<S> ForestResult<S> {
    /// Create a new training result.
    pub(crate) fn new(
        forest: SimilarityForest<S>,
        oob_score: Option<OobScore>,
        metadata: TrainingMetadata,
    ) -> Self {
        Self {
            forest,
            oob_score,
            metadata,
        }
    }

    /// Borrow the fitted forest.
    #[must_use]
    pub fn forest(&self) -> &SimilarityForest<S> {
        &self.forest
    }

    /// Consume the result and return the fitted forest.
    #[must_use]
    pub fn into_forest(self) -> SimilarityForest<S> {
        self.forest
    }

    /// Return the OOB score, if computed.
    #[must_use]
    pub fn oob_score(&self) -> Option<&OobScore> {
        self.oob_score.as_ref()
    }

    /// Return training metadata.
    #[must_use]
    pub fn metadata(&self) -> &TrainingMetadata {
        &self.metadata
    }

    /// Return the per-tree OOB sample indices.
    #[must_use]
    pub fn oob_indices_per_tree(&self) -> Vec<&[usize]> {
        self.forest.trees.iter().map(|bt| bt.oob_indices()).collect()
    }
}

impl<S: Similarity> ForestResult<S> {
    /// Compute permutation feature importance using OOB samples.
    ///
    /// Requires the original training data since it is not stored in the
    /// result. Results are sorted by descending importance.
    ///
    /// # Errors
    ///
    /// | Variant                                        | When                                          |
    /// |------------------------------------------------|-----------------------------------------------|
    /// | [`SimForestError::TargetCountMismatch`]        | `features` is not the training sample count or outcomes differ in length |
    /// | [`SimForestError::PredictionFeatureMismatch`]  | a row has the wrong feature count             |
    /// | [`SimForestError::OutcomeMismatch`]            | labels given for a regressor or values for a classifier |
    pub fn permutation_importances(
        &self,
        features: &[Vec<f64>],
        outcomes: Outcomes<'_>,
        seed: u64,
    ) -> Result<Vec<PermutationImportance>, SimForestError> {
        if features.len() != self.metadata.n_samples {
            return Err(SimForestError::TargetCountMismatch {
                n_samples: self.metadata.n_samples,
                n_targets: features.len(),
            });
        }
        if outcomes.len() != features.len() {
            return Err(SimForestError::TargetCountMismatch {
                n_samples: features.len(),
                n_targets: outcomes.len(),
            });
        }
        for row in features {
            check_sample(row, self.forest.n_features)?;
        }
        match (self.forest.task, outcomes) {
            (Task::Classification { .. }, Outcomes::Classes(_))
            | (Task::Regression, Outcomes::Values(_)) => {}
            (Task::Classification { .. }, Outcomes::Values(_)) => {
                return Err(SimForestError::OutcomeMismatch {
                    task: "classification",
                    outcomes: "real values",
                });
            }
            (_, _) => {
                return Err(SimForestError::OutcomeMismatch {
                    task: "regression",
                    outcomes: "class labels",
                });
            }
        }
        Ok(compute_permutation_importance(&self.forest, features, outcomes, seed))
    }
}
