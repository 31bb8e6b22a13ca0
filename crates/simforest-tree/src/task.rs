//! Learning tasks: what a tree is fitted against and what it predicts.

use crate::criterion::Criterion;
use crate::error::SimForestError;

/// The kind of model a fitted tree or forest is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Task {
    /// Class labels `0..n_classes`.
    Classification {
        /// Number of classes seen during fit (max label + 1).
        n_classes: usize,
    },
    /// Real-valued targets.
    Regression,
    /// No target; leaves are clusters.
    Clustering,
}

impl Task {
    /// Return the class count for classification tasks.
    #[must_use]
    pub fn n_classes(&self) -> Option<usize> {
        match self {
            Task::Classification { n_classes } => Some(*n_classes),
            _ => None,
        }
    }
}

/// Training outcomes borrowed from the caller.
#[derive(Debug, Clone, Copy)]
pub enum Outcomes<'a> {
    /// Zero-based class labels.
    Classes(&'a [usize]),
    /// Real-valued regression targets.
    Values(&'a [f64]),
}

impl Outcomes<'_> {
    /// Return the number of outcomes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Outcomes::Classes(labels) => labels.len(),
            Outcomes::Values(values) => values.len(),
        }
    }

    /// Return `true` when there are no outcomes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Tagged induction target: selects the split criterion and the leaf-value
/// strategy of the shared induction core.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Target<'a> {
    /// Majority-class leaves scored by Gini or entropy.
    Classes {
        labels: &'a [usize],
        n_classes: usize,
        criterion: Criterion,
    },
    /// Mean leaves scored by variance reduction.
    Values { values: &'a [f64] },
    /// Cluster-id leaves scored by projection variance reduction.
    Unsupervised,
}

impl<'a> Target<'a> {
    /// Build a classification target, rejecting non-classification criteria.
    pub(crate) fn classes(
        labels: &'a [usize],
        n_classes: usize,
        criterion: Criterion,
    ) -> Result<Self, SimForestError> {
        if !criterion.is_classification() {
            return Err(SimForestError::IncompatibleCriterion {
                criterion,
                task: "classification",
            });
        }
        Ok(Target::Classes {
            labels,
            n_classes,
            criterion,
        })
    }

    /// Build a regression target, rejecting classification criteria.
    pub(crate) fn values(values: &'a [f64], criterion: Criterion) -> Result<Self, SimForestError> {
        if criterion != Criterion::Variance {
            return Err(SimForestError::IncompatibleCriterion {
                criterion,
                task: "regression",
            });
        }
        Ok(Target::Values { values })
    }

    pub(crate) fn task(&self) -> Task {
        match self {
            Target::Classes { n_classes, .. } => Task::Classification {
                n_classes: *n_classes,
            },
            Target::Values { .. } => Task::Regression,
            Target::Unsupervised => Task::Clustering,
        }
    }
}

/// A single prediction from a tree or forest.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Prediction {
    /// Predicted class label.
    Class(usize),
    /// Predicted regression value.
    Value(f64),
    /// Tree-local cluster id.
    Cluster(usize),
}

impl Prediction {
    /// Return the class label, if this is a classification prediction.
    #[must_use]
    pub fn class(self) -> Option<usize> {
        match self {
            Prediction::Class(c) => Some(c),
            _ => None,
        }
    }

    /// Return the prediction as a number: the value, or the label/cluster id as `f64`.
    #[must_use]
    pub fn as_f64(self) -> f64 {
        match self {
            Prediction::Class(c) | Prediction::Cluster(c) => c as f64,
            Prediction::Value(v) => v,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_rejects_variance() {
        let err = Target::classes(&[0, 1], 2, Criterion::Variance).unwrap_err();
        assert!(matches!(err, SimForestError::IncompatibleCriterion { .. }));
    }

    #[test]
    fn values_rejects_gini() {
        let err = Target::values(&[1.0], Criterion::Gini).unwrap_err();
        assert!(matches!(
            err,
            SimForestError::IncompatibleCriterion { task: "regression", .. }
        ));
    }

    #[test]
    fn target_task_kind() {
        let t = Target::classes(&[0, 2], 3, Criterion::Entropy).unwrap();
        assert_eq!(t.task(), Task::Classification { n_classes: 3 });
        assert_eq!(t.task().n_classes(), Some(3));
        assert_eq!(Target::Unsupervised.task(), Task::Clustering);
    }

    #[test]
    fn prediction_accessors() {
        assert_eq!(Prediction::Class(2).class(), Some(2));
        assert_eq!(Prediction::Value(1.5).class(), None);
        assert!((Prediction::Value(1.5).as_f64() - 1.5).abs() < f64::EPSILON);
        assert!((Prediction::Cluster(3).as_f64() - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn outcomes_len() {
        assert_eq!(Outcomes::Classes(&[0, 1, 1]).len(), 3);
        assert!(Outcomes::Values(&[]).is_empty());
    }
}
