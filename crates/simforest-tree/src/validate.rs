//! Input validation shared by every fit entry point.
//!
//! All checks run before any induction work, so a rejected fit leaves no
//! partial model behind.

use crate::error::SimForestError;

/// Validate a row-major feature matrix and return its feature count.
pub(crate) fn validate_features(features: &[Vec<f64>]) -> Result<usize, SimForestError> {
    if features.is_empty() {
        return Err(SimForestError::EmptyDataset);
    }
    let n_features = features[0].len();
    if n_features == 0 {
        return Err(SimForestError::ZeroFeatures);
    }
    for (sample_index, row) in features.iter().enumerate() {
        if row.len() != n_features {
            return Err(SimForestError::FeatureCountMismatch {
                expected: n_features,
                got: row.len(),
                sample_index,
            });
        }
        for (feature_index, &val) in row.iter().enumerate() {
            if !val.is_finite() {
                return Err(SimForestError::NonFiniteValue {
                    sample_index,
                    feature_index,
                });
            }
        }
    }
    Ok(n_features)
}

/// Validate class labels against the sample count and return the class count.
///
/// Labels are zero-based class indices, so each must be below `n_samples`.
pub(crate) fn validate_labels(labels: &[usize], n_samples: usize) -> Result<usize, SimForestError> {
    if labels.len() != n_samples {
        return Err(SimForestError::TargetCountMismatch {
            n_samples,
            n_targets: labels.len(),
        });
    }
    if let Some((sample_index, &label)) = labels.iter().enumerate().find(|&(_, &l)| l >= n_samples) {
        return Err(SimForestError::LabelOutOfRange {
            label,
            sample_index,
            n_samples,
        });
    }
    Ok(labels.iter().max().map_or(1, |&max| max + 1))
}

/// Validate regression targets against the sample count.
pub(crate) fn validate_targets(targets: &[f64], n_samples: usize) -> Result<(), SimForestError> {
    if targets.len() != n_samples {
        return Err(SimForestError::TargetCountMismatch {
            n_samples,
            n_targets: targets.len(),
        });
    }
    if let Some(sample_index) = targets.iter().position(|t| !t.is_finite()) {
        return Err(SimForestError::NonFiniteTarget { sample_index });
    }
    Ok(())
}

/// Check a prediction input against the fitted feature count.
pub(crate) fn check_sample(sample: &[f64], n_features: usize) -> Result<(), SimForestError> {
    if sample.len() != n_features {
        return Err(SimForestError::PredictionFeatureMismatch {
            expected: n_features,
            got: sample.len(),
        });
    }
    if let Some(feature_index) = sample.iter().position(|v| !v.is_finite()) {
        return Err(SimForestError::NonFinitePredictionValue { feature_index });
    }
    Ok(())
}
