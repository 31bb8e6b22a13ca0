//! Out-of-bag (OOB) evaluation for Similarity Forest.

use rayon::iter::{IntoParallelIterator, ParallelIterator};

use crate::forest::SimilarityForest;
use crate::similarity::Similarity;
use crate::task::{Outcomes, Task};

/// Out-of-bag evaluation result.
#[derive(Debug, Clone, serde::Serialize)]
pub struct OobScore {
    /// OOB accuracy (classification) or R² (regression). NaN when no sample
    /// was ever out of bag.
    pub score: f64,
    /// Number of samples that had at least one OOB tree.
    pub n_oob_samples: usize,
    /// Per-sample OOB prediction (class label as `f64`, or value). NaN for
    /// samples that were in every bootstrap.
    pub predictions: Vec<f64>,
    /// Per-sample OOB vote fractions for classifiers; rows are NaN for
    /// samples that were in every bootstrap.
    pub decision_function: Option<Vec<Vec<f64>>>,
}

/// Coefficient of determination of `predicted` against `actual`.
///
/// A constant `actual` scores 1.0 when predicted exactly and 0.0 otherwise.
pub(crate) fn r2_score(actual: &[f64], predicted: &[f64]) -> f64 {
    let n = actual.len() as f64;
    let mean = actual.iter().sum::<f64>() / n;
    let ss_tot: f64 = actual.iter().map(|y| (y - mean) * (y - mean)).sum();
    let ss_res: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(y, p)| (y - p) * (y - p))
        .sum();
    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

/// Compute out-of-bag predictions and the OOB score.
///
/// For each sample, only trees where the sample was NOT in the bootstrap
/// are aggregated. Samples with no OOB tree get NaN and are left out of the
/// score.
pub(crate) fn compute_oob<S: Similarity>(
    forest: &SimilarityForest<S>,
    features: &[Vec<f64>],
    outcomes: Outcomes<'_>,
) -> OobScore {
    let n_samples = features.len();

    // For each sample, the trees that never saw it.
    let mut oob_trees: Vec<Vec<usize>> = vec![Vec::new(); n_samples];
    for (tree_idx, bt) in forest.trees.iter().enumerate() {
        for &sample_idx in &bt.oob_indices {
            oob_trees[sample_idx].push(tree_idx);
        }
    }

    let predictions: Vec<f64> = (0..n_samples)
        .into_par_iter()
        .map(|i| {
            let trees = oob_trees[i].iter().map(|&t| &forest.trees[t].tree);
            forest
                .aggregate(trees, &features[i])
                .map_or(f64::NAN, |p| p.as_f64())
        })
        .collect();

    let decision_function = forest.task.n_classes().map(|n_classes| {
        (0..n_samples)
            .into_par_iter()
            .map(|i| {
                if oob_trees[i].is_empty() {
                    return vec![f64::NAN; n_classes];
                }
                let trees = oob_trees[i].iter().map(|&t| &forest.trees[t].tree);
                forest.vote_fractions(trees, &features[i], n_classes)
            })
            .collect()
    });

    let scored: Vec<usize> = (0..n_samples).filter(|&i| !oob_trees[i].is_empty()).collect();
    let n_oob_samples = scored.len();

    let score = if n_oob_samples == 0 {
        f64::NAN
    } else {
        match (forest.task, outcomes) {
            (Task::Classification { .. }, Outcomes::Classes(labels)) => {
                let correct = scored
                    .iter()
                    .filter(|&&i| predictions[i] == labels[i] as f64)
                    .count();
                correct as f64 / n_oob_samples as f64
            }
            (_, Outcomes::Values(values)) => {
                let actual: Vec<f64> = scored.iter().map(|&i| values[i]).collect();
                let predicted: Vec<f64> = scored.iter().map(|&i| predictions[i]).collect();
                r2_score(&actual, &predicted)
            }
            (_, Outcomes::Classes(_)) => f64::NAN,
        }
    };

    OobScore {
        score,
        n_oob_samples,
        predictions,
        decision_function,
    }
}

#[cfg(test)]
mod tests {
    use super::r2_score;
    use crate::config::{OobMode, SimilarityForestConfig};

    #[test]
    fn r2_perfect_and_mean() {
        assert!((r2_score(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]) - 1.0).abs() < 1e-12);
        assert!(r2_score(&[1.0, 2.0, 3.0], &[2.0, 2.0, 2.0]).abs() < 1e-12);
    }

    #[test]
    fn r2_constant_target() {
        assert_eq!(r2_score(&[4.0, 4.0], &[4.0, 4.0]), 1.0);
        assert_eq!(r2_score(&[4.0, 4.0], &[3.0, 4.0]), 0.0);
    }

    #[test]
    fn single_tree_leaves_some_samples_unscored() {
        let features: Vec<Vec<f64>> = (0..30).map(|i| vec![i as f64]).collect();
        let labels: Vec<usize> = (0..30).map(|i| usize::from(i >= 15)).collect();
        let result = SimilarityForestConfig::new(1)
            .unwrap()
            .with_oob_mode(OobMode::Enabled)
            .fit_classifier(&features, &labels)
            .unwrap();
        let oob = result.oob_score().unwrap();
        let oob_set = result.forest().trees()[0].oob_indices();
        assert_eq!(oob.n_oob_samples, oob_set.len());
        for i in 0..features.len() {
            let never_oob = !oob_set.contains(&i);
            assert_eq!(oob.predictions[i].is_nan(), never_oob);
        }
        let rows = oob.decision_function.as_ref().unwrap();
        assert_eq!(rows.len(), features.len());
    }

    #[test]
    fn regression_oob_is_r2() {
        let features: Vec<Vec<f64>> = (0..60).map(|i| vec![i as f64 * 0.1]).collect();
        let targets: Vec<f64> = features.iter().map(|x| 3.0 * x[0]).collect();
        let result = SimilarityForestConfig::new(25)
            .unwrap()
            .with_oob_mode(OobMode::Enabled)
            .with_seed(4)
            .fit_regressor(&features, &targets)
            .unwrap();
        let oob = result.oob_score().unwrap();
        assert!(oob.decision_function.is_none());
        assert!(oob.score > 0.9 && oob.score <= 1.0, "r2 = {}", oob.score);
    }
}
