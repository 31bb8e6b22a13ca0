//! Permutation-based feature importance.

use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use rayon::iter::{IndexedParallelIterator, IntoParallelRefIterator, ParallelIterator};

use crate::forest::SimilarityForest;
use crate::oob::r2_score;
use crate::similarity::Similarity;
use crate::task::Outcomes;
use crate::tree::SimilarityTree;

/// Permutation importance result for a single feature.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PermutationImportance {
    /// Zero-based feature column.
    pub feature: usize,
    /// Mean score drop when this feature is permuted.
    pub importance: f64,
    /// Standard deviation of the score drop across trees.
    pub std: f64,
    /// Rank (1 = most important).
    pub rank: usize,
}

/// Score one tree on `rows`: accuracy for labels, R² for values.
fn tree_score<S: Similarity>(
    tree: &SimilarityTree<S>,
    rows: &[Vec<f64>],
    oob_indices: &[usize],
    outcomes: Outcomes<'_>,
) -> f64 {
    match outcomes {
        Outcomes::Classes(labels) => {
            let correct = rows
                .iter()
                .zip(oob_indices)
                .filter(|&(row, &idx)| tree.predict_unchecked(row).class() == Some(labels[idx]))
                .count();
            correct as f64 / oob_indices.len() as f64
        }
        Outcomes::Values(values) => {
            let actual: Vec<f64> = oob_indices.iter().map(|&idx| values[idx]).collect();
            let predicted: Vec<f64> = rows
                .iter()
                .map(|row| tree.predict_unchecked(row).as_f64())
                .collect();
            r2_score(&actual, &predicted)
        }
    }
}

/// Compute permutation feature importance using per-tree OOB samples.
///
/// For each tree and each feature:
/// 1. Score this tree on its OOB samples
/// 2. Permute the feature column among those OOB samples
/// 3. Score again
/// 4. Importance = baseline score - permuted score
///
/// The final importance per feature is the mean across trees with a
/// non-empty OOB set; the standard deviation is the population std across
/// those trees.
pub(crate) fn compute_permutation_importance<S: Similarity>(
    forest: &SimilarityForest<S>,
    features: &[Vec<f64>],
    outcomes: Outcomes<'_>,
    seed: u64,
) -> Vec<PermutationImportance> {
    let n_features = forest.n_features;

    let drops: Vec<Vec<f64>> = forest
        .trees
        .par_iter()
        .enumerate()
        .filter(|(_, bt)| !bt.oob_indices.is_empty())
        .map(|(tree_idx, bt)| {
            let oob = &bt.oob_indices;
            let rows: Vec<Vec<f64>> = oob.iter().map(|&idx| features[idx].clone()).collect();
            let baseline = tree_score(&bt.tree, &rows, oob, outcomes);

            (0..n_features)
                .map(|feat_idx| {
                    let rng_seed = seed
                        .wrapping_add((tree_idx as u64).wrapping_mul(n_features as u64))
                        .wrapping_add(feat_idx as u64);
                    let mut rng = ChaCha8Rng::seed_from_u64(rng_seed);

                    let mut column: Vec<f64> = rows.iter().map(|row| row[feat_idx]).collect();
                    column.shuffle(&mut rng);
                    let permuted: Vec<Vec<f64>> = rows
                        .iter()
                        .zip(&column)
                        .map(|(row, &val)| {
                            let mut row = row.clone();
                            row[feat_idx] = val;
                            row
                        })
                        .collect();

                    baseline - tree_score(&bt.tree, &permuted, oob, outcomes)
                })
                .collect()
        })
        .collect();

    // If no trees had OOB samples, return all-zero importances.
    if drops.is_empty() {
        return (0..n_features)
            .map(|feature| PermutationImportance {
                feature,
                importance: 0.0,
                std: 0.0,
                rank: feature + 1,
            })
            .collect();
    }

    let n_valid_trees = drops.len() as f64;

    let mut results: Vec<PermutationImportance> = (0..n_features)
        .map(|feature| {
            let values: Vec<f64> = drops.iter().map(|tree_drops| tree_drops[feature]).collect();
            let mean = values.iter().sum::<f64>() / n_valid_trees;
            let variance =
                values.iter().map(|&v| (v - mean) * (v - mean)).sum::<f64>() / n_valid_trees;
            PermutationImportance {
                feature,
                importance: mean,
                std: variance.sqrt(),
                rank: 0,
            }
        })
        .collect();

    // Sort by importance descending and assign ranks.
    results.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    for (i, result) in results.iter_mut().enumerate() {
        result.rank = i + 1;
    }

    results
}

#[cfg(test)]
mod tests {
    use crate::config::{OobMode, SimilarityForestConfig};
    use crate::error::SimForestError;
    use crate::task::Outcomes;

    /// Feature 0 is informative, feature 1 is constant noise.
    fn make_data() -> (Vec<Vec<f64>>, Vec<usize>) {
        let mut features = Vec::new();
        let mut labels = Vec::new();
        for class in 0..3 {
            for i in 0..30 {
                features.push(vec![10.0 * class as f64 + i as f64 * 0.1, 0.5]);
                labels.push(class);
            }
        }
        (features, labels)
    }

    #[test]
    fn informative_feature_ranks_first() {
        let (features, labels) = make_data();
        let result = SimilarityForestConfig::new(30)
            .unwrap()
            .with_similarity(crate::Kernel::NegSquaredEuclidean)
            .with_oob_mode(OobMode::Enabled)
            .with_n_directions(2)
            .with_seed(42)
            .fit_classifier(&features, &labels)
            .unwrap();
        let perm_imp = result
            .permutation_importances(&features, Outcomes::Classes(&labels), 42)
            .unwrap();

        assert_eq!(perm_imp.len(), 2);
        let informative = perm_imp.iter().find(|p| p.feature == 0).unwrap();
        let noise = perm_imp.iter().find(|p| p.feature == 1).unwrap();
        assert_eq!(informative.rank, 1);
        assert!(informative.importance > 0.1, "importance = {}", informative.importance);
        // Permuting a constant column changes nothing.
        assert!(noise.importance.abs() < 1e-12);
    }

    #[test]
    fn wrong_outcome_kind_rejected() {
        let (features, labels) = make_data();
        let result = SimilarityForestConfig::new(5)
            .unwrap()
            .fit_classifier(&features, &labels)
            .unwrap();
        let values: Vec<f64> = labels.iter().map(|&l| l as f64).collect();
        let err = result
            .permutation_importances(&features, Outcomes::Values(&values), 0)
            .unwrap_err();
        assert!(matches!(err, SimForestError::OutcomeMismatch { .. }));
    }

    #[test]
    fn no_bootstrap_gives_zero_importances() {
        let (features, labels) = make_data();
        let result = SimilarityForestConfig::new(3)
            .unwrap()
            .with_bootstrap(false)
            .fit_classifier(&features, &labels)
            .unwrap();
        let perm_imp = result
            .permutation_importances(&features, Outcomes::Classes(&labels), 1)
            .unwrap();
        assert!(perm_imp.iter().all(|p| p.importance == 0.0 && p.std == 0.0));
        assert_eq!(perm_imp.iter().map(|p| p.rank).collect::<Vec<_>>(), vec![1, 2]);
    }
}
