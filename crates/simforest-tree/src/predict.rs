//! Prediction methods for the Similarity Forest ensemble.

use rayon::iter::{IntoParallelIterator, ParallelIterator};

use crate::error::SimForestError;
use crate::forest::{BaggedTree, SimilarityForest};
use crate::node::NodeId;
use crate::similarity::Similarity;
use crate::task::{Prediction, Task};
use crate::tree::first_argmax;
use crate::validate::check_sample;

/// Class probability distribution from a prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDistribution {
    probs: Vec<f64>,
}

impl ClassDistribution {
    /// Create a new class distribution.
    pub(crate) fn new(probs: Vec<f64>) -> Self {
        Self { probs }
    }

    /// Return the predicted class (argmax of probabilities, lowest class on ties).
    #[must_use]
    pub fn predicted_class(&self) -> usize {
        first_argmax(&self.probs)
    }

    /// Return the top-k classes sorted by descending probability.
    #[must_use]
    pub fn top_k(&self, k: usize) -> Vec<(usize, f64)> {
        let mut indexed: Vec<(usize, f64)> = self.probs.iter().copied().enumerate().collect();
        indexed.sort_by(|a, b| b.1.total_cmp(&a.1));
        indexed.truncate(k);
        indexed
    }

    /// Return the probability distribution as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.probs
    }

    /// Natural log of each class probability; classes with no votes map to `-inf`.
    #[must_use]
    pub fn log_probs(&self) -> Vec<f64> {
        self.probs.iter().map(|p| p.ln()).collect()
    }
}

impl<S> SimilarityForest<S> {
    /// Return the number of features this forest was trained on.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Return the task this forest was trained for.
    #[must_use]
    pub fn task(&self) -> Task {
        self.task
    }

    /// Return the number of trees in the ensemble.
    #[must_use]
    pub fn n_estimators(&self) -> usize {
        self.trees.len()
    }

    /// Return the ensemble members in fit order.
    #[must_use]
    pub fn trees(&self) -> &[BaggedTree<S>] {
        &self.trees
    }
}

impl<S: Similarity> SimilarityForest<S> {
    /// Predict a single sample.
    ///
    /// Classification: majority vote of tree predictions, lowest class on
    /// ties. Regression: mean of tree predictions.
    ///
    /// # Errors
    ///
    /// Returns [`SimForestError::PredictionFeatureMismatch`] when `sample.len() != n_features`
    /// and [`SimForestError::NonFinitePredictionValue`] when a value is NaN or infinite.
    pub fn predict(&self, sample: &[f64]) -> Result<Prediction, SimForestError> {
        check_sample(sample, self.n_features)?;
        Ok(self.predict_unchecked(sample))
    }

    /// Return the per-class vote fractions for a single sample.
    ///
    /// # Errors
    ///
    /// | Variant                                        | When                            |
    /// |------------------------------------------------|---------------------------------|
    /// | [`SimForestError::NotAClassifier`]             | the forest is a regressor       |
    /// | [`SimForestError::PredictionFeatureMismatch`]  | `sample.len() != n_features`    |
    /// | [`SimForestError::NonFinitePredictionValue`]   | a value is NaN or infinite      |
    pub fn predict_proba(&self, sample: &[f64]) -> Result<ClassDistribution, SimForestError> {
        let Some(n_classes) = self.task.n_classes() else {
            return Err(SimForestError::NotAClassifier {
                operation: "predict_proba",
            });
        };
        check_sample(sample, self.n_features)?;
        Ok(ClassDistribution::new(self.vote_fractions(
            self.trees.iter().map(|bt| &bt.tree),
            sample,
            n_classes,
        )))
    }

    /// Return the log of the per-class vote fractions for a single sample.
    ///
    /// # Errors
    ///
    /// Same as [`predict_proba`](Self::predict_proba).
    pub fn predict_log_proba(&self, sample: &[f64]) -> Result<Vec<f64>, SimForestError> {
        Ok(self.predict_proba(sample)?.log_probs())
    }

    /// Predict a batch of samples in parallel.
    ///
    /// # Errors
    ///
    /// Returns [`SimForestError::PredictionFeatureMismatch`] if any sample has the wrong feature count
    /// and [`SimForestError::NonFinitePredictionValue`] if any value is NaN or infinite.
    pub fn predict_batch(&self, features: &[Vec<f64>]) -> Result<Vec<Prediction>, SimForestError> {
        features
            .into_par_iter()
            .map(|sample| self.predict(sample))
            .collect()
    }

    /// Return vote fractions for a batch of samples in parallel.
    ///
    /// # Errors
    ///
    /// Same as [`predict_proba`](Self::predict_proba), for any sample.
    pub fn predict_proba_batch(
        &self,
        features: &[Vec<f64>],
    ) -> Result<Vec<ClassDistribution>, SimForestError> {
        features
            .into_par_iter()
            .map(|sample| self.predict_proba(sample))
            .collect()
    }

    /// Return the leaf id each tree routes `sample` to, in tree order.
    ///
    /// # Errors
    ///
    /// Returns [`SimForestError::PredictionFeatureMismatch`] when `sample.len() != n_features`
    /// and [`SimForestError::NonFinitePredictionValue`] when a value is NaN or infinite.
    pub fn apply(&self, sample: &[f64]) -> Result<Vec<NodeId>, SimForestError> {
        check_sample(sample, self.n_features)?;
        Ok(self.trees.iter().map(|bt| bt.tree.leaf_id(sample)).collect())
    }

    pub(crate) fn predict_unchecked(&self, sample: &[f64]) -> Prediction {
        self.aggregate(self.trees.iter().map(|bt| &bt.tree), sample)
            .unwrap_or(Prediction::Value(f64::NAN))
    }

    /// Aggregate the predictions of a subset of trees. `None` for an empty subset.
    pub(crate) fn aggregate<'a, I>(&self, trees: I, sample: &[f64]) -> Option<Prediction>
    where
        I: Iterator<Item = &'a crate::tree::SimilarityTree<S>>,
        S: 'a,
    {
        match self.task {
            Task::Classification { n_classes } => {
                let mut votes = vec![0usize; n_classes];
                let mut n = 0usize;
                for tree in trees {
                    if let Prediction::Class(c) = tree.predict_unchecked(sample) {
                        votes[c] += 1;
                        n += 1;
                    }
                }
                (n > 0).then(|| Prediction::Class(first_argmax(&votes)))
            }
            Task::Regression | Task::Clustering => {
                let (sum, n) = trees.fold((0.0, 0usize), |(s, n), tree| {
                    (s + tree.predict_unchecked(sample).as_f64(), n + 1)
                });
                (n > 0).then(|| Prediction::Value(sum / n as f64))
            }
        }
    }

    /// Per-class vote fractions over a subset of trees. All zeros for an empty subset.
    pub(crate) fn vote_fractions<'a, I>(&self, trees: I, sample: &[f64], n_classes: usize) -> Vec<f64>
    where
        I: Iterator<Item = &'a crate::tree::SimilarityTree<S>>,
        S: 'a,
    {
        let mut votes = vec![0.0f64; n_classes];
        let mut n = 0usize;
        for tree in trees {
            if let Prediction::Class(c) = tree.predict_unchecked(sample) {
                votes[c] += 1.0;
                n += 1;
            }
        }
        if n > 0 {
            let n = n as f64;
            votes.iter_mut().for_each(|v| *v /= n);
        }
        votes
    }
}

#[cfg(test)]
mod tests {
    use super::ClassDistribution;
    use crate::config::SimilarityForestConfig;
    use crate::error::SimForestError;
    use crate::task::Prediction;

    fn two_blobs() -> (Vec<Vec<f64>>, Vec<usize>) {
        let features = vec![
            vec![0.0, 0.0],
            vec![0.0, 1.0],
            vec![1.0, 0.0],
            vec![5.0, 5.0],
            vec![5.0, 6.0],
            vec![6.0, 5.0],
        ];
        (features, vec![0, 0, 0, 1, 1, 1])
    }

    #[test]
    fn predicted_class_breaks_ties_low() {
        let dist = ClassDistribution::new(vec![0.4, 0.4, 0.2]);
        assert_eq!(dist.predicted_class(), 0);
        assert_eq!(dist.top_k(2), vec![(0, 0.4), (1, 0.4)]);
    }

    #[test]
    fn log_probs_of_unvoted_class_is_neg_infinity() {
        let dist = ClassDistribution::new(vec![1.0, 0.0, 0.25]);
        let logs = dist.log_probs();
        assert_eq!(logs[0], 0.0);
        assert_eq!(logs[1], f64::NEG_INFINITY);
        assert!((logs[2] - 0.25_f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn predict_log_proba_matches_proba() {
        let (features, labels) = two_blobs();
        let forest = SimilarityForestConfig::new(10)
            .unwrap()
            .with_seed(3)
            .fit_classifier(&features, &labels)
            .unwrap()
            .into_forest();
        let proba = forest.predict_proba(&features[4]).unwrap();
        let logs = forest.predict_log_proba(&features[4]).unwrap();
        for (p, l) in proba.as_slice().iter().zip(&logs) {
            assert_eq!(p.ln(), *l);
        }
    }

    #[test]
    fn forest_rejects_nan_sample() {
        let (features, labels) = two_blobs();
        let forest = SimilarityForestConfig::new(3)
            .unwrap()
            .fit_classifier(&features, &labels)
            .unwrap()
            .into_forest();
        let nan = [f64::NAN, 0.0];
        assert!(matches!(
            forest.predict(&nan),
            Err(SimForestError::NonFinitePredictionValue { feature_index: 0 })
        ));
        assert!(forest.predict_proba(&nan).is_err());
        assert!(forest.apply(&nan).is_err());
        assert!(forest.predict_batch(&[features[0].clone(), nan.to_vec()]).is_err());
    }

    #[test]
    fn predict_proba_rows_sum_to_one() {
        let (features, labels) = two_blobs();
        let result = SimilarityForestConfig::new(15)
            .unwrap()
            .with_seed(9)
            .fit_classifier(&features, &labels)
            .unwrap();
        for dist in result.forest().predict_proba_batch(&features).unwrap() {
            let sum: f64 = dist.as_slice().iter().sum();
            assert!((sum - 1.0).abs() < 1e-10, "sum = {sum}");
        }
    }

    #[test]
    fn predict_matches_proba_argmax() {
        let (features, labels) = two_blobs();
        let forest = SimilarityForestConfig::new(15)
            .unwrap()
            .fit_classifier(&features, &labels)
            .unwrap()
            .into_forest();
        let probe = [2.5, 2.5];
        let class = forest.predict(&probe).unwrap();
        let proba = forest.predict_proba(&probe).unwrap();
        assert_eq!(class, Prediction::Class(proba.predicted_class()));
    }

    #[test]
    fn apply_returns_one_leaf_per_tree() {
        let (features, labels) = two_blobs();
        let forest = SimilarityForestConfig::new(7)
            .unwrap()
            .fit_classifier(&features, &labels)
            .unwrap()
            .into_forest();
        let leaves = forest.apply(&features[0]).unwrap();
        assert_eq!(leaves.len(), 7);
        for (leaf, bt) in leaves.iter().zip(forest.trees()) {
            assert!(bt.tree().node(*leaf).is_leaf());
        }
    }

    #[test]
    fn regressor_rejects_proba() {
        let (features, _) = two_blobs();
        let targets = vec![0.0, 0.1, 0.2, 5.0, 5.1, 5.2];
        let forest = SimilarityForestConfig::new(5)
            .unwrap()
            .fit_regressor(&features, &targets)
            .unwrap()
            .into_forest();
        assert!(matches!(
            forest.predict_proba(&[0.0, 0.0]),
            Err(SimForestError::NotAClassifier { .. })
        ));
        assert!(matches!(forest.predict(&[0.0, 0.0]).unwrap(), Prediction::Value(_)));
    }

    #[test]
    fn batch_rejects_wrong_width() {
        let (features, labels) = two_blobs();
        let forest = SimilarityForestConfig::new(3)
            .unwrap()
            .fit_classifier(&features, &labels)
            .unwrap()
            .into_forest();
        let err = forest.predict_batch(&[vec![1.0, 2.0], vec![1.0]]).unwrap_err();
        assert!(matches!(
            err,
            SimForestError::PredictionFeatureMismatch { expected: 2, got: 1 }
        ));
    }
}
