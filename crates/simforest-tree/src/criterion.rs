use crate::node::Impurity;

/// Criterion for measuring the quality of a split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Criterion {
    /// Gini impurity: 1 - Σ(p_i²). Classification only.
    Gini,
    /// Information entropy: -Σ(p_i · ln(p_i)). Classification only.
    Entropy,
    /// Population variance of the target. Regression only.
    Variance,
}

impl Criterion {
    /// Compute the impurity of a node from its class counts.
    ///
    /// Returns [`Impurity::new(0.0)`] when `n_samples` is zero (pure node).
    ///
    /// For `Gini`: `1 - Σ(p_i²)` where `p_i = count_i / n_samples`.
    /// For `Entropy`: `-Σ(p_i · ln(p_i))` summed only over classes where `p_i > 0`.
    /// `Variance` treats the counts as a categorical sample and returns the
    /// Gini value, which is the variance of the one-hot encoding.
    #[must_use]
    pub fn impurity(&self, class_counts: &[usize], n_samples: usize) -> Impurity {
        if n_samples == 0 {
            return Impurity::new(0.0);
        }
        let n = n_samples as f64;
        let value = match self {
            Criterion::Gini | Criterion::Variance => {
                let sum_sq: f64 = class_counts
                    .iter()
                    .map(|&c| {
                        let p = c as f64 / n;
                        p * p
                    })
                    .sum();
                1.0 - sum_sq
            }
            Criterion::Entropy => -class_counts
                .iter()
                .filter(|&&c| c > 0)
                .map(|&c| {
                    let p = c as f64 / n;
                    p * p.ln()
                })
                .sum::<f64>(),
        };
        Impurity::new(value)
    }

    /// Return `true` when this criterion scores class labels.
    #[must_use]
    pub fn is_classification(&self) -> bool {
        matches!(self, Criterion::Gini | Criterion::Entropy)
    }
}

/// Population variance from running sums of shifted values.
///
/// The sums must be taken over `value - shift` for a shift inside the range of
/// the values; raw sums of values sharing a large offset cancel to noise.
/// Clamped at zero against rounding.
pub(crate) fn variance(sum: f64, sum_sq: f64, n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let n = n as f64;
    let mean = sum / n;
    (sum_sq / n - mean * mean).max(0.0)
}

/// Two-pass population variance of `values`.
pub(crate) fn centered_variance(values: impl Iterator<Item = f64> + Clone) -> f64 {
    let (n, sum) = values.clone().fold((0usize, 0.0), |(n, s), v| (n + 1, s + v));
    if n == 0 {
        return 0.0;
    }
    let mean = sum / n as f64;
    values.map(|v| (v - mean) * (v - mean)).sum::<f64>() / n as f64
}

/// Sufficient statistics of one side of a candidate split.
///
/// Updated one sample at a time while scanning sorted projections, so a whole
/// direction is scored in a single pass.
#[derive(Debug, Clone)]
pub(crate) enum SideStats {
    /// Per-class sample counts.
    Classes { counts: Vec<usize>, n: usize },
    /// Running sum and sum of squares of `value - shift`.
    Moments {
        shift: f64,
        sum: f64,
        sum_sq: f64,
        n: usize,
    },
}

impl SideStats {
    pub(crate) fn classes(n_classes: usize) -> Self {
        SideStats::Classes {
            counts: vec![0; n_classes],
            n: 0,
        }
    }

    /// Empty moments accumulated relative to `shift`.
    pub(crate) fn moments(shift: f64) -> Self {
        SideStats::Moments {
            shift,
            sum: 0.0,
            sum_sq: 0.0,
            n: 0,
        }
    }

    /// Empty statistics of the same kind: same class count or same shift.
    pub(crate) fn emptied(&self) -> Self {
        match self {
            SideStats::Classes { counts, .. } => SideStats::classes(counts.len()),
            SideStats::Moments { shift, .. } => SideStats::moments(*shift),
        }
    }

    /// Add a class label. No-op on `Moments`.
    pub(crate) fn add_class(&mut self, class: usize) {
        if let SideStats::Classes { counts, n } = self {
            counts[class] += 1;
            *n += 1;
        }
    }

    /// Remove a class label. No-op on `Moments`.
    pub(crate) fn remove_class(&mut self, class: usize) {
        if let SideStats::Classes { counts, n } = self {
            counts[class] -= 1;
            *n -= 1;
        }
    }

    /// Add a real value. No-op on `Classes`.
    pub(crate) fn add_value(&mut self, value: f64) {
        if let SideStats::Moments { shift, sum, sum_sq, n } = self {
            let d = value - *shift;
            *sum += d;
            *sum_sq += d * d;
            *n += 1;
        }
    }

    /// Remove a real value. No-op on `Classes`.
    pub(crate) fn remove_value(&mut self, value: f64) {
        if let SideStats::Moments { shift, sum, sum_sq, n } = self {
            let d = value - *shift;
            *sum -= d;
            *sum_sq -= d * d;
            *n -= 1;
        }
    }

    pub(crate) fn n(&self) -> usize {
        match self {
            SideStats::Classes { n, .. } | SideStats::Moments { n, .. } => *n,
        }
    }

    /// Impurity of this side: class impurity under `criterion`, or variance.
    pub(crate) fn impurity(&self, criterion: Criterion) -> f64 {
        match self {
            SideStats::Classes { counts, n } => criterion.impurity(counts, *n).value(),
            SideStats::Moments { sum, sum_sq, n, .. } => variance(*sum, *sum_sq, *n),
        }
    }
}

/// Weighted impurity decrease of a split:
/// `N_t/N · (impurity - N_tL/N_t · impurity_L - N_tR/N_t · impurity_R)`.
pub(crate) fn weighted_decrease(
    n_total: usize,
    parent_impurity: f64,
    left: &SideStats,
    right: &SideStats,
    criterion: Criterion,
) -> f64 {
    let n_left = left.n() as f64;
    let n_right = right.n() as f64;
    let n_node = n_left + n_right;
    let children = (n_left * left.impurity(criterion) + n_right * right.impurity(criterion)) / n_node;
    n_node / n_total as f64 * (parent_impurity - children)
}

#[cfg(test)]
mod tests {
    use super::{Criterion, SideStats, centered_variance, variance, weighted_decrease};

    #[test]
    fn gini_pure() {
        let imp = Criterion::Gini.impurity(&[10, 0, 0], 10);
        assert!((imp.value() - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn gini_binary_balanced() {
        let imp = Criterion::Gini.impurity(&[5, 5], 10);
        assert!((imp.value() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn entropy_binary_balanced() {
        let imp = Criterion::Entropy.impurity(&[5, 5], 10);
        assert!((imp.value() - 2.0_f64.ln()).abs() < 1e-10);
    }

    #[test]
    fn entropy_pure() {
        let imp = Criterion::Entropy.impurity(&[0, 7], 7);
        assert!(imp.value().abs() < f64::EPSILON);
    }

    #[test]
    fn classification_flags() {
        assert!(Criterion::Gini.is_classification());
        assert!(Criterion::Entropy.is_classification());
        assert!(!Criterion::Variance.is_classification());
    }

    #[test]
    fn variance_of_known_values() {
        // values 1, 2, 3, 4 -> mean 2.5, population variance 1.25
        let v = variance(10.0, 30.0, 4);
        assert!((v - 1.25).abs() < 1e-12);
        assert_eq!(variance(0.0, 0.0, 0), 0.0);
    }

    #[test]
    fn moments_add_remove() {
        let mut s = SideStats::moments(0.0);
        s.add_value(2.0);
        s.add_value(4.0);
        s.remove_value(2.0);
        assert_eq!(s.n(), 1);
        assert!(s.impurity(Criterion::Variance).abs() < 1e-12);
    }

    #[test]
    fn shifted_moments_survive_a_large_offset() {
        let offset = 1e9;
        let mut s = SideStats::moments(offset);
        for v in [1.0, 2.0, 3.0, 4.0] {
            s.add_value(offset + v);
        }
        assert!((s.impurity(Criterion::Variance) - 1.25).abs() < 1e-9);

        let empty = s.emptied();
        assert_eq!(empty.n(), 0);
        assert!(matches!(empty, SideStats::Moments { shift, .. } if shift == offset));
    }

    #[test]
    fn centered_variance_ignores_offset() {
        let values = [1e9 + 1.0, 1e9 + 2.0, 1e9 + 3.0, 1e9 + 4.0];
        assert!((centered_variance(values.iter().copied()) - 1.25).abs() < 1e-9);
        assert_eq!(centered_variance(std::iter::empty()), 0.0);
    }

    #[test]
    fn perfect_split_recovers_parent_impurity() {
        let mut left = SideStats::classes(2);
        let mut right = SideStats::classes(2);
        for _ in 0..3 {
            left.add_class(0);
            right.add_class(1);
        }
        // Node holds all 6 of 6 training samples and parent Gini is 0.5.
        let d = weighted_decrease(6, 0.5, &left, &right, Criterion::Gini);
        assert!((d - 0.5).abs() < 1e-12);
    }

    #[test]
    fn decrease_is_weighted_by_node_share() {
        let mut left = SideStats::classes(2);
        let mut right = SideStats::classes(2);
        left.add_class(0);
        right.add_class(1);
        // Node holds 2 of 8 training samples.
        let d = weighted_decrease(8, 0.5, &left, &right, Criterion::Gini);
        assert!((d - 0.125).abs() < 1e-12);
    }
}
