use rand::Rng;

use crate::criterion::{Criterion, SideStats, centered_variance, weighted_decrease};
use crate::node::Direction;
use crate::similarity::Similarity;
use crate::task::Target;

/// Relative improvement below which a split counts as no improvement.
const MIN_RELATIVE_GAIN: f64 = 1e-12;

/// Result of the direction search for one node.
#[derive(Debug, Clone)]
pub(crate) struct SplitResult {
    /// Reference pair of the winning direction.
    pub(crate) direction: Direction,
    /// Projection threshold: samples with projection <= threshold go left.
    pub(crate) threshold: f64,
    /// Criterion improvement of this split.
    pub(crate) improvement: f64,
    /// Sample indices going to the left child.
    pub(crate) left_indices: Vec<usize>,
    /// Sample indices going to the right child.
    pub(crate) right_indices: Vec<usize>,
}

/// Best threshold found so far, with the positions of its reference pair.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    p: usize,
    q: usize,
    threshold: f64,
    score: f64,
}

/// Draw two distinct positions into `indices`.
///
/// For classification targets `q` is drawn among samples whose class differs
/// from `p`'s. Otherwise `q` is drawn among positions holding a different
/// training sample, so bootstrap repeats never pair a sample with itself.
/// Falls back to any other position when no such candidate exists.
fn sample_pair(target: &Target<'_>, indices: &[usize], rng: &mut impl Rng) -> (usize, usize) {
    let m = indices.len();
    let p = rng.gen_range(0..m);
    let p_sample = indices[p];
    let others: Vec<usize> = match target {
        Target::Classes { labels, .. } => (0..m)
            .filter(|&pos| labels[indices[pos]] != labels[p_sample])
            .collect(),
        _ => (0..m).filter(|&pos| indices[pos] != p_sample).collect(),
    };
    if !others.is_empty() {
        return (p, others[rng.gen_range(0..others.len())]);
    }
    let mut q = rng.gen_range(0..m - 1);
    if q >= p {
        q += 1;
    }
    (p, q)
}

/// Midpoint of two consecutive distinct sorted values, kept strictly below `hi`.
fn midpoint(lo: f64, hi: f64) -> f64 {
    let mid = lo + (hi - lo) / 2.0;
    if mid < hi { mid } else { lo }
}

/// Statistics of the whole node for the supervised targets.
fn parent_stats(target: &Target<'_>, indices: &[usize]) -> Option<SideStats> {
    match target {
        Target::Classes {
            labels, n_classes, ..
        } => {
            let mut stats = SideStats::classes(*n_classes);
            for &si in indices {
                stats.add_class(labels[si]);
            }
            Some(stats)
        }
        Target::Values { values } => {
            let shift = indices.first().map_or(0.0, |&si| values[si]);
            let mut stats = SideStats::moments(shift);
            for &si in indices {
                stats.add_value(values[si]);
            }
            Some(stats)
        }
        Target::Unsupervised => None,
    }
}

/// Scan one sorted projection for its best threshold.
///
/// Supervised targets are scored by [`weighted_decrease`] over the target;
/// the unsupervised target by the relative reduction of projection variance.
fn best_threshold(
    sorted: &[(f64, usize)],
    target: &Target<'_>,
    parent: Option<&SideStats>,
    n_total: usize,
    min_samples_leaf: usize,
) -> Option<(f64, f64)> {
    let m = sorted.len();

    let (criterion, mut left, mut right, parent_impurity) = match (target, parent) {
        (Target::Classes { criterion, .. }, Some(stats)) => (
            *criterion,
            stats.emptied(),
            stats.clone(),
            stats.impurity(*criterion),
        ),
        (Target::Values { .. }, Some(stats)) => (
            Criterion::Variance,
            stats.emptied(),
            stats.clone(),
            stats.impurity(Criterion::Variance),
        ),
        _ => {
            let mut all = SideStats::moments(sorted[0].0);
            for &(v, _) in sorted {
                all.add_value(v);
            }
            let var = all.impurity(Criterion::Variance);
            (Criterion::Variance, all.emptied(), all, var)
        }
    };

    if parent_impurity <= 0.0 {
        return None;
    }

    let unsupervised = matches!(target, Target::Unsupervised);
    let min_gain = if unsupervised {
        MIN_RELATIVE_GAIN
    } else {
        MIN_RELATIVE_GAIN * parent_impurity * m as f64 / n_total as f64
    };

    let mut best: Option<(f64, f64)> = None;
    let mut best_score = min_gain;

    for i in 0..(m - 1) {
        let (val_i, si) = sorted[i];
        match target {
            Target::Classes { labels, .. } => {
                left.add_class(labels[si]);
                right.remove_class(labels[si]);
            }
            Target::Values { values } => {
                left.add_value(values[si]);
                right.remove_value(values[si]);
            }
            Target::Unsupervised => {
                left.add_value(val_i);
                right.remove_value(val_i);
            }
        }

        let val_next = sorted[i + 1].0;
        if val_i == val_next {
            continue;
        }

        let n_left = i + 1;
        let n_right = m - n_left;
        if n_left < min_samples_leaf || n_right < min_samples_leaf {
            continue;
        }

        let score = if unsupervised {
            let children = (n_left as f64 * left.impurity(criterion)
                + n_right as f64 * right.impurity(criterion))
                / m as f64;
            (parent_impurity - children) / parent_impurity
        } else {
            weighted_decrease(n_total, parent_impurity, &left, &right, criterion)
        };

        if score > best_score {
            best_score = score;
            best = Some((midpoint(val_i, val_next), score));
        }
    }

    best
}

/// Search `n_directions` random reference pairs for the best split of a node.
///
/// `features` is row-major and shared by every node and tree; `indices` are
/// the node's training samples and `n_total` the size of the tree's training
/// set. Returns `None` when no trial strictly improves the criterion: every
/// sample projects identically, or each split would violate
/// `min_samples_leaf`, or no threshold reduces impurity.
#[allow(clippy::too_many_arguments)]
pub(crate) fn find_best_split<S: Similarity + ?Sized>(
    features: &[Vec<f64>],
    target: &Target<'_>,
    indices: &[usize],
    n_total: usize,
    similarity: &S,
    n_directions: usize,
    min_samples_leaf: usize,
    rng: &mut impl Rng,
) -> Option<SplitResult> {
    let m = indices.len();
    if m < 2 {
        return None;
    }

    let parent = parent_stats(target, indices);
    let mut best: Option<Candidate> = None;
    let mut sorted: Vec<(f64, usize)> = Vec::with_capacity(m);

    for _ in 0..n_directions {
        let (p, q) = sample_pair(target, indices, rng);
        let (xp, xq) = (&features[indices[p]], &features[indices[q]]);

        sorted.clear();
        sorted.extend(indices.iter().map(|&si| {
            let x = &features[si];
            (similarity.similarity(x, xq) - similarity.similarity(x, xp), si)
        }));
        sorted.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));

        let Some((threshold, score)) =
            best_threshold(&sorted, target, parent.as_ref(), n_total, min_samples_leaf)
        else {
            continue;
        };

        if best.is_none_or(|b| score > b.score) {
            best = Some(Candidate {
                p,
                q,
                threshold,
                score,
            });
        }
    }

    let best = best?;
    let (p_sample, q_sample) = (indices[best.p], indices[best.q]);
    let direction = Direction::new(
        features[p_sample].clone(),
        features[q_sample].clone(),
        p_sample,
        q_sample,
    );

    let mut left_indices = Vec::with_capacity(m / 2);
    let mut right_indices = Vec::with_capacity(m / 2);
    for &si in indices {
        if direction.project(similarity, &features[si]) <= best.threshold {
            left_indices.push(si);
        } else {
            right_indices.push(si);
        }
    }

    Some(SplitResult {
        direction,
        threshold: best.threshold,
        improvement: best.score,
        left_indices,
        right_indices,
    })
}

/// Spread of a node without a target: summed per-feature variance.
pub(crate) fn feature_spread(features: &[Vec<f64>], indices: &[usize]) -> f64 {
    let Some(&first) = indices.first() else {
        return 0.0;
    };
    (0..features[first].len())
        .map(|f| centered_variance(indices.iter().map(|&si| features[si][f])))
        .sum()
}
