//! Average-linkage agglomeration of a precomputed distance matrix.

use crate::linkage::{Linkage, Merge};

/// Agglomerate `distances` (square, symmetric) with average linkage.
///
/// Each step merges the closest pair of active clusters; ties go to the
/// first pair in row-major order. Distances to the merged cluster follow the
/// Lance-Williams update for average linkage:
/// `d(k, i ∪ j) = (|i| d(k, i) + |j| d(k, j)) / (|i| + |j|)`.
pub(crate) fn average_linkage(distances: &[Vec<f64>]) -> Linkage {
    let n = distances.len();
    let mut d: Vec<Vec<f64>> = distances.to_vec();
    let mut active = vec![true; n];
    let mut sizes = vec![1usize; n];
    // Linkage id currently held by each slot.
    let mut ids: Vec<usize> = (0..n).collect();
    let mut merges = Vec::with_capacity(n.saturating_sub(1));

    for r in 0..n.saturating_sub(1) {
        let mut best: Option<(usize, usize, f64)> = None;
        for i in 0..n {
            if !active[i] {
                continue;
            }
            for j in (i + 1)..n {
                if !active[j] {
                    continue;
                }
                if best.is_none_or(|(_, _, bd)| d[i][j] < bd) {
                    best = Some((i, j, d[i][j]));
                }
            }
        }
        let Some((i, j, distance)) = best else {
            break;
        };

        let size = sizes[i] + sizes[j];
        merges.push(Merge {
            a: ids[i].min(ids[j]),
            b: ids[i].max(ids[j]),
            distance,
            size,
        });

        let (wi, wj) = (sizes[i] as f64, sizes[j] as f64);
        for k in 0..n {
            if active[k] && k != i && k != j {
                let updated = (wi * d[i][k] + wj * d[j][k]) / (wi + wj);
                d[i][k] = updated;
                d[k][i] = updated;
            }
        }
        active[j] = false;
        sizes[i] = size;
        ids[i] = n + r;
    }

    Linkage::new(merges, n)
}
