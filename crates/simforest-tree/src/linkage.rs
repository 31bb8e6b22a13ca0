//! Agglomerative merge hierarchies and flat cuts.
//!
//! Observations are clusters `0..n`; merge row `r` creates cluster `n + r`.
//! Rows are ordered by non-decreasing distance, the layout hierarchical
//! clustering and dendrogram tools expect.

use crate::error::SimForestError;
use crate::label::{ClusterLabel, relabel_by_first_appearance};
use crate::node::{Node, NodeId};

/// One merge of two clusters.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Merge {
    /// First merged cluster id.
    pub a: usize,
    /// Second merged cluster id.
    pub b: usize,
    /// Merge height.
    pub distance: f64,
    /// Number of observations in the new cluster.
    pub size: usize,
}

/// A complete merge hierarchy over `n_observations` points (`n - 1` rows).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Linkage {
    merges: Vec<Merge>,
    n_observations: usize,
}

impl Linkage {
    pub(crate) fn new(merges: Vec<Merge>, n_observations: usize) -> Self {
        debug_assert_eq!(merges.len() + 1, n_observations.max(1));
        Self {
            merges,
            n_observations,
        }
    }

    /// Return the merge rows in creation order.
    #[must_use]
    pub fn rows(&self) -> &[Merge] {
        &self.merges
    }

    /// Return the number of clustered observations.
    #[must_use]
    pub fn n_observations(&self) -> usize {
        self.n_observations
    }

    /// Return the hierarchy as `[a, b, distance, size]` rows.
    #[must_use]
    pub fn to_matrix(&self) -> Vec<[f64; 4]> {
        self.merges
            .iter()
            .map(|m| [m.a as f64, m.b as f64, m.distance, m.size as f64])
            .collect()
    }

    /// Cut the hierarchy into `n_clusters` flat clusters by undoing the last
    /// `n_clusters - 1` merges.
    ///
    /// Labels are numbered `0..` in order of first appearance.
    ///
    /// # Errors
    ///
    /// Returns [`SimForestError::InvalidClusterCount`] when `n_clusters` is
    /// zero or exceeds the number of observations.
    pub fn fcluster(&self, n_clusters: usize) -> Result<Vec<ClusterLabel>, SimForestError> {
        let n = self.n_observations;
        if n_clusters == 0 || n_clusters > n {
            return Err(SimForestError::InvalidClusterCount {
                n_clusters,
                n_points: n,
            });
        }

        let mut parent: Vec<usize> = (0..n).collect();
        // Representative observation of every cluster id created so far.
        let mut representative: Vec<usize> = (0..n).collect();

        for merge in &self.merges[..n - n_clusters] {
            let ra = find(&mut parent, representative[merge.a]);
            let rb = find(&mut parent, representative[merge.b]);
            parent[rb] = ra;
            representative.push(ra);
        }

        let roots: Vec<usize> = (0..n).map(|i| find(&mut parent, i)).collect();
        Ok(relabel_by_first_appearance(&roots))
    }

    /// Build the hierarchy of a fitted cluster tree.
    ///
    /// A leaf holding `k` observations contributes `k - 1` merges at distance
    /// 0; a split merges its children's clusters at its subtree height
    /// (leaves 0, splits one more than their tallest child). Rows are sorted
    /// by `(distance, node id)`, so every row only references formed ids.
    pub(crate) fn from_tree(
        nodes: &[Node],
        leaf_samples: &[(NodeId, Vec<usize>)],
        n_observations: usize,
    ) -> Self {
        let heights = subtree_heights(nodes);

        let empty: &[usize] = &[];
        let mut members = vec![empty; nodes.len()];
        for (id, samples) in leaf_samples {
            members[id.index()] = samples;
        }

        let mut order: Vec<usize> = (0..nodes.len()).collect();
        order.sort_by(|&x, &y| heights[x].cmp(&heights[y]).then(x.cmp(&y)));

        let mut merges = Vec::with_capacity(n_observations.saturating_sub(1));
        let mut sizes: Vec<usize> = vec![1; n_observations];
        // Cluster id formed by each processed node.
        let mut formed: Vec<usize> = vec![usize::MAX; nodes.len()];

        let mut push = |a: usize, b: usize, distance: f64, merges: &mut Vec<Merge>| {
            let size = sizes[a] + sizes[b];
            merges.push(Merge { a, b, distance, size });
            sizes.push(size);
            n_observations + merges.len() - 1
        };

        for idx in order {
            match &nodes[idx] {
                Node::Leaf { .. } => {
                    let samples = members[idx];
                    let Some((&first, rest)) = samples.split_first() else {
                        continue;
                    };
                    let mut current = first;
                    for &sample in rest {
                        current = push(current, sample, 0.0, &mut merges);
                    }
                    formed[idx] = current;
                }
                Node::Split { left, right, .. } => {
                    let (a, b) = (formed[left.index()], formed[right.index()]);
                    formed[idx] = push(a, b, heights[idx] as f64, &mut merges);
                }
            }
        }

        Self::new(merges, n_observations)
    }
}

fn find(parent: &mut [usize], mut x: usize) -> usize {
    while parent[x] != x {
        parent[x] = parent[parent[x]];
        x = parent[x];
    }
    x
}

/// Height of every node's subtree. Children always have larger ids than
/// their parent, so one reverse pass suffices.
fn subtree_heights(nodes: &[Node]) -> Vec<usize> {
    let mut heights = vec![0usize; nodes.len()];
    for idx in (0..nodes.len()).rev() {
        if let Some((l, r)) = nodes[idx].children() {
            heights[idx] = 1 + heights[l.index()].max(heights[r.index()]);
        }
    }
    heights
}

#[cfg(test)]
mod tests {
    use super::{Linkage, Merge};
    use crate::error::SimForestError;
    use crate::node::{Direction, Impurity, LeafValue, Node, NodeId};

    fn leaf(id: usize, depth: usize, cluster: usize, n: usize) -> Node {
        Node::Leaf {
            id: NodeId::new(id),
            depth,
            value: LeafValue::Cluster(cluster),
            impurity: Impurity::new(0.0),
            n_samples: n,
        }
    }

    fn split(id: usize, depth: usize, left: usize, right: usize, n: usize) -> Node {
        Node::Split {
            id: NodeId::new(id),
            depth,
            direction: Direction::new(vec![0.0], vec![1.0], 0, 1),
            threshold: 0.5,
            left: NodeId::new(left),
            right: NodeId::new(right),
            impurity: Impurity::new(1.0),
            n_samples: n,
            impurity_decrease: 0.5,
        }
    }

    /// Root splits into leaf {0, 1} and a split of leaves {2} and {3, 4}.
    fn example() -> Linkage {
        let nodes = vec![
            split(0, 1, 1, 2, 5),
            leaf(1, 2, 0, 2),
            split(2, 2, 3, 4, 3),
            leaf(3, 3, 1, 1),
            leaf(4, 3, 2, 2),
        ];
        let leaf_samples = vec![
            (NodeId::new(1), vec![0, 1]),
            (NodeId::new(3), vec![2]),
            (NodeId::new(4), vec![3, 4]),
        ];
        Linkage::from_tree(&nodes, &leaf_samples, 5)
    }

    #[test]
    fn tree_linkage_rows() {
        let linkage = example();
        assert_eq!(
            linkage.rows(),
            &[
                Merge { a: 0, b: 1, distance: 0.0, size: 2 },
                Merge { a: 3, b: 4, distance: 0.0, size: 2 },
                Merge { a: 2, b: 6, distance: 1.0, size: 3 },
                Merge { a: 5, b: 7, distance: 2.0, size: 5 },
            ]
        );
        assert_eq!(linkage.to_matrix()[3], [5.0, 7.0, 2.0, 5.0]);
    }

    #[test]
    fn fcluster_cuts() {
        let linkage = example();
        let idx = |k| -> Vec<usize> {
            linkage.fcluster(k).unwrap().iter().map(|l| l.index()).collect()
        };
        assert_eq!(idx(1), vec![0, 0, 0, 0, 0]);
        assert_eq!(idx(2), vec![0, 0, 1, 1, 1]);
        assert_eq!(idx(3), vec![0, 0, 1, 2, 2]);
        assert_eq!(idx(5), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn fcluster_rejects_bad_counts() {
        let linkage = example();
        assert!(matches!(
            linkage.fcluster(0),
            Err(SimForestError::InvalidClusterCount { n_clusters: 0, n_points: 5 })
        ));
        assert!(linkage.fcluster(6).is_err());
    }

    #[test]
    fn single_observation_has_no_rows() {
        let nodes = vec![leaf(0, 1, 0, 1)];
        let linkage = Linkage::from_tree(&nodes, &[(NodeId::new(0), vec![0])], 1);
        assert!(linkage.rows().is_empty());
        assert_eq!(linkage.fcluster(1).unwrap().len(), 1);
    }
}
