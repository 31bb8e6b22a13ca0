use std::fmt;

use crate::similarity::Similarity;

/// Tree-local node identifier: the node's position in its tree's arena.
///
/// Ids are handed out in creation order, so a parent's id is always smaller
/// than its children's.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    serde::Serialize, serde::Deserialize,
)]
pub struct NodeId(usize);

impl NodeId {
    /// Create a node id from a zero-based arena position.
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Return the zero-based arena index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Criterion-agnostic impurity value (Gini, entropy or variance).
#[derive(
    Debug, Clone, Copy, PartialEq, PartialOrd,
    serde::Serialize, serde::Deserialize,
)]
pub struct Impurity(f64);

impl Impurity {
    /// Create a new impurity value.
    pub(crate) fn new(value: f64) -> Self {
        Self(value)
    }

    /// Return the raw impurity value.
    #[must_use]
    pub fn value(self) -> f64 {
        self.0
    }
}

impl fmt::Display for Impurity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.0)
    }
}

/// A split direction: the reference pair `(p, q)`.
///
/// Projects a sample onto `sim(x, q) - sim(x, p)`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Direction {
    p: Vec<f64>,
    q: Vec<f64>,
    p_sample: usize,
    q_sample: usize,
}

impl Direction {
    pub(crate) fn new(p: Vec<f64>, q: Vec<f64>, p_sample: usize, q_sample: usize) -> Self {
        Self {
            p,
            q,
            p_sample,
            q_sample,
        }
    }

    /// Project `x` onto this direction.
    #[must_use]
    pub fn project<S: Similarity + ?Sized>(&self, similarity: &S, x: &[f64]) -> f64 {
        similarity.similarity(x, &self.q) - similarity.similarity(x, &self.p)
    }

    /// Return the first reference point.
    #[must_use]
    pub fn p(&self) -> &[f64] {
        &self.p
    }

    /// Return the second reference point.
    #[must_use]
    pub fn q(&self) -> &[f64] {
        &self.q
    }

    /// Return the training-set indices `(p, q)` the reference points were drawn from.
    #[must_use]
    pub fn sample_indices(&self) -> (usize, usize) {
        (self.p_sample, self.q_sample)
    }
}

/// Value stored in a leaf, selected by the task the tree was fitted for.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum LeafValue {
    /// Majority class (lowest label on ties) and the leaf's class distribution.
    Class {
        /// Predicted class.
        class: usize,
        /// Normalized class frequencies of the training samples in the leaf.
        distribution: Vec<f64>,
    },
    /// Mean target of the training samples in the leaf.
    Mean(f64),
    /// Tree-local cluster id, assigned to leaves in creation order.
    Cluster(usize),
}

/// A node in a similarity tree arena.
///
/// Children are referenced by [`NodeId`]; a split always has both.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Node {
    /// An interior split node.
    Split {
        /// This node's id.
        id: NodeId,
        /// Depth of this node; the root is at depth 1.
        depth: usize,
        /// Reference pair defining the projection.
        direction: Direction,
        /// Samples with projection <= threshold go left.
        threshold: f64,
        /// Left child.
        left: NodeId,
        /// Right child.
        right: NodeId,
        /// Impurity at this node before splitting.
        impurity: Impurity,
        /// Number of training samples that reached this node.
        n_samples: usize,
        /// Weighted criterion improvement of this split.
        impurity_decrease: f64,
    },
    /// A terminal leaf node.
    Leaf {
        /// This node's id.
        id: NodeId,
        /// Depth of this node; the root is at depth 1.
        depth: usize,
        /// Predicted value.
        value: LeafValue,
        /// Impurity at this leaf.
        impurity: Impurity,
        /// Number of training samples in this leaf.
        n_samples: usize,
    },
}

impl Node {
    /// Return this node's id.
    #[must_use]
    pub fn id(&self) -> NodeId {
        match self {
            Node::Split { id, .. } | Node::Leaf { id, .. } => *id,
        }
    }

    /// Return this node's depth (root = 1).
    #[must_use]
    pub fn depth(&self) -> usize {
        match self {
            Node::Split { depth, .. } | Node::Leaf { depth, .. } => *depth,
        }
    }

    /// Return the impurity at this node (before splitting for interior nodes).
    #[must_use]
    pub fn impurity(&self) -> Impurity {
        match self {
            Node::Split { impurity, .. } | Node::Leaf { impurity, .. } => *impurity,
        }
    }

    /// Return the number of training samples that reached this node.
    #[must_use]
    pub fn n_samples(&self) -> usize {
        match self {
            Node::Split { n_samples, .. } | Node::Leaf { n_samples, .. } => *n_samples,
        }
    }

    /// Return `true` if this node is a leaf.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }

    /// Return `(left, right)` for a split, `None` for a leaf.
    #[must_use]
    pub fn children(&self) -> Option<(NodeId, NodeId)> {
        match self {
            Node::Split { left, right, .. } => Some((*left, *right)),
            Node::Leaf { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Direction, Impurity, LeafValue, Node, NodeId};
    use crate::similarity::Kernel;

    #[test]
    fn node_id_roundtrip_and_display() {
        let id = NodeId::new(42);
        assert_eq!(id.index(), 42);
        assert_eq!(format!("{id}"), "42");
        assert!(NodeId::new(1) < NodeId::new(2));
    }

    #[test]
    fn impurity_display() {
        assert_eq!(format!("{}", Impurity::new(0.333333)), "0.333333");
    }

    #[test]
    fn direction_projection_with_dot() {
        let d = Direction::new(vec![0.0, 0.0], vec![5.0, 5.0], 0, 2);
        // sim(x, q) - sim(x, p) = 5 + 30 - 0
        assert!((d.project(&Kernel::Dot, &[1.0, 6.0]) - 35.0).abs() < f64::EPSILON);
        assert_eq!(d.sample_indices(), (0, 2));
    }

    fn make_leaf() -> Node {
        Node::Leaf {
            id: NodeId::new(1),
            depth: 2,
            value: LeafValue::Mean(3.0),
            impurity: Impurity::new(0.25),
            n_samples: 4,
        }
    }

    fn make_split() -> Node {
        Node::Split {
            id: NodeId::new(0),
            depth: 1,
            direction: Direction::new(vec![0.0], vec![1.0], 0, 1),
            threshold: 0.5,
            left: NodeId::new(1),
            right: NodeId::new(2),
            impurity: Impurity::new(0.5),
            n_samples: 8,
            impurity_decrease: 0.5,
        }
    }

    #[test]
    fn accessors() {
        let leaf = make_leaf();
        let split = make_split();
        assert!(leaf.is_leaf());
        assert!(!split.is_leaf());
        assert_eq!(leaf.depth(), 2);
        assert_eq!(split.id(), NodeId::new(0));
        assert_eq!(split.n_samples(), 8);
        assert_eq!(leaf.children(), None);
        assert_eq!(split.children(), Some((NodeId::new(1), NodeId::new(2))));
        assert!((leaf.impurity().value() - 0.25).abs() < f64::EPSILON);
    }
}
