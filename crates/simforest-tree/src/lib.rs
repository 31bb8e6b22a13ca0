//! Similarity Forest: train, evaluate, predict, cluster.
//!
//! Trees split on the projection of a sample onto a pair of reference points
//! drawn from the training data, `sim(x, q) - sim(x, p)`, instead of on a
//! single feature. Provides single similarity trees, a bagged forest with
//! parallel training via rayon and out-of-bag evaluation, permutation feature
//! importance, model serialization, and a divisive clustering mode that emits
//! an agglomerative linkage hierarchy.

mod agglomerate;
mod cluster;
mod config;
mod criterion;
mod error;
mod forest;
mod forest_cluster;
mod label;
mod linkage;
mod node;
mod oob;
mod perm_importance;
mod predict;
mod result;
mod serialize;
mod similarity;
mod split;
mod task;
mod tree;
mod validate;

pub use cluster::{ClusterCut, ClusterResult, SimilarityClusterConfig};
pub use config::{OobMode, SimilarityForestConfig};
pub use criterion::Criterion;
pub use error::SimForestError;
pub use forest::{BaggedTree, SimilarityForest};
pub use forest_cluster::{ForestClusterResult, SimilarityForestClusterConfig};
pub use label::ClusterLabel;
pub use linkage::{Linkage, Merge};
pub use node::{Direction, Impurity, LeafValue, Node, NodeId};
pub use oob::OobScore;
pub use perm_importance::PermutationImportance;
pub use predict::ClassDistribution;
pub use result::{ForestResult, TrainingMetadata};
pub use similarity::{FnSimilarity, Kernel, Similarity};
pub use task::{Outcomes, Prediction, Task};
pub use tree::{SimilarityTree, SimilarityTreeConfig};
