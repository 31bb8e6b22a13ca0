//! Accuracy regression tests for simforest-tree.
//!
//! These tests verify that algorithmic changes do not degrade tree, forest
//! or clustering behavior on small deterministic datasets.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use simforest_tree::{
    ClusterCut, Kernel, LeafValue, Node, OobMode, Outcomes, Prediction, SimilarityClusterConfig,
    SimilarityForestClusterConfig, SimilarityForestConfig, SimilarityTree, SimilarityTreeConfig,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Generate a 150-sample, 5-feature, 3-class classification dataset.
///
/// Features 0-1 are informative (class * 3.0 + noise in [0, 0.5]).
/// Features 2-4 are pure noise in [0, 0.5].
fn make_classification() -> (Vec<Vec<f64>>, Vec<usize>) {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let n_samples = 150;
    let n_classes = 3;

    let mut features = Vec::with_capacity(n_samples);
    let mut labels = Vec::with_capacity(n_samples);
    for i in 0..n_samples {
        let class = i % n_classes;
        labels.push(class);
        let row: Vec<f64> = (0..5)
            .map(|f| {
                let base = if f < 2 { class as f64 * 3.0 } else { 0.0 };
                base + rng.r#gen::<f64>() * 0.5
            })
            .collect();
        features.push(row);
    }
    (features, labels)
}

/// `y = 2 x0 + noise`, 100 samples; feature 1 is pure noise.
fn make_regression() -> (Vec<Vec<f64>>, Vec<f64>) {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let mut features = Vec::new();
    let mut targets = Vec::new();
    for _ in 0..100 {
        let row: Vec<f64> = (0..2).map(|_| rng.r#gen::<f64>() * 10.0).collect();
        targets.push(2.0 * row[0] + rng.r#gen::<f64>() * 0.1);
        features.push(row);
    }
    (features, targets)
}

fn scenario_features() -> Vec<Vec<f64>> {
    vec![vec![0.0, 0.0], vec![0.0, 1.0], vec![5.0, 5.0], vec![5.0, 6.0]]
}

/// Walk every split and check structural invariants.
fn assert_well_formed<S>(tree: &SimilarityTree<S>, max_depth: Option<usize>) {
    assert_eq!(tree.nodes()[0].depth(), 1, "root depth");
    for node in tree.nodes() {
        if let Some(max_depth) = max_depth {
            assert!(node.depth() <= max_depth, "node {:?} too deep", node.id());
        }
        if let Node::Split { left, right, n_samples, depth, .. } = node {
            let (l, r) = (tree.node(*left), tree.node(*right));
            assert_eq!(l.depth(), depth + 1);
            assert_eq!(r.depth(), depth + 1);
            assert!(l.n_samples() > 0 && r.n_samples() > 0, "empty child");
            assert_eq!(l.n_samples() + r.n_samples(), *n_samples, "children do not partition parent");
        }
    }
}

// ---------------------------------------------------------------------------
// Single tree scenarios
// ---------------------------------------------------------------------------

#[test]
fn scenario_a_separable_classification() {
    let features = scenario_features();
    let labels = vec![0, 0, 1, 1];
    let tree = SimilarityTreeConfig::new()
        .with_similarity(Kernel::Dot)
        .with_max_depth(Some(2))
        .with_n_directions(5)
        .fit_classifier(&features, &labels)
        .unwrap();

    let predicted: Vec<Option<usize>> = features
        .iter()
        .map(|x| tree.predict(x).unwrap().class())
        .collect();
    assert_eq!(predicted, vec![Some(0), Some(0), Some(1), Some(1)]);
    assert_well_formed(&tree, Some(2));
}

#[test]
fn scenario_b_regression_leaf_means() {
    let features = scenario_features();
    let targets = vec![1.0, 1.1, 9.0, 9.2];
    let tree = SimilarityTreeConfig::new()
        .with_max_depth(Some(2))
        .with_n_directions(5)
        .fit_regressor(&features, &targets)
        .unwrap();

    let mut means: Vec<f64> = tree
        .nodes()
        .iter()
        .filter_map(|node| match node {
            Node::Leaf { value: LeafValue::Mean(m), .. } => Some(*m),
            _ => None,
        })
        .collect();
    means.sort_by(f64::total_cmp);
    assert_eq!(means.len(), 2);
    assert!((means[0] - 1.05).abs() < 1e-9, "low leaf mean {}", means[0]);
    assert!((means[1] - 9.1).abs() < 1e-9, "high leaf mean {}", means[1]);
}

#[test]
fn unbounded_tree_memorizes_training_labels() {
    let (features, labels) = make_classification();
    let tree = SimilarityTreeConfig::new()
        .with_seed(3)
        .fit_classifier(&features, &labels)
        .unwrap();
    for (x, &y) in features.iter().zip(&labels) {
        assert_eq!(tree.predict(x).unwrap(), Prediction::Class(y));
    }
    assert_well_formed(&tree, None);
}

#[test]
fn depth_limit_is_respected() {
    let (features, targets) = make_regression();
    for max_depth in [1, 2, 4] {
        let tree = SimilarityTreeConfig::new()
            .with_max_depth(Some(max_depth))
            .fit_regressor(&features, &targets)
            .unwrap();
        assert!(tree.depth() <= max_depth);
        assert_well_formed(&tree, Some(max_depth));
    }
}

// ---------------------------------------------------------------------------
// Forest
// ---------------------------------------------------------------------------

/// OOB accuracy with 50 trees must exceed 0.80.
#[test]
fn oob_accuracy_above_threshold() {
    let (features, labels) = make_classification();
    let result = SimilarityForestConfig::new(50)
        .unwrap()
        .with_seed(42)
        .with_oob_mode(OobMode::Enabled)
        .fit_classifier(&features, &labels)
        .unwrap();

    let oob = result.oob_score().expect("OOB score must be computed when OobMode::Enabled");
    assert!((0.0..=1.0).contains(&oob.score));
    assert!(oob.score > 0.80, "oob accuracy {} <= 0.80", oob.score);
    assert_eq!(oob.n_oob_samples, features.len());
}

#[test]
fn scenario_c_oob_score_is_reproducible() {
    let (features, labels) = make_classification();
    let config = SimilarityForestConfig::new(10)
        .unwrap()
        .with_seed(11)
        .with_oob_mode(OobMode::Enabled);
    let a = config.fit_classifier(&features, &labels).unwrap();
    let b = config.with_n_jobs(Some(2)).fit_classifier(&features, &labels).unwrap();

    let (sa, sb) = (a.oob_score().unwrap(), b.oob_score().unwrap());
    assert_eq!(sa.score, sb.score);
    assert_eq!(a.oob_indices_per_tree(), b.oob_indices_per_tree());
}

#[test]
fn predict_proba_rows_sum_to_one() {
    let (features, labels) = make_classification();
    let forest = SimilarityForestConfig::new(15)
        .unwrap()
        .fit_classifier(&features, &labels)
        .unwrap()
        .into_forest();
    for dist in forest.predict_proba_batch(&features).unwrap() {
        let total: f64 = dist.as_slice().iter().sum();
        assert!((total - 1.0).abs() < 1e-9, "row sums to {total}");
        assert_eq!(dist.as_slice().len(), 3);
    }
}

#[test]
fn regression_forest_oob_r2_is_high() {
    let (features, targets) = make_regression();
    let result = SimilarityForestConfig::new(40)
        .unwrap()
        .with_similarity(Kernel::NegSquaredEuclidean)
        .with_n_directions(3)
        .with_oob_mode(OobMode::Enabled)
        .fit_regressor(&features, &targets)
        .unwrap();
    let oob = result.oob_score().unwrap();
    assert!(oob.score > 0.6, "oob R² {} <= 0.6", oob.score);
}

#[test]
fn informative_features_have_positive_importance() {
    let (features, labels) = make_classification();
    let result = SimilarityForestConfig::new(30)
        .unwrap()
        .with_similarity(Kernel::NegSquaredEuclidean)
        .with_n_directions(2)
        .fit_classifier(&features, &labels)
        .unwrap();
    let importances = result
        .permutation_importances(&features, Outcomes::Classes(&labels), 42)
        .unwrap();
    let top = importances.iter().find(|p| p.rank == 1).unwrap();
    assert!(top.feature < 2, "top feature {} is noise", top.feature);
}

// ---------------------------------------------------------------------------
// Clustering
// ---------------------------------------------------------------------------

fn make_blobs() -> Vec<Vec<f64>> {
    let mut rng = ChaCha8Rng::seed_from_u64(5);
    let mut features = Vec::new();
    for center in [[0.0, 0.0], [30.0, 30.0]] {
        for _ in 0..15 {
            features.push(vec![
                center[0] + rng.r#gen::<f64>(),
                center[1] + rng.r#gen::<f64>(),
            ]);
        }
    }
    features
}

#[test]
fn cluster_linkage_has_n_minus_one_increasing_rows() {
    let features = make_blobs();
    let result = SimilarityClusterConfig::new()
        .with_similarity(Kernel::NegSquaredEuclidean)
        .fit(&features)
        .unwrap();
    let n = features.len();
    let rows = result.linkage().rows();
    assert_eq!(rows.len(), n - 1);

    let mut used = std::collections::HashSet::new();
    for (r, row) in rows.iter().enumerate() {
        assert!(row.a < n + r && row.b < n + r);
        assert!(used.insert(row.a) && used.insert(row.b), "id merged twice in row {r}");
    }
    assert_eq!(rows[n - 2].size, n);
}

#[test]
fn cluster_tree_separates_blobs() {
    let features = make_blobs();
    let labels = SimilarityClusterConfig::new()
        .with_similarity(Kernel::NegSquaredEuclidean)
        .with_n_directions(3)
        .with_cut(ClusterCut::NClusters(2))
        .fit_predict(&features)
        .unwrap();
    assert!(labels[..15].iter().all(|&l| l == labels[0]));
    assert!(labels[15..].iter().all(|&l| l == labels[15]));
    assert_ne!(labels[0], labels[15]);
}

#[test]
fn cluster_fit_is_deterministic() {
    let features = make_blobs();
    let config = SimilarityClusterConfig::new().with_seed(99);
    let a = config.fit(&features).unwrap();
    let b = config.fit(&features).unwrap();
    assert_eq!(a.linkage(), b.linkage());
    assert_eq!(a.labels(), b.labels());
}

#[test]
fn forest_cluster_separates_blobs() {
    let features = make_blobs();
    let labels = SimilarityForestClusterConfig::new(20)
        .unwrap()
        .with_similarity(Kernel::NegSquaredEuclidean)
        .with_max_depth(Some(5))
        .fit_predict(&features)
        .unwrap();
    assert!(labels[..15].iter().all(|&l| l == labels[0]));
    assert!(labels[15..].iter().all(|&l| l == labels[15]));
    assert_ne!(labels[0], labels[15]);
}
