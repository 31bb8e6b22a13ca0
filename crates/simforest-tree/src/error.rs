use std::path::PathBuf;

use crate::criterion::Criterion;

/// Errors from similarity tree, forest and clustering operations.
#[derive(Debug, thiserror::Error)]
pub enum SimForestError {
    /// Returned when n_estimators is zero.
    #[error("n_estimators must be at least 1, got {n_estimators}")]
    InvalidEstimatorCount {
        /// The invalid n_estimators value provided.
        n_estimators: usize,
    },

    /// Returned when max_depth is zero.
    #[error("max_depth must be at least 1, got {max_depth}")]
    InvalidMaxDepth {
        /// The invalid max_depth value provided.
        max_depth: usize,
    },

    /// Returned when min_samples_split is less than 2.
    #[error("min_samples_split must be at least 2, got {min_samples_split}")]
    InvalidMinSamplesSplit {
        /// The invalid min_samples_split value provided.
        min_samples_split: usize,
    },

    /// Returned when min_samples_leaf is zero.
    #[error("min_samples_leaf must be at least 1, got {min_samples_leaf}")]
    InvalidMinSamplesLeaf {
        /// The invalid min_samples_leaf value provided.
        min_samples_leaf: usize,
    },

    /// Returned when n_directions is zero.
    #[error("n_directions must be at least 1, got {n_directions}")]
    InvalidDirectionCount {
        /// The invalid n_directions value provided.
        n_directions: usize,
    },

    /// Returned when an RBF kernel has a gamma that is not finite and positive.
    #[error("rbf gamma must be finite and positive, got {gamma}")]
    InvalidGamma {
        /// The invalid gamma value provided.
        gamma: f64,
    },

    /// Returned when n_jobs is `Some(0)`.
    #[error("n_jobs must be at least 1 when set, got {n_jobs}")]
    InvalidJobCount {
        /// The invalid n_jobs value provided.
        n_jobs: usize,
    },

    /// Returned when the criterion cannot score the requested task.
    #[error("criterion {criterion:?} cannot be used for {task}")]
    IncompatibleCriterion {
        /// The configured criterion.
        criterion: Criterion,
        /// Human-readable task name ("classification" or "regression").
        task: &'static str,
    },

    /// Returned when OOB scoring is requested without bootstrap sampling.
    #[error("OOB scoring requires bootstrap sampling")]
    OobWithoutBootstrap,

    /// Returned when the training dataset has zero samples.
    #[error("training dataset has zero samples")]
    EmptyDataset,

    /// Returned when the training dataset has zero feature columns.
    #[error("training dataset has zero feature columns")]
    ZeroFeatures,

    /// Returned when a sample has a different number of features than the first row.
    #[error("sample {sample_index} has {got} features, expected {expected}")]
    FeatureCountMismatch {
        /// The expected number of features.
        expected: usize,
        /// The actual number of features in the sample.
        got: usize,
        /// The zero-based index of the offending sample.
        sample_index: usize,
    },

    /// Returned when a sample has a different number of features at prediction time.
    #[error("prediction input has {got} features, expected {expected}")]
    PredictionFeatureMismatch {
        /// The expected number of features.
        expected: usize,
        /// The actual number of features in the prediction input.
        got: usize,
    },

    /// Returned when a feature value is NaN or infinite.
    #[error("non-finite value at sample {sample_index}, feature {feature_index}")]
    NonFiniteValue {
        /// The zero-based index of the offending sample.
        sample_index: usize,
        /// The zero-based index of the offending feature column.
        feature_index: usize,
    },

    /// Returned when a prediction input holds a NaN or infinite value.
    #[error("non-finite prediction input at feature {feature_index}")]
    NonFinitePredictionValue {
        /// The zero-based index of the offending feature.
        feature_index: usize,
    },

    /// Returned when a regression target is NaN or infinite.
    #[error("non-finite target at sample {sample_index}")]
    NonFiniteTarget {
        /// The zero-based index of the offending sample.
        sample_index: usize,
    },

    /// Returned when the target vector length differs from the number of samples.
    #[error("got {n_targets} targets for {n_samples} samples")]
    TargetCountMismatch {
        /// Number of feature rows.
        n_samples: usize,
        /// Number of targets.
        n_targets: usize,
    },

    /// Returned when a class label is not below the sample count.
    #[error("class label {label} at sample {sample_index} is out of range for {n_samples} samples")]
    LabelOutOfRange {
        /// The offending label.
        label: usize,
        /// The zero-based index of the offending sample.
        sample_index: usize,
        /// Number of training samples.
        n_samples: usize,
    },

    /// Returned when a classification-only operation is called on a regression model.
    #[error("{operation} is only available for classification models")]
    NotAClassifier {
        /// Name of the rejected operation.
        operation: &'static str,
    },

    /// Returned when scoring outcomes do not match the model's task.
    #[error("a {task} model cannot be scored against {outcomes}")]
    OutcomeMismatch {
        /// Task of the fitted model.
        task: &'static str,
        /// Kind of outcomes supplied.
        outcomes: &'static str,
    },

    /// Returned when a cluster cut asks for zero clusters or more clusters than points.
    #[error("cannot cut {n_points} points into {n_clusters} clusters")]
    InvalidClusterCount {
        /// The requested cluster count.
        n_clusters: usize,
        /// The number of clustered points.
        n_points: usize,
    },

    /// Returned when a depth cut is zero.
    #[error("cut depth must be at least 1, got {depth}")]
    InvalidCutDepth {
        /// The invalid depth.
        depth: usize,
    },

    /// Returned when the dedicated worker pool cannot be built.
    #[error("failed to build a worker pool with {n_jobs} threads")]
    ThreadPool {
        /// Requested thread count.
        n_jobs: usize,
        /// The underlying rayon error.
        source: rayon::ThreadPoolBuildError,
    },

    /// Returned when model serialization fails.
    #[error("failed to serialize model")]
    SerializeModel {
        /// The underlying bincode error.
        source: Box<bincode::ErrorKind>,
    },

    /// Returned when model deserialization fails.
    #[error("failed to deserialize model from {path}")]
    DeserializeModel {
        /// Path to the model file that could not be deserialized.
        path: PathBuf,
        /// The underlying bincode error.
        source: Box<bincode::ErrorKind>,
    },

    /// Returned when writing the model file fails.
    #[error("failed to write model to {path}")]
    WriteModel {
        /// Path to the file that could not be written.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when reading the model file fails.
    #[error("failed to read model from {path}")]
    ReadModel {
        /// Path to the file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when loading a model with an incompatible format version.
    #[error("incompatible model version in {path}: expected {expected}, found {found}")]
    IncompatibleModelVersion {
        /// The model format version this build expects.
        expected: u32,
        /// The model format version found in the file.
        found: u32,
        /// Path to the model file with the incompatible version.
        path: PathBuf,
    },
}
