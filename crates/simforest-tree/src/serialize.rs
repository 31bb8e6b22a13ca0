//! Model serialization and deserialization via bincode.

use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument};

use crate::error::SimForestError;
use crate::forest::SimilarityForest;
use crate::task::Task;

/// Current binary format version.
const FORMAT_VERSION: u32 = 1;

/// Versioned envelope for the serialized model.
///
/// Generic over the payload so saving can borrow the forest while loading
/// owns it.
#[derive(serde::Serialize, serde::Deserialize)]
struct ModelEnvelope<F> {
    /// Format version for compatibility checking.
    format_version: u32,
    /// Number of trees in the forest.
    n_estimators: usize,
    /// Number of features the model was trained on.
    n_features: usize,
    /// Task the model was trained for.
    task: Task,
    /// The serialized forest.
    forest: F,
}

impl<S: Serialize> SimilarityForest<S> {
    /// Save the model to a binary file.
    ///
    /// Uses bincode encoding wrapped in a versioned envelope. The similarity
    /// function is stored with the trees, so only serializable similarities
    /// (such as [`Kernel`](crate::Kernel)) can be saved.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`SimForestError::SerializeModel`] | bincode encoding failed |
    /// | [`SimForestError::WriteModel`] | file write failed |
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SimForestError> {
        let path = path.as_ref();

        let envelope = ModelEnvelope {
            format_version: FORMAT_VERSION,
            n_estimators: self.trees.len(),
            n_features: self.n_features,
            task: self.task,
            forest: self,
        };

        let bytes = bincode::serialize(&envelope)
            .map_err(|e| SimForestError::SerializeModel { source: e })?;

        std::fs::write(path, &bytes).map_err(|e| SimForestError::WriteModel {
            path: path.to_path_buf(),
            source: e,
        })?;

        info!(
            size_bytes = bytes.len(),
            n_estimators = self.trees.len(),
            "model saved"
        );

        Ok(())
    }
}

impl<S: DeserializeOwned> SimilarityForest<S> {
    /// Load a model from a binary file.
    ///
    /// Checks the format version and returns an error on mismatch.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`SimForestError::ReadModel`] | file read failed |
    /// | [`SimForestError::DeserializeModel`] | bincode decoding failed |
    /// | [`SimForestError::IncompatibleModelVersion`] | format version mismatch |
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SimForestError> {
        let path = path.as_ref();

        let bytes = std::fs::read(path).map_err(|e| SimForestError::ReadModel {
            path: path.to_path_buf(),
            source: e,
        })?;

        // The version is the envelope's first field; check it before decoding
        // the payload so older layouts report a version mismatch.
        let format_version: u32 = bincode::deserialize(&bytes).map_err(|e| {
            SimForestError::DeserializeModel {
                path: path.to_path_buf(),
                source: e,
            }
        })?;
        if format_version != FORMAT_VERSION {
            return Err(SimForestError::IncompatibleModelVersion {
                expected: FORMAT_VERSION,
                found: format_version,
                path: path.to_path_buf(),
            });
        }

        let envelope: ModelEnvelope<SimilarityForest<S>> = bincode::deserialize(&bytes)
            .map_err(|e| SimForestError::DeserializeModel {
                path: path.to_path_buf(),
                source: e,
            })?;

        debug!(
            n_estimators = envelope.n_estimators,
            n_features = envelope.n_features,
            task = ?envelope.task,
            "model loaded"
        );

        Ok(envelope.forest)
    }
}
