//! JSON result writer for forest fits, predictions and clusterings.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use simforest_tree::{
    ClassDistribution, ClusterLabel, ForestResult, Linkage, OobScore, PermutationImportance,
    Prediction, TrainingMetadata,
};
use tracing::{debug, info, instrument};

use crate::IoError;
use crate::domain::{ExperimentName, SampleId};

/// Writes fit, prediction and clustering results to JSON files.
///
/// Creates the output directory on construction if it does not exist.
/// Output files are named `{experiment}_fit.json`,
/// `{experiment}_predictions.json` and `{experiment}_cluster.json`.
pub struct ResultWriter {
    output_dir: PathBuf,
    experiment: ExperimentName,
}

impl ResultWriter {
    /// Create a new writer targeting the given directory and experiment name.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::OutputDirCreate`] if the directory cannot be created.
    #[instrument(skip_all, fields(dir = %output_dir.display(), experiment = %experiment))]
    pub fn new(output_dir: &Path, experiment: ExperimentName) -> Result<Self, IoError> {
        fs::create_dir_all(output_dir).map_err(|e| IoError::OutputDirCreate {
            path: output_dir.to_path_buf(),
            source: e,
        })?;
        debug!("output directory ready");
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            experiment,
        })
    }

    fn artifact_path(&self, suffix: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}_{suffix}", self.experiment.as_str()))
    }

    fn write_json<T: Serialize>(&self, path: &Path, artifact: &T) -> Result<(), IoError> {
        let json = serde_json::to_string_pretty(artifact).map_err(|e| IoError::SerializeJson {
            path: path.to_path_buf(),
            source: e,
        })?;
        fs::write(path, &json).map_err(|e| IoError::WriteFile {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Write a training summary to `{experiment}_fit.json`.
    ///
    /// `classes` names the class labels of a classifier; `importances` are
    /// written ranked when given.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::SerializeJson`] | JSON encoding failed |
    /// | [`IoError::WriteFile`] | the file cannot be written |
    #[instrument(skip_all)]
    pub fn write_fit<S>(
        &self,
        result: &ForestResult<S>,
        feature_names: &[String],
        classes: Option<&[String]>,
        importances: Option<&[PermutationImportance]>,
    ) -> Result<PathBuf, IoError> {
        let path = self.artifact_path("fit.json");

        let importances = importances.map(|imps| {
            imps.iter()
                .map(|p| ImportanceEntry {
                    name: feature_names.get(p.feature).map_or("", String::as_str),
                    importance: p.importance,
                    std: p.std,
                    rank: p.rank,
                })
                .collect()
        });

        let artifact = FitArtifact {
            experiment: self.experiment.as_str(),
            metadata: result.metadata(),
            feature_names,
            classes,
            oob: result.oob_score().map(OobEntry::from),
            importances,
            model_path: self.model_path(),
        };
        self.write_json(&path, &artifact)?;

        info!(path = %path.display(), "fit summary written");
        Ok(path)
    }

    /// Write predictions to `{experiment}_predictions.json`.
    ///
    /// `probabilities` is parallel to `predictions` for classifiers. Class
    /// labels are written by name when `classes` is given.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::SerializeJson`] | JSON encoding failed |
    /// | [`IoError::WriteFile`] | the file cannot be written |
    #[instrument(skip_all)]
    pub fn write_predictions(
        &self,
        ids: &[SampleId],
        predictions: &[Prediction],
        probabilities: Option<&[ClassDistribution]>,
        classes: Option<&[String]>,
    ) -> Result<PathBuf, IoError> {
        let path = self.artifact_path("predictions.json");

        let entries: Vec<PredictionEntry> = ids
            .iter()
            .zip(predictions)
            .enumerate()
            .map(|(i, (id, prediction))| {
                let label = match (prediction, classes) {
                    (Prediction::Class(c), Some(names)) => names.get(*c).cloned(),
                    _ => None,
                };
                PredictionEntry {
                    id: id.as_str(),
                    prediction: prediction.as_f64(),
                    label,
                    probabilities: probabilities
                        .and_then(|p| p.get(i))
                        .map(ClassDistribution::as_slice),
                }
            })
            .collect();

        let artifact = PredictArtifact {
            experiment: self.experiment.as_str(),
            n_samples: entries.len(),
            predictions: entries,
        };
        self.write_json(&path, &artifact)?;

        info!(path = %path.display(), "predictions written");
        Ok(path)
    }

    /// Write a clustering to `{experiment}_cluster.json`: per-sample labels,
    /// cluster sizes and the linkage matrix.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::SerializeJson`] | JSON encoding failed |
    /// | [`IoError::WriteFile`] | the file cannot be written |
    #[instrument(skip_all)]
    pub fn write_cluster(
        &self,
        ids: &[SampleId],
        labels: &[ClusterLabel],
        linkage: &Linkage,
    ) -> Result<PathBuf, IoError> {
        let path = self.artifact_path("cluster.json");

        let assignments: BTreeMap<&str, usize> = ids
            .iter()
            .zip(labels)
            .map(|(id, label)| (id.as_str(), label.index()))
            .collect();
        let n_clusters = labels.iter().map(|l| l.index() + 1).max().unwrap_or(0);
        let mut cluster_sizes = vec![0usize; n_clusters];
        for label in labels {
            cluster_sizes[label.index()] += 1;
        }

        let artifact = ClusterArtifact {
            experiment: self.experiment.as_str(),
            n_clusters,
            assignments,
            cluster_sizes,
            linkage: linkage.to_matrix(),
        };
        self.write_json(&path, &artifact)?;

        info!(path = %path.display(), "cluster result written");
        Ok(path)
    }

    /// Return the path where the model binary should be saved.
    ///
    /// Does not write anything, just computes `{output_dir}/{experiment}_model.bin`.
    #[must_use]
    pub fn model_path(&self) -> PathBuf {
        self.artifact_path("model.bin")
    }
}

// --- Shadow structs for JSON serialization ---

#[derive(Serialize)]
struct FitArtifact<'a> {
    experiment: &'a str,
    metadata: &'a TrainingMetadata,
    feature_names: &'a [String],
    classes: Option<&'a [String]>,
    oob: Option<OobEntry>,
    importances: Option<Vec<ImportanceEntry<'a>>>,
    model_path: PathBuf,
}

#[derive(Serialize)]
struct OobEntry {
    score: Option<f64>,
    n_oob_samples: usize,
}

impl From<&OobScore> for OobEntry {
    fn from(oob: &OobScore) -> Self {
        // JSON has no NaN.
        Self {
            score: oob.score.is_finite().then_some(oob.score),
            n_oob_samples: oob.n_oob_samples,
        }
    }
}

#[derive(Serialize)]
struct ImportanceEntry<'a> {
    name: &'a str,
    importance: f64,
    std: f64,
    rank: usize,
}

#[derive(Serialize)]
struct PredictArtifact<'a> {
    experiment: &'a str,
    n_samples: usize,
    predictions: Vec<PredictionEntry<'a>>,
}

#[derive(Serialize)]
struct PredictionEntry<'a> {
    id: &'a str,
    prediction: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    probabilities: Option<&'a [f64]>,
}

#[derive(Serialize)]
struct ClusterArtifact<'a> {
    experiment: &'a str,
    n_clusters: usize,
    assignments: BTreeMap<&'a str, usize>,
    cluster_sizes: Vec<usize>,
    linkage: Vec<[f64; 4]>,
}
