//! Domain types for simforest-io.

use std::collections::BTreeSet;

use crate::IoError;

/// A sample identifier.
///
/// Taken from the id column when one is configured, otherwise the zero-based
/// row index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SampleId(String);

impl SampleId {
    pub(crate) fn new(id: String) -> Self {
        Self(id)
    }

    /// Return the sample id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SampleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated experiment name for output file naming.
///
/// Must match `[a-zA-Z0-9_-]+`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentName(String);

impl ExperimentName {
    /// Parse and validate an experiment name.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::InvalidExperimentName`] if the name is empty or
    /// contains characters outside `[a-zA-Z0-9_-]`.
    pub fn new(name: String) -> Result<Self, IoError> {
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(IoError::InvalidExperimentName { name });
        }
        Ok(Self(name))
    }

    /// Return the experiment name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ExperimentName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The raw cells of the target column.
#[derive(Debug, Clone)]
pub struct TargetColumn {
    name: String,
    raw: Vec<String>,
}

impl TargetColumn {
    pub(crate) fn new(name: String, raw: Vec<String>) -> Self {
        Self { name, raw }
    }

    /// Return the column name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the raw cell strings.
    #[must_use]
    pub fn raw(&self) -> &[String] {
        &self.raw
    }

    /// Encode the cells as zero-based class labels.
    ///
    /// Class names are sorted, so label `i` is `classes[i]`.
    #[must_use]
    pub fn class_labels(&self) -> (Vec<usize>, Vec<String>) {
        let classes: Vec<String> = self
            .raw
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let labels = self
            .raw
            .iter()
            .map(|cell| classes.partition_point(|c| c < cell))
            .collect();
        (labels, classes)
    }

    /// Parse the cells as finite regression targets.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::NonNumericTarget`] for the first cell that is not a
    /// finite float.
    pub fn values(&self) -> Result<Vec<f64>, IoError> {
        self.raw
            .iter()
            .enumerate()
            .map(|(row_index, raw)| match raw.trim().parse::<f64>() {
                Ok(v) if v.is_finite() => Ok(v),
                _ => Err(IoError::NonNumericTarget {
                    column: self.name.clone(),
                    row_index,
                    raw: raw.clone(),
                }),
            })
            .collect()
    }
}

/// A tabular dataset read from CSV.
///
/// Produced by [`DatasetReader`](crate::DatasetReader). Ids and feature rows
/// are stored in parallel vectors: `ids[i]` corresponds to `features[i]`.
#[derive(Debug)]
pub struct Dataset {
    ids: Vec<SampleId>,
    feature_names: Vec<String>,
    features: Vec<Vec<f64>>,
    target: Option<TargetColumn>,
}

impl Dataset {
    pub(crate) fn new(
        ids: Vec<SampleId>,
        feature_names: Vec<String>,
        features: Vec<Vec<f64>>,
        target: Option<TargetColumn>,
    ) -> Self {
        Self {
            ids,
            feature_names,
            features,
            target,
        }
    }

    /// Return the sample ids.
    #[must_use]
    pub fn ids(&self) -> &[SampleId] {
        &self.ids
    }

    /// Return the feature column names.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Return the feature matrix (row-major).
    #[must_use]
    pub fn features(&self) -> &[Vec<f64>] {
        &self.features
    }

    /// Return the target column, if one was read.
    #[must_use]
    pub fn target(&self) -> Option<&TargetColumn> {
        self.target.as_ref()
    }

    /// Return the number of samples.
    #[must_use]
    pub fn n_samples(&self) -> usize {
        self.ids.len()
    }

    /// Return the number of feature columns.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_id_as_str_returns_inner() {
        let id = SampleId::new("s-17".to_string());
        assert_eq!(id.as_str(), "s-17");
        assert_eq!(id.to_string(), "s-17");
    }

    #[test]
    fn experiment_name_valid() {
        let name = ExperimentName::new("my-experiment_01".to_string());
        assert_eq!(name.unwrap().as_str(), "my-experiment_01");
    }

    #[test]
    fn experiment_name_rejects_empty() {
        let name = ExperimentName::new(String::new());
        assert!(matches!(name, Err(IoError::InvalidExperimentName { .. })));
    }

    #[test]
    fn experiment_name_rejects_special_chars() {
        let name = ExperimentName::new("my experiment!".to_string());
        assert!(matches!(name, Err(IoError::InvalidExperimentName { .. })));
    }

    #[test]
    fn class_labels_are_sorted_names() {
        let target = TargetColumn::new(
            "species".into(),
            vec!["virginica".into(), "setosa".into(), "virginica".into(), "versicolor".into()],
        );
        let (labels, classes) = target.class_labels();
        assert_eq!(classes, vec!["setosa", "versicolor", "virginica"]);
        assert_eq!(labels, vec![2, 0, 2, 1]);
    }

    #[test]
    fn numeric_values_parse_and_reject() {
        let ok = TargetColumn::new("y".into(), vec!["1.5".into(), " -2 ".into()]);
        assert_eq!(ok.values().unwrap(), vec![1.5, -2.0]);

        let bad = TargetColumn::new("y".into(), vec!["1.0".into(), "NaN".into()]);
        assert!(matches!(
            bad.values(),
            Err(IoError::NonNumericTarget { row_index: 1, .. })
        ));
    }
}
