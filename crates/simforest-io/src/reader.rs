//! CSV dataset reader with full input validation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use crate::IoError;
use crate::domain::{Dataset, SampleId, TargetColumn};

/// Reads a tabular dataset from a CSV file.
///
/// Expected CSV format:
/// - Header row required
/// - An optional id column and an optional target column, both by name
/// - Every other column is a numeric feature
/// - All rows must have the same number of columns
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`IoError::FileNotFound`] | File doesn't exist or is unreadable |
/// | [`IoError::CsvParse`] | Malformed CSV record |
/// | [`IoError::MissingColumn`] | Id or target column not in header |
/// | [`IoError::NoFeatureColumns`] | Header has no feature columns left |
/// | [`IoError::EmptyDataset`] | Zero data rows after header |
/// | [`IoError::InconsistentRowLength`] | Row has different column count than header |
/// | [`IoError::NonFiniteValue`] | Feature cell is NaN, Inf, or unparseable float |
/// | [`IoError::DuplicateId`] | Same id appears twice |
pub struct DatasetReader {
    path: PathBuf,
    id_column: Option<String>,
    target_column: Option<String>,
}

impl DatasetReader {
    /// Create a new reader for the given CSV file path.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            id_column: None,
            target_column: None,
        }
    }

    /// Take sample ids from the named column.
    #[must_use]
    pub fn with_id_column(mut self, column: Option<String>) -> Self {
        self.id_column = column;
        self
    }

    /// Read the named column as the target.
    #[must_use]
    pub fn with_target_column(mut self, column: Option<String>) -> Self {
        self.target_column = column;
        self
    }

    fn column_index(&self, header: &csv::StringRecord, column: &str) -> Result<usize, IoError> {
        header
            .iter()
            .position(|h| h == column)
            .ok_or_else(|| IoError::MissingColumn {
                path: self.path.clone(),
                column: column.to_string(),
            })
    }

    fn csv_error(&self, e: csv::Error) -> IoError {
        IoError::CsvParse {
            path: self.path.clone(),
            offset: e.position().map_or(0, |p| p.byte()),
            source: e,
        }
    }

    /// Read and validate the CSV file, returning a [`Dataset`].
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn read(&self) -> Result<Dataset, IoError> {
        let file = std::fs::File::open(&self.path).map_err(|e| IoError::FileNotFound {
            path: self.path.clone(),
            source: e,
        })?;

        // flexible(true) allows rows with varying column counts so that our own
        // InconsistentRowLength check fires instead of a low-level CsvParse error.
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(file);

        let header = rdr.headers().map_err(|e| self.csv_error(e))?.clone();
        let expected_cols = header.len();

        let id_idx = self
            .id_column
            .as_deref()
            .map(|c| self.column_index(&header, c))
            .transpose()?;
        let target_idx = self
            .target_column
            .as_deref()
            .map(|c| self.column_index(&header, c))
            .transpose()?;

        let feature_cols: Vec<usize> = (0..expected_cols)
            .filter(|&i| Some(i) != id_idx && Some(i) != target_idx)
            .collect();
        if feature_cols.is_empty() {
            return Err(IoError::NoFeatureColumns {
                path: self.path.clone(),
            });
        }
        let feature_names: Vec<String> =
            feature_cols.iter().map(|&i| header[i].to_string()).collect();
        debug!(expected_cols, n_features = feature_cols.len(), "read CSV header");

        let mut ids = Vec::new();
        let mut features = Vec::new();
        let mut targets = Vec::new();
        let mut seen: HashMap<String, usize> = HashMap::new();

        for (row_index, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| self.csv_error(e))?;

            if record.len() != expected_cols {
                return Err(IoError::InconsistentRowLength {
                    path: self.path.clone(),
                    row_index,
                    expected: expected_cols,
                    got: record.len(),
                });
            }

            let id = match id_idx {
                Some(i) => record[i].to_string(),
                None => row_index.to_string(),
            };
            if let Some(&first_row) = seen.get(&id) {
                return Err(IoError::DuplicateId {
                    path: self.path.clone(),
                    id,
                    first_row,
                    second_row: row_index,
                });
            }
            seen.insert(id.clone(), row_index);

            let mut row = Vec::with_capacity(feature_cols.len());
            for &col in &feature_cols {
                let raw = &record[col];
                let value = raw
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| IoError::NonFiniteValue {
                        path: self.path.clone(),
                        row_index,
                        column: header[col].to_string(),
                        raw: raw.to_string(),
                    })?;
                row.push(value);
            }

            if let Some(t) = target_idx {
                targets.push(record[t].to_string());
            }
            ids.push(SampleId::new(id));
            features.push(row);
        }

        if ids.is_empty() {
            return Err(IoError::EmptyDataset {
                path: self.path.clone(),
            });
        }

        info!(
            n_samples = ids.len(),
            n_features = feature_names.len(),
            has_target = target_idx.is_some(),
            "dataset loaded"
        );

        let target = target_idx.map(|t| TargetColumn::new(header[t].to_string(), targets));
        Ok(Dataset::new(ids, feature_names, features, target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    const LABELLED: &str = "id,x0,species,x1\na,0.0,cat,1.0\nb,0.5,dog,1.5\nc,5.0,cat,6.0\n";

    #[test]
    fn read_with_id_and_target() {
        let f = write_csv(LABELLED);
        let ds = DatasetReader::new(f.path())
            .with_id_column(Some("id".into()))
            .with_target_column(Some("species".into()))
            .read()
            .unwrap();
        assert_eq!(ds.n_samples(), 3);
        assert_eq!(ds.feature_names(), &["x0", "x1"]);
        assert_eq!(ds.features()[1], vec![0.5, 1.5]);
        assert_eq!(ds.ids()[2].as_str(), "c");
        let target = ds.target().unwrap();
        assert_eq!(target.name(), "species");
        assert_eq!(target.raw(), &["cat", "dog", "cat"]);
    }

    #[test]
    fn row_index_ids_without_id_column() {
        let f = write_csv("x0,x1\n1.0,2.0\n3.0,4.0\n");
        let ds = DatasetReader::new(f.path()).read().unwrap();
        assert_eq!(ds.ids()[0].as_str(), "0");
        assert_eq!(ds.ids()[1].as_str(), "1");
        assert!(ds.target().is_none());
        assert_eq!(ds.n_features(), 2);
    }

    #[test]
    fn value_round_trip() {
        let f = write_csv("x0,x1\n1.23456789, 9.87654321\n");
        let ds = DatasetReader::new(f.path()).read().unwrap();
        let vals = &ds.features()[0];
        assert!((vals[0] - 1.23456789).abs() < 1e-12);
        assert!((vals[1] - 9.87654321).abs() < 1e-12);
    }

    #[test]
    fn error_file_not_found() {
        let result = DatasetReader::new(Path::new("/nonexistent/file.csv")).read();
        assert!(matches!(result, Err(IoError::FileNotFound { .. })));
    }

    #[test]
    fn error_missing_target_column() {
        let f = write_csv(LABELLED);
        let result = DatasetReader::new(f.path())
            .with_target_column(Some("label".into()))
            .read();
        assert!(matches!(result, Err(IoError::MissingColumn { column, .. }) if column == "label"));
    }

    #[test]
    fn error_no_feature_columns() {
        let f = write_csv("id,y\na,1\n");
        let result = DatasetReader::new(f.path())
            .with_id_column(Some("id".into()))
            .with_target_column(Some("y".into()))
            .read();
        assert!(matches!(result, Err(IoError::NoFeatureColumns { .. })));
    }

    #[test]
    fn error_empty_dataset() {
        let f = write_csv("x0,x1,x2\n");
        let result = DatasetReader::new(f.path()).read();
        assert!(matches!(result, Err(IoError::EmptyDataset { .. })));
    }

    #[test]
    fn error_inconsistent_row_length() {
        let f = write_csv("x0,x1,x2\n1.0,2.0,3.0\n1.0,2.0\n");
        let result = DatasetReader::new(f.path()).read();
        assert!(matches!(
            result,
            Err(IoError::InconsistentRowLength { row_index: 1, .. })
        ));
    }

    #[test]
    fn error_non_finite_and_unparseable() {
        for cell in ["NaN", "inf", "abc", ""] {
            let f = write_csv(&format!("x0,x1\n1.0,{cell}\n"));
            let result = DatasetReader::new(f.path()).read();
            assert!(
                matches!(result, Err(IoError::NonFiniteValue { ref column, .. }) if column == "x1"),
                "cell {cell:?} accepted"
            );
        }
    }

    #[test]
    fn error_duplicate_id() {
        let f = write_csv("id,x0\nB01,1.0\nB02,3.0\nB01,5.0\n");
        let result = DatasetReader::new(f.path())
            .with_id_column(Some("id".into()))
            .read();
        assert!(matches!(
            result,
            Err(IoError::DuplicateId {
                first_row: 0,
                second_row: 2,
                ..
            })
        ));
    }
}
