//! CSV feature-dataset reader with explicit missing-value handling.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use netequity_model::{Feature, FeatureDataset, FeatureRecord, N_FEATURES, TARGET_NAME};
use tracing::{debug, info, instrument, warn};

use crate::IoError;

/// Header names accepted for the entity column, in lookup order.
pub const ENTITY_COLUMNS: [&str; 3] = ["country", "entity", "Country"];

/// Cell contents treated as a missing value.
pub const MISSING_MARKERS: [&str; 7] = ["", "..", "NA", "N/A", "n/a", "NaN", "nan"];

/// Reads a [`FeatureDataset`] from a CSV file.
///
/// Expected CSV format:
/// - Header row required
/// - An entity column named `country` (or `entity` / `Country`)
/// - The eight feature columns and `web_pages_per_million`, in any order
/// - Extra columns are ignored
///
/// Feature cells holding one of [`MISSING_MARKERS`] become `None`. Rows
/// whose label is missing are skipped with a warning.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`IoError::FileNotFound`] | File doesn't exist or is unreadable |
/// | [`IoError::CsvParse`] | Malformed CSV record |
/// | [`IoError::MissingColumn`] | Entity, feature or label column absent |
/// | [`IoError::ShortRow`] | Row ends before a required column |
/// | [`IoError::InvalidValue`] | Cell is unparseable, infinite, or an empty entity |
/// | [`IoError::DuplicateEntity`] | Same entity appears twice |
/// | [`IoError::EmptyDataset`] | No labelled rows after the header |
pub struct DatasetReader {
    path: PathBuf,
}

/// Column positions resolved from the header.
struct Columns {
    entity: usize,
    entity_name: String,
    features: [usize; N_FEATURES],
    label: usize,
}

impl Columns {
    fn max_index(&self) -> usize {
        self.features
            .iter()
            .copied()
            .chain([self.entity, self.label])
            .max()
            .unwrap_or(0)
    }
}

impl DatasetReader {
    /// Create a new reader for the given CSV file path.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Read and validate the CSV file, returning a [`FeatureDataset`].
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn read(&self) -> Result<FeatureDataset, IoError> {
        let file = std::fs::File::open(&self.path).map_err(|e| IoError::FileNotFound {
            path: self.path.clone(),
            source: e,
        })?;

        // flexible(true) so that short rows surface as ShortRow, not CsvParse.
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(file);

        let header = rdr.headers().map_err(|e| self.csv_error(e))?.clone();
        let columns = self.resolve_columns(&header)?;
        let required = columns.max_index() + 1;
        debug!(n_columns = header.len(), entity = %columns.entity_name, "read CSV header");

        let mut records = Vec::new();
        let mut seen: HashMap<String, usize> = HashMap::new();
        let mut n_skipped = 0usize;

        for (row_index, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| self.csv_error(e))?;

            if record.len() < required {
                return Err(IoError::ShortRow {
                    path: self.path.clone(),
                    row_index,
                    expected: required,
                    got: record.len(),
                });
            }

            let entity = record.get(columns.entity).unwrap_or("").to_string();
            if entity.is_empty() {
                return Err(IoError::InvalidValue {
                    path: self.path.clone(),
                    row_index,
                    column: columns.entity_name.clone(),
                    raw: entity,
                });
            }
            if let Some(&first_row) = seen.get(&entity) {
                return Err(IoError::DuplicateEntity {
                    path: self.path.clone(),
                    entity,
                    first_row,
                    second_row: row_index,
                });
            }
            seen.insert(entity.clone(), row_index);

            let mut values = [None; N_FEATURES];
            for feature in Feature::ALL {
                let raw = record.get(columns.features[feature.index()]).unwrap_or("");
                values[feature.index()] = self.parse_cell(raw, row_index, feature.name())?;
            }

            let raw_label = record.get(columns.label).unwrap_or("");
            let Some(label) = self.parse_cell(raw_label, row_index, TARGET_NAME)? else {
                warn!(row_index, entity = %entity, "skipping row without label");
                n_skipped += 1;
                continue;
            };

            records.push(FeatureRecord::new(entity, values, label));
        }

        if records.is_empty() {
            return Err(IoError::EmptyDataset {
                path: self.path.clone(),
            });
        }

        let n_missing_cells: usize = records
            .iter()
            .map(|r| r.values.iter().filter(|v| v.is_none()).count())
            .sum();
        info!(
            n_records = records.len(),
            n_skipped, n_missing_cells, "dataset loaded"
        );

        Ok(FeatureDataset::new(records))
    }

    fn resolve_columns(&self, header: &csv::StringRecord) -> Result<Columns, IoError> {
        let position = |name: &str| header.iter().position(|h| h == name);
        let missing = |name: &str| IoError::MissingColumn {
            path: self.path.clone(),
            column: name.to_string(),
        };

        let (entity, entity_name) = ENTITY_COLUMNS
            .iter()
            .find_map(|&name| position(name).map(|i| (i, name.to_string())))
            .ok_or_else(|| missing(ENTITY_COLUMNS[0]))?;

        let mut features = [0usize; N_FEATURES];
        for feature in Feature::ALL {
            features[feature.index()] =
                position(feature.name()).ok_or_else(|| missing(feature.name()))?;
        }
        let label = position(TARGET_NAME).ok_or_else(|| missing(TARGET_NAME))?;

        Ok(Columns {
            entity,
            entity_name,
            features,
            label,
        })
    }

    fn parse_cell(&self, raw: &str, row_index: usize, column: &str) -> Result<Option<f64>, IoError> {
        if MISSING_MARKERS.iter().any(|m| *m == raw) {
            return Ok(None);
        }
        let invalid = || IoError::InvalidValue {
            path: self.path.clone(),
            row_index,
            column: column.to_string(),
            raw: raw.to_string(),
        };
        let value: f64 = raw.parse().map_err(|_| invalid())?;
        if !value.is_finite() {
            return Err(invalid());
        }
        Ok(Some(value))
    }

    fn csv_error(&self, e: csv::Error) -> IoError {
        IoError::CsvParse {
            path: self.path.clone(),
            offset: e.position().map_or(0, |p| p.byte()),
            source: e,
        }
    }
}
