//! Per-country records and the dataset that holds them.

use crate::schema::{Feature, N_FEATURES};

/// One observed entity: eight optional indicator values and a label.
///
/// `None` marks an unknown value; it is imputed at training and
/// prediction time, never dropped.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FeatureRecord {
    /// Country or region name.
    pub entity: String,
    /// One slot per [`Feature`], in schema order.
    pub values: [Option<f64>; N_FEATURES],
    /// Web pages per million population.
    pub label: f64,
}

impl FeatureRecord {
    /// Create a record.
    #[must_use]
    pub fn new(entity: impl Into<String>, values: [Option<f64>; N_FEATURES], label: f64) -> Self {
        Self {
            entity: entity.into(),
            values,
            label,
        }
    }

    /// Value of one feature, if present.
    #[must_use]
    pub fn get(&self, feature: Feature) -> Option<f64> {
        self.values[feature.index()]
    }
}

/// An ordered collection of [`FeatureRecord`]s.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FeatureDataset {
    records: Vec<FeatureRecord>,
}

impl FeatureDataset {
    /// Wrap a vector of records.
    #[must_use]
    pub fn new(records: Vec<FeatureRecord>) -> Self {
        Self { records }
    }

    /// Borrow the records.
    #[must_use]
    pub fn records(&self) -> &[FeatureRecord] {
        &self.records
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// `true` when the dataset holds no record.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Labels in record order.
    #[must_use]
    pub fn labels(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.label).collect()
    }

    /// One column, with missing values kept as `None`.
    #[must_use]
    pub fn column(&self, feature: Feature) -> Vec<Option<f64>> {
        self.records.iter().map(|r| r.get(feature)).collect()
    }

    /// Present values of one column.
    #[must_use]
    pub fn present_values(&self, feature: Feature) -> Vec<f64> {
        self.records.iter().filter_map(|r| r.get(feature)).collect()
    }

    /// Percentile `q` (0..=100) of a column's present values.
    ///
    /// `None` when the column has no present value.
    #[must_use]
    pub fn percentile(&self, feature: Feature, q: f64) -> Option<f64> {
        percentile(&self.present_values(feature), q)
    }

    /// New dataset holding the records at `indices`, in that order.
    ///
    /// # Panics
    ///
    /// Panics if an index is out of bounds.
    #[must_use]
    pub fn subset(&self, indices: &[usize]) -> Self {
        Self {
            records: indices.iter().map(|&i| self.records[i].clone()).collect(),
        }
    }
}

impl FromIterator<FeatureRecord> for FeatureDataset {
    fn from_iter<I: IntoIterator<Item = FeatureRecord>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Percentile `q` (clamped to 0..=100) by linear interpolation between order statistics.
///
/// Matches NumPy's default `linear` method. Returns `None` for empty input.
#[must_use]
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let pos = q.clamp(0.0, 100.0) / 100.0 * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}
