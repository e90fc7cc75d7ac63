//! Error types for netequity-model.

use std::path::PathBuf;

use netequity_rf::RfError;

use crate::schema::Feature;

/// Errors from malformed or incomplete model input.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// Returned when a feature name is not part of the schema.
    #[error("unknown feature \"{name}\"")]
    UnknownFeature {
        /// The unrecognised name.
        name: String,
    },

    /// Returned when a preset name is not one of developed, emerging, rural.
    #[error("unknown preset \"{name}\": expected developed, emerging or rural")]
    UnknownPreset {
        /// The unrecognised name.
        name: String,
    },

    /// Returned when an input row has the wrong number of feature values.
    #[error("input has {got} feature values, expected {expected}")]
    FeatureCountMismatch {
        /// Width of the fitted schema.
        expected: usize,
        /// Width of the offending input.
        got: usize,
    },

    /// Returned when a feature has no present value in the training rows.
    #[error("column {feature} is entirely missing")]
    ColumnEntirelyMissing {
        /// The empty column.
        feature: Feature,
    },

    /// Returned when a training row holds a NaN or infinite feature value.
    #[error("non-finite value for {feature} at row {row}")]
    NonFiniteValue {
        /// Column of the offending value.
        feature: Feature,
        /// Zero-based row index.
        row: usize,
    },

    /// Returned when an inference input holds a NaN or infinite feature value.
    #[error("non-finite input value for {feature}")]
    NonFiniteInput {
        /// Column of the offending value.
        feature: Feature,
    },

    /// Returned when a record's label is NaN or infinite.
    #[error("non-finite label for \"{entity}\" at row {row}")]
    NonFiniteLabel {
        /// Entity name of the record.
        entity: String,
        /// Zero-based row index.
        row: usize,
    },

    /// Returned when a scenario lacks a feature and the policy gives no fallback.
    #[error("scenario is missing {feature} and no fallback is configured")]
    MissingScenarioFeature {
        /// First absent feature in schema order.
        feature: Feature,
    },

    /// Returned when no dataset record has a value for the simulated feature.
    #[error("no record has a value for {feature}")]
    NoRecordsWithFeature {
        /// The simulated feature.
        feature: Feature,
    },

    /// Returned when a simulated percentage change is NaN or infinite.
    #[error("percentage change must be finite, got {pct_change}")]
    InvalidPercentChange {
        /// The offending percentage.
        pct_change: f64,
    },

    /// Returned when the forest rejects a transformed input.
    #[error("forest rejected the input")]
    Forest(#[from] RfError),
}

/// Errors that abort a training run.
#[derive(Debug, thiserror::Error)]
pub enum TrainingError {
    /// Returned when there are too few records to hold one out.
    #[error("need at least {min_records} records to train, got {n_records}")]
    InsufficientRecords {
        /// Number of records supplied.
        n_records: usize,
        /// Minimum accepted.
        min_records: usize,
    },

    /// Returned when every label has the same value.
    #[error("all {n_records} labels equal {value}; nothing to learn")]
    DegenerateLabels {
        /// The shared label value.
        value: f64,
        /// Number of records supplied.
        n_records: usize,
    },

    /// Returned when the held-out fraction is not in (0.0, 1.0).
    #[error("test_fraction must be in (0.0, 1.0), got {fraction}")]
    InvalidTestFraction {
        /// The invalid fraction.
        fraction: f64,
    },

    /// Returned when the forest configuration or fit fails.
    #[error("forest training failed")]
    Forest(#[from] RfError),
}

/// Errors from saving or loading a model artifact.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    /// Returned when the artifact file cannot be read.
    #[error("cannot read model artifact {path}")]
    Read {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when the artifact cannot be written or moved into place.
    #[error("cannot write model artifact {path}")]
    Write {
        /// Destination path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when bincode encoding fails.
    #[error("cannot encode model artifact")]
    Encode {
        /// Underlying bincode error.
        source: bincode::Error,
    },

    /// Returned when the file is not a decodable artifact.
    #[error("corrupt model artifact {path}")]
    Decode {
        /// Path that was read.
        path: PathBuf,
        /// Underlying bincode error.
        source: bincode::Error,
    },

    /// Returned when the artifact was written by an incompatible format version.
    #[error("model artifact {path} has format version {found}, expected {expected}")]
    IncompatibleVersion {
        /// Path that was read.
        path: PathBuf,
        /// Version this build understands.
        expected: u32,
        /// Version found in the file.
        found: u32,
    },

    /// Returned when the artifact was trained on a different feature schema.
    #[error("model artifact {path} was trained on features {found:?}")]
    SchemaMismatch {
        /// Path that was read.
        path: PathBuf,
        /// Feature names stored in the artifact.
        found: Vec<String>,
    },
}

/// Any error raised by the modeling pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// Invalid input.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Training failed.
    #[error(transparent)]
    Training(#[from] TrainingError),

    /// Artifact save or load failed.
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}
