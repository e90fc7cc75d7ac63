//! Dataset input and report output for the netequity pipeline.
//!
//! Reads per-country indicator tables from CSV, generates deterministic
//! synthetic datasets, and writes training, prediction and simulation
//! reports for a named experiment.

mod domain;
mod error;
mod reader;
mod synthetic;
mod writer;

pub use domain::ExperimentName;
pub use error::IoError;
pub use reader::{DatasetReader, ENTITY_COLUMNS, MISSING_MARKERS};
pub use synthetic::{MISSING_RATE, synthetic_dataset};
pub use writer::{PredictionEntry, ReportWriter};
