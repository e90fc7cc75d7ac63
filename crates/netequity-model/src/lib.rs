//! Web-presence modeling pipeline.
//!
//! Turns per-country indicator records into a trained Random Forest
//! regressor: mean imputation and standard scaling, seeded held-out
//! evaluation, ranked feature importances, comparison of forest variants,
//! scenario and preset prediction with per-feature contributions,
//! sensitivity simulation, versioned artifacts and a shared model handle
//! for concurrent inference.

mod artifact;
mod compare;
mod error;
mod handle;
mod importance;
mod predict;
mod preprocess;
mod record;
mod scenario;
mod schema;
mod sensitivity;
mod train;

pub use artifact::FORMAT_VERSION;
pub use compare::{Candidate, ComparisonRow, compare};
pub use error::{ArtifactError, ModelError, TrainingError, ValidationError};
pub use handle::{LifecycleState, ModelHandle};
pub use importance::{FeatureImportance, importances};
pub use netequity_rf::ForestSummary;
pub use predict::{
    Breakdown, FeatureContribution, MissingFeaturePolicy, PredictOptions, Prediction, predict,
    predict_preset, resolve_scenario,
};
pub use preprocess::Preprocessor;
pub use record::{FeatureDataset, FeatureRecord, percentile};
pub use scenario::{Preset, Scenario};
pub use schema::{Feature, N_FEATURES, TARGET_NAME, feature_names};
pub use sensitivity::{SimulationRow, simulate};
pub use train::{
    Evaluation, HeldOutPrediction, MIN_RECORDS, ReferenceProfile, TrainedModel, TrainingConfig,
    TrainingReport, train,
};
