//! Training and held-out evaluation of the web-presence model.

use netequity_rf::{
    ForestSummary, MaxFeatures, OobMode, RandomForest, RandomForestConfig, RfError,
    SplitCriterion, SplitMethod, mean_squared_error, r2_score,
};
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, instrument, warn};

use crate::error::{ModelError, TrainingError, ValidationError};
use crate::importance::{FeatureImportance, importances};
use crate::preprocess::Preprocessor;
use crate::record::FeatureDataset;
use crate::schema::{Feature, N_FEATURES, feature_names};
use crate::scenario::Preset;

/// Fewest records that still leave one for training and one held out.
pub const MIN_RECORDS: usize = 2;

/// Hyperparameters for a training run.
///
/// Construct via [`TrainingConfig::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter            | Default        |
/// |----------------------|----------------|
/// | `n_trees`            | 100            |
/// | `max_depth`          | `Some(10)`     |
/// | `min_samples_split`  | 5              |
/// | `min_samples_leaf`   | 1              |
/// | `max_features`       | `All`          |
/// | `criterion`          | `SquaredError` |
/// | `split_method`       | `Exact`        |
/// | `bootstrap_fraction` | 1.0            |
/// | `oob_mode`           | `Disabled`     |
/// | `seed`               | 42             |
/// | `test_fraction`      | 0.2            |
///
/// The seed drives both the held-out shuffle and the forest.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TrainingConfig {
    n_trees: usize,
    max_depth: Option<usize>,
    min_samples_split: usize,
    min_samples_leaf: usize,
    max_features: MaxFeatures,
    criterion: SplitCriterion,
    split_method: SplitMethod,
    bootstrap_fraction: f64,
    oob_mode: OobMode,
    seed: u64,
    test_fraction: f64,
}

impl TrainingConfig {
    /// Create a config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            n_trees: 100,
            max_depth: Some(10),
            min_samples_split: 5,
            min_samples_leaf: 1,
            max_features: MaxFeatures::All,
            criterion: SplitCriterion::SquaredError,
            split_method: SplitMethod::Exact,
            bootstrap_fraction: 1.0,
            oob_mode: OobMode::Disabled,
            seed: 42,
            test_fraction: 0.2,
        }
    }

    /// Set the number of trees.
    #[must_use]
    pub fn with_n_trees(mut self, n_trees: usize) -> Self {
        self.n_trees = n_trees;
        self
    }

    /// Set the maximum tree depth. `None` means unlimited.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the minimum number of samples required to attempt a split.
    #[must_use]
    pub fn with_min_samples_split(mut self, min_samples_split: usize) -> Self {
        self.min_samples_split = min_samples_split;
        self
    }

    /// Set the minimum number of samples per leaf.
    #[must_use]
    pub fn with_min_samples_leaf(mut self, min_samples_leaf: usize) -> Self {
        self.min_samples_leaf = min_samples_leaf;
        self
    }

    /// Set the per-split feature subsampling strategy.
    #[must_use]
    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    /// Set the split criterion.
    #[must_use]
    pub fn with_criterion(mut self, criterion: SplitCriterion) -> Self {
        self.criterion = criterion;
        self
    }

    /// Set the split-finding strategy.
    #[must_use]
    pub fn with_split_method(mut self, split_method: SplitMethod) -> Self {
        self.split_method = split_method;
        self
    }

    /// Set the bootstrap fraction.
    #[must_use]
    pub fn with_bootstrap_fraction(mut self, bootstrap_fraction: f64) -> Self {
        self.bootstrap_fraction = bootstrap_fraction;
        self
    }

    /// Enable or disable out-of-bag scoring.
    #[must_use]
    pub fn with_oob_mode(mut self, oob_mode: OobMode) -> Self {
        self.oob_mode = oob_mode;
        self
    }

    /// Set the seed for the held-out shuffle and the forest.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the held-out fraction, in (0.0, 1.0).
    #[must_use]
    pub fn with_test_fraction(mut self, test_fraction: f64) -> Self {
        self.test_fraction = test_fraction;
        self
    }

    /// Return the number of trees.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.n_trees
    }

    /// Return the maximum depth, if any.
    #[must_use]
    pub fn max_depth(&self) -> Option<usize> {
        self.max_depth
    }

    /// Return the seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Return the held-out fraction.
    #[must_use]
    pub fn test_fraction(&self) -> f64 {
        self.test_fraction
    }

    /// Return the split criterion.
    #[must_use]
    pub fn criterion(&self) -> SplitCriterion {
        self.criterion
    }

    /// Return the split method.
    #[must_use]
    pub fn split_method(&self) -> SplitMethod {
        self.split_method
    }

    /// Return the OOB mode.
    #[must_use]
    pub fn oob_mode(&self) -> OobMode {
        self.oob_mode
    }

    /// Build the forest configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::InvalidTreeCount`] if `n_trees` is zero.
    pub fn forest_config(&self) -> Result<RandomForestConfig, RfError> {
        Ok(RandomForestConfig::new(self.n_trees)?
            .with_max_depth(self.max_depth)
            .with_min_samples_split(self.min_samples_split)
            .with_min_samples_leaf(self.min_samples_leaf)
            .with_max_features(self.max_features)
            .with_criterion(self.criterion)
            .with_split_method(self.split_method)
            .with_bootstrap_fraction(self.bootstrap_fraction)
            .with_oob_mode(self.oob_mode)
            .with_seed(self.seed))
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// One held-out record with its observed and predicted label.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct HeldOutPrediction {
    /// Entity name.
    pub entity: String,
    /// Observed label.
    pub actual: f64,
    /// Model prediction.
    pub predicted: f64,
}

/// Held-out evaluation of a trained model.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Evaluation {
    /// Coefficient of determination on the held-out records (always finite).
    pub r2: f64,
    /// Mean squared error on the held-out records.
    pub mse: f64,
    /// Number of training records.
    pub n_train: usize,
    /// Number of held-out records.
    pub n_test: usize,
    /// Out-of-bag R² on the training records, when enabled.
    pub oob_r2: Option<f64>,
    /// Per-record held-out predictions.
    pub held_out: Vec<HeldOutPrediction>,
}

/// Per-feature 10th, 50th and 90th percentiles of the training records.
///
/// Kept with the model so presets resolve the same way after reload.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ReferenceProfile {
    p10: [f64; N_FEATURES],
    p50: [f64; N_FEATURES],
    p90: [f64; N_FEATURES],
}

impl ReferenceProfile {
    fn from_dataset(dataset: &FeatureDataset) -> Result<Self, ValidationError> {
        let mut profile = Self {
            p10: [0.0; N_FEATURES],
            p50: [0.0; N_FEATURES],
            p90: [0.0; N_FEATURES],
        };
        for feature in Feature::ALL {
            let col = feature.index();
            let values = dataset.present_values(feature);
            let missing = || ValidationError::ColumnEntirelyMissing { feature };
            profile.p10[col] = crate::record::percentile(&values, 10.0).ok_or_else(missing)?;
            profile.p50[col] = crate::record::percentile(&values, 50.0).ok_or_else(missing)?;
            profile.p90[col] = crate::record::percentile(&values, 90.0).ok_or_else(missing)?;
        }
        Ok(profile)
    }

    /// Value of `feature` under `preset`.
    #[must_use]
    pub fn value(&self, preset: Preset, feature: Feature) -> f64 {
        let col = feature.index();
        match preset {
            Preset::Developed => self.p90[col],
            Preset::Emerging => self.p50[col],
            Preset::Rural => self.p10[col],
        }
    }
}

/// A fitted preprocessing + forest pipeline.
///
/// Immutable once built; retraining produces a new instance.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TrainedModel {
    pub(crate) preprocessor: Preprocessor,
    pub(crate) forest: RandomForest,
    pub(crate) reference: ReferenceProfile,
    pub(crate) config: TrainingConfig,
    pub(crate) evaluation: Evaluation,
}

impl TrainedModel {
    /// Borrow the fitted preprocessing statistics.
    #[must_use]
    pub fn preprocessor(&self) -> &Preprocessor {
        &self.preprocessor
    }

    /// Borrow the fitted forest.
    #[must_use]
    pub fn forest(&self) -> &RandomForest {
        &self.forest
    }

    /// Borrow the training percentile profile.
    #[must_use]
    pub fn reference(&self) -> &ReferenceProfile {
        &self.reference
    }

    /// Borrow the configuration the model was trained with.
    #[must_use]
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Borrow the held-out evaluation.
    #[must_use]
    pub fn evaluation(&self) -> &Evaluation {
        &self.evaluation
    }
}

/// Outcome of [`train`]: the model, its ranked importances and the forest shape.
#[derive(Debug, Clone)]
pub struct TrainingReport {
    model: TrainedModel,
    importances: Vec<FeatureImportance>,
    forest_summary: ForestSummary,
}

impl TrainingReport {
    /// Borrow the trained model.
    #[must_use]
    pub fn model(&self) -> &TrainedModel {
        &self.model
    }

    /// Consume the report and return the model.
    #[must_use]
    pub fn into_model(self) -> TrainedModel {
        self.model
    }

    /// Borrow the held-out evaluation.
    #[must_use]
    pub fn evaluation(&self) -> &Evaluation {
        &self.model.evaluation
    }

    /// Borrow the ranked feature importances.
    #[must_use]
    pub fn importances(&self) -> &[FeatureImportance] {
        &self.importances
    }

    /// Shape of the fitted forest.
    #[must_use]
    pub fn forest_summary(&self) -> &ForestSummary {
        &self.forest_summary
    }
}

/// Number of held-out records for `n` records: `ceil(n * fraction)`, clamped to `[1, n - 1]`.
fn held_out_count(n: usize, fraction: f64) -> usize {
    ((n as f64 * fraction).ceil() as usize).clamp(1, n - 1)
}

fn validate_dataset(dataset: &FeatureDataset) -> Result<(), ModelError> {
    let n_records = dataset.len();
    if n_records < MIN_RECORDS {
        return Err(TrainingError::InsufficientRecords {
            n_records,
            min_records: MIN_RECORDS,
        }
        .into());
    }

    for (row, record) in dataset.records().iter().enumerate() {
        if !record.label.is_finite() {
            return Err(ValidationError::NonFiniteLabel {
                entity: record.entity.clone(),
                row,
            }
            .into());
        }
    }

    let first = dataset.records()[0].label;
    if dataset.records().iter().all(|r| r.label == first) {
        return Err(TrainingError::DegenerateLabels {
            value: first,
            n_records,
        }
        .into());
    }

    for feature in Feature::ALL {
        if dataset.records().iter().all(|r| r.get(feature).is_none()) {
            return Err(ValidationError::ColumnEntirelyMissing { feature }.into());
        }
    }

    Ok(())
}

/// Train a model on `dataset` and evaluate it on a held-out subset.
///
/// Records are shuffled with the configured seed; the first
/// `ceil(n * test_fraction)` (at least 1, at most n - 1) are held out.
/// Preprocessing statistics, the reference profile and the forest are
/// fitted on the remaining records only.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`TrainingError::InsufficientRecords`] | fewer than [`MIN_RECORDS`] records |
/// | [`ValidationError::NonFiniteLabel`] | a label is NaN or infinite |
/// | [`TrainingError::DegenerateLabels`] | every label is identical |
/// | [`ValidationError::ColumnEntirelyMissing`] | a feature has no value in the (training) records |
/// | [`ValidationError::NonFiniteValue`] | a feature value is NaN or infinite |
/// | [`TrainingError::InvalidTestFraction`] | `test_fraction` is outside (0.0, 1.0) |
/// | [`TrainingError::Forest`] | the forest configuration is invalid |
#[instrument(skip_all, fields(n_records = dataset.len(), n_trees = config.n_trees, seed = config.seed))]
pub fn train(dataset: &FeatureDataset, config: &TrainingConfig) -> Result<TrainingReport, ModelError> {
    validate_dataset(dataset)?;

    if !(config.test_fraction > 0.0 && config.test_fraction < 1.0) {
        return Err(TrainingError::InvalidTestFraction {
            fraction: config.test_fraction,
        }
        .into());
    }
    let forest_config = config.forest_config().map_err(TrainingError::from)?;

    let n = dataset.len();
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut ChaCha8Rng::seed_from_u64(config.seed));
    let n_test = held_out_count(n, config.test_fraction);
    let (test_idx, train_idx) = indices.split_at(n_test);

    let train_set = dataset.subset(train_idx);
    let test_set = dataset.subset(test_idx);
    debug!(n_train = train_set.len(), n_test = test_set.len(), "held-out split");

    let train_rows: Vec<Vec<Option<f64>>> =
        train_set.records().iter().map(|r| r.values.to_vec()).collect();
    let preprocessor = Preprocessor::fit(&train_rows)?;
    let reference = ReferenceProfile::from_dataset(&train_set)?;

    let x_train = preprocessor.transform_batch(&train_rows)?;
    let y_train = train_set.labels();
    let result = forest_config
        .fit(&x_train, &y_train, &feature_names())
        .map_err(TrainingError::from)?;
    let oob_r2 = result.oob_score().map(|s| s.r2);
    let forest_summary = result.summary().clone();
    let forest = result.into_forest();

    let test_rows: Vec<Vec<Option<f64>>> =
        test_set.records().iter().map(|r| r.values.to_vec()).collect();
    let x_test = preprocessor.transform_batch(&test_rows)?;
    let y_test = test_set.labels();
    let predicted = forest.predict_batch(&x_test).map_err(ValidationError::from)?;

    let r2 = r2_score(&y_test, &predicted);
    let mse = mean_squared_error(&y_test, &predicted);
    if r2 < 0.0 {
        warn!(r2, "held-out R² is below the mean baseline");
    }

    let held_out = test_set
        .records()
        .iter()
        .zip(&predicted)
        .map(|(record, &p)| HeldOutPrediction {
            entity: record.entity.clone(),
            actual: record.label,
            predicted: p,
        })
        .collect();

    let model = TrainedModel {
        preprocessor,
        forest,
        reference,
        config: config.clone(),
        evaluation: Evaluation {
            r2,
            mse,
            n_train: train_set.len(),
            n_test: test_set.len(),
            oob_r2,
            held_out,
        },
    };
    let importances = importances(&model);

    info!(
        r2,
        mse,
        n_train = model.evaluation.n_train,
        n_test = model.evaluation.n_test,
        top_feature = importances.first().map(|f| f.feature.name()),
        mean_depth = forest_summary.mean_depth,
        "model trained"
    );

    Ok(TrainingReport {
        model,
        importances,
        forest_summary,
    })
}
