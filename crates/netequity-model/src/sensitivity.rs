//! What-if analysis: scale one feature and rank how much predictions move.

use tracing::{info, instrument};

use crate::error::ValidationError;
use crate::predict::{MissingFeaturePolicy, PredictOptions, predict};
use crate::record::FeatureDataset;
use crate::scenario::Scenario;
use crate::schema::Feature;
use crate::train::TrainedModel;

/// Effect of the change on one record.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SimulationRow {
    /// Entity name.
    pub entity: String,
    /// Feature value before the change.
    pub original_value: f64,
    /// Feature value after the change.
    pub modified_value: f64,
    /// Prediction before the change.
    pub baseline: f64,
    /// Prediction after the change.
    pub modified: f64,
    /// Relative change of the prediction in percent; `None` when the baseline is zero.
    pub pct_change: Option<f64>,
}

/// Multiply `feature` by `1 + pct_change / 100` on every record that has it
/// and rank records by the relative change of their prediction.
///
/// Other missing features fall back to the training mean. Rows are sorted by
/// descending percent change (undefined changes last, then dataset order) and
/// truncated to `top_n`.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`ValidationError::InvalidPercentChange`] | `pct_change` is NaN or infinite |
/// | [`ValidationError::NoRecordsWithFeature`] | no record has a value for `feature` |
/// | [`ValidationError::NonFiniteInput`] | a record value is NaN or infinite |
#[instrument(skip_all, fields(feature = %feature, pct_change, top_n, n_records = dataset.len()))]
pub fn simulate(
    model: &TrainedModel,
    dataset: &FeatureDataset,
    feature: Feature,
    pct_change: f64,
    top_n: usize,
) -> Result<Vec<SimulationRow>, ValidationError> {
    if !pct_change.is_finite() {
        return Err(ValidationError::InvalidPercentChange { pct_change });
    }

    let options = PredictOptions::new()
        .with_missing_policy(MissingFeaturePolicy::TrainingMean)
        .with_contributions(false);
    let factor = 1.0 + pct_change / 100.0;

    let mut rows = Vec::new();
    for record in dataset.records() {
        let Some(original_value) = record.get(feature) else {
            continue;
        };
        let scenario = Scenario::from(record);
        let baseline = predict(model, &scenario, &options)?.value;

        let mut changed = scenario;
        let modified_value = original_value * factor;
        changed.set(feature, Some(modified_value));
        let modified = predict(model, &changed, &options)?.value;

        let pct = (baseline != 0.0).then(|| 100.0 * (modified - baseline) / baseline);
        rows.push(SimulationRow {
            entity: record.entity.clone(),
            original_value,
            modified_value,
            baseline,
            modified,
            pct_change: pct,
        });
    }

    if rows.is_empty() {
        return Err(ValidationError::NoRecordsWithFeature { feature });
    }

    rows.sort_by(|a, b| match (a.pct_change, b.pct_change) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    let n_candidates = rows.len();
    rows.truncate(top_n);

    info!(n_candidates, n_returned = rows.len(), "simulation complete");
    Ok(rows)
}
