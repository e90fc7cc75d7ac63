//! Scenario prediction with optional per-feature contributions.

use tracing::{debug, instrument};

use crate::error::ValidationError;
use crate::scenario::{Preset, Scenario};
use crate::schema::Feature;
use crate::train::TrainedModel;

/// What to do when a scenario lacks a feature value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum MissingFeaturePolicy {
    /// Fail with [`ValidationError::MissingScenarioFeature`].
    #[default]
    Reject,
    /// Fill with the training imputation mean.
    TrainingMean,
    /// Fill with the preset's training percentile.
    Preset(Preset),
}

/// Options for [`predict`].
///
/// # Defaults
///
/// | Parameter       | Default  |
/// |-----------------|----------|
/// | `missing`       | `Reject` |
/// | `contributions` | `true`   |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredictOptions {
    missing: MissingFeaturePolicy,
    contributions: bool,
}

impl PredictOptions {
    /// Create options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            missing: MissingFeaturePolicy::Reject,
            contributions: true,
        }
    }

    /// Set the missing-feature policy.
    #[must_use]
    pub fn with_missing_policy(mut self, missing: MissingFeaturePolicy) -> Self {
        self.missing = missing;
        self
    }

    /// Request or skip the per-feature breakdown.
    #[must_use]
    pub fn with_contributions(mut self, contributions: bool) -> Self {
        self.contributions = contributions;
        self
    }

    /// Return the missing-feature policy.
    #[must_use]
    pub fn missing_policy(&self) -> MissingFeaturePolicy {
        self.missing
    }
}

impl Default for PredictOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Signed contribution of one feature to a prediction.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FeatureContribution {
    /// The feature.
    pub feature: Feature,
    /// Amount this feature moved the prediction away from the bias.
    pub contribution: f64,
}

/// Decomposition of a prediction: `bias + Σ contributions == value`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Breakdown {
    /// Mean training label seen by the trees.
    pub bias: f64,
    /// One entry per feature, in schema order.
    pub contributions: Vec<FeatureContribution>,
}

/// A point prediction.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Prediction {
    /// Predicted web pages per million.
    pub value: f64,
    /// Per-feature breakdown, when requested.
    pub breakdown: Option<Breakdown>,
}

/// Fill absent features according to `policy`.
///
/// # Errors
///
/// Returns [`ValidationError::MissingScenarioFeature`] under
/// [`MissingFeaturePolicy::Reject`] when any feature is absent.
pub fn resolve_scenario(
    model: &TrainedModel,
    scenario: &Scenario,
    policy: MissingFeaturePolicy,
) -> Result<Scenario, ValidationError> {
    let mut resolved = scenario.clone();
    for feature in Feature::ALL {
        if scenario.get(feature).is_some() {
            continue;
        }
        let fill = match policy {
            MissingFeaturePolicy::Reject => {
                return Err(ValidationError::MissingScenarioFeature { feature });
            }
            MissingFeaturePolicy::TrainingMean => model.preprocessor.imputation_mean(feature),
            MissingFeaturePolicy::Preset(preset) => model.reference.value(preset, feature),
        };
        resolved.set(feature, Some(fill));
    }
    Ok(resolved)
}

/// Predict web presence for one scenario.
///
/// The scenario is completed per the missing-feature policy, transformed with
/// the fitted preprocessing statistics and averaged over every tree. The
/// result is deterministic for a given model and scenario.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`ValidationError::MissingScenarioFeature`] | a feature is absent and the policy is `Reject` |
/// | [`ValidationError::NonFiniteInput`] | a scenario value is NaN or infinite |
#[instrument(skip_all, fields(policy = ?options.missing))]
pub fn predict(
    model: &TrainedModel,
    scenario: &Scenario,
    options: &PredictOptions,
) -> Result<Prediction, ValidationError> {
    let resolved = resolve_scenario(model, scenario, options.missing)?;
    let x = model.preprocessor.transform(resolved.values())?;
    let value = model.forest.predict(&x)?;

    let breakdown = if options.contributions {
        let c = model.forest.predict_contributions(&x)?;
        Some(Breakdown {
            bias: c.bias,
            contributions: Feature::ALL
                .into_iter()
                .zip(c.per_feature)
                .map(|(feature, contribution)| FeatureContribution {
                    feature,
                    contribution,
                })
                .collect(),
        })
    } else {
        None
    };

    debug!(value, "scenario predicted");
    Ok(Prediction { value, breakdown })
}

/// Predict one of the named presets.
///
/// # Errors
///
/// Returns the same errors as [`predict`]; presets are complete, so in
/// practice only forest errors can surface.
pub fn predict_preset(
    model: &TrainedModel,
    preset: Preset,
    options: &PredictOptions,
) -> Result<Prediction, ValidationError> {
    predict(model, &model.preset_scenario(preset), options)
}
