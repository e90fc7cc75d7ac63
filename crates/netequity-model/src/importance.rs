//! Ranked feature importances of a trained model.

use crate::schema::{Feature, N_FEATURES};
use crate::train::TrainedModel;

/// One feature's share of the ensemble's impurity reduction.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FeatureImportance {
    /// The feature.
    pub feature: Feature,
    /// Normalized score; scores of a model sum to 1.0.
    pub score: f64,
    /// 1-based rank (1 = most important).
    pub rank: usize,
}

/// Features sorted by descending importance; ties keep schema order.
///
/// Scores are non-negative and sum to 1.0. A forest without any split
/// gives every feature the same score. Every schema feature appears
/// exactly once.
#[must_use]
pub fn importances(model: &TrainedModel) -> Vec<FeatureImportance> {
    // Training and artifact loading both pin the forest to the schema width.
    debug_assert_eq!(model.forest.n_features(), N_FEATURES);
    model
        .forest
        .ranked_importances()
        .into_iter()
        .map(|ranked| FeatureImportance {
            feature: Feature::ALL[ranked.index.index()],
            score: ranked.importance,
            rank: ranked.rank,
        })
        .collect()
}
