//! Feature importance aggregation across trees.

use crate::node::FeatureIndex;

/// A ranked feature with name, importance score, and rank.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RankedFeature {
    /// Column position of the feature in the training matrix.
    pub index: FeatureIndex,
    /// Feature name.
    pub name: String,
    /// Normalized importance score (sums to 1.0 across all features).
    pub importance: f64,
    /// 1-based rank (1 = most important).
    pub rank: usize,
}

/// Sum per-tree importances and normalize to 1.0.
///
/// Falls back to a uniform `1 / n_features` vector when the total is zero,
/// which happens when every tree is a single leaf.
pub(crate) fn aggregate_importances(per_tree: &[Vec<f64>], n_features: usize) -> Vec<f64> {
    if n_features == 0 {
        return vec![];
    }

    let mut totals = vec![0.0f64; n_features];
    for tree_imp in per_tree {
        for (total, &val) in totals.iter_mut().zip(tree_imp) {
            *total += val;
        }
    }

    let sum: f64 = totals.iter().sum();
    if sum > 0.0 {
        totals.iter_mut().for_each(|v| *v /= sum);
    } else {
        totals.fill(1.0 / n_features as f64);
    }
    totals
}

/// Pair importances with names, sort descending, and assign 1-based ranks.
///
/// The sort is stable so equal scores keep column order.
pub(crate) fn rank_features(importances: &[f64], names: &[String]) -> Vec<RankedFeature> {
    let mut features: Vec<RankedFeature> = names
        .iter()
        .zip(importances)
        .enumerate()
        .map(|(i, (name, &importance))| RankedFeature {
            index: FeatureIndex::new(i),
            name: name.clone(),
            importance,
            rank: 0,
        })
        .collect();

    features.sort_by(|a, b| b.importance.total_cmp(&a.importance));

    for (i, feat) in features.iter_mut().enumerate() {
        feat.rank = i + 1;
    }

    features
}
