use rand::Rng;

use crate::node::{FeatureIndex, Impurity};

/// Criterion for measuring the quality of a split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SplitCriterion {
    /// Squared error: node impurity is the target variance.
    SquaredError,
    /// Half Poisson deviance: `mean(y · ln(y / ȳ) - y + ȳ)`.
    ///
    /// Suited to non-negative count-like targets. Requires every target to be
    /// non-negative and the total to be positive.
    Poisson,
}

impl SplitCriterion {
    /// Compute the impurity of a node from the targets that reached it.
    ///
    /// Returns [`Impurity::new(0.0)`] for an empty node.
    #[must_use]
    pub fn impurity(&self, targets: &[f64]) -> Impurity {
        if targets.is_empty() {
            return Impurity::new(0.0);
        }
        let n = targets.len() as f64;
        let mean = targets.iter().sum::<f64>() / n;
        let value = match self {
            SplitCriterion::SquaredError => {
                targets.iter().map(|&y| (y - mean).powi(2)).sum::<f64>() / n
            }
            SplitCriterion::Poisson => {
                if mean <= 0.0 {
                    0.0
                } else {
                    targets
                        .iter()
                        .map(|&y| {
                            let log_term = if y > 0.0 { y * (y / mean).ln() } else { 0.0 };
                            log_term - y + mean
                        })
                        .sum::<f64>()
                        / n
                }
            }
        };
        Impurity::new(value.max(0.0))
    }

    /// Weighted impurity decrease `n·I(parent) - n_l·I(left) - n_r·I(right)`.
    ///
    /// Both criteria reduce to expressions over child target sums, so the
    /// incremental scan never needs sums of squares. Returns `None` when the
    /// split is not admissible for the criterion (Poisson child with a
    /// non-positive sum).
    pub(crate) fn weighted_decrease(
        &self,
        sum_left: f64,
        n_left: usize,
        sum_right: f64,
        n_right: usize,
    ) -> Option<f64> {
        let total = sum_left + sum_right;
        let nl = n_left as f64;
        let nr = n_right as f64;
        let n = nl + nr;
        match self {
            SplitCriterion::SquaredError => {
                Some(sum_left * sum_left / nl + sum_right * sum_right / nr - total * total / n)
            }
            SplitCriterion::Poisson => {
                if sum_left <= 0.0 || sum_right <= 0.0 {
                    return None;
                }
                Some(
                    sum_left * (sum_left / nl).ln() + sum_right * (sum_right / nr).ln()
                        - total * (total / n).ln(),
                )
            }
        }
    }
}

/// Strategy for choosing split thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SplitMethod {
    /// Evaluate every boundary between consecutive distinct values (CART).
    Exact,
    /// Draw one uniform random threshold per candidate feature (Extremely
    /// Randomized Trees).
    ExtraTrees,
}

/// Result of finding the best split for a node.
#[derive(Debug, Clone)]
pub(crate) struct SplitResult {
    /// Feature used for the split.
    pub(crate) feature: FeatureIndex,
    /// Threshold value.
    pub(crate) threshold: f64,
    /// Weighted impurity decrease from this split (MDI formula).
    pub(crate) impurity_decrease: f64,
    /// Sample indices going to the left child.
    pub(crate) left_indices: Vec<usize>,
    /// Sample indices going to the right child.
    pub(crate) right_indices: Vec<usize>,
}

/// Find the best split among a random subset of features.
///
/// Draws `max_features` candidate features with a partial Fisher-Yates
/// shuffle, evaluates thresholds according to `method`, and keeps the
/// candidate with the largest weighted impurity decrease.
///
/// Returns `None` when no split strictly decreases impurity (constant
/// features, `min_samples_leaf` violations, inadmissible Poisson children).
///
/// # Column-major layout
///
/// `features` is column-major: `features[feature_idx][sample_idx]`.
/// `sample_indices` are indices into these inner Vecs and into `targets`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn find_best_split(
    features: &[Vec<f64>],
    targets: &[f64],
    sample_indices: &[usize],
    criterion: &SplitCriterion,
    method: &SplitMethod,
    max_features: usize,
    min_samples_leaf: usize,
    rng: &mut impl Rng,
) -> Option<SplitResult> {
    let n_features = features.len();
    let n_samples = sample_indices.len();

    if n_samples < 2 || n_features == 0 {
        return None;
    }

    let total_sum: f64 = sample_indices.iter().map(|&si| targets[si]).sum();

    let mut feature_order: Vec<usize> = (0..n_features).collect();
    let take = max_features.min(n_features);
    for i in 0..take {
        let j = rng.gen_range(i..n_features);
        feature_order.swap(i, j);
    }
    let selected_features = &feature_order[..take];

    let mut best_decrease = 0.0f64;
    let mut best: Option<(FeatureIndex, f64)> = None;

    for &feat_idx in selected_features {
        let feat_col = &features[feat_idx];

        let candidate = match method {
            SplitMethod::Exact => best_exact_threshold(
                feat_col,
                targets,
                sample_indices,
                total_sum,
                criterion,
                min_samples_leaf,
            ),
            SplitMethod::ExtraTrees => random_threshold(
                feat_col,
                targets,
                sample_indices,
                total_sum,
                criterion,
                min_samples_leaf,
                rng,
            ),
        };

        if let Some((threshold, decrease)) = candidate
            && decrease > best_decrease
        {
            best_decrease = decrease;
            best = Some((FeatureIndex::new(feat_idx), threshold));
        }
    }

    let (best_feature, threshold) = best?;

    let feat_col = &features[best_feature.index()];
    let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = sample_indices
        .iter()
        .partition(|&&si| feat_col[si] <= threshold);

    Some(SplitResult {
        feature: best_feature,
        threshold,
        impurity_decrease: best_decrease,
        left_indices,
        right_indices,
    })
}

/// Scan every boundary of one feature and return `(threshold, decrease)` of the best.
fn best_exact_threshold(
    feat_col: &[f64],
    targets: &[f64],
    sample_indices: &[usize],
    total_sum: f64,
    criterion: &SplitCriterion,
    min_samples_leaf: usize,
) -> Option<(f64, f64)> {
    let n_samples = sample_indices.len();

    let mut sorted: Vec<(f64, usize)> = sample_indices
        .iter()
        .map(|&si| (feat_col[si], si))
        .collect();
    sorted.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));

    let mut best: Option<(f64, f64)> = None;
    let mut sum_left = 0.0f64;

    for i in 0..(n_samples - 1) {
        let (val_i, si) = sorted[i];
        sum_left += targets[si];

        let val_next = sorted[i + 1].0;
        if val_i == val_next {
            continue;
        }

        let n_left = i + 1;
        let n_right = n_samples - n_left;
        if n_left < min_samples_leaf || n_right < min_samples_leaf {
            continue;
        }

        let Some(decrease) =
            criterion.weighted_decrease(sum_left, n_left, total_sum - sum_left, n_right)
        else {
            continue;
        };

        if best.is_none_or(|(_, d)| decrease > d) {
            let mut threshold = (val_i + val_next) / 2.0;
            // Midpoint of adjacent floats can round up to the right value.
            if threshold >= val_next {
                threshold = val_i;
            }
            best = Some((threshold, decrease));
        }
    }

    best
}

/// Draw a uniform threshold in `[min, max)` of one feature and score it.
fn random_threshold(
    feat_col: &[f64],
    targets: &[f64],
    sample_indices: &[usize],
    total_sum: f64,
    criterion: &SplitCriterion,
    min_samples_leaf: usize,
    rng: &mut impl Rng,
) -> Option<(f64, f64)> {
    let (min, max) = sample_indices
        .iter()
        .map(|&si| feat_col[si])
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if min >= max {
        return None;
    }

    let threshold = rng.gen_range(min..max);

    let mut sum_left = 0.0f64;
    let mut n_left = 0usize;
    for &si in sample_indices {
        if feat_col[si] <= threshold {
            sum_left += targets[si];
            n_left += 1;
        }
    }
    let n_right = sample_indices.len() - n_left;
    if n_left < min_samples_leaf || n_right < min_samples_leaf || n_right == 0 {
        return None;
    }

    let decrease = criterion.weighted_decrease(sum_left, n_left, total_sum - sum_left, n_right)?;
    Some((threshold, decrease))
}
