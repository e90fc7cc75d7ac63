//! Regression metrics.

/// Largest absolute value in `values`; NaN entries are ignored.
fn max_abs(values: impl Iterator<Item = f64>) -> f64 {
    values.fold(0.0f64, |m, v| m.max(v.abs()))
}

/// Mean squared error between observed and predicted values.
///
/// Residuals are divided by their largest magnitude before squaring, so the
/// sum cannot overflow on its own; a true MSE beyond the `f64` range
/// saturates at `f64::MAX`. Returns 0.0 for empty input. Extra elements in
/// the longer slice are ignored.
#[must_use]
pub fn mean_squared_error(observed: &[f64], predicted: &[f64]) -> f64 {
    let n = observed.len().min(predicted.len());
    if n == 0 {
        return 0.0;
    }
    let residuals = || observed.iter().zip(predicted).map(|(y, p)| y - p);
    let scale = max_abs(residuals());
    if scale == 0.0 {
        return 0.0;
    }
    if !scale.is_finite() {
        return f64::MAX;
    }
    let scaled = residuals().map(|r| (r / scale).powi(2)).sum::<f64>() / n as f64;
    (scaled * scale * scale).min(f64::MAX)
}

/// Coefficient of determination, `1 - SS_res / SS_tot`.
///
/// Always finite: when the observed values have zero variance the score is
/// 1.0 for a perfect fit and 0.0 otherwise. Empty input scores 0.0. Both
/// sums are taken over deviations divided by a common scale, so very large
/// labels do not overflow.
#[must_use]
pub fn r2_score(observed: &[f64], predicted: &[f64]) -> f64 {
    let n = observed.len().min(predicted.len());
    if n == 0 {
        return 0.0;
    }
    let observed = &observed[..n];
    let predicted = &predicted[..n];
    let mean = observed.iter().map(|y| y / n as f64).sum::<f64>();

    let scale = max_abs(
        observed
            .iter()
            .zip(predicted)
            .flat_map(|(y, p)| [y - mean, y - p]),
    );
    if scale == 0.0 {
        return 1.0;
    }
    if !scale.is_finite() {
        return 0.0;
    }

    let ss_tot: f64 = observed.iter().map(|y| ((y - mean) / scale).powi(2)).sum();
    let ss_res: f64 = observed
        .iter()
        .zip(predicted)
        .map(|(y, p)| ((y - p) / scale).powi(2))
        .sum();

    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    (1.0 - ss_res / ss_tot).max(f64::MIN)
}
