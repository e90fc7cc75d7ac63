//! Accuracy regression tests for netequity-rf.
//!
//! These tests verify that algorithmic changes do not degrade Random Forest
//! regression quality on a deterministic synthetic dataset.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use netequity_rf::{MaxFeatures, OobMode, RandomForestConfig, SplitCriterion, r2_score};

// ---------------------------------------------------------------------------
// Helper: deterministic synthetic regression dataset
// ---------------------------------------------------------------------------

/// Generate a 300-sample, 10-feature regression dataset.
///
/// Features 0-2 drive the target (`y = 4 f0 + 2 f1 + f2 * f2 + noise`).
/// Features 3-9 are pure noise in [0, 10].
fn make_regression() -> (Vec<Vec<f64>>, Vec<f64>, Vec<String>) {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let n_samples = 300;
    let n_features = 10;

    let mut features = Vec::with_capacity(n_samples);
    let mut targets = Vec::with_capacity(n_samples);
    for _ in 0..n_samples {
        let row: Vec<f64> = (0..n_features).map(|_| rng.r#gen::<f64>() * 10.0).collect();
        let noise = rng.r#gen::<f64>() - 0.5;
        targets.push(4.0 * row[0] + 2.0 * row[1] + row[2] * row[2] + noise);
        features.push(row);
    }
    let names: Vec<String> = (0..n_features).map(|f| format!("f{f}")).collect();
    (features, targets, names)
}

/// Split off the last fifth as a held-out set.
fn holdout(
    features: &[Vec<f64>],
    targets: &[f64],
) -> (Vec<Vec<f64>>, Vec<f64>, Vec<Vec<f64>>, Vec<f64>) {
    let cut = features.len() * 4 / 5;
    (
        features[..cut].to_vec(),
        targets[..cut].to_vec(),
        features[cut..].to_vec(),
        targets[cut..].to_vec(),
    )
}

// ---------------------------------------------------------------------------
// a) holdout_r2_above_threshold
// ---------------------------------------------------------------------------

/// Held-out R² with 100 trees must exceed 0.8.
#[test]
fn holdout_r2_above_threshold() {
    let (features, targets, names) = make_regression();
    let (train_x, train_y, test_x, test_y) = holdout(&features, &targets);
    let result = RandomForestConfig::new(100)
        .unwrap()
        .with_seed(42)
        .fit(&train_x, &train_y, &names)
        .unwrap();

    let predictions = result.forest().predict_batch(&test_x).unwrap();
    let r2 = r2_score(&test_y, &predictions);
    assert!(r2 > 0.8, "holdout r2 {r2} <= 0.8");
}

// ---------------------------------------------------------------------------
// b) oob_r2_above_threshold
// ---------------------------------------------------------------------------

/// OOB R² with 100 trees must exceed 0.80.
#[test]
fn oob_r2_above_threshold() {
    let (features, targets, names) = make_regression();
    let result = RandomForestConfig::new(100)
        .unwrap()
        .with_seed(42)
        .with_oob_mode(OobMode::Enabled)
        .fit(&features, &targets, &names)
        .unwrap();

    let oob = result.oob_score().expect("OOB score must be computed when OobMode::Enabled");
    assert!(oob.r2 > 0.80, "oob_r2 {} <= 0.80", oob.r2);
    assert_eq!(oob.n_oob_samples, features.len());
}

// ---------------------------------------------------------------------------
// c) top_features_are_informative
// ---------------------------------------------------------------------------

/// The top 3 features by importance must include at least 2 of f0, f1, f2.
#[test]
fn top_features_are_informative() {
    let (features, targets, names) = make_regression();
    let result = RandomForestConfig::new(100)
        .unwrap()
        .with_seed(42)
        .fit(&features, &targets, &names)
        .unwrap();

    let informative: std::collections::HashSet<&str> = ["f0", "f1", "f2"].into_iter().collect();
    let top3_names: Vec<&str> = result
        .importances()
        .iter()
        .take(3)
        .map(|f| f.name.as_str())
        .collect();

    let informative_in_top3 = top3_names.iter().filter(|&&n| informative.contains(n)).count();
    assert!(
        informative_in_top3 >= 2,
        "only {informative_in_top3}/3 of top-3 features are informative; top-3: {top3_names:?}"
    );
    assert!(informative.contains(top3_names[0]));
}

// ---------------------------------------------------------------------------
// d) feature_subsampling_still_fits
// ---------------------------------------------------------------------------

/// Sqrt feature subsampling must keep held-out R² above 0.6.
#[test]
fn feature_subsampling_still_fits() {
    let (features, targets, names) = make_regression();
    let (train_x, train_y, test_x, test_y) = holdout(&features, &targets);
    let result = RandomForestConfig::new(100)
        .unwrap()
        .with_seed(42)
        .with_max_features(MaxFeatures::Sqrt)
        .fit(&train_x, &train_y, &names)
        .unwrap();

    let predictions = result.forest().predict_batch(&test_x).unwrap();
    let r2 = r2_score(&test_y, &predictions);
    assert!(r2 > 0.6, "sqrt-subsampled holdout r2 {r2} <= 0.6");
}

// ---------------------------------------------------------------------------
// e) poisson_on_count_targets
// ---------------------------------------------------------------------------

/// Poisson criterion on non-negative count-like targets tracks the signal.
#[test]
fn poisson_on_count_targets() {
    let (features, _, names) = make_regression();
    let counts: Vec<f64> = features.iter().map(|r| (r[0] * r[0]).round()).collect();
    let (train_x, train_y, test_x, test_y) = holdout(&features, &counts);
    let result = RandomForestConfig::new(50)
        .unwrap()
        .with_seed(42)
        .with_criterion(SplitCriterion::Poisson)
        .fit(&train_x, &train_y, &names)
        .unwrap();

    let predictions = result.forest().predict_batch(&test_x).unwrap();
    assert!(predictions.iter().all(|&p| p >= 0.0));
    let r2 = r2_score(&test_y, &predictions);
    assert!(r2 > 0.8, "poisson holdout r2 {r2} <= 0.8");
}
