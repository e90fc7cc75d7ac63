//! Random Forest training with parallel tree construction.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{debug, info, instrument};

use crate::config::{MaxFeatures, OobMode, RandomForestConfig};
use crate::error::RfError;
use crate::importance::{RankedFeature, aggregate_importances, rank_features};
use crate::oob::compute_oob;
use crate::result::{ForestSummary, RandomForestResult};
use crate::tree::{DecisionTree, DecisionTreeConfig, validate_training_data};

/// A fitted Random Forest regressor.
///
/// The prediction is the mean of the per-tree predictions.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RandomForest {
    pub(crate) trees: Vec<DecisionTree>,
    pub(crate) n_features: usize,
    pub(crate) feature_names: Vec<String>,
}

impl RandomForest {
    /// Mean Decrease in Impurity per feature, in column order.
    ///
    /// Per-tree importances are summed and renormalized to 1.0. When no tree
    /// made a single split, every feature gets `1 / n_features`.
    #[must_use]
    pub fn feature_importances(&self) -> Vec<f64> {
        let per_tree: Vec<Vec<f64>> = self.trees.iter().map(|t| t.feature_importances()).collect();
        aggregate_importances(&per_tree, self.n_features)
    }

    /// Feature importances sorted descending with 1-based ranks.
    ///
    /// Ties keep column order.
    #[must_use]
    pub fn ranked_importances(&self) -> Vec<RankedFeature> {
        rank_features(&self.feature_importances(), &self.feature_names)
    }

    /// Borrow the fitted trees.
    #[must_use]
    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }
}

/// Resolve `MaxFeatures` to a concrete count.
pub(crate) fn resolve_max_features(
    max_features: MaxFeatures,
    n_features: usize,
) -> Result<usize, RfError> {
    let resolved = match max_features {
        MaxFeatures::Sqrt => (n_features as f64).sqrt().ceil() as usize,
        MaxFeatures::Log2 => (n_features as f64).log2().ceil().max(1.0) as usize,
        MaxFeatures::Fraction(f) => (n_features as f64 * f).ceil() as usize,
        MaxFeatures::Fixed(n) => n,
        MaxFeatures::All => n_features,
    };
    if resolved == 0 || resolved > n_features {
        return Err(RfError::InvalidMaxFeatures {
            max_features: resolved,
            n_features,
        });
    }
    Ok(resolved)
}

/// Draw `draw_count` indices with replacement; return them with the indices never drawn.
fn bootstrap_sample(
    n_samples: usize,
    draw_count: usize,
    rng: &mut impl Rng,
) -> (Vec<usize>, Vec<usize>) {
    let mut in_bag = vec![false; n_samples];
    let mut bootstrap_indices = Vec::with_capacity(draw_count);
    for _ in 0..draw_count {
        let idx = rng.gen_range(0..n_samples);
        bootstrap_indices.push(idx);
        in_bag[idx] = true;
    }
    let oob_indices: Vec<usize> = (0..n_samples).filter(|&i| !in_bag[i]).collect();
    (bootstrap_indices, oob_indices)
}

/// Train the Random Forest ensemble.
#[instrument(skip_all, fields(n_trees = config.n_trees, n_samples = features.len()))]
pub(crate) fn train(
    config: &RandomForestConfig,
    features: &[Vec<f64>],
    targets: &[f64],
    feature_names: &[String],
) -> Result<RandomForestResult, RfError> {
    let n_features = validate_training_data(features, targets, config.criterion)?;
    let n_samples = features.len();

    if feature_names.len() != n_features {
        return Err(RfError::FeatureNameMismatch {
            n_features,
            n_names: feature_names.len(),
        });
    }

    let max_features_resolved = resolve_max_features(config.max_features, n_features)?;

    if config.bootstrap_fraction <= 0.0 || config.bootstrap_fraction > 1.0 {
        return Err(RfError::InvalidBootstrapFraction {
            fraction: config.bootstrap_fraction,
        });
    }

    let draw_count = ((n_samples as f64) * config.bootstrap_fraction).ceil() as usize;

    info!(
        n_trees = config.n_trees,
        n_samples,
        n_features,
        max_features = max_features_resolved,
        draw_count,
        "training random forest"
    );

    // Per-tree seeds come from the master RNG so results do not depend on thread scheduling.
    let mut master_rng = ChaCha8Rng::seed_from_u64(config.seed);
    let tree_seeds: Vec<u64> = (0..config.n_trees).map(|_| master_rng.r#gen()).collect();

    let criterion = config.criterion;
    let split_method = config.split_method;
    let max_depth = config.max_depth;
    let min_samples_split = config.min_samples_split;
    let min_samples_leaf = config.min_samples_leaf;

    let tree_results: Vec<(DecisionTree, Vec<usize>)> = tree_seeds
        .into_par_iter()
        .map(|seed| -> Result<(DecisionTree, Vec<usize>), RfError> {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let (bootstrap_indices, oob_indices) =
                bootstrap_sample(n_samples, draw_count, &mut rng);

            let boot_features: Vec<Vec<f64>> = bootstrap_indices
                .iter()
                .map(|&i| features[i].clone())
                .collect();
            let boot_targets: Vec<f64> = bootstrap_indices.iter().map(|&i| targets[i]).collect();

            let tree = DecisionTreeConfig::new()
                .with_criterion(criterion)
                .with_split_method(split_method)
                .with_max_depth(max_depth)
                .with_min_samples_split(min_samples_split)
                .with_min_samples_leaf(min_samples_leaf)
                .with_max_features(Some(max_features_resolved))
                .with_seed(rng.r#gen())
                .fit(&boot_features, &boot_targets)?;

            Ok((tree, oob_indices))
        })
        .collect::<Result<_, _>>()?;

    let mut trees = Vec::with_capacity(config.n_trees);
    let mut oob_indices_per_tree = Vec::with_capacity(config.n_trees);
    for (tree, oob) in tree_results {
        trees.push(tree);
        oob_indices_per_tree.push(oob);
    }

    debug!(n_trees_trained = trees.len(), "tree training complete");

    let oob_score = if config.oob_mode == OobMode::Enabled {
        Some(compute_oob(&trees, features, targets, &oob_indices_per_tree)?)
    } else {
        None
    };

    let forest = RandomForest {
        trees,
        n_features,
        feature_names: feature_names.to_vec(),
    };
    let importances = forest.ranked_importances();

    let summary =
        ForestSummary::from_trees(&forest.trees, n_samples, max_features_resolved, draw_count);

    info!(
        oob_r2 = oob_score.as_ref().map(|s| s.r2),
        mean_depth = summary.mean_depth,
        "random forest training complete"
    );

    Ok(RandomForestResult::new(forest, importances, oob_score, summary))
}

#[cfg(test)]
mod tests {
    use crate::config::{MaxFeatures, OobMode, RandomForestConfig};
    use crate::split::SplitMethod;
    use crate::{RfError, r2_score};

    /// Piecewise-linear target driven by the first feature; the second is noise.
    fn make_regression_data() -> (Vec<Vec<f64>>, Vec<f64>, Vec<String>) {
        let mut features = Vec::new();
        let mut targets = Vec::new();
        for i in 0..60 {
            let x = i as f64 * 0.5;
            let noise = ((i * 37) % 11) as f64;
            features.push(vec![x, noise]);
            targets.push(if x < 15.0 { 2.0 * x } else { 30.0 + 0.5 * x });
        }
        let names = vec!["x".to_string(), "noise".to_string()];
        (features, targets, names)
    }

    #[test]
    fn fits_training_data_closely() {
        let (features, targets, names) = make_regression_data();
        let result = RandomForestConfig::new(50)
            .unwrap()
            .with_max_features(MaxFeatures::All)
            .fit(&features, &targets, &names)
            .unwrap();

        let predictions = result.forest().predict_batch(&features).unwrap();
        let r2 = r2_score(&targets, &predictions);
        assert!(r2 > 0.95, "r2 = {r2}");
    }

    #[test]
    fn oob_score_computed() {
        let (features, targets, names) = make_regression_data();
        let result = RandomForestConfig::new(50)
            .unwrap()
            .with_oob_mode(OobMode::Enabled)
            .fit(&features, &targets, &names)
            .unwrap();

        let oob = result.oob_score().expect("OOB should be computed");
        assert!(oob.r2 > 0.8, "oob r2 = {}", oob.r2);
        assert!(oob.mse >= 0.0);
        assert!(oob.n_oob_samples > 0);
    }

    #[test]
    fn summary_describes_fitted_forest() {
        let (features, targets, names) = make_regression_data();
        let result = RandomForestConfig::new(12)
            .unwrap()
            .with_max_features(MaxFeatures::All)
            .with_max_depth(Some(3))
            .with_bootstrap_fraction(0.5)
            .fit(&features, &targets, &names)
            .unwrap();

        let summary = result.summary();
        assert_eq!(summary.n_trees, 12);
        assert_eq!(summary.n_samples, 60);
        assert_eq!(summary.max_features_resolved, 2);
        assert_eq!(summary.draw_count, 30);
        assert!(summary.mean_depth >= 1.0 && summary.mean_depth <= 3.0);
        assert!(summary.mean_leaves >= 2.0 && summary.mean_leaves <= 8.0);
    }

    #[test]
    fn feature_importances_sum_to_one() {
        let (features, targets, names) = make_regression_data();
        let result = RandomForestConfig::new(20)
            .unwrap()
            .fit(&features, &targets, &names)
            .unwrap();

        let total: f64 = result.importances().iter().map(|f| f.importance).sum();
        assert!((total - 1.0).abs() < 1e-10, "total = {total}");
        assert_eq!(result.importances()[0].name, "x");
        assert_eq!(result.importances()[0].rank, 1);
    }

    #[test]
    fn constant_targets_fall_back_to_uniform_importance() {
        let features: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64, 1.0, 2.0, 3.0]).collect();
        let targets = vec![4.0; 10];
        let names: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        let result = RandomForestConfig::new(5)
            .unwrap()
            .fit(&features, &targets, &names)
            .unwrap();
        for ranked in result.importances() {
            assert!((ranked.importance - 0.25).abs() < 1e-12);
        }
        let order: Vec<&str> = result.importances().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(order, ["a", "b", "c", "d"]);
    }

    #[test]
    fn deterministic_with_same_seed() {
        let (features, targets, names) = make_regression_data();
        let fit = || {
            RandomForestConfig::new(10)
                .unwrap()
                .with_seed(99)
                .with_max_features(MaxFeatures::Sqrt)
                .fit(&features, &targets, &names)
                .unwrap()
        };
        let preds1 = fit().forest().predict_batch(&features).unwrap();
        let preds2 = fit().forest().predict_batch(&features).unwrap();
        assert_eq!(preds1, preds2);
    }

    #[test]
    fn contributions_batch_matches_individual() {
        let (features, targets, names) = make_regression_data();
        let result = RandomForestConfig::new(10)
            .unwrap()
            .fit(&features, &targets, &names)
            .unwrap();
        let forest = result.forest();

        let batch = forest.predict_batch(&features).unwrap();
        for (i, sample) in features.iter().enumerate() {
            let contributions = forest.predict_contributions(sample).unwrap();
            assert!((contributions.prediction - batch[i]).abs() < 1e-9);
        }
    }

    #[test]
    fn empty_dataset_error() {
        let config = RandomForestConfig::new(10).unwrap();
        let err = config.fit(&[], &[], &[]).unwrap_err();
        assert!(matches!(err, RfError::EmptyDataset));
    }

    #[test]
    fn feature_name_mismatch_error() {
        let (features, targets, _) = make_regression_data();
        let err = RandomForestConfig::new(3)
            .unwrap()
            .fit(&features, &targets, &["x".to_string()])
            .unwrap_err();
        assert!(matches!(err, RfError::FeatureNameMismatch { n_features: 2, n_names: 1 }));
    }

    #[test]
    fn invalid_bootstrap_fraction_error() {
        let (features, targets, names) = make_regression_data();
        let err = RandomForestConfig::new(3)
            .unwrap()
            .with_bootstrap_fraction(1.5)
            .fit(&features, &targets, &names)
            .unwrap_err();
        assert!(matches!(err, RfError::InvalidBootstrapFraction { .. }));
    }

    #[test]
    fn invalid_max_depth_propagates_from_tree() {
        let (features, targets, names) = make_regression_data();
        let err = RandomForestConfig::new(3)
            .unwrap()
            .with_max_depth(Some(0))
            .fit(&features, &targets, &names)
            .unwrap_err();
        assert!(matches!(err, RfError::InvalidMaxDepth { max_depth: 0 }));
    }

    #[test]
    fn extra_trees_fit_quality() {
        let (features, targets, names) = make_regression_data();
        let result = RandomForestConfig::new(50)
            .unwrap()
            .with_split_method(SplitMethod::ExtraTrees)
            .fit(&features, &targets, &names)
            .unwrap();

        let predictions = result.forest().predict_batch(&features).unwrap();
        let r2 = r2_score(&targets, &predictions);
        assert!(r2 > 0.9, "extra-trees r2 = {r2}");
    }
}
