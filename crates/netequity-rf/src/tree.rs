use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, instrument};

use crate::{
    RfError,
    node::{Impurity, Node, NodeIndex},
    split::{SplitCriterion, SplitMethod, find_best_split},
};

/// Configuration for a single CART regression tree.
///
/// Construct via [`DecisionTreeConfig::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter           | Default               |
/// |---------------------|-----------------------|
/// | `criterion`         | `SquaredError`        |
/// | `split_method`      | `Exact`               |
/// | `max_depth`         | `None` (unlimited)    |
/// | `min_samples_split` | 2                     |
/// | `min_samples_leaf`  | 1                     |
/// | `max_features`      | `None` (all features) |
/// | `seed`              | 42                    |
#[derive(Debug, Clone)]
pub struct DecisionTreeConfig {
    pub(crate) criterion: SplitCriterion,
    pub(crate) split_method: SplitMethod,
    pub(crate) max_depth: Option<usize>,
    pub(crate) min_samples_split: usize,
    pub(crate) min_samples_leaf: usize,
    pub(crate) max_features: Option<usize>,
    pub(crate) seed: u64,
}

impl DecisionTreeConfig {
    /// Create a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            criterion: SplitCriterion::SquaredError,
            split_method: SplitMethod::Exact,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            seed: 42,
        }
    }

    /// Set the split quality criterion.
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

    /// Set the maximum tree depth.
    ///
    /// `None` means grow until leaves are pure or stopping conditions are
    /// met. `Some(d)` limits depth to `d` levels (root is depth 0).
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

    /// Set the minimum number of samples required in each leaf after a split.
    #[must_use]
    pub fn with_min_samples_leaf(mut self, min_samples_leaf: usize) -> Self {
        self.min_samples_leaf = min_samples_leaf;
        self
    }

    /// Set the maximum number of features to consider at each split.
    #[must_use]
    pub fn with_max_features(mut self, max_features: Option<usize>) -> Self {
        self.max_features = max_features;
        self
    }

    /// Set the random seed for reproducibility.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Train a regression tree on the provided row-major dataset.
    ///
    /// `features[sample_idx][feature_idx]` is row-major; `targets[sample_idx]`
    /// is the continuous response.
    ///
    /// # Errors
    ///
    /// | Variant                             | When                                            |
    /// |-------------------------------------|-------------------------------------------------|
    /// | [`RfError::EmptyDataset`]           | `features` is empty                             |
    /// | [`RfError::ZeroFeatures`]           | rows have zero feature columns                  |
    /// | [`RfError::TargetCountMismatch`]    | `targets.len() != features.len()`               |
    /// | [`RfError::FeatureCountMismatch`]   | rows have inconsistent lengths                  |
    /// | [`RfError::NonFiniteValue`]         | any feature value is NaN or infinite            |
    /// | [`RfError::NonFiniteTarget`]        | any target is NaN or infinite                   |
    /// | [`RfError::InvalidPoissonTarget`]   | Poisson criterion with a negative or all-zero target |
    /// | [`RfError::InvalidMaxFeatures`]     | `max_features` resolves outside [1, n_features] |
    /// | [`RfError::InvalidMaxDepth`]        | `max_depth` is `Some(0)`                        |
    /// | [`RfError::InvalidMinSamplesSplit`] | `min_samples_split` < 2                         |
    /// | [`RfError::InvalidMinSamplesLeaf`]  | `min_samples_leaf` < 1                          |
    #[instrument(skip(self, features, targets), fields(n_samples = features.len()))]
    pub fn fit(&self, features: &[Vec<f64>], targets: &[f64]) -> Result<DecisionTree, RfError> {
        let n_features = validate_training_data(features, targets, self.criterion)?;
        let n_samples = features.len();

        if let Some(d) = self.max_depth
            && d == 0
        {
            return Err(RfError::InvalidMaxDepth { max_depth: 0 });
        }

        if self.min_samples_split < 2 {
            return Err(RfError::InvalidMinSamplesSplit {
                min_samples_split: self.min_samples_split,
            });
        }

        if self.min_samples_leaf < 1 {
            return Err(RfError::InvalidMinSamplesLeaf {
                min_samples_leaf: self.min_samples_leaf,
            });
        }

        let max_features = self.max_features.unwrap_or(n_features);
        if max_features == 0 || max_features > n_features {
            return Err(RfError::InvalidMaxFeatures {
                max_features,
                n_features,
            });
        }

        debug!(n_samples, n_features, max_features, "fitting regression tree");

        let col_features: Vec<Vec<f64>> = (0..n_features)
            .map(|feat_idx| features.iter().map(|row| row[feat_idx]).collect())
            .collect();

        // Splits are scored on targets divided by a power of two so that
        // squared sums stay finite for very large labels. The division is
        // exact, so the chosen splits do not depend on the scale.
        let scale = target_scale(targets);
        let split_targets: Vec<f64> = targets.iter().map(|y| y / scale).collect();

        let sample_indices: Vec<usize> = (0..n_samples).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut arena: Vec<Node> = Vec::new();

        let mut builder = TreeBuilder {
            col_features: &col_features,
            targets,
            split_targets: &split_targets,
            config: self,
            max_features,
            rng: &mut rng,
            arena: &mut arena,
        };
        let root = builder.build(&sample_indices, 0);

        debug!(
            root_index = root.index(),
            n_nodes = arena.len(),
            "regression tree built"
        );

        Ok(DecisionTree {
            nodes: arena,
            n_features,
        })
    }
}

impl Default for DecisionTreeConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate a row-major training set and return its feature count.
pub(crate) fn validate_training_data(
    features: &[Vec<f64>],
    targets: &[f64],
    criterion: SplitCriterion,
) -> Result<usize, RfError> {
    if features.is_empty() {
        return Err(RfError::EmptyDataset);
    }
    if targets.len() != features.len() {
        return Err(RfError::TargetCountMismatch {
            n_samples: features.len(),
            n_targets: targets.len(),
        });
    }

    let n_features = features[0].len();
    if n_features == 0 {
        return Err(RfError::ZeroFeatures);
    }

    for (sample_index, row) in features.iter().enumerate() {
        if row.len() != n_features {
            return Err(RfError::FeatureCountMismatch {
                expected: n_features,
                got: row.len(),
                sample_index,
            });
        }
        if let Some(feature_index) = row.iter().position(|v| !v.is_finite()) {
            return Err(RfError::NonFiniteValue {
                sample_index,
                feature_index,
            });
        }
    }

    if let Some(sample_index) = targets.iter().position(|y| !y.is_finite()) {
        return Err(RfError::NonFiniteTarget { sample_index });
    }

    if criterion == SplitCriterion::Poisson {
        if let Some(sample_index) = targets.iter().position(|&y| y < 0.0) {
            return Err(RfError::InvalidPoissonTarget {
                reason: format!("target at sample {sample_index} is negative"),
            });
        }
        if targets.iter().sum::<f64>() <= 0.0 {
            return Err(RfError::InvalidPoissonTarget {
                reason: "targets sum to zero".to_string(),
            });
        }
    }

    Ok(n_features)
}

/// Smallest power of two at or above `max |y|`, or 1.0 for all-zero targets.
fn target_scale(targets: &[f64]) -> f64 {
    let max_abs = targets.iter().fold(0.0f64, |m, y| m.max(y.abs()));
    if max_abs > 0.0 {
        let exponent = (max_abs.log2().ceil() as i32).clamp(f64::MIN_EXP - 1, f64::MAX_EXP - 1);
        2f64.powi(exponent)
    } else {
        1.0
    }
}

/// Recursive arena builder; bundles the state shared by every recursion level.
struct TreeBuilder<'a> {
    col_features: &'a [Vec<f64>],
    targets: &'a [f64],
    split_targets: &'a [f64],
    config: &'a DecisionTreeConfig,
    max_features: usize,
    rng: &'a mut ChaCha8Rng,
    arena: &'a mut Vec<Node>,
}

impl TreeBuilder<'_> {
    /// Build the subtree for `sample_indices` and return its arena index.
    fn build(&mut self, sample_indices: &[usize], depth: usize) -> NodeIndex {
        let n_samples = sample_indices.len();
        let node_targets: Vec<f64> = sample_indices.iter().map(|&si| self.targets[si]).collect();
        let value = node_targets.iter().sum::<f64>() / n_samples as f64;
        let impurity = self.config.criterion.impurity(&node_targets);

        let depth_exceeded = self.config.max_depth.is_some_and(|max_d| depth >= max_d);
        let too_few = n_samples < self.config.min_samples_split;
        let pure = node_targets.iter().all(|&y| y == node_targets[0]);

        if too_few || pure || depth_exceeded {
            return self.push_leaf(value, impurity, n_samples);
        }

        let Some(split) = find_best_split(
            self.col_features,
            self.split_targets,
            sample_indices,
            &self.config.criterion,
            &self.config.split_method,
            self.max_features,
            self.config.min_samples_leaf,
            &mut *self.rng,
        ) else {
            return self.push_leaf(value, impurity, n_samples);
        };

        // Reserve the slot so children get higher indices, then overwrite.
        let node_idx = self.arena.len();
        self.arena.push(Node::Leaf {
            value,
            impurity,
            n_samples,
        });

        let left = self.build(&split.left_indices, depth + 1);
        let right = self.build(&split.right_indices, depth + 1);

        self.arena[node_idx] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
            value,
            impurity,
            n_samples,
            impurity_decrease: split.impurity_decrease,
        };

        NodeIndex::new(node_idx)
    }

    fn push_leaf(&mut self, value: f64, impurity: Impurity, n_samples: usize) -> NodeIndex {
        let idx = self.arena.len();
        self.arena.push(Node::Leaf {
            value,
            impurity,
            n_samples,
        });
        NodeIndex::new(idx)
    }
}

/// A fitted CART regression tree.
///
/// Stored as an arena-based `Vec<Node>` with index references for
/// cache-friendly traversal and trivial serialization.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DecisionTree {
    pub(crate) nodes: Vec<Node>,
    pub(crate) n_features: usize,
}

impl DecisionTree {
    /// Predict the target for a single sample.
    ///
    /// Traverses from the root (index 0): at each `Split`, goes left when
    /// `sample[feature] <= threshold`, right otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::PredictionFeatureMismatch`] when `sample.len() != n_features`.
    pub fn predict(&self, sample: &[f64]) -> Result<f64, RfError> {
        self.check_width(sample)?;
        Ok(self.nodes[self.traverse(sample)].value())
    }

    /// Decompose a prediction along its decision path.
    ///
    /// Returns `(bias, contributions)` where `bias` is the root mean and
    /// `contributions[f]` sums the change in node mean over every split on
    /// feature `f` along the path. `bias + Σ contributions` equals
    /// [`predict`](Self::predict).
    ///
    /// # Errors
    ///
    /// Returns [`RfError::PredictionFeatureMismatch`] when `sample.len() != n_features`.
    pub fn decision_path_contributions(&self, sample: &[f64]) -> Result<(f64, Vec<f64>), RfError> {
        self.check_width(sample)?;
        let mut contributions = vec![0.0f64; self.n_features];
        let bias = self.nodes[0].value();
        let mut idx = 0usize;
        while let Node::Split {
            feature,
            threshold,
            left,
            right,
            value,
            ..
        } = &self.nodes[idx]
        {
            let next = if sample[feature.index()] <= *threshold {
                left.index()
            } else {
                right.index()
            };
            contributions[feature.index()] += self.nodes[next].value() - value;
            idx = next;
        }
        Ok((bias, contributions))
    }

    /// Compute Mean Decrease in Impurity (MDI) feature importances.
    ///
    /// For each `Split` node, the `impurity_decrease` is accumulated by
    /// feature index, then the totals are normalized so they sum to 1.0.
    /// Returns a `Vec` of length `n_features`; all zeros when the tree is
    /// a single leaf.
    #[must_use]
    pub fn feature_importances(&self) -> Vec<f64> {
        let mut totals = vec![0.0f64; self.n_features];
        for node in &self.nodes {
            if let Node::Split {
                feature,
                impurity_decrease,
                ..
            } = node
            {
                totals[feature.index()] += impurity_decrease.max(0.0);
            }
        }
        let sum: f64 = totals.iter().sum();
        if sum > 0.0 {
            totals.iter_mut().for_each(|v| *v /= sum);
        }
        totals
    }

    /// Return the total number of nodes in the tree (both splits and leaves).
    #[must_use]
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Return the number of leaf nodes.
    #[must_use]
    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Return the maximum depth of the tree.
    ///
    /// A single-node tree (just a root leaf) has depth 0.
    #[must_use]
    pub fn depth(&self) -> usize {
        if self.nodes.is_empty() {
            return 0;
        }

        let mut max_depth = 0usize;
        let mut queue = std::collections::VecDeque::new();
        queue.push_back((0usize, 0usize));

        while let Some((node_idx, d)) = queue.pop_front() {
            match &self.nodes[node_idx] {
                Node::Leaf { .. } => max_depth = max_depth.max(d),
                Node::Split { left, right, .. } => {
                    queue.push_back((left.index(), d + 1));
                    queue.push_back((right.index(), d + 1));
                }
            }
        }

        max_depth
    }

    /// Borrow the node arena (root at index 0).
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    fn check_width(&self, sample: &[f64]) -> Result<(), RfError> {
        if sample.len() != self.n_features {
            return Err(RfError::PredictionFeatureMismatch {
                expected: self.n_features,
                got: sample.len(),
            });
        }
        Ok(())
    }

    /// Traverse the tree from the root and return the arena index of the leaf.
    fn traverse(&self, sample: &[f64]) -> usize {
        let mut idx = 0usize;
        while let Node::Split {
            feature,
            threshold,
            left,
            right,
            ..
        } = &self.nodes[idx]
        {
            idx = if sample[feature.index()] <= *threshold {
                left.index()
            } else {
                right.index()
            };
        }
        idx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_data() -> (Vec<Vec<f64>>, Vec<f64>) {
        let features = vec![
            vec![1.0, 0.0],
            vec![2.0, 0.0],
            vec![3.0, 0.0],
            vec![10.0, 0.0],
            vec![11.0, 0.0],
            vec![12.0, 0.0],
        ];
        let targets = vec![5.0, 5.0, 5.0, 50.0, 50.0, 50.0];
        (features, targets)
    }

    #[test]
    fn empty_dataset_error() {
        let err = DecisionTreeConfig::new().fit(&[], &[]).unwrap_err();
        assert!(matches!(err, RfError::EmptyDataset));
    }

    #[test]
    fn constant_targets_single_leaf() {
        let features = vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]];
        let targets = vec![7.0, 7.0, 7.0];
        let tree = DecisionTreeConfig::new().fit(&features, &targets).unwrap();
        assert_eq!(tree.n_nodes(), 1);
        assert_eq!(tree.n_leaves(), 1);
        assert!((tree.predict(&[2.0, 3.0]).unwrap() - 7.0).abs() < f64::EPSILON);
    }

    #[test]
    fn step_function_recovered() {
        let (features, targets) = step_data();
        let tree = DecisionTreeConfig::new().fit(&features, &targets).unwrap();
        assert!((tree.predict(&[2.0, 0.0]).unwrap() - 5.0).abs() < 1e-12);
        assert!((tree.predict(&[11.0, 0.0]).unwrap() - 50.0).abs() < 1e-12);
        assert_eq!(tree.depth(), 1);
    }

    #[test]
    fn huge_targets_still_split() {
        let (features, targets) = step_data();
        let huge: Vec<f64> = targets.iter().map(|y| y * 1e300).collect();
        let tree = DecisionTreeConfig::new().fit(&features, &huge).unwrap();
        assert_eq!(tree.depth(), 1);
        assert!((tree.predict(&[2.0, 0.0]).unwrap() / 5e300 - 1.0).abs() < 1e-12);
        assert!((tree.predict(&[11.0, 0.0]).unwrap() / 5e301 - 1.0).abs() < 1e-12);
        assert_eq!(tree.feature_importances(), vec![1.0, 0.0]);
    }

    #[test]
    fn target_scale_bounds_targets() {
        assert_eq!(target_scale(&[0.0, 0.0]), 1.0);
        assert_eq!(target_scale(&[-3.0, 2.0]), 4.0);
        assert_eq!(target_scale(&[0.25]), 0.25);
        let big = target_scale(&[f64::MAX]);
        assert!(big.is_finite() && f64::MAX / big <= 2.0);
    }

    #[test]
    fn contributions_sum_to_prediction() {
        let features: Vec<Vec<f64>> = (0..20)
            .map(|i| vec![i as f64, (i % 4) as f64])
            .collect();
        let targets: Vec<f64> = (0..20).map(|i| (i * i) as f64 + (i % 4) as f64).collect();
        let tree = DecisionTreeConfig::new().fit(&features, &targets).unwrap();
        for sample in &features {
            let (bias, contribs) = tree.decision_path_contributions(sample).unwrap();
            let total = bias + contribs.iter().sum::<f64>();
            assert!((total - tree.predict(sample).unwrap()).abs() < 1e-9);
        }
    }

    #[test]
    fn feature_importances_sum_to_one() {
        let features = vec![
            vec![1.0, 100.0],
            vec![2.0, 200.0],
            vec![3.0, 300.0],
            vec![10.0, 100.0],
            vec![11.0, 200.0],
            vec![12.0, 300.0],
        ];
        let targets = vec![1.0, 1.5, 2.0, 9.0, 9.5, 10.0];
        let tree = DecisionTreeConfig::new().fit(&features, &targets).unwrap();
        let sum: f64 = tree.feature_importances().iter().sum();
        assert!((sum - 1.0).abs() < 1e-10, "sum = {sum}");
    }

    #[test]
    fn deterministic_with_same_seed() {
        let features: Vec<Vec<f64>> = (0..30)
            .map(|i| vec![(i * 7 % 11) as f64, (i * 3 % 5) as f64, i as f64])
            .collect();
        let targets: Vec<f64> = (0..30).map(|i| (i * 13 % 17) as f64).collect();
        let config = DecisionTreeConfig::new().with_max_features(Some(1)).with_seed(123);
        let tree1 = config.fit(&features, &targets).unwrap();
        let tree2 = config.fit(&features, &targets).unwrap();
        for sample in &features {
            assert_eq!(tree1.predict(sample).unwrap(), tree2.predict(sample).unwrap());
        }
    }

    #[test]
    fn prediction_feature_mismatch() {
        let (features, targets) = step_data();
        let tree = DecisionTreeConfig::new().fit(&features, &targets).unwrap();
        let err = tree.predict(&[1.0]).unwrap_err();
        assert!(matches!(
            err,
            RfError::PredictionFeatureMismatch { expected: 2, got: 1 }
        ));
    }

    #[test]
    fn max_depth_limits_tree() {
        let features: Vec<Vec<f64>> = (0..16).map(|i| vec![i as f64]).collect();
        let targets: Vec<f64> = (0..16).map(|i| i as f64).collect();
        let tree = DecisionTreeConfig::new()
            .with_max_depth(Some(2))
            .fit(&features, &targets)
            .unwrap();
        assert!(tree.depth() <= 2);
        assert!(tree.n_leaves() <= 4);
    }

    #[test]
    fn min_samples_split_stops_growth() {
        let features: Vec<Vec<f64>> = (0..4).map(|i| vec![i as f64]).collect();
        let targets = vec![1.0, 2.0, 3.0, 4.0];
        let tree = DecisionTreeConfig::new()
            .with_min_samples_split(5)
            .fit(&features, &targets)
            .unwrap();
        assert_eq!(tree.n_nodes(), 1);
        assert!((tree.predict(&[0.0]).unwrap() - 2.5).abs() < 1e-12);
    }

    #[test]
    fn target_count_mismatch_error() {
        let features = vec![vec![1.0], vec![2.0]];
        let err = DecisionTreeConfig::new().fit(&features, &[1.0]).unwrap_err();
        assert!(matches!(err, RfError::TargetCountMismatch { n_samples: 2, n_targets: 1 }));
    }

    #[test]
    fn non_finite_value_error() {
        let features = vec![vec![1.0, f64::NAN], vec![3.0, 4.0]];
        let err = DecisionTreeConfig::new().fit(&features, &[0.0, 1.0]).unwrap_err();
        assert!(matches!(err, RfError::NonFiniteValue { sample_index: 0, feature_index: 1 }));
    }

    #[test]
    fn non_finite_target_error() {
        let features = vec![vec![1.0], vec![3.0]];
        let err = DecisionTreeConfig::new()
            .fit(&features, &[0.0, f64::INFINITY])
            .unwrap_err();
        assert!(matches!(err, RfError::NonFiniteTarget { sample_index: 1 }));
    }

    #[test]
    fn poisson_rejects_negative_targets() {
        let features = vec![vec![1.0], vec![3.0]];
        let err = DecisionTreeConfig::new()
            .with_criterion(SplitCriterion::Poisson)
            .fit(&features, &[-1.0, 4.0])
            .unwrap_err();
        assert!(matches!(err, RfError::InvalidPoissonTarget { .. }));
    }

    #[test]
    fn poisson_step_function() {
        let (features, targets) = step_data();
        let tree = DecisionTreeConfig::new()
            .with_criterion(SplitCriterion::Poisson)
            .fit(&features, &targets)
            .unwrap();
        assert!((tree.predict(&[2.0, 0.0]).unwrap() - 5.0).abs() < 1e-12);
        assert!((tree.predict(&[12.0, 0.0]).unwrap() - 50.0).abs() < 1e-12);
    }

    #[test]
    fn extra_trees_step_function() {
        let (features, targets) = step_data();
        let tree = DecisionTreeConfig::new()
            .with_split_method(SplitMethod::ExtraTrees)
            .with_seed(42)
            .fit(&features, &targets)
            .unwrap();
        assert!((tree.predict(&[2.0, 0.0]).unwrap() - 5.0).abs() < 1e-12);
        assert!((tree.predict(&[11.0, 0.0]).unwrap() - 50.0).abs() < 1e-12);
    }
}
