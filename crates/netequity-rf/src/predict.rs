//! Prediction methods for the Random Forest ensemble.

use rayon::iter::{IntoParallelIterator, ParallelIterator};

use crate::error::RfError;
use crate::forest::RandomForest;

/// Additive decomposition of a forest prediction.
///
/// `bias + per_feature.iter().sum()` equals `prediction` up to floating-point
/// rounding.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Contributions {
    /// Mean of the per-tree predictions.
    pub prediction: f64,
    /// Mean of the per-tree root values (the training mean of each bootstrap).
    pub bias: f64,
    /// Average per-tree path contribution of each feature, in column order.
    pub per_feature: Vec<f64>,
}

impl RandomForest {
    /// Predict the target for a single sample.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::PredictionFeatureMismatch`] when `sample.len() != n_features`.
    pub fn predict(&self, sample: &[f64]) -> Result<f64, RfError> {
        self.check_width(sample)?;
        let mut total = 0.0f64;
        for tree in &self.trees {
            total += tree.predict(sample)?;
        }
        Ok(total / self.trees.len() as f64)
    }

    /// Predict a single sample and decompose it into per-feature contributions.
    ///
    /// Each tree's decision path is decomposed into a root bias plus the change
    /// in node mean at every split; the forest averages those across trees.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::PredictionFeatureMismatch`] when `sample.len() != n_features`.
    pub fn predict_contributions(&self, sample: &[f64]) -> Result<Contributions, RfError> {
        self.check_width(sample)?;

        let mut bias = 0.0f64;
        let mut per_feature = vec![0.0f64; self.n_features];
        for tree in &self.trees {
            let (tree_bias, tree_contribs) = tree.decision_path_contributions(sample)?;
            bias += tree_bias;
            for (acc, c) in per_feature.iter_mut().zip(tree_contribs) {
                *acc += c;
            }
        }

        let n = self.trees.len() as f64;
        bias /= n;
        per_feature.iter_mut().for_each(|v| *v /= n);
        let prediction = bias + per_feature.iter().sum::<f64>();

        Ok(Contributions {
            prediction,
            bias,
            per_feature,
        })
    }

    /// Predict targets for a batch of samples in parallel.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::PredictionFeatureMismatch`] if any sample has the wrong feature count.
    pub fn predict_batch(&self, features: &[Vec<f64>]) -> Result<Vec<f64>, RfError> {
        features
            .into_par_iter()
            .map(|sample| self.predict(sample))
            .collect()
    }

    /// Return the number of features this forest was trained on.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Return the number of trees in the ensemble.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Return the feature names.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
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
}

#[cfg(test)]
mod tests {
    use crate::RandomForestConfig;

    #[test]
    fn contributions_sum_to_prediction() {
        let features: Vec<Vec<f64>> = (0..40)
            .map(|i| vec![i as f64, ((i * 7) % 5) as f64, ((i * 3) % 4) as f64])
            .collect();
        let targets: Vec<f64> = features.iter().map(|r| r[0] * 1.5 + r[1] * r[2]).collect();
        let names = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let result = RandomForestConfig::new(25)
            .unwrap()
            .fit(&features, &targets, &names)
            .unwrap();

        for sample in &features {
            let c = result.forest().predict_contributions(sample).unwrap();
            let total = c.bias + c.per_feature.iter().sum::<f64>();
            assert!((total - c.prediction).abs() < 1e-9);
            let direct = result.forest().predict(sample).unwrap();
            assert!((direct - c.prediction).abs() < 1e-9);
        }
    }

    #[test]
    fn wrong_width_rejected() {
        let features: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64, 0.0]).collect();
        let targets: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let names = vec!["a".to_string(), "b".to_string()];
        let result = RandomForestConfig::new(3)
            .unwrap()
            .fit(&features, &targets, &names)
            .unwrap();
        assert!(matches!(
            result.forest().predict(&[1.0]),
            Err(crate::RfError::PredictionFeatureMismatch { expected: 2, got: 1 })
        ));
    }
}
