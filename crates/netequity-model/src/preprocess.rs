//! Mean imputation followed by standard scaling.

use tracing::{debug, instrument};

use crate::error::ValidationError;
use crate::schema::{Feature, N_FEATURES};

/// Fitted imputation and scaling statistics.
///
/// Statistics are learned once from the training rows and applied
/// unchanged at inference time.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Preprocessor {
    imputation_means: Vec<f64>,
    scale_means: Vec<f64>,
    scale_stds: Vec<f64>,
}

impl Preprocessor {
    /// Learn per-column statistics from training rows.
    ///
    /// The imputation mean is taken over present values. Scaling uses the
    /// mean and population standard deviation (divides by n) of the imputed
    /// column; a zero standard deviation is replaced by 1.0.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ValidationError::FeatureCountMismatch`] | a row is not `N_FEATURES` wide |
    /// | [`ValidationError::NonFiniteValue`] | a present value is NaN or infinite |
    /// | [`ValidationError::ColumnEntirelyMissing`] | a column has no present value (or there are no rows) |
    #[instrument(skip_all, fields(n_rows = rows.len()))]
    pub fn fit(rows: &[Vec<Option<f64>>]) -> Result<Self, ValidationError> {
        for (row_idx, row) in rows.iter().enumerate() {
            if row.len() != N_FEATURES {
                return Err(ValidationError::FeatureCountMismatch {
                    expected: N_FEATURES,
                    got: row.len(),
                });
            }
            for (feature, value) in Feature::ALL.into_iter().zip(row) {
                if value.is_some_and(|v| !v.is_finite()) {
                    return Err(ValidationError::NonFiniteValue { feature, row: row_idx });
                }
            }
        }

        let mut imputation_means = Vec::with_capacity(N_FEATURES);
        let mut scale_means = Vec::with_capacity(N_FEATURES);
        let mut scale_stds = Vec::with_capacity(N_FEATURES);

        for feature in Feature::ALL {
            let col = feature.index();
            let present: Vec<f64> = rows.iter().filter_map(|row| row[col]).collect();
            if present.is_empty() {
                return Err(ValidationError::ColumnEntirelyMissing { feature });
            }
            let impute = present.iter().sum::<f64>() / present.len() as f64;

            let imputed: Vec<f64> = rows.iter().map(|row| row[col].unwrap_or(impute)).collect();
            let n = imputed.len() as f64;
            let mean = imputed.iter().sum::<f64>() / n;
            let variance = imputed.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / n;
            let std = variance.sqrt();

            imputation_means.push(impute);
            scale_means.push(mean);
            scale_stds.push(if std > 0.0 { std } else { 1.0 });
        }

        debug!(?imputation_means, ?scale_stds, "preprocessor fitted");

        Ok(Self {
            imputation_means,
            scale_means,
            scale_stds,
        })
    }

    /// Impute and standardize one row.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ValidationError::FeatureCountMismatch`] | the row width differs from the fitted width |
    /// | [`ValidationError::NonFiniteInput`] | a present value is NaN or infinite |
    pub fn transform(&self, row: &[Option<f64>]) -> Result<Vec<f64>, ValidationError> {
        self.check_width(row.len())?;
        Feature::ALL
            .into_iter()
            .zip(row)
            .map(|(feature, value)| {
                let col = feature.index();
                let raw = match *value {
                    Some(v) if !v.is_finite() => {
                        return Err(ValidationError::NonFiniteInput { feature });
                    }
                    Some(v) => v,
                    None => self.imputation_means[col],
                };
                Ok((raw - self.scale_means[col]) / self.scale_stds[col])
            })
            .collect()
    }

    /// Transform a batch of rows.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by [`transform`](Self::transform).
    pub fn transform_batch(&self, rows: &[Vec<Option<f64>>]) -> Result<Vec<Vec<f64>>, ValidationError> {
        rows.iter().map(|row| self.transform(row)).collect()
    }

    /// Map standardized values back to raw units.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::FeatureCountMismatch`] if the width differs from the fitted width.
    pub fn inverse_transform(&self, scaled: &[f64]) -> Result<Vec<f64>, ValidationError> {
        self.check_width(scaled.len())?;
        Ok(scaled
            .iter()
            .enumerate()
            .map(|(col, &z)| z * self.scale_stds[col] + self.scale_means[col])
            .collect())
    }

    /// Mean of the present training values of one feature.
    #[must_use]
    pub fn imputation_mean(&self, feature: Feature) -> f64 {
        self.imputation_means[feature.index()]
    }

    /// Scaling mean of one feature.
    #[must_use]
    pub fn scale_mean(&self, feature: Feature) -> f64 {
        self.scale_means[feature.index()]
    }

    /// Scaling standard deviation of one feature (1.0 for constant columns).
    #[must_use]
    pub fn scale_std(&self, feature: Feature) -> f64 {
        self.scale_stds[feature.index()]
    }

    fn check_width(&self, got: usize) -> Result<(), ValidationError> {
        if got != self.scale_means.len() {
            return Err(ValidationError::FeatureCountMismatch {
                expected: self.scale_means.len(),
                got,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<Vec<Option<f64>>> {
        vec![
            vec![Some(1.0), Some(10.0), Some(5.0), Some(0.0), Some(2.0), Some(3.0), Some(4.0), Some(7.0)],
            vec![Some(2.0), None, Some(5.0), Some(1.0), Some(4.0), Some(3.0), Some(4.0), Some(8.0)],
            vec![Some(3.0), Some(30.0), Some(5.0), Some(2.0), Some(6.0), Some(3.0), None, Some(9.0)],
        ]
    }

    #[test]
    fn imputation_uses_present_mean() {
        let pre = Preprocessor::fit(&rows()).unwrap();
        assert!((pre.imputation_mean(Feature::InternetPenetration) - 20.0).abs() < 1e-12);
        let z = pre.transform(&rows()[1]).unwrap();
        // Imputed to the column mean, which standardizes to zero.
        assert!(z[Feature::InternetPenetration.index()].abs() < 1e-12);
    }

    #[test]
    fn population_std() {
        let pre = Preprocessor::fit(&rows()).unwrap();
        let expected = (2.0f64 / 3.0).sqrt();
        assert!((pre.scale_std(Feature::GdpPerCapita) - expected).abs() < 1e-12);
        assert!((pre.scale_mean(Feature::GdpPerCapita) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn constant_column_scaled_by_one() {
        let pre = Preprocessor::fit(&rows()).unwrap();
        assert_eq!(pre.scale_std(Feature::UrbanPct), 1.0);
        let z = pre.transform(&rows()[0]).unwrap();
        assert_eq!(z[Feature::UrbanPct.index()], 0.0);
    }

    #[test]
    fn round_trip_recovers_present_values() {
        let pre = Preprocessor::fit(&rows()).unwrap();
        for row in rows() {
            let back = pre.inverse_transform(&pre.transform(&row).unwrap()).unwrap();
            for (orig, restored) in row.iter().zip(&back) {
                if let Some(v) = orig {
                    assert!((v - restored).abs() < 1e-9, "{v} vs {restored}");
                }
            }
        }
    }

    #[test]
    fn transformed_columns_are_standardized() {
        let pre = Preprocessor::fit(&rows()).unwrap();
        let z = pre.transform_batch(&rows()).unwrap();
        for col in 0..N_FEATURES {
            let mean: f64 = z.iter().map(|r| r[col]).sum::<f64>() / z.len() as f64;
            assert!(mean.abs() < 1e-12);
        }
    }

    #[test]
    fn entirely_missing_column_rejected() {
        let mut data = rows();
        for row in &mut data {
            row[Feature::LiteracyRate.index()] = None;
        }
        let err = Preprocessor::fit(&data).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::ColumnEntirelyMissing { feature: Feature::LiteracyRate }
        ));
    }

    #[test]
    fn width_mismatch_rejected() {
        let pre = Preprocessor::fit(&rows()).unwrap();
        let err = pre.transform(&[Some(1.0); 3]).unwrap_err();
        assert!(matches!(err, ValidationError::FeatureCountMismatch { expected: 8, got: 3 }));
        assert!(pre.inverse_transform(&[0.0; 9]).is_err());
    }

    #[test]
    fn non_finite_rejected() {
        let mut data = rows();
        data[2][0] = Some(f64::NAN);
        assert!(matches!(
            Preprocessor::fit(&data).unwrap_err(),
            ValidationError::NonFiniteValue { feature: Feature::GdpPerCapita, row: 2 }
        ));

        let pre = Preprocessor::fit(&rows()).unwrap();
        let mut row = rows()[0].clone();
        row[7] = Some(f64::INFINITY);
        assert!(matches!(
            pre.transform(&row).unwrap_err(),
            ValidationError::NonFiniteInput { feature: Feature::AgeMedian }
        ));
    }
}
