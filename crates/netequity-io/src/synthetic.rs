//! Deterministic synthetic country dataset.

use netequity_model::{Feature, FeatureDataset, FeatureRecord, N_FEATURES};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{info, instrument};

use crate::IoError;

/// Probability that a single feature cell is left missing.
pub const MISSING_RATE: f64 = 0.05;

/// Generate `n` synthetic country records.
///
/// A latent development level in `[0, 1)` drives every indicator and the
/// label, so profiles that look more developed have a higher web presence.
/// About [`MISSING_RATE`] of feature cells are `None`; the first record is
/// always complete so that no column is entirely missing.
///
/// The same `(n, seed)` always yields the same dataset.
///
/// # Errors
///
/// Returns [`IoError::InvalidSyntheticSize`] if `n` is zero.
#[instrument(skip_all, fields(n, seed))]
pub fn synthetic_dataset(n: usize, seed: u64) -> Result<FeatureDataset, IoError> {
    if n == 0 {
        return Err(IoError::InvalidSyntheticSize { n });
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut n_missing = 0usize;

    let records: Vec<FeatureRecord> = (0..n)
        .map(|i| {
            let level: f64 = rng.r#gen();
            let mut values = [None; N_FEATURES];
            for feature in Feature::ALL {
                let value = indicator(&mut rng, feature, level);
                if i > 0 && rng.gen_bool(MISSING_RATE) {
                    n_missing += 1;
                } else {
                    values[feature.index()] = Some(value);
                }
            }
            let label = 10f64.powf(0.5 + 3.5 * level) * rng.gen_range(0.8..1.2);
            FeatureRecord::new(format!("country_{i:03}"), values, label)
        })
        .collect();

    info!(n_records = records.len(), n_missing, "synthetic dataset generated");
    Ok(FeatureDataset::new(records))
}

fn indicator(rng: &mut ChaCha8Rng, feature: Feature, level: f64) -> f64 {
    let pct = |v: f64| v.clamp(0.0, 100.0);
    match feature {
        Feature::GdpPerCapita => 400.0 + 80_000.0 * level * level * rng.gen_range(0.7..1.3),
        Feature::InternetPenetration => pct(2.0 + 95.0 * level + rng.gen_range(-6.0..6.0)),
        Feature::UrbanPct => pct(12.0 + 78.0 * level + rng.gen_range(-10.0..10.0)),
        Feature::LiteracyRate => pct(30.0 + 69.0 * level + rng.gen_range(-5.0..5.0)),
        Feature::MobileSubscriptions => (20.0 + 120.0 * level + rng.gen_range(-15.0..15.0)).max(0.0),
        Feature::ElectricityAccess => pct(8.0 + 92.0 * level + rng.gen_range(-5.0..5.0)),
        Feature::EducationIndex => (0.2 + 0.75 * level + rng.gen_range(-0.05..0.05)).clamp(0.0, 1.0),
        Feature::AgeMedian => 15.0 + 30.0 * level + rng.gen_range(-3.0..3.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_dataset() {
        let a = synthetic_dataset(50, 7).unwrap();
        let b = synthetic_dataset(50, 7).unwrap();
        assert_eq!(a.records(), b.records());
    }

    #[test]
    fn different_seed_differs() {
        let a = synthetic_dataset(50, 7).unwrap();
        let b = synthetic_dataset(50, 8).unwrap();
        assert_ne!(a.labels(), b.labels());
    }

    #[test]
    fn zero_records_rejected() {
        assert!(matches!(
            synthetic_dataset(0, 42),
            Err(IoError::InvalidSyntheticSize { n: 0 })
        ));
    }

    #[test]
    fn values_in_range() {
        let ds = synthetic_dataset(200, 42).unwrap();
        for record in ds.records() {
            assert!(record.label > 0.0 && record.label.is_finite());
            for v in record.values.iter().flatten() {
                assert!(v.is_finite() && *v >= 0.0);
            }
            if let Some(edu) = record.get(Feature::EducationIndex) {
                assert!((0.0..=1.0).contains(&edu));
            }
        }
    }

    #[test]
    fn some_cells_missing_first_record_complete() {
        let ds = synthetic_dataset(400, 42).unwrap();
        assert!(ds.records()[0].values.iter().all(Option::is_some));
        let total = 400 * N_FEATURES;
        let missing: usize = ds
            .records()
            .iter()
            .map(|r| r.values.iter().filter(|v| v.is_none()).count())
            .sum();
        let rate = missing as f64 / total as f64;
        assert!(rate > 0.02 && rate < 0.08, "missing rate {rate}");
    }

    #[test]
    fn label_tracks_development() {
        let ds = synthetic_dataset(300, 42).unwrap();
        let mut pairs: Vec<(f64, f64)> = ds
            .records()
            .iter()
            .filter_map(|r| r.get(Feature::InternetPenetration).map(|v| (v, r.label)))
            .collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
        let third = pairs.len() / 3;
        let low: f64 = pairs[..third].iter().map(|p| p.1).sum::<f64>() / third as f64;
        let high: f64 = pairs[pairs.len() - third..].iter().map(|p| p.1).sum::<f64>() / third as f64;
        assert!(high > 5.0 * low, "high {high} vs low {low}");
    }
}
