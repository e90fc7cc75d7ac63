//! Side-by-side held-out comparison of forest variants.

use std::fmt;

use netequity_rf::{OobMode, RfError, SplitCriterion, SplitMethod};
use tracing::{info, instrument, warn};

use crate::error::{ModelError, TrainingError};
use crate::record::FeatureDataset;
use crate::train::{TrainingConfig, train};

/// A model variant derived from a base [`TrainingConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Candidate {
    /// Bagged CART trees with exact squared-error splits.
    RandomForest,
    /// Bagged trees with randomly drawn split thresholds.
    ExtraTrees,
    /// Bagged trees split on Poisson deviance.
    PoissonForest,
    /// One bootstrapped tree; the baseline every forest should beat.
    SingleTree,
}

impl Candidate {
    /// Every candidate, in report order before ranking.
    pub const ALL: [Self; 4] = [
        Self::RandomForest,
        Self::ExtraTrees,
        Self::PoissonForest,
        Self::SingleTree,
    ];

    /// Stable snake_case name used in reports.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::RandomForest => "random_forest",
            Self::ExtraTrees => "extra_trees",
            Self::PoissonForest => "poisson_forest",
            Self::SingleTree => "single_tree",
        }
    }

    /// The configuration this candidate trains with.
    ///
    /// Keeps the base depth, leaf, feature-sampling, bootstrap, seed and
    /// held-out settings; overrides the criterion, split method and, for
    /// [`Candidate::SingleTree`], the tree count. OOB scoring is off since
    /// only held-out metrics are compared.
    #[must_use]
    pub fn config(self, base: &TrainingConfig) -> TrainingConfig {
        let config = base
            .clone()
            .with_criterion(SplitCriterion::SquaredError)
            .with_split_method(SplitMethod::Exact)
            .with_oob_mode(OobMode::Disabled);
        match self {
            Self::RandomForest => config,
            Self::ExtraTrees => config.with_split_method(SplitMethod::ExtraTrees),
            Self::PoissonForest => config.with_criterion(SplitCriterion::Poisson),
            Self::SingleTree => config.with_n_trees(1),
        }
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Held-out score of one candidate.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ComparisonRow {
    /// 1-based position after sorting by R², best first.
    pub rank: usize,
    /// The variant that was trained.
    pub candidate: Candidate,
    /// Held-out coefficient of determination.
    pub r2: f64,
    /// Held-out mean squared error.
    pub mse: f64,
}

/// Train every [`Candidate`] on the same held-out split and rank them by R².
///
/// All candidates share the base seed, so they see identical training and
/// held-out records. The Poisson forest is skipped with a warning when the
/// labels are not valid Poisson targets. Ties keep [`Candidate::ALL`] order.
///
/// # Errors
///
/// Any [`ModelError`] from [`train`] other than an invalid Poisson target,
/// e.g. too few records or a feature column with no values.
#[instrument(skip_all, fields(n_records = dataset.len(), seed = base.seed()))]
pub fn compare(
    dataset: &FeatureDataset,
    base: &TrainingConfig,
) -> Result<Vec<ComparisonRow>, ModelError> {
    let mut rows = Vec::with_capacity(Candidate::ALL.len());
    for candidate in Candidate::ALL {
        let report = match train(dataset, &candidate.config(base)) {
            Ok(report) => report,
            Err(ModelError::Training(TrainingError::Forest(RfError::InvalidPoissonTarget {
                reason,
            }))) => {
                warn!(%candidate, %reason, "candidate skipped");
                continue;
            }
            Err(e) => return Err(e),
        };
        let evaluation = report.evaluation();
        rows.push(ComparisonRow {
            rank: 0,
            candidate,
            r2: evaluation.r2,
            mse: evaluation.mse,
        });
    }

    rows.sort_by(|a, b| b.r2.total_cmp(&a.r2));
    for (i, row) in rows.iter_mut().enumerate() {
        row.rank = i + 1;
    }

    info!(
        n_candidates = rows.len(),
        best = rows.first().map(|r| r.candidate.name()),
        "comparison complete"
    );
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FeatureRecord;

    fn quadratic_dataset(n: usize) -> FeatureDataset {
        (0..n)
            .map(|i| {
                let x = i as f64;
                let values = [
                    Some(x * 1000.0),
                    Some(x * 3.0),
                    Some(50.0 + x),
                    Some(60.0 - x * 0.5),
                    Some(80.0 + (i % 3) as f64),
                    Some(70.0 + x),
                    Some(0.3 + x * 0.01),
                    Some(20.0 + x * 0.5),
                ];
                FeatureRecord::new(format!("c{i}"), values, 10.0 + x * x)
            })
            .collect()
    }

    #[test]
    fn candidate_configs_override_only_their_axis() {
        let base = TrainingConfig::new()
            .with_n_trees(25)
            .with_criterion(SplitCriterion::Poisson)
            .with_oob_mode(OobMode::Enabled)
            .with_seed(7);

        let rf = Candidate::RandomForest.config(&base);
        assert_eq!(rf.n_trees(), 25);
        assert_eq!(rf.seed(), 7);
        assert_eq!(rf.criterion(), SplitCriterion::SquaredError);
        assert_eq!(rf.split_method(), SplitMethod::Exact);
        assert_eq!(rf.oob_mode(), OobMode::Disabled);

        let et = Candidate::ExtraTrees.config(&base);
        assert_eq!(et.split_method(), SplitMethod::ExtraTrees);
        assert_eq!(et.criterion(), SplitCriterion::SquaredError);

        assert_eq!(Candidate::PoissonForest.config(&base).criterion(), SplitCriterion::Poisson);
        assert_eq!(Candidate::SingleTree.config(&base).n_trees(), 1);
    }

    #[test]
    fn ranks_every_candidate_by_r2() {
        let base = TrainingConfig::new().with_n_trees(20);
        let rows = compare(&quadratic_dataset(40), &base).unwrap();

        assert_eq!(rows.len(), Candidate::ALL.len());
        for (i, row) in rows.iter().enumerate() {
            assert_eq!(row.rank, i + 1);
            assert!(row.r2.is_finite() && row.r2 <= 1.0);
            assert!(row.mse >= 0.0);
        }
        assert!(rows.windows(2).all(|w| w[0].r2 >= w[1].r2));
        for candidate in Candidate::ALL {
            assert_eq!(rows.iter().filter(|r| r.candidate == candidate).count(), 1);
        }
    }

    #[test]
    fn rows_match_individual_training() {
        let dataset = quadratic_dataset(30);
        let base = TrainingConfig::new().with_n_trees(10).with_seed(3);
        let rows = compare(&dataset, &base).unwrap();

        let single = rows
            .iter()
            .find(|r| r.candidate == Candidate::SingleTree)
            .unwrap();
        let direct = train(&dataset, &Candidate::SingleTree.config(&base)).unwrap();
        assert_eq!(single.r2, direct.evaluation().r2);
        assert_eq!(single.mse, direct.evaluation().mse);
    }

    #[test]
    fn negative_labels_skip_poisson() {
        let dataset: FeatureDataset = quadratic_dataset(30)
            .records()
            .iter()
            .cloned()
            .map(|mut r| {
                r.label -= 200.0;
                r
            })
            .collect();
        let rows = compare(&dataset, &TrainingConfig::new().with_n_trees(10)).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.candidate != Candidate::PoissonForest));
    }

    #[test]
    fn other_training_errors_propagate() {
        let err = compare(&quadratic_dataset(1), &TrainingConfig::new()).unwrap_err();
        assert!(matches!(
            err,
            ModelError::Training(TrainingError::InsufficientRecords { .. })
        ));
    }

    #[test]
    fn names_serialize_in_snake_case() {
        let json = serde_json::to_string(&Candidate::PoissonForest).unwrap();
        assert_eq!(json, "\"poisson_forest\"");
        assert_eq!(Candidate::ExtraTrees.to_string(), "extra_trees");
    }
}
