//! What a training run produced: the forest, its ranking and a shape summary.

use crate::forest::RandomForest;
use crate::importance::RankedFeature;
use crate::oob::OobScore;
use crate::tree::DecisionTree;

/// Shape of a fitted forest, reported next to the evaluation metrics.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ForestSummary {
    /// Number of trees fitted.
    pub n_trees: usize,
    /// Number of training samples.
    pub n_samples: usize,
    /// Features considered at each split after resolving `MaxFeatures`.
    pub max_features_resolved: usize,
    /// Bootstrap draws per tree.
    pub draw_count: usize,
    /// Mean depth over the trees.
    pub mean_depth: f64,
    /// Mean number of leaves over the trees.
    pub mean_leaves: f64,
}

impl ForestSummary {
    pub(crate) fn from_trees(
        trees: &[DecisionTree],
        n_samples: usize,
        max_features_resolved: usize,
        draw_count: usize,
    ) -> Self {
        let n = trees.len().max(1) as f64;
        Self {
            n_trees: trees.len(),
            n_samples,
            max_features_resolved,
            draw_count,
            mean_depth: trees.iter().map(|t| t.depth() as f64).sum::<f64>() / n,
            mean_leaves: trees.iter().map(|t| t.n_leaves() as f64).sum::<f64>() / n,
        }
    }
}

/// Result of Random Forest training.
#[derive(Debug)]
pub struct RandomForestResult {
    forest: RandomForest,
    importances: Vec<RankedFeature>,
    oob_score: Option<OobScore>,
    summary: ForestSummary,
}

impl RandomForestResult {
    pub(crate) fn new(
        forest: RandomForest,
        importances: Vec<RankedFeature>,
        oob_score: Option<OobScore>,
        summary: ForestSummary,
    ) -> Self {
        Self {
            forest,
            importances,
            oob_score,
            summary,
        }
    }

    /// Borrow the fitted forest.
    #[must_use]
    pub fn forest(&self) -> &RandomForest {
        &self.forest
    }

    /// Consume the result and return the fitted forest.
    #[must_use]
    pub fn into_forest(self) -> RandomForest {
        self.forest
    }

    /// Ranked feature importances.
    #[must_use]
    pub fn importances(&self) -> &[RankedFeature] {
        &self.importances
    }

    /// OOB score, if computed.
    #[must_use]
    pub fn oob_score(&self) -> Option<&OobScore> {
        self.oob_score.as_ref()
    }

    /// Shape of the fitted forest.
    #[must_use]
    pub fn summary(&self) -> &ForestSummary {
        &self.summary
    }
}
