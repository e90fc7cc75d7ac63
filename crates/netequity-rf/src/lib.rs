//! Random Forest regression: train, evaluate, predict, explain.
//!
//! Provides a hand-rolled Random Forest regressor with CART decision trees,
//! squared-error and Poisson split criteria, parallel training via rayon,
//! out-of-bag scoring, mean-decrease-in-impurity feature importance and
//! decision-path contributions for individual predictions.

mod config;
mod error;
mod forest;
mod importance;
mod metrics;
mod node;
mod oob;
mod predict;
mod result;
mod split;
mod tree;

pub use config::{MaxFeatures, OobMode, RandomForestConfig};
pub use error::RfError;
pub use forest::RandomForest;
pub use importance::RankedFeature;
pub use metrics::{mean_squared_error, r2_score};
pub use node::{FeatureIndex, Impurity, Node, NodeIndex};
pub use oob::OobScore;
pub use predict::Contributions;
pub use result::{ForestSummary, RandomForestResult};
pub use split::{SplitCriterion, SplitMethod};
pub use tree::{DecisionTree, DecisionTreeConfig};
