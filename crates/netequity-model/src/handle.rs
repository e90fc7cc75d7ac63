//! Shared, atomically replaceable reference to the current model.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::{info, instrument, warn};

use crate::error::ModelError;
use crate::record::FeatureDataset;
use crate::train::{TrainedModel, TrainingConfig, TrainingReport, train};

/// Lifecycle state reported by [`ModelHandle::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// No model has been installed yet.
    Untrained,
    /// A training run is in progress.
    Training,
    /// A model is installed and no training run is in progress.
    Trained,
}

/// Holds the current [`TrainedModel`] for concurrent readers.
///
/// Readers take an `Arc` snapshot and predict without holding any lock.
/// Retraining is serialized, runs outside the read/write lock and swaps
/// the reference only on success; a failed run leaves the previous model
/// installed.
#[derive(Debug, Default)]
pub struct ModelHandle {
    current: RwLock<Option<Arc<TrainedModel>>>,
    retrain: Mutex<()>,
    training: AtomicBool,
}

impl ModelHandle {
    /// An empty handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle already holding `model`.
    #[must_use]
    pub fn with_model(model: TrainedModel) -> Self {
        let handle = Self::new();
        handle.install(model);
        handle
    }

    /// Snapshot of the current model, if any.
    #[must_use]
    pub fn current(&self) -> Option<Arc<TrainedModel>> {
        self.current.read().clone()
    }

    /// Replace the current model and return the previous one.
    pub fn install(&self, model: TrainedModel) -> Option<Arc<TrainedModel>> {
        self.current.write().replace(Arc::new(model))
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        if self.training.load(Ordering::Acquire) {
            LifecycleState::Training
        } else if self.current.read().is_some() {
            LifecycleState::Trained
        } else {
            LifecycleState::Untrained
        }
    }

    /// Train a new model and swap it in on success.
    ///
    /// Concurrent calls run one at a time. Readers keep using the previous
    /// model until the swap.
    ///
    /// # Errors
    ///
    /// Returns the [`ModelError`] from [`train`]; the installed model is unchanged.
    #[instrument(skip_all, fields(n_records = dataset.len()))]
    pub fn retrain(
        &self,
        dataset: &FeatureDataset,
        config: &TrainingConfig,
    ) -> Result<TrainingReport, ModelError> {
        let _guard = self.retrain.lock();
        let flag = TrainingFlag::raise(&self.training);

        let outcome = train(dataset, config);
        if let Ok(report) = &outcome {
            let replaced = self.install(report.model().clone()).is_some();
            info!(replaced, r2 = report.evaluation().r2, "model swapped in");
        }
        // Lowered only after the swap so readers never see `Untrained` mid-retrain.
        drop(flag);

        if let Err(e) = &outcome {
            warn!(error = %e, "retraining failed; keeping previous model");
        }
        outcome
    }
}

/// Holds the training flag up for its lifetime, including during unwinding.
struct TrainingFlag<'a>(&'a AtomicBool);

impl<'a> TrainingFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for TrainingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    #[test]
    fn flag_is_lowered_when_training_panics() {
        let handle = ModelHandle::new();
        let mut during = None;
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let _flag = TrainingFlag::raise(&handle.training);
            during = Some(handle.state());
            panic!("training aborted");
        }));

        assert!(outcome.is_err());
        assert_eq!(during, Some(LifecycleState::Training));
        assert_eq!(handle.state(), LifecycleState::Untrained);
    }

    #[test]
    fn flag_follows_guard_scope() {
        let flag = AtomicBool::new(false);
        {
            let _raised = TrainingFlag::raise(&flag);
            assert!(flag.load(Ordering::Acquire));
        }
        assert!(!flag.load(Ordering::Acquire));
    }
}
