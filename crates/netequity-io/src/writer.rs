//! JSON and text report writer for training, comparison, prediction and simulation outputs.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use netequity_model::{
    ComparisonRow, Evaluation, Feature, FeatureImportance, ForestSummary, HeldOutPrediction,
    Prediction, Scenario, SimulationRow, TARGET_NAME, TrainingConfig, TrainingReport,
};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::IoError;
use crate::domain::ExperimentName;

/// Width in characters of the longest bar in the summary chart.
const BAR_WIDTH: usize = 40;

/// Writes experiment reports into one output directory.
///
/// Creates the output directory on construction if it does not exist.
/// Files are named `{experiment}_training.json`, `{experiment}_summary.txt`,
/// `{experiment}_predict.json`, `{experiment}_simulate.json` and
/// `{experiment}_compare.json`; the model artifact path is
/// `{experiment}_model.bin`.
pub struct ReportWriter {
    output_dir: PathBuf,
    experiment: ExperimentName,
}

/// A labelled scenario prediction for [`ReportWriter::write_predictions`].
#[derive(Debug, Clone)]
pub struct PredictionEntry {
    /// Preset name or a caller-chosen label.
    pub label: String,
    /// The scenario after missing-value resolution.
    pub inputs: Scenario,
    /// The prediction.
    pub prediction: Prediction,
}

impl ReportWriter {
    /// Create a new writer targeting the given directory and experiment name.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::OutputDirCreate`] if the directory cannot be created.
    #[instrument(skip_all, fields(dir = %output_dir.display(), experiment = %experiment))]
    pub fn new(output_dir: &Path, experiment: ExperimentName) -> Result<Self, IoError> {
        fs::create_dir_all(output_dir).map_err(|e| IoError::OutputDirCreate {
            path: output_dir.to_path_buf(),
            source: e,
        })?;
        debug!("output directory ready");
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            experiment,
        })
    }

    /// Path where the model artifact for this experiment lives.
    #[must_use]
    pub fn model_path(&self) -> PathBuf {
        self.file_path("model.bin")
    }

    /// Write metrics, configuration, forest shape, importances and held-out
    /// pairs to `{experiment}_training.json`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::Serialize`] or [`IoError::WriteFile`].
    #[instrument(skip_all)]
    pub fn write_training(&self, report: &TrainingReport) -> Result<PathBuf, IoError> {
        let evaluation = report.evaluation();
        let artifact = TrainingArtifact {
            experiment: self.experiment.as_str(),
            target: TARGET_NAME,
            config: report.model().config(),
            metrics: MetricsEntry::from(evaluation),
            forest: report.forest_summary(),
            importances: report.importances().iter().map(ImportanceEntry::from).collect(),
            held_out: &evaluation.held_out,
        };
        let path = self.write_json("training.json", &artifact)?;
        info!(path = %path.display(), "training report written");
        Ok(path)
    }

    /// Write a human-readable summary with a bar chart of importances to
    /// `{experiment}_summary.txt`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::WriteFile`] if the file cannot be written.
    #[instrument(skip_all)]
    pub fn write_summary(&self, report: &TrainingReport) -> Result<PathBuf, IoError> {
        let path = self.file_path("summary.txt");
        let text = render_summary(&self.experiment, report.evaluation(), report.importances());
        self.write_file(&path, &text)?;
        info!(path = %path.display(), "summary written");
        Ok(path)
    }

    /// Write scenario predictions to `{experiment}_predict.json`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::Serialize`] or [`IoError::WriteFile`].
    #[instrument(skip_all, fields(n = entries.len()))]
    pub fn write_predictions(&self, entries: &[PredictionEntry]) -> Result<PathBuf, IoError> {
        let artifact = PredictArtifact {
            experiment: self.experiment.as_str(),
            target: TARGET_NAME,
            predictions: entries
                .iter()
                .map(|e| PredictionRecord {
                    label: &e.label,
                    inputs: inputs_map(&e.inputs),
                    prediction: &e.prediction,
                })
                .collect(),
        };
        let path = self.write_json("predict.json", &artifact)?;
        info!(path = %path.display(), "predictions written");
        Ok(path)
    }

    /// Write a sensitivity ranking to `{experiment}_simulate.json`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::Serialize`] or [`IoError::WriteFile`].
    #[instrument(skip_all, fields(feature = %feature, pct_change))]
    pub fn write_simulation(
        &self,
        feature: Feature,
        pct_change: f64,
        rows: &[SimulationRow],
    ) -> Result<PathBuf, IoError> {
        let artifact = SimulateArtifact {
            experiment: self.experiment.as_str(),
            feature,
            pct_change,
            rows,
        };
        let path = self.write_json("simulate.json", &artifact)?;
        info!(path = %path.display(), n_rows = rows.len(), "simulation written");
        Ok(path)
    }

    /// Write a ranked model comparison to `{experiment}_compare.json`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::Serialize`] or [`IoError::WriteFile`].
    #[instrument(skip_all, fields(n = rows.len()))]
    pub fn write_comparison(&self, rows: &[ComparisonRow]) -> Result<PathBuf, IoError> {
        let artifact = CompareArtifact {
            experiment: self.experiment.as_str(),
            target: TARGET_NAME,
            models: rows,
        };
        let path = self.write_json("compare.json", &artifact)?;
        info!(path = %path.display(), "comparison written");
        Ok(path)
    }

    fn file_path(&self, suffix: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}_{suffix}", self.experiment.as_str()))
    }

    fn write_json<T: Serialize>(&self, suffix: &str, artifact: &T) -> Result<PathBuf, IoError> {
        let path = self.file_path(suffix);
        let json = serde_json::to_string_pretty(artifact).map_err(|e| IoError::Serialize {
            path: path.clone(),
            source: e,
        })?;
        self.write_file(&path, &json)?;
        Ok(path)
    }

    fn write_file(&self, path: &Path, contents: &str) -> Result<(), IoError> {
        fs::write(path, contents).map_err(|e| IoError::WriteFile {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Render the plain-text training summary.
fn render_summary(
    experiment: &ExperimentName,
    evaluation: &Evaluation,
    importances: &[FeatureImportance],
) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail.
    let _ = writeln!(out, "experiment: {experiment}");
    let _ = writeln!(
        out,
        "records:    {} train / {} held out",
        evaluation.n_train, evaluation.n_test
    );
    let _ = writeln!(out, "R²:         {:.4}", evaluation.r2);
    let _ = writeln!(out, "MSE:        {:.4}", evaluation.mse);
    if let Some(oob) = evaluation.oob_r2 {
        let _ = writeln!(out, "OOB R²:     {oob:.4}");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "feature importances");

    let max_score = importances.iter().map(|i| i.score).fold(0.0_f64, f64::max);
    let name_width = importances
        .iter()
        .map(|i| i.feature.name().len())
        .max()
        .unwrap_or(0);
    for imp in importances {
        let filled = if max_score > 0.0 {
            ((imp.score / max_score) * BAR_WIDTH as f64).round() as usize
        } else {
            0
        };
        let _ = writeln!(
            out,
            "{:>2}. {:<name_width$}  {:.4}  {}",
            imp.rank,
            imp.feature.name(),
            imp.score,
            "#".repeat(filled),
        );
    }
    out
}

fn inputs_map(scenario: &Scenario) -> BTreeMap<&'static str, Option<f64>> {
    Feature::ALL
        .iter()
        .map(|f| (f.name(), scenario.get(*f)))
        .collect()
}

#[derive(Serialize)]
struct TrainingArtifact<'a> {
    experiment: &'a str,
    target: &'static str,
    config: &'a TrainingConfig,
    metrics: MetricsEntry,
    forest: &'a ForestSummary,
    importances: Vec<ImportanceEntry>,
    held_out: &'a [HeldOutPrediction],
}

#[derive(Serialize)]
struct MetricsEntry {
    r2: f64,
    mse: f64,
    oob_r2: Option<f64>,
    n_train: usize,
    n_test: usize,
}

impl From<&Evaluation> for MetricsEntry {
    fn from(e: &Evaluation) -> Self {
        Self {
            r2: e.r2,
            mse: e.mse,
            oob_r2: e.oob_r2,
            n_train: e.n_train,
            n_test: e.n_test,
        }
    }
}

#[derive(Serialize)]
struct ImportanceEntry {
    rank: usize,
    feature: &'static str,
    score: f64,
}

impl From<&FeatureImportance> for ImportanceEntry {
    fn from(i: &FeatureImportance) -> Self {
        Self {
            rank: i.rank,
            feature: i.feature.name(),
            score: i.score,
        }
    }
}

#[derive(Serialize)]
struct PredictArtifact<'a> {
    experiment: &'a str,
    target: &'static str,
    predictions: Vec<PredictionRecord<'a>>,
}

#[derive(Serialize)]
struct PredictionRecord<'a> {
    label: &'a str,
    inputs: BTreeMap<&'static str, Option<f64>>,
    prediction: &'a Prediction,
}

#[derive(Serialize)]
struct SimulateArtifact<'a> {
    experiment: &'a str,
    feature: Feature,
    pct_change: f64,
    rows: &'a [SimulationRow],
}

#[derive(Serialize)]
struct CompareArtifact<'a> {
    experiment: &'a str,
    target: &'static str,
    models: &'a [ComparisonRow],
}

#[cfg(test)]
mod tests {
    use super::*;
    use netequity_model::{Breakdown, Candidate, FeatureContribution};
    use tempfile::TempDir;

    fn evaluation() -> Evaluation {
        Evaluation {
            r2: 0.8123,
            mse: 1520.25,
            n_train: 16,
            n_test: 4,
            oob_r2: None,
            held_out: Vec::new(),
        }
    }

    fn importances() -> Vec<FeatureImportance> {
        vec![
            FeatureImportance {
                feature: Feature::InternetPenetration,
                score: 0.6,
                rank: 1,
            },
            FeatureImportance {
                feature: Feature::GdpPerCapita,
                score: 0.3,
                rank: 2,
            },
            FeatureImportance {
                feature: Feature::AgeMedian,
                score: 0.1,
                rank: 3,
            },
        ]
    }

    #[test]
    fn summary_contains_metrics_and_bars() {
        let name = ExperimentName::new("demo").unwrap();
        let text = render_summary(&name, &evaluation(), &importances());
        assert!(text.contains("experiment: demo"));
        assert!(text.contains("0.8123"));
        assert!(text.contains("1520.2500"));
        assert!(!text.contains("OOB"));

        let lines: Vec<&str> = text.lines().filter(|l| l.contains('#')).collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("internet_penetration"));
        assert!(lines[0].ends_with(&"#".repeat(BAR_WIDTH)));
        assert_eq!(lines[1].matches('#').count(), 20);
        assert_eq!(lines[2].matches('#').count(), 7);
    }

    #[test]
    fn summary_handles_all_zero_scores() {
        let name = ExperimentName::new("zero").unwrap();
        let mut imps = importances();
        for i in &mut imps {
            i.score = 0.0;
        }
        let text = render_summary(&name, &evaluation(), &imps);
        assert!(!text.contains('#'));
    }

    #[test]
    fn new_creates_directory_and_model_path() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("out").join("run");
        let writer = ReportWriter::new(&nested, ExperimentName::new("exp").unwrap()).unwrap();
        assert!(nested.is_dir());
        assert_eq!(writer.model_path(), nested.join("exp_model.bin"));
    }

    #[test]
    fn predictions_written_with_inputs_by_name() {
        let dir = TempDir::new().unwrap();
        let writer = ReportWriter::new(dir.path(), ExperimentName::new("p").unwrap()).unwrap();
        let entry = PredictionEntry {
            label: "developed".to_string(),
            inputs: Scenario::new().with_value(Feature::UrbanPct, 80.0),
            prediction: Prediction {
                value: 120.0,
                breakdown: Some(Breakdown {
                    bias: 100.0,
                    contributions: vec![FeatureContribution {
                        feature: Feature::UrbanPct,
                        contribution: 20.0,
                    }],
                }),
            },
        };
        let path = writer.write_predictions(&[entry]).unwrap();
        assert_eq!(path, dir.path().join("p_predict.json"));

        let content: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let first = &content["predictions"][0];
        assert_eq!(first["label"], "developed");
        assert_eq!(first["inputs"]["urban_pct"], 80.0);
        assert!(first["inputs"]["gdp_per_capita"].is_null());
        assert_eq!(first["prediction"]["value"], 120.0);
        assert_eq!(
            first["prediction"]["breakdown"]["contributions"][0]["feature"],
            "urban_pct"
        );
    }

    #[test]
    fn comparison_written_in_rank_order() {
        let dir = TempDir::new().unwrap();
        let writer = ReportWriter::new(dir.path(), ExperimentName::new("cmp").unwrap()).unwrap();
        let rows = [
            ComparisonRow {
                rank: 1,
                candidate: Candidate::ExtraTrees,
                r2: 0.91,
                mse: 12.5,
            },
            ComparisonRow {
                rank: 2,
                candidate: Candidate::SingleTree,
                r2: 0.62,
                mse: 40.0,
            },
        ];
        let path = writer.write_comparison(&rows).unwrap();
        assert_eq!(path, dir.path().join("cmp_compare.json"));

        let content: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(content["target"], TARGET_NAME);
        let models = content["models"].as_array().unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0]["candidate"], "extra_trees");
        assert_eq!(models[0]["rank"], 1);
        assert_eq!(models[1]["candidate"], "single_tree");
        assert_eq!(models[1]["r2"], 0.62);
    }

    #[test]
    fn write_into_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let writer = ReportWriter::new(dir.path(), ExperimentName::new("gone").unwrap()).unwrap();
        drop(dir);
        let err = writer
            .write_simulation(Feature::GdpPerCapita, 10.0, &[])
            .unwrap_err();
        assert!(matches!(err, IoError::WriteFile { .. }));
    }
}
