//! JSON artifact writer for tuning tables, predictions and summaries.

use std::fs;
use std::path::{Path, PathBuf};

use coppice_tree::{ColumnKind, Decision, Model, TreeFit, TuningEstimate};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::IoError;
use crate::domain::RunName;
use crate::summary::{Evaluation, TrainingSummary};

/// Writes run artifacts to JSON files.
///
/// Creates the output directory on construction if it does not exist.
/// Output files are named `{run}_tuning.json`, `{run}_predict.json` and
/// `{run}_summary.json`; the model binary goes to `{run}_model.bin`.
pub struct ArtifactWriter {
    output_dir: PathBuf,
    run: RunName,
}

impl ArtifactWriter {
    /// Create a new writer targeting the given directory and run name.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::OutputDirCreate`] if the directory cannot be created.
    #[instrument(skip_all, fields(dir = %output_dir.display(), run = %run))]
    pub fn new(output_dir: &Path, run: RunName) -> Result<Self, IoError> {
        fs::create_dir_all(output_dir).map_err(|e| IoError::OutputDirCreate {
            path: output_dir.to_path_buf(),
            source: e,
        })?;
        debug!("output directory ready");
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            run,
        })
    }

    /// Return the run name.
    #[must_use]
    pub fn run(&self) -> &RunName {
        &self.run
    }

    /// Write the cross-validation table of a single-tree fit to
    /// `{run}_tuning.json`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::WriteFile`] if the file cannot be written.
    #[instrument(skip_all)]
    pub fn write_tuning(&self, fit: &TreeFit) -> Result<PathBuf, IoError> {
        let artifact = TuningArtifact {
            run: self.run.as_str(),
            candidates: fit.candidates(),
            selected_cutoff: fit.cutoff(),
            tuning: fit.tuning(),
        };
        let path = self.write_json("tuning", &artifact)?;
        info!(path = %path.display(), n_candidates = fit.candidates().len(), "tuning table written");
        Ok(path)
    }

    /// Write predictions to `{run}_predict.json`.
    ///
    /// Class predictions are written as level names of the model's response.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::WriteFile`] if the file cannot be written.
    #[instrument(skip_all, fields(n_rows = predictions.len()))]
    pub fn write_predictions(
        &self,
        model: &Model,
        predictions: &[Decision],
        evaluation: Option<&Evaluation>,
    ) -> Result<PathBuf, IoError> {
        let levels: &[String] = match &model.schema().response().kind {
            ColumnKind::Categorical { levels } => levels.as_slice(),
            ColumnKind::Numeric => &[],
        };
        let entries: Vec<PredictionEntry> = predictions
            .iter()
            .enumerate()
            .map(|(row, decision)| PredictionEntry {
                row,
                prediction: match *decision {
                    Decision::Class(c) => levels
                        .get(c)
                        .map_or(PredictedValue::Code(c), |l| PredictedValue::Level(l)),
                    Decision::Value(v) => PredictedValue::Value(v),
                },
            })
            .collect();

        let artifact = PredictArtifact {
            run: self.run.as_str(),
            model: model.kind(),
            n_rows: predictions.len(),
            evaluation,
            predictions: entries,
        };
        let path = self.write_json("predict", &artifact)?;
        info!(path = %path.display(), "predictions written");
        Ok(path)
    }

    /// Write a training summary to `{run}_summary.json`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::WriteFile`] if the file cannot be written.
    #[instrument(skip_all)]
    pub fn write_summary(&self, summary: &TrainingSummary) -> Result<PathBuf, IoError> {
        let path = self.write_json("summary", summary)?;
        info!(path = %path.display(), "summary written");
        Ok(path)
    }

    /// Return the path where the model binary should be saved.
    ///
    /// Does not write anything, just computes `{output_dir}/{run}_model.bin`.
    #[must_use]
    pub fn model_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}_model.bin", self.run.as_str()))
    }

    fn write_json(&self, suffix: &str, artifact: &impl Serialize) -> Result<PathBuf, IoError> {
        let path = self
            .output_dir
            .join(format!("{}_{suffix}.json", self.run.as_str()));
        let json = serde_json::to_string_pretty(artifact).map_err(|e| IoError::SerializeArtifact {
            path: path.clone(),
            source: e,
        })?;
        fs::write(&path, &json).map_err(|e| IoError::WriteFile {
            path: path.clone(),
            source: e,
        })?;
        Ok(path)
    }
}

// --- Shadow structs for JSON serialization ---

#[derive(Serialize)]
struct TuningArtifact<'a> {
    run: &'a str,
    candidates: &'a [f64],
    selected_cutoff: Option<f64>,
    tuning: &'a [TuningEstimate],
}

#[derive(Serialize)]
struct PredictArtifact<'a> {
    run: &'a str,
    model: &'static str,
    n_rows: usize,
    evaluation: Option<&'a Evaluation>,
    predictions: Vec<PredictionEntry<'a>>,
}

#[derive(Serialize)]
struct PredictionEntry<'a> {
    row: usize,
    prediction: PredictedValue<'a>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum PredictedValue<'a> {
    Level(&'a str),
    Code(usize),
    Value(f64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use coppice_tree::{Column, Table, TreeConfig};
    use tempfile::TempDir;

    fn table() -> Table {
        Table::new(vec![
            Column::categorical_from_strs("y", &["lo", "lo", "lo", "hi", "hi", "hi"]),
            Column::numeric("x", vec![1.0, 2.0, 3.0, 7.0, 8.0, 9.0]),
        ])
        .unwrap()
    }

    fn writer(dir: &TempDir) -> ArtifactWriter {
        ArtifactWriter::new(dir.path(), RunName::new("unit".into()).unwrap()).unwrap()
    }

    fn read_json(path: &Path) -> serde_json::Value {
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn creates_nested_output_dir() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        let writer = ArtifactWriter::new(&nested, RunName::new("n".into()).unwrap()).unwrap();
        assert!(nested.is_dir());
        assert_eq!(writer.model_path(), nested.join("n_model.bin"));
    }

    #[test]
    fn tuning_artifact_lists_every_candidate() {
        let dir = TempDir::new().unwrap();
        let fit = TreeConfig::new()
            .with_min_split(2)
            .with_min_bucket(1)
            .with_folds(2)
            .fit(&table())
            .unwrap();
        let path = writer(&dir).write_tuning(&fit).unwrap();
        assert_eq!(path, dir.path().join("unit_tuning.json"));

        let content = read_json(&path);
        assert_eq!(content["run"], "unit");
        let tuning = content["tuning"].as_array().unwrap();
        assert_eq!(tuning.len(), fit.candidates().len());
        assert!(tuning[0]["parameter"].is_f64());
        assert!(content["selected_cutoff"].is_f64());
    }

    #[test]
    fn predictions_use_level_names() {
        let dir = TempDir::new().unwrap();
        let table = table();
        let model = Model::from(
            TreeConfig::new()
                .with_min_split(2)
                .with_min_bucket(1)
                .grow(&table)
                .unwrap(),
        );
        let predictions = model.predict(&table).unwrap();
        let evaluation = Evaluation::score(&table, &predictions).unwrap();
        let path = writer(&dir)
            .write_predictions(&model, &predictions, Some(&evaluation))
            .unwrap();

        let content = read_json(&path);
        assert_eq!(content["model"], "tree");
        assert_eq!(content["n_rows"], 6);
        assert_eq!(content["predictions"][0]["prediction"], "lo");
        assert_eq!(content["predictions"][5]["prediction"], "hi");
        assert_eq!(content["evaluation"]["task"], "classification");
        assert_eq!(content["evaluation"]["accuracy"], 1.0);
    }

    #[test]
    fn summary_written() {
        let dir = TempDir::new().unwrap();
        let table = table();
        let model = Model::from(TreeConfig::new().with_min_split(2).with_min_bucket(1).grow(&table).unwrap());
        let w = writer(&dir);
        let summary = TrainingSummary::describe(w.run(), &model, table.n_rows());
        let content = read_json(&w.write_summary(&summary).unwrap());
        assert_eq!(content["kind"], "tree");
        assert_eq!(content["task"], "classification");
        assert_eq!(content["n_leaves"], 2);
        assert!(content["training"].is_null());
    }
}
