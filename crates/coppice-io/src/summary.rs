//! Model summaries and scoring of predictions against a known response.

use coppice_tree::{ClassMetrics, Column, ConfusionMatrix, Decision, Model, Table, TreeError};
use serde::Serialize;

use crate::IoError;
use crate::domain::RunName;

/// Scores of predictions against the table's response.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum Evaluation {
    /// Categorical response.
    Classification {
        /// Proportion of rows predicted correctly.
        accuracy: f64,
        /// Counts of true vs predicted levels.
        confusion: ConfusionMatrix,
        /// Per-level precision, recall, and F1.
        class_metrics: Vec<ClassMetrics>,
    },
    /// Numeric response.
    Regression {
        /// Mean squared error.
        mse: f64,
        /// Mean absolute error.
        mae: f64,
    },
}

impl Evaluation {
    /// Score `predictions` against the response column of `table`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::Evaluate`] when the prediction count differs from
    /// the row count or the predictions are of the wrong task.
    pub fn score(table: &Table, predictions: &[Decision]) -> Result<Self, IoError> {
        match table.response() {
            Column::Categorical { levels, codes, .. } => {
                let predicted = predictions
                    .iter()
                    .map(|d| d.class())
                    .collect::<Option<Vec<usize>>>()
                    .ok_or_else(|| wrong_task("class"))?;
                let confusion = ConfusionMatrix::from_labels(codes, &predicted, levels.len())
                    .map_err(|e| IoError::Evaluate { source: e })?
                    .with_levels(levels);
                Ok(Evaluation::Classification {
                    accuracy: confusion.accuracy(),
                    class_metrics: confusion.class_metrics(),
                    confusion,
                })
            }
            Column::Numeric { values, .. } => {
                let predicted = predictions
                    .iter()
                    .map(|d| d.value())
                    .collect::<Option<Vec<f64>>>()
                    .ok_or_else(|| wrong_task("numeric"))?;
                if predicted.len() != values.len() || values.is_empty() {
                    return Err(IoError::Evaluate {
                        source: TreeError::LabelCountMismatch {
                            truth: values.len(),
                            predicted: predicted.len(),
                        },
                    });
                }
                let n = values.len() as f64;
                let (sq, abs) = values
                    .iter()
                    .zip(&predicted)
                    .fold((0.0, 0.0), |(sq, abs), (y, p)| (sq + (y - p) * (y - p), abs + (y - p).abs()));
                Ok(Evaluation::Regression {
                    mse: sq / n,
                    mae: abs / n,
                })
            }
        }
    }
}

fn wrong_task(expected: &str) -> IoError {
    IoError::Evaluate {
        source: TreeError::SchemaMismatch {
            reason: format!("expected {expected} predictions for this response"),
        },
    }
}

/// Shape of a fitted model and, optionally, its scores on the training table.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingSummary {
    /// Run name.
    pub run: String,
    /// `"tree"` or `"forest"`.
    pub kind: &'static str,
    /// Learning task.
    pub task: String,
    /// Response column name.
    pub response: String,
    /// Covariate names in schema order.
    pub covariates: Vec<String>,
    /// Rows in the training table.
    pub n_rows: usize,
    /// 1 for a single tree.
    pub n_trees: usize,
    /// Total node count.
    pub n_nodes: usize,
    /// Total leaf count.
    pub n_leaves: usize,
    /// Depth of the deepest tree.
    pub depth: usize,
    /// Committed cost-complexity cutoff of a single tree.
    pub cutoff: Option<f64>,
    /// Resubstitution scores.
    pub training: Option<Evaluation>,
}

impl TrainingSummary {
    /// Describe `model`, trained on `n_rows` rows.
    #[must_use]
    pub fn describe(run: &RunName, model: &Model, n_rows: usize) -> Self {
        let schema = model.schema();
        let (n_trees, n_nodes, n_leaves, depth, cutoff) = match model {
            Model::Tree(tree) => (1, tree.n_nodes(), tree.n_leaves(), tree.depth(), tree.committed_cutoff()),
            Model::Forest(forest) => (
                forest.n_trees(),
                forest.n_nodes(),
                forest.n_leaves(),
                forest.max_depth(),
                None,
            ),
        };
        Self {
            run: run.as_str().to_string(),
            kind: model.kind(),
            task: schema.task().to_string(),
            response: schema.response().name.clone(),
            covariates: schema.covariates().iter().map(|c| c.name.clone()).collect(),
            n_rows,
            n_trees,
            n_nodes,
            n_leaves,
            depth,
            cutoff,
            training: None,
        }
    }

    /// Attach resubstitution scores.
    #[must_use]
    pub fn with_training(mut self, evaluation: Evaluation) -> Self {
        self.training = Some(evaluation);
        self
    }
}
