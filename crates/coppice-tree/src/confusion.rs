//! Cross-tabulation of observed against predicted classes.

use std::fmt;

use crate::error::TreeError;

/// Counts of observed class (rows) against predicted class (columns).
#[derive(Debug, Clone, serde::Serialize)]
pub struct ConfusionMatrix {
    matrix: Vec<Vec<usize>>,
    levels: Vec<String>,
}

/// Agreement statistics for one class.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ClassMetrics {
    /// Level name.
    pub level: String,
    /// Share of rows predicted as this class that truly belong to it.
    pub precision: f64,
    /// Share of rows of this class that were predicted as it.
    pub recall: f64,
    /// Harmonic mean of precision and recall.
    pub f1: f64,
    /// Observed rows of this class.
    pub support: usize,
}

/// `num / den`, or zero for an empty denominator.
fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 { num / den } else { 0.0 }
}

impl ConfusionMatrix {
    /// Tabulate observed class codes against predicted ones.
    ///
    /// Levels default to the class codes; see [`with_levels`](Self::with_levels).
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`TreeError::EmptyTable`] | no rows |
    /// | [`TreeError::LabelCountMismatch`] | `truth` and `predicted` differ in length |
    /// | [`TreeError::ClassOutOfRange`] | a code is `>= n_classes` |
    pub fn from_labels(truth: &[usize], predicted: &[usize], n_classes: usize) -> Result<Self, TreeError> {
        if truth.is_empty() {
            return Err(TreeError::EmptyTable);
        }
        if truth.len() != predicted.len() {
            return Err(TreeError::LabelCountMismatch {
                truth: truth.len(),
                predicted: predicted.len(),
            });
        }

        let mut matrix = vec![vec![0; n_classes]; n_classes];
        for (&observed, &guessed) in truth.iter().zip(predicted) {
            let class = observed.max(guessed);
            if class >= n_classes {
                return Err(TreeError::ClassOutOfRange { class, n_classes });
            }
            matrix[observed][guessed] += 1;
        }
        let levels = (0..n_classes).map(|code| code.to_string()).collect();
        Ok(Self { matrix, levels })
    }

    /// Label classes by name. A list of the wrong length is ignored.
    #[must_use]
    pub fn with_levels(mut self, levels: &[String]) -> Self {
        if levels.len() == self.n_classes() {
            self.levels = levels.to_vec();
        }
        self
    }

    /// Fraction of rows on the diagonal.
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        let diagonal = self.matrix.iter().enumerate().map(|(c, row)| row[c]).sum::<usize>();
        ratio(diagonal as f64, self.total() as f64)
    }

    /// Misclassified fraction, `1 - accuracy`.
    #[must_use]
    pub fn error_rate(&self) -> f64 {
        1.0 - self.accuracy()
    }

    /// Precision, recall and F1 for every class, in code order.
    #[must_use]
    pub fn class_metrics(&self) -> Vec<ClassMetrics> {
        let predicted_totals: Vec<usize> = (0..self.n_classes())
            .map(|c| self.matrix.iter().map(|row| row[c]).sum())
            .collect();

        self.matrix
            .iter()
            .zip(&self.levels)
            .zip(predicted_totals)
            .enumerate()
            .map(|(c, ((row, level), n_predicted))| {
                let hits = row[c] as f64;
                let support: usize = row.iter().sum();
                let precision = ratio(hits, n_predicted as f64);
                let recall = ratio(hits, support as f64);
                ClassMetrics {
                    level: level.clone(),
                    precision,
                    recall,
                    f1: ratio(2.0 * precision * recall, precision + recall),
                    support,
                }
            })
            .collect()
    }

    /// Rows of the table, indexed `[observed][predicted]`.
    #[must_use]
    pub fn as_rows(&self) -> &[Vec<usize>] {
        &self.matrix
    }

    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.matrix.len()
    }

    fn total(&self) -> usize {
        self.matrix.iter().flatten().sum()
    }
}

/// Right-aligned table with observed classes down the side.
impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .matrix
            .iter()
            .flatten()
            .map(|count| count.to_string().len())
            .chain(self.levels.iter().map(String::len))
            .fold("observed".len(), usize::max);

        write!(f, "{:>width$}", "observed")?;
        for level in &self.levels {
            write!(f, " {level:>width$}")?;
        }
        writeln!(f)?;
        for (level, row) in self.levels.iter().zip(&self.matrix) {
            write!(f, "{level:>width$}")?;
            for count in row {
                write!(f, " {count:>width$}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
