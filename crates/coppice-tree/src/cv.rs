//! k-fold cross-validation over a grid of tuning values.

use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{debug, info, instrument};

use crate::error::TreeError;
use crate::table::{Column, Table};

/// Cross-validation configuration.
///
/// Construct via [`CrossValidation::new`], then chain `with_seed` if desired.
#[derive(Debug, Clone)]
pub struct CrossValidation {
    folds: usize,
    seed: u64,
}

/// Cross-validated score of one tuning value.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TuningEstimate {
    /// The tuning value.
    pub parameter: f64,
    /// Mean validation score across folds.
    pub estimate: f64,
    /// Standard error of the mean across folds.
    pub error: f64,
}

impl CrossValidation {
    /// Create a cross-validation config with the given number of folds.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::InvalidFoldCount`] if `folds` < 2.
    pub fn new(folds: usize) -> Result<Self, TreeError> {
        if folds < 2 {
            return Err(TreeError::InvalidFoldCount { folds });
        }
        Ok(Self { folds, seed: 42 })
    }

    /// Set the random seed for fold assignment.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Return the number of folds.
    #[must_use]
    pub fn folds(&self) -> usize {
        self.folds
    }

    /// Return the fold-assignment seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Assign each row to a fold.
    ///
    /// Rows are shuffled and dealt round-robin; for a categorical response the
    /// rows of each class are dealt in turn, continuing where the previous
    /// class stopped, so every fold sees each class in proportion.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::TooFewRowsForFolds`] when `table` has fewer rows
    /// than folds.
    pub fn assign_folds(&self, table: &Table) -> Result<Vec<usize>, TreeError> {
        let n_rows = table.n_rows();
        if n_rows < self.folds {
            return Err(TreeError::TooFewRowsForFolds {
                n_rows,
                folds: self.folds,
            });
        }
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);

        let mut groups: Vec<Vec<usize>> = match table.response() {
            Column::Categorical { levels, codes, .. } => {
                let mut by_class = vec![Vec::new(); levels.len()];
                for (row, &code) in codes.iter().enumerate() {
                    by_class[code].push(row);
                }
                by_class
            }
            Column::Numeric { .. } => vec![(0..n_rows).collect()],
        };

        let mut assignment = vec![0usize; n_rows];
        let mut next = 0usize;
        for rows in &mut groups {
            rows.shuffle(&mut rng);
            for &row in rows.iter() {
                assignment[row] = next % self.folds;
                next += 1;
            }
        }
        Ok(assignment)
    }
}

/// Cross-validate a model family over `tuning` values.
///
/// For each fold, `train` fits a model on the remaining rows and `validate`
/// scores it on the held-out rows once per tuning value. Folds run in
/// parallel; the per-value mean and standard error are computed once all
/// folds have finished.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`TreeError::TooFewRowsForFolds`] | fewer rows than folds |
/// | any | propagated from `train` or `validate` |
#[instrument(skip_all, fields(folds = cv.folds, n_rows = table.n_rows(), n_tuning = tuning.len()))]
pub fn cross_validate<M, T, V>(
    table: &Table,
    train: T,
    validate: V,
    tuning: &[f64],
    cv: &CrossValidation,
) -> Result<Vec<TuningEstimate>, TreeError>
where
    M: Send,
    T: Fn(&Table) -> Result<M, TreeError> + Sync,
    V: Fn(f64, &M, &Table) -> Result<f64, TreeError> + Sync,
{
    let assignment = cv.assign_folds(table)?;

    let per_fold: Vec<Vec<f64>> = (0..cv.folds)
        .into_par_iter()
        .map(|fold| -> Result<Vec<f64>, TreeError> {
            let (held_out, kept): (Vec<usize>, Vec<usize>) =
                (0..table.n_rows()).partition(|&row| assignment[row] == fold);
            let model = train(&table.take_rows(&kept))?;
            let validation = table.take_rows(&held_out);
            let scores = tuning
                .iter()
                .map(|&value| validate(value, &model, &validation))
                .collect::<Result<Vec<f64>, TreeError>>()?;
            debug!(fold, n_train = kept.len(), n_validate = held_out.len(), "fold scored");
            Ok(scores)
        })
        .collect::<Result<_, TreeError>>()?;

    let k = per_fold.len() as f64;
    let estimates: Vec<TuningEstimate> = tuning
        .iter()
        .enumerate()
        .map(|(i, &parameter)| {
            let mean = per_fold.iter().map(|s| s[i]).sum::<f64>() / k;
            let variance = per_fold.iter().map(|s| (s[i] - mean).powi(2)).sum::<f64>() / (k - 1.0);
            TuningEstimate {
                parameter,
                estimate: mean,
                error: (variance / k).sqrt(),
            }
        })
        .collect();

    info!(folds = cv.folds, n_tuning = estimates.len(), "cross-validation complete");
    Ok(estimates)
}
