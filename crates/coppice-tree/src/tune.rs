//! Single-tree training: grow, cross-validate the pruning cutoff, commit it.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{info, instrument};

use crate::config::TreeConfig;
use crate::cv::{CrossValidation, TuningEstimate, cross_validate};
use crate::error::TreeError;
use crate::grow::{GrowParams, grow_tree};
use crate::node::Decision;
use crate::table::{Column, Table};
use crate::tree::DecisionTree;

/// Result of [`TreeConfig::fit`].
#[derive(Debug, Clone)]
pub struct TreeFit {
    tree: DecisionTree,
    candidates: Vec<f64>,
    tuning: Vec<TuningEstimate>,
    cutoff: Option<f64>,
}

impl TreeFit {
    /// Borrow the committed tree.
    #[must_use]
    pub fn tree(&self) -> &DecisionTree {
        &self.tree
    }

    /// Consume the result and return the committed tree.
    #[must_use]
    pub fn into_tree(self) -> DecisionTree {
        self.tree
    }

    /// Candidate cutoffs of the full tree: 0 plus every finite collapse value.
    #[must_use]
    pub fn candidates(&self) -> &[f64] {
        &self.candidates
    }

    /// Cross-validated error per candidate (empty when folds = 0).
    #[must_use]
    pub fn tuning(&self) -> &[TuningEstimate] {
        &self.tuning
    }

    /// The cutoff committed by the one-standard-error rule, if cross-validated.
    #[must_use]
    pub fn cutoff(&self) -> Option<f64> {
        self.cutoff
    }
}

/// Pick a cutoff by the one-standard-error rule.
///
/// Finds the estimate with the smallest mean error (first one on ties), then
/// returns the largest parameter whose mean error is within that estimate's
/// standard error of it. `None` for an empty slice.
#[must_use]
pub fn select_cutoff(estimates: &[TuningEstimate]) -> Option<f64> {
    let best = estimates
        .iter()
        .reduce(|best, e| if e.estimate < best.estimate { e } else { best })?;
    let threshold = best.estimate + best.error;
    estimates
        .iter()
        .filter(|e| e.estimate <= threshold)
        .map(|e| e.parameter)
        .reduce(f64::max)
}

/// Mean validation error of `tree` on `table` at `cutoff`.
///
/// Misclassification proportion for classification, mean squared error for
/// regression.
///
/// # Errors
///
/// Returns [`TreeError::SchemaMismatch`] when `table` does not match the tree.
pub fn validation_error(tree: &DecisionTree, table: &Table, cutoff: f64) -> Result<f64, TreeError> {
    let predictions = tree.predict(table, cutoff)?;
    let n = predictions.len().max(1) as f64;
    let loss: f64 = match table.response() {
        Column::Categorical { codes, .. } => predictions
            .iter()
            .zip(codes)
            .filter(|&(p, &c)| *p != Decision::Class(c))
            .count() as f64,
        Column::Numeric { values, .. } => predictions
            .iter()
            .zip(values)
            .map(|(p, &y)| p.value().map_or(0.0, |v| (v - y).powi(2)))
            .sum(),
    };
    Ok(loss / n)
}

/// Grow a full tree over every row of `table`.
pub(crate) fn grow_full(config: &TreeConfig, table: &Table) -> Result<DecisionTree, TreeError> {
    let risk = config.risk_config(table.task());
    let params = GrowParams {
        min_split: config.min_split,
        min_bucket: config.min_bucket,
        max_depth: config.max_depth,
        max_covariates: config.max_covariates,
        risk: &risk,
    };
    let rows: Vec<usize> = (0..table.n_rows()).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    grow_tree(table, &rows, &params, &mut rng)
}

#[instrument(skip_all, fields(n_rows = table.n_rows(), folds = config.folds))]
pub(crate) fn fit(config: &TreeConfig, table: &Table) -> Result<TreeFit, TreeError> {
    let mut tree = grow_full(config, table)?;
    tree.finalize_collapse();

    let mut candidates = tree.get_tuning();
    candidates.push(0.0);
    candidates.sort_by(f64::total_cmp);
    candidates.dedup();

    info!(
        n_nodes = tree.n_nodes(),
        n_leaves = tree.n_leaves(),
        n_candidates = candidates.len(),
        "full tree grown"
    );

    if config.folds == 0 {
        return Ok(TreeFit {
            tree,
            candidates,
            tuning: Vec::new(),
            cutoff: None,
        });
    }

    let cv = CrossValidation::new(config.folds)?.with_seed(config.seed);
    let tuning = cross_validate(
        table,
        |train: &Table| -> Result<DecisionTree, TreeError> {
            let mut fold_tree = grow_full(config, train)?;
            fold_tree.finalize_collapse();
            Ok(fold_tree)
        },
        |cutoff, fold_tree: &DecisionTree, held_out: &Table| validation_error(fold_tree, held_out, cutoff),
        &candidates,
        &cv,
    )?;

    let cutoff = select_cutoff(&tuning);
    if let Some(cutoff) = cutoff {
        tree.prune(cutoff);
    }

    info!(
        cutoff,
        n_nodes = tree.n_nodes(),
        n_leaves = tree.n_leaves(),
        "tree pruned by cross-validation"
    );

    Ok(TreeFit {
        tree,
        candidates,
        tuning,
        cutoff,
    })
}
