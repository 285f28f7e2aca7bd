//! Bagged random forests with parallel tree construction.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{debug, info, instrument};

use crate::config::ForestConfig;
use crate::error::TreeError;
use crate::grow::{GrowParams, grow_tree};
use crate::table::{ColumnKind, Table, TableSchema, Task};
use crate::tree::DecisionTree;

/// A fitted random forest: unpruned trees grown on bootstrap resamples.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Forest {
    pub(crate) trees: Vec<DecisionTree>,
    pub(crate) schema: TableSchema,
    pub(crate) max_covariates: usize,
}

/// Draw `n` row indices uniformly with replacement.
fn bootstrap_sample(n: usize, rng: &mut impl Rng) -> Vec<usize> {
    (0..n).map(|_| rng.gen_range(0..n)).collect()
}

/// Train a forest.
#[instrument(skip_all, fields(n_trees = config.n_trees, n_rows = table.n_rows()))]
pub(crate) fn train(config: &ForestConfig, table: &Table) -> Result<Forest, TreeError> {
    table.check_trainable()?;
    let risk = config.risk_config(table.task());
    risk.check_task(table.task())?;

    let n_rows = table.n_rows();
    let n_covariates = table.covariates().len();
    let max_covariates = config.max_covariates.resolve(n_covariates)?;

    info!(
        n_trees = config.n_trees,
        n_rows,
        n_covariates,
        max_covariates,
        task = %table.task(),
        "training random forest"
    );

    let params = GrowParams {
        min_split: config.min_split,
        min_bucket: config.min_bucket,
        max_depth: config.max_depth,
        max_covariates: Some(max_covariates),
        risk: &risk,
    };

    // Per-tree seeds from the master RNG.
    let mut master_rng = ChaCha8Rng::seed_from_u64(config.seed);
    let tree_seeds: Vec<u64> = (0..config.n_trees).map(|_| master_rng.r#gen()).collect();

    let trees = tree_seeds
        .into_par_iter()
        .map(|seed| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let rows = bootstrap_sample(n_rows, &mut rng);
            grow_tree(table, &rows, &params, &mut rng)
        })
        .collect::<Result<Vec<DecisionTree>, TreeError>>()?;

    debug!(n_trees_trained = trees.len(), "tree training complete");

    Ok(Forest {
        trees,
        schema: table.schema(),
        max_covariates,
    })
}

impl Forest {
    /// Return the trees.
    #[must_use]
    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    /// Return the number of trees in the ensemble.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Return the number of covariates searched per split.
    #[must_use]
    pub fn max_covariates(&self) -> usize {
        self.max_covariates
    }

    /// Return the schema of the training table.
    #[must_use]
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Return the learning task.
    #[must_use]
    pub fn task(&self) -> Task {
        self.schema.task()
    }

    /// Return the response levels for a classification forest.
    #[must_use]
    pub fn class_levels(&self) -> Option<&[String]> {
        match &self.schema.response().kind {
            ColumnKind::Categorical { levels } => Some(levels),
            ColumnKind::Numeric => None,
        }
    }

    /// Total node count across all trees.
    #[must_use]
    pub fn n_nodes(&self) -> usize {
        self.trees.iter().map(DecisionTree::n_nodes).sum()
    }

    /// Total leaf count across all trees.
    #[must_use]
    pub fn n_leaves(&self) -> usize {
        self.trees.iter().map(DecisionTree::n_leaves).sum()
    }

    /// Depth of the deepest tree.
    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.trees.iter().map(DecisionTree::depth).max().unwrap_or(0)
    }
}
