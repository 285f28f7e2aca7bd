//! Configuration builders for single-tree and forest training.

use std::sync::Arc;

use crate::error::TreeError;
use crate::forest::Forest;
use crate::risk::{Criterion, RiskConfig, RiskFunction};
use crate::table::{Table, Task};
use crate::tree::DecisionTree;
use crate::tune::TreeFit;

/// Strategy for the number of covariates searched at each split.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum MaxCovariates {
    /// Square root of the covariate count, rounded up.
    Sqrt,
    /// Log base 2 of the covariate count, rounded up (at least 1).
    Log2,
    /// A fraction of the covariate count, rounded up.
    Fraction(f64),
    /// A fixed count.
    Fixed(usize),
    /// All covariates (no subsampling).
    All,
}

impl MaxCovariates {
    /// Resolve to a concrete count for `n_covariates` covariates.
    ///
    /// Counts above `n_covariates` are capped.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::InvalidMaxCovariates`] if the count resolves to zero.
    pub fn resolve(self, n_covariates: usize) -> Result<usize, TreeError> {
        let n = n_covariates as f64;
        let resolved = match self {
            MaxCovariates::Sqrt => n.sqrt().ceil() as usize,
            MaxCovariates::Log2 => n.log2().ceil().max(1.0) as usize,
            MaxCovariates::Fraction(f) => (n * f).ceil() as usize,
            MaxCovariates::Fixed(k) => k,
            MaxCovariates::All => n_covariates,
        };
        if resolved == 0 {
            return Err(TreeError::InvalidMaxCovariates { n_covariates });
        }
        Ok(resolved.min(n_covariates))
    }
}

/// Check the stopping rules shared by trees and forests.
fn validate_stopping(min_split: usize, min_bucket: usize, max_depth: Option<usize>) -> Result<(), TreeError> {
    if min_split == 0 {
        return Err(TreeError::InvalidMinSplit { min_split });
    }
    if min_bucket == 0 || min_bucket >= min_split {
        return Err(TreeError::InvalidMinBucket { min_bucket, min_split });
    }
    if max_depth == Some(0) {
        return Err(TreeError::InvalidMaxDepth { max_depth: 0 });
    }
    Ok(())
}

/// Configuration for growing, cross-validating and pruning a single tree.
///
/// Construct via [`TreeConfig::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter        | Default                                  |
/// |------------------|------------------------------------------|
/// | `min_split`      | 20                                       |
/// | `min_bucket`     | 7                                        |
/// | `max_depth`      | `None`                                   |
/// | `folds`          | 10 (0 skips cross-validation)            |
/// | `seed`           | 42                                       |
/// | `build_risk`     | `Gini` / `Sse` by task                   |
/// | `prune_risk`     | `Error` / `Sse` by task                  |
/// | `prior`          | empirical class frequencies              |
/// | `max_covariates` | `None` (all covariates)                  |
#[derive(Debug, Clone)]
pub struct TreeConfig {
    pub(crate) min_split: usize,
    pub(crate) min_bucket: usize,
    pub(crate) max_depth: Option<usize>,
    pub(crate) folds: usize,
    pub(crate) seed: u64,
    pub(crate) build_risk: Option<Arc<dyn RiskFunction>>,
    pub(crate) prune_risk: Option<Arc<dyn RiskFunction>>,
    pub(crate) prior: Option<Vec<f64>>,
    pub(crate) max_covariates: Option<usize>,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeConfig {
    /// Create a config with default parameters.
    #[must_use]
    pub fn new() -> Self {
        Self {
            min_split: 20,
            min_bucket: 7,
            max_depth: None,
            folds: 10,
            seed: 42,
            build_risk: None,
            prune_risk: None,
            prior: None,
            max_covariates: None,
        }
    }

    // --- Setters ---

    /// Set the minimum row count a node needs to be split.
    #[must_use]
    pub fn with_min_split(mut self, min_split: usize) -> Self {
        self.min_split = min_split;
        self
    }

    /// Set the minimum row count of each child of a split.
    #[must_use]
    pub fn with_min_bucket(mut self, min_bucket: usize) -> Self {
        self.min_bucket = min_bucket;
        self
    }

    /// Set the maximum tree depth. `None` means unlimited.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the number of cross-validation folds; 0 skips cross-validation.
    #[must_use]
    pub fn with_folds(mut self, folds: usize) -> Self {
        self.folds = folds;
        self
    }

    /// Set the random seed for covariate sampling and fold assignment.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the risk function used by split search.
    #[must_use]
    pub fn with_build_risk(mut self, risk: impl RiskFunction + 'static) -> Self {
        self.build_risk = Some(Arc::new(risk));
        self
    }

    /// Set the risk function used for node risks and pruning.
    #[must_use]
    pub fn with_prune_risk(mut self, risk: impl RiskFunction + 'static) -> Self {
        self.prune_risk = Some(Arc::new(risk));
        self
    }

    /// Set explicit class prior probabilities. `None` uses class frequencies.
    #[must_use]
    pub fn with_prior(mut self, prior: Option<Vec<f64>>) -> Self {
        self.prior = prior;
        self
    }

    /// Set the number of covariates searched per split. `None` searches all.
    #[must_use]
    pub fn with_max_covariates(mut self, max_covariates: Option<usize>) -> Self {
        self.max_covariates = max_covariates;
        self
    }

    // --- Getters ---

    /// Return the minimum row count a node needs to be split.
    #[must_use]
    pub fn min_split(&self) -> usize {
        self.min_split
    }

    /// Return the minimum row count of each child.
    #[must_use]
    pub fn min_bucket(&self) -> usize {
        self.min_bucket
    }

    /// Return the maximum depth limit, if any.
    #[must_use]
    pub fn max_depth(&self) -> Option<usize> {
        self.max_depth
    }

    /// Return the number of cross-validation folds.
    #[must_use]
    pub fn folds(&self) -> usize {
        self.folds
    }

    /// Return the random seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Return the explicit class prior, if any.
    #[must_use]
    pub fn prior(&self) -> Option<&[f64]> {
        self.prior.as_deref()
    }

    /// Return the per-split covariate sample size, if any.
    #[must_use]
    pub fn max_covariates(&self) -> Option<usize> {
        self.max_covariates
    }

    /// Resolve the risk functions for a task, falling back to the task defaults.
    #[must_use]
    pub fn risk_config(&self, task: Task) -> RiskConfig {
        let build: Arc<dyn RiskFunction> = match &self.build_risk {
            Some(risk) => Arc::clone(risk),
            None => Arc::new(Criterion::default_build(task)),
        };
        let prune: Arc<dyn RiskFunction> = match &self.prune_risk {
            Some(risk) => Arc::clone(risk),
            None => Arc::new(Criterion::default_prune(task)),
        };
        RiskConfig::new(build, prune).with_prior(self.prior.clone())
    }

    /// Check every parameter, independent of any table.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`TreeError::InvalidMinSplit`] | `min_split` is zero |
    /// | [`TreeError::InvalidMinBucket`] | `min_bucket` is zero or `>= min_split` |
    /// | [`TreeError::InvalidMaxDepth`] | `max_depth` is `Some(0)` |
    /// | [`TreeError::InvalidFoldCount`] | `folds` is 1 |
    /// | [`TreeError::InvalidMaxCovariates`] | `max_covariates` is `Some(0)` |
    /// | [`TreeError::UnscoredPruneRisk`] | the prune risk cannot score one node (twoing, zero) |
    pub fn validate(&self) -> Result<(), TreeError> {
        validate_stopping(self.min_split, self.min_bucket, self.max_depth)?;
        if self.folds == 1 {
            return Err(TreeError::InvalidFoldCount { folds: self.folds });
        }
        if self.max_covariates == Some(0) {
            return Err(TreeError::InvalidMaxCovariates { n_covariates: 0 });
        }
        if let Some(risk) = &self.prune_risk
            && !risk.scores_nodes()
        {
            return Err(TreeError::UnscoredPruneRisk {
                risk: risk.name().to_string(),
            });
        }
        Ok(())
    }

    /// Grow a full, unpruned tree on every row of `table`.
    ///
    /// Call [`DecisionTree::finalize_collapse`] before pruning the result.
    ///
    /// # Errors
    ///
    /// Configuration errors from [`validate`](Self::validate), plus
    /// [`TreeError::EmptyTable`], [`TreeError::NoCovariates`],
    /// [`TreeError::RiskTaskMismatch`], [`TreeError::InvalidPrior`] and
    /// [`TreeError::TooManyLevels`].
    pub fn grow(&self, table: &Table) -> Result<DecisionTree, TreeError> {
        self.validate()?;
        crate::tune::grow_full(self, table)
    }

    /// Grow, cross-validate and prune a tree on `table`.
    ///
    /// # Errors
    ///
    /// Everything [`grow`](Self::grow) returns, plus
    /// [`TreeError::TooFewRowsForFolds`] when `folds` exceeds the row count.
    pub fn fit(&self, table: &Table) -> Result<TreeFit, TreeError> {
        self.validate()?;
        crate::tune::fit(self, table)
    }
}

/// Configuration for random forest training.
///
/// Construct via [`ForestConfig::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter        | Default              |
/// |------------------|----------------------|
/// | `max_covariates` | `Sqrt`               |
/// | `min_split`      | 2                    |
/// | `min_bucket`     | 1                    |
/// | `max_depth`      | `None`               |
/// | `build_risk`     | `Gini` / `Sse`       |
/// | `seed`           | 42                   |
#[derive(Debug, Clone)]
pub struct ForestConfig {
    pub(crate) n_trees: usize,
    pub(crate) max_covariates: MaxCovariates,
    pub(crate) min_split: usize,
    pub(crate) min_bucket: usize,
    pub(crate) max_depth: Option<usize>,
    pub(crate) build_risk: Option<Arc<dyn RiskFunction>>,
    pub(crate) seed: u64,
}

impl ForestConfig {
    /// Create a new config with the given number of trees.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::InvalidTreeCount`] if `n_trees` is zero.
    pub fn new(n_trees: usize) -> Result<Self, TreeError> {
        if n_trees == 0 {
            return Err(TreeError::InvalidTreeCount { n_trees });
        }
        Ok(Self {
            n_trees,
            max_covariates: MaxCovariates::Sqrt,
            min_split: 2,
            min_bucket: 1,
            max_depth: None,
            build_risk: None,
            seed: 42,
        })
    }

    /// Set the per-split covariate sampling strategy.
    #[must_use]
    pub fn with_max_covariates(mut self, max_covariates: MaxCovariates) -> Self {
        self.max_covariates = max_covariates;
        self
    }

    /// Set the minimum row count a node needs to be split.
    #[must_use]
    pub fn with_min_split(mut self, min_split: usize) -> Self {
        self.min_split = min_split;
        self
    }

    /// Set the minimum row count of each child of a split.
    #[must_use]
    pub fn with_min_bucket(mut self, min_bucket: usize) -> Self {
        self.min_bucket = min_bucket;
        self
    }

    /// Set the maximum tree depth. `None` means unlimited.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the risk function used by split search.
    #[must_use]
    pub fn with_build_risk(mut self, risk: impl RiskFunction + 'static) -> Self {
        self.build_risk = Some(Arc::new(risk));
        self
    }

    /// Set the random seed for bootstrap draws and covariate sampling.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Return the number of trees.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.n_trees
    }

    /// Return the covariate sampling strategy.
    #[must_use]
    pub fn max_covariates(&self) -> MaxCovariates {
        self.max_covariates
    }

    /// Return the minimum row count a node needs to be split.
    #[must_use]
    pub fn min_split(&self) -> usize {
        self.min_split
    }

    /// Return the minimum row count of each child.
    #[must_use]
    pub fn min_bucket(&self) -> usize {
        self.min_bucket
    }

    /// Return the random seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Split-search risk plus the zero prune risk: forest trees are never pruned.
    pub(crate) fn risk_config(&self, task: Task) -> RiskConfig {
        let build: Arc<dyn RiskFunction> = match &self.build_risk {
            Some(risk) => Arc::clone(risk),
            None => Arc::new(Criterion::default_build(task)),
        };
        RiskConfig::new(build, Arc::new(Criterion::Zero))
    }

    /// Train a forest on bootstrap resamples of `table`.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`TreeError::InvalidMinSplit`] | `min_split` is zero |
    /// | [`TreeError::InvalidMinBucket`] | `min_bucket` is zero or `>= min_split` |
    /// | [`TreeError::InvalidMaxDepth`] | `max_depth` is `Some(0)` |
    /// | [`TreeError::InvalidMaxCovariates`] | the covariate count resolves to zero |
    /// | [`TreeError::EmptyTable`] / [`TreeError::NoCovariates`] | table unusable |
    /// | [`TreeError::RiskTaskMismatch`] | build risk cannot score the response |
    /// | [`TreeError::TooManyLevels`] | a categorical covariate has too many levels |
    pub fn fit(&self, table: &Table) -> Result<Forest, TreeError> {
        validate_stopping(self.min_split, self.min_bucket, self.max_depth)?;
        crate::forest::train(self, table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_defaults() {
        let config = TreeConfig::new();
        assert_eq!(config.min_split(), 20);
        assert_eq!(config.min_bucket(), 7);
        assert_eq!(config.folds(), 10);
        assert_eq!(config.seed(), 42);
        assert!(config.validate().is_ok());
        let risk = config.risk_config(Task::Classification);
        assert_eq!(risk.build().name(), "gini");
        assert_eq!(risk.prune().name(), "error");
        let risk = config.risk_config(Task::Regression);
        assert_eq!(risk.build().name(), "sse");
    }

    #[test]
    fn invalid_stopping_rules() {
        let err = TreeConfig::new().with_min_split(0).validate().unwrap_err();
        assert!(matches!(err, TreeError::InvalidMinSplit { min_split: 0 }));

        let err = TreeConfig::new().with_min_split(5).with_min_bucket(5).validate().unwrap_err();
        assert!(matches!(err, TreeError::InvalidMinBucket { min_bucket: 5, min_split: 5 }));

        let err = TreeConfig::new().with_min_bucket(0).validate().unwrap_err();
        assert!(matches!(err, TreeError::InvalidMinBucket { .. }));

        let err = TreeConfig::new().with_max_depth(Some(0)).validate().unwrap_err();
        assert!(matches!(err, TreeError::InvalidMaxDepth { max_depth: 0 }));
    }

    #[test]
    fn one_fold_rejected_zero_allowed() {
        let err = TreeConfig::new().with_folds(1).validate().unwrap_err();
        assert!(matches!(err, TreeError::InvalidFoldCount { folds: 1 }));
        assert!(TreeConfig::new().with_folds(0).validate().is_ok());
    }

    #[test]
    fn pruning_needs_a_node_risk() {
        for risk in [Criterion::Twoing, Criterion::Zero] {
            let err = TreeConfig::new().with_prune_risk(risk).validate().unwrap_err();
            assert!(matches!(err, TreeError::UnscoredPruneRisk { .. }), "{risk:?}: {err}");
        }
        // Twoing still drives split search.
        assert!(TreeConfig::new().with_build_risk(Criterion::Twoing).validate().is_ok());
    }

    #[test]
    fn custom_risks_override_defaults() {
        let config = TreeConfig::new()
            .with_build_risk(Criterion::Entropy)
            .with_prune_risk(Criterion::Gini)
            .with_prior(Some(vec![0.5, 0.5]));
        let risk = config.risk_config(Task::Classification);
        assert_eq!(risk.build().name(), "entropy");
        assert_eq!(risk.prune().name(), "gini");
        assert_eq!(risk.prior(), Some([0.5, 0.5].as_slice()));
    }

    #[test]
    fn max_covariates_resolution() {
        assert_eq!(MaxCovariates::Sqrt.resolve(10).unwrap(), 4);
        assert_eq!(MaxCovariates::Log2.resolve(1).unwrap(), 1);
        assert_eq!(MaxCovariates::Log2.resolve(8).unwrap(), 3);
        assert_eq!(MaxCovariates::Fraction(0.5).resolve(5).unwrap(), 3);
        assert_eq!(MaxCovariates::All.resolve(7).unwrap(), 7);
        // Capped rather than rejected.
        assert_eq!(MaxCovariates::Fixed(50).resolve(3).unwrap(), 3);
        assert!(MaxCovariates::Fixed(0).resolve(3).is_err());
        assert!(MaxCovariates::Fraction(0.0).resolve(3).is_err());
    }

    #[test]
    fn forest_defaults() {
        let config = ForestConfig::new(10).unwrap();
        assert_eq!(config.n_trees(), 10);
        assert_eq!(config.max_covariates(), MaxCovariates::Sqrt);
        assert_eq!(config.min_split(), 2);
        assert_eq!(config.min_bucket(), 1);
        assert_eq!(config.risk_config(Task::Classification).prune().name(), "zero");
    }

    #[test]
    fn invalid_tree_count() {
        assert!(matches!(
            ForestConfig::new(0).unwrap_err(),
            TreeError::InvalidTreeCount { n_trees: 0 }
        ));
    }
}
