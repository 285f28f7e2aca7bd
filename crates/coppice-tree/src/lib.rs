//! CART decision trees: induction, cost-complexity pruning, random forests.
//!
//! Trees are grown over typed tables of categorical and numeric covariates,
//! pruned by Breiman's weakest-link algorithm with the cutoff chosen by k-fold
//! cross-validation and the one-standard-error rule, and bagged into random
//! forests trained in parallel via rayon. Risk functions are pluggable through
//! the [`RiskFunction`] trait.

mod config;
mod confusion;
mod cv;
mod error;
mod forest;
mod grow;
mod node;
mod predict;
mod prune;
mod risk;
mod serialize;
mod split;
mod table;
mod tree;
mod tune;

pub use config::{ForestConfig, MaxCovariates, TreeConfig};
pub use confusion::{ClassMetrics, ConfusionMatrix};
pub use cv::{CrossValidation, TuningEstimate, cross_validate};
pub use error::TreeError;
pub use forest::Forest;
pub use node::{Decision, Node, NodeId, Split};
pub use risk::{Criterion, Labels, Prior, RiskConfig, RiskFunction, RiskValue};
pub use serialize::{FORMAT_VERSION, Model};
pub use split::{Cell, LevelSet, MAX_CATEGORICAL_LEVELS, SplitPoint, goes_left, partition_rows};
pub use table::{Column, ColumnKind, ColumnSchema, Table, TableSchema, Task};
pub use tree::DecisionTree;
pub use tune::{TreeFit, select_cutoff, validation_error};
