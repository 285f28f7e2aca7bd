//! Prediction for single trees and forests.

use rayon::iter::{IntoParallelIterator, ParallelIterator};

use crate::error::TreeError;
use crate::forest::Forest;
use crate::node::{Decision, NodeId};
use crate::split::{Cell, goes_left};
use crate::table::{Column, Table, Task};
use crate::tree::DecisionTree;

impl DecisionTree {
    /// Predict every row of `table`, stopping at nodes with `collapse <= cutoff`.
    ///
    /// `f64::NEG_INFINITY` walks to the true leaves; a committed cutoff
    /// reproduces the pruned tree without mutating it. The response column
    /// of `table` is ignored, only covariates are read.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::SchemaMismatch`] when the covariates differ from
    /// the training table in names, kinds or categorical levels.
    pub fn predict(&self, table: &Table, cutoff: f64) -> Result<Vec<Decision>, TreeError> {
        self.schema.check_covariates(table)?;
        let covariates = table.covariates();
        Ok((0..table.n_rows())
            .into_par_iter()
            .map(|row| self.decide(covariates, row, cutoff))
            .collect())
    }

    /// Walk one row down the tree.
    pub(crate) fn decide(&self, covariates: &[Column], row: usize, cutoff: f64) -> Decision {
        let mut id = NodeId::ROOT;
        loop {
            let node = &self[id];
            match (node.split(), node.left(), node.right()) {
                (Some(split), Some(left), Some(right)) if node.collapse() > cutoff => {
                    let cell = Cell::of(&covariates[split.variable], row);
                    id = if goes_left(cell, &split.point) { left } else { right };
                }
                _ => return node.decision(),
            }
        }
    }
}

impl Forest {
    /// Predict every row of `table` from all trees grown to their leaves.
    ///
    /// Classification forests return the plurality class (ties go to the
    /// lowest class code); regression forests return the mean of the trees.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::SchemaMismatch`] when the covariates differ from
    /// the training table.
    pub fn predict(&self, table: &Table) -> Result<Vec<Decision>, TreeError> {
        self.schema.check_covariates(table)?;
        let covariates = table.covariates();
        let n_classes = self.class_levels().map_or(0, <[String]>::len);
        let task = self.task();
        Ok((0..table.n_rows())
            .into_par_iter()
            .map(|row| {
                let votes = self
                    .trees
                    .iter()
                    .map(|tree| tree.decide(covariates, row, f64::NEG_INFINITY));
                match task {
                    Task::Classification => Decision::Class(plurality(votes, n_classes)),
                    Task::Regression => {
                        let sum: f64 = votes.filter_map(Decision::value).sum();
                        Decision::Value(sum / self.trees.len() as f64)
                    }
                }
            })
            .collect())
    }
}

/// Most frequent class among `votes`; ties go to the lowest class code.
fn plurality(votes: impl Iterator<Item = Decision>, n_classes: usize) -> usize {
    let mut tally = vec![0usize; n_classes];
    for class in votes.filter_map(Decision::class) {
        tally[class] += 1;
    }
    let mut best = 0;
    for (class, &count) in tally.iter().enumerate() {
        if count > tally[best] {
            best = class;
        }
    }
    best
}
