//! Recursive tree induction.

use rand_chacha::ChaCha8Rng;
use tracing::{debug, instrument};

use crate::error::TreeError;
use crate::node::{Decision, NodeId, Split};
use crate::risk::{Labels, Prior, RiskConfig};
use crate::split::{MAX_CATEGORICAL_LEVELS, Response, find_best_split, partition_rows};
use crate::table::{Column, Table};
use crate::tree::DecisionTree;

/// Stopping rules and risks for one induction run.
#[derive(Debug, Clone)]
pub(crate) struct GrowParams<'a> {
    pub(crate) min_split: usize,
    pub(crate) min_bucket: usize,
    pub(crate) max_depth: Option<usize>,
    pub(crate) max_covariates: Option<usize>,
    pub(crate) risk: &'a RiskConfig,
}

/// Read-only state shared by every recursive call.
struct GrowContext<'a> {
    covariates: &'a [Column],
    response: Response<'a>,
    prior: Prior,
    params: &'a GrowParams<'a>,
}

/// Grow a full tree over `rows` of `table` (duplicates allowed).
///
/// The returned tree has node risks, leaf statistics and per-node collapse
/// values filled in, but [`DecisionTree::finalize_collapse`] has not run.
#[instrument(skip_all, fields(n_rows = rows.len()))]
pub(crate) fn grow_tree(
    table: &Table,
    rows: &[usize],
    params: &GrowParams<'_>,
    rng: &mut ChaCha8Rng,
) -> Result<DecisionTree, TreeError> {
    table.check_trainable()?;
    params.risk.check_task(table.task())?;
    for column in table.covariates() {
        if let Some(levels) = column.levels()
            && levels.len() > MAX_CATEGORICAL_LEVELS
        {
            return Err(TreeError::TooManyLevels {
                column: column.name().to_string(),
                n_levels: levels.len(),
                max: MAX_CATEGORICAL_LEVELS,
            });
        }
    }

    let response = Response::from_column(table.response());
    let prior = match response {
        Response::Classes { .. } => params.risk.resolve_prior(response.class_counts(rows))?,
        Response::Values(_) => Prior::none(),
    };

    let ctx = GrowContext {
        covariates: table.covariates(),
        response,
        prior,
        params,
    };

    let mut tree = DecisionTree::with_root(table.schema());
    grow_subtree(&mut tree, NodeId::ROOT, &ctx, rows, 0, rng);

    debug!(
        n_nodes = tree.n_nodes(),
        n_leaves = tree.root().leaf_count(),
        depth = tree.depth(),
        "tree grown"
    );
    Ok(tree)
}

fn grow_subtree(
    tree: &mut DecisionTree,
    id: NodeId,
    ctx: &GrowContext<'_>,
    rows: &[usize],
    depth: usize,
    rng: &mut ChaCha8Rng,
) {
    let counts = ctx.response.class_counts(rows);
    let values = ctx.response.values(rows);
    let (decision, pure) = match ctx.response {
        Response::Classes { .. } => (
            Decision::Class(majority(&counts)),
            counts.iter().filter(|&&c| c > 0.0).count() <= 1,
        ),
        Response::Values(_) => (
            Decision::Value(values.iter().sum::<f64>() / values.len() as f64),
            values.windows(2).all(|w| w[0] == w[1]),
        ),
    };
    let labels = match ctx.response {
        Response::Classes { .. } => Labels::Counts(&counts),
        Response::Values(_) => Labels::Values(&values),
    };
    let risk = ctx.params.risk.prune().risk(&[labels], &ctx.prior, false).total();

    {
        let node = tree.node_mut(id);
        node.decision = decision;
        node.n_obs = rows.len();
        node.risk = risk;
    }

    let depth_exceeded = ctx.params.max_depth.is_some_and(|d| depth >= d);
    if rows.len() >= ctx.params.min_split
        && !pure
        && !depth_exceeded
        && let Some((split, left_rows, right_rows)) = choose_split(ctx, rows, rng)
    {
        let (left, right) = tree.alloc_children(id);
        tree.node_mut(id).split = Some(split);
        grow_subtree(tree, left, ctx, &left_rows, depth + 1, rng);
        grow_subtree(tree, right, ctx, &right_rows, depth + 1, rng);

        let leaf_risk = tree[left].leaf_risk() + tree[right].leaf_risk();
        let leaf_count = tree[left].leaf_count() + tree[right].leaf_count();
        let node = tree.node_mut(id);
        node.class_counts = counts;
        node.leaf_risk = leaf_risk;
        node.leaf_count = leaf_count;
        node.refresh_collapse();
        return;
    }

    let node = tree.node_mut(id);
    node.class_counts = counts;
    node.leaf_risk = risk;
    node.leaf_count = 1;
    node.collapse = f64::INFINITY;
}

/// Search for the best split and partition rows by it, honouring `min_bucket`.
fn choose_split(
    ctx: &GrowContext<'_>,
    rows: &[usize],
    rng: &mut ChaCha8Rng,
) -> Option<(Split, Vec<usize>, Vec<usize>)> {
    let candidate = find_best_split(
        ctx.covariates,
        ctx.response,
        rows,
        ctx.params.risk.build(),
        &ctx.prior,
        ctx.params.max_covariates,
        rng,
    )?;
    let (left, right) = partition_rows(&ctx.covariates[candidate.variable], rows, &candidate.point);
    if left.len() < ctx.params.min_bucket || right.len() < ctx.params.min_bucket {
        return None;
    }
    Some((
        Split {
            variable: candidate.variable,
            point: candidate.point,
        },
        left,
        right,
    ))
}

/// Index of the largest count; ties go to the lowest class.
pub(crate) fn majority(counts: &[f64]) -> usize {
    let mut best = 0;
    for (class, &count) in counts.iter().enumerate() {
        if count > counts[best] {
            best = class;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;
    use crate::risk::Criterion;
    use crate::split::{LevelSet, SplitPoint};

    fn grow(table: &Table, risk: &RiskConfig, min_split: usize, min_bucket: usize) -> DecisionTree {
        let params = GrowParams {
            min_split,
            min_bucket,
            max_depth: None,
            max_covariates: None,
            risk,
        };
        let rows: Vec<usize> = (0..table.n_rows()).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        grow_tree(table, &rows, &params, &mut rng).unwrap()
    }

    fn four_rows() -> Table {
        Table::new(vec![
            Column::categorical_from_strs("y", &["A", "A", "B", "B"]),
            Column::numeric("x", vec![1.0, 2.0, 3.0, 4.0]),
        ])
        .unwrap()
    }

    #[test]
    fn four_rows_split_into_two_pure_leaves() {
        let table = four_rows();
        let risk = RiskConfig::for_task(table.task());
        let tree = grow(&table, &risk, 2, 1);
        tree.assert_consistent();

        let root = tree.root();
        let split = root.split().expect("root should split");
        assert_eq!(split.variable, 0);
        assert_eq!(split.point, SplitPoint::Threshold(2.5));
        let left = &tree[root.left().unwrap()];
        let right = &tree[root.right().unwrap()];
        assert!(left.is_leaf() && right.is_leaf());
        assert_eq!(left.decision(), Decision::Class(0));
        assert_eq!(right.decision(), Decision::Class(1));
        assert_eq!(left.class_counts(), &[2.0, 0.0]);
    }

    #[test]
    fn min_split_stops_growth() {
        let table = four_rows();
        let risk = RiskConfig::for_task(table.task());
        let tree = grow(&table, &risk, 5, 1);
        assert_eq!(tree.n_nodes(), 1);
        assert_eq!(tree.root().n_obs(), 4);
    }

    #[test]
    fn min_bucket_discards_split() {
        // Best gini split isolates the single B row; min_bucket = 2 rejects it.
        let table = Table::new(vec![
            Column::categorical_from_strs("y", &["A", "A", "A", "B"]),
            Column::numeric("x", vec![1.0, 2.0, 3.0, 4.0]),
        ])
        .unwrap();
        let risk = RiskConfig::for_task(table.task());
        let tree = grow(&table, &risk, 3, 2);
        assert!(tree.root().is_leaf());
        assert_eq!(tree.root().decision(), Decision::Class(0));
    }

    #[test]
    fn constant_covariate_leaves_root_a_leaf() {
        let table = Table::new(vec![
            Column::categorical_from_strs("y", &["A", "B", "A", "B"]),
            Column::numeric("x", vec![1.0; 4]),
        ])
        .unwrap();
        let risk = RiskConfig::for_task(table.task());
        let tree = grow(&table, &risk, 2, 1);
        assert!(tree.root().is_leaf());
        assert!(tree.root().collapse().is_infinite());
    }

    #[test]
    fn categorical_split_sends_subset_left() {
        let table = Table::new(vec![
            Column::categorical_from_strs("y", &["A", "A", "B", "A", "B", "B"]),
            Column::categorical_from_strs("c", &["x", "y", "z", "x", "z", "z"]),
        ])
        .unwrap();
        let risk = RiskConfig::for_task(table.task());
        let tree = grow(&table, &risk, 2, 1);
        let split = tree.root().split().unwrap();
        assert_eq!(split.point, SplitPoint::Levels(LevelSet::new(vec![0, 1])));
        assert_eq!(tree.n_leaves(), 2);
    }

    #[test]
    fn risks_and_collapse_are_filled_in() {
        let table = Table::new(vec![
            Column::categorical_from_strs("y", &["A", "A", "B", "A", "B", "B", "A", "B"]),
            Column::numeric("x", vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]),
        ])
        .unwrap();
        let risk = RiskConfig::for_task(table.task());
        let tree = grow(&table, &risk, 2, 1);
        tree.assert_consistent();
        // Root error rate is 4/8 of the total mass.
        assert!((tree.root().risk() - 0.5).abs() < 1e-12);
        for id in tree.preorder() {
            let node = &tree[id];
            if node.is_leaf() {
                assert!(node.risk().abs() < 1e-12, "leaves are pure");
            } else {
                assert!(node.collapse().is_finite());
            }
        }
    }

    #[test]
    fn zero_prune_risk_still_populates_fields() {
        let table = four_rows();
        let risk = RiskConfig::new(
            std::sync::Arc::new(Criterion::Gini),
            std::sync::Arc::new(Criterion::Zero),
        );
        let tree = grow(&table, &risk, 2, 1);
        assert_eq!(tree.root().risk(), 0.0);
        assert_eq!(tree.root().leaf_count(), 2);
        assert_eq!(tree.root().collapse(), 0.0);
    }

    #[test]
    fn regression_tree_fits_means() {
        let table = Table::new(vec![
            Column::numeric("y", vec![1.0, 1.0, 5.0, 5.0]),
            Column::numeric("x", vec![0.0, 1.0, 2.0, 3.0]),
        ])
        .unwrap();
        let risk = RiskConfig::for_task(table.task());
        let tree = grow(&table, &risk, 2, 1);
        assert_eq!(tree.root().decision(), Decision::Value(3.0));
        assert!((tree.root().risk() - 16.0).abs() < 1e-12);
        let left = &tree[tree.root().left().unwrap()];
        assert_eq!(left.decision(), Decision::Value(1.0));
        assert_eq!(tree.n_leaves(), 2);
    }

    #[test]
    fn max_depth_limits_tree() {
        let table = Table::new(vec![
            Column::categorical_from_strs("y", &["A", "B", "A", "B", "A", "B"]),
            Column::numeric("x", vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
        ])
        .unwrap();
        let risk = RiskConfig::for_task(table.task());
        let params = GrowParams {
            min_split: 2,
            min_bucket: 1,
            max_depth: Some(1),
            max_covariates: None,
            risk: &risk,
        };
        let rows: Vec<usize> = (0..6).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let tree = grow_tree(&table, &rows, &params, &mut rng).unwrap();
        assert!(tree.depth() <= 1);
    }

    #[test]
    fn task_mismatch_is_rejected_before_growing() {
        let table = four_rows();
        let risk = RiskConfig::for_task(crate::table::Task::Regression);
        let params = GrowParams {
            min_split: 2,
            min_bucket: 1,
            max_depth: None,
            max_covariates: None,
            risk: &risk,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let err = grow_tree(&table, &[0, 1, 2, 3], &params, &mut rng).unwrap_err();
        assert!(matches!(err, TreeError::RiskTaskMismatch { .. }));
    }

    #[test]
    fn majority_ties_go_to_first_class() {
        assert_eq!(majority(&[2.0, 2.0, 1.0]), 0);
        assert_eq!(majority(&[1.0, 3.0, 3.0]), 1);
    }
}
