//! Breiman weakest-link cost-complexity pruning.

use tracing::{debug, instrument};

use crate::node::NodeId;
use crate::tree::DecisionTree;

/// Relative gap under which two collapse values count as the same link cost.
const TIE_TOLERANCE: f64 = 1e-12;

/// Whether `a` and `b` differ only by rounding, at a risk scale of `scale`.
fn tied(a: f64, b: f64, scale: f64) -> bool {
    (a - b).abs() <= TIE_TOLERANCE * scale.max(a.abs()).max(b.abs())
}

/// For ascending `sorted`, the smallest value each entry is tied with.
/// Values tied with zero become zero.
fn merge_ties(sorted: &[f64], scale: f64) -> Vec<f64> {
    let mut current = 0.0;
    sorted
        .iter()
        .map(|&value| {
            if !tied(value, current, scale) {
                current = value;
            }
            current
        })
        .collect()
}

impl DecisionTree {
    /// Compute each internal node's final collapse value.
    ///
    /// Repeatedly picks the live internal node with the smallest collapse value
    /// (ties go to the lowest id), records that value, collapses it virtually
    /// and recomputes its ancestors, until the root itself is picked. Nodes
    /// swallowed by an ancestor's collapse before being picked inherit the
    /// ancestor's value. Values are clamped to be non-negative, and values that
    /// differ only by floating-point rounding are merged onto the smallest of
    /// them, so a split with no real gain collapses at exactly zero.
    ///
    /// Returns the weakest links in the order they were collapsed; their values
    /// are non-decreasing. Node risks and leaf statistics are left untouched.
    #[instrument(skip_all, fields(n_nodes = self.n_nodes()))]
    pub fn finalize_collapse(&mut self) -> Vec<(NodeId, f64)> {
        let order = self.preorder();
        let n_slots = order.iter().map(|id| id.slot()).max().map_or(0, |s| s + 1);

        let mut leaf_risk = vec![0.0; n_slots];
        let mut leaf_count = vec![1usize; n_slots];
        let mut collapse = vec![f64::INFINITY; n_slots];
        let mut collapsed = vec![false; n_slots];
        let mut recorded: Vec<Option<f64>> = vec![None; n_slots];
        for &id in &order {
            let node = &self[id];
            leaf_risk[id.slot()] = node.leaf_risk();
            leaf_count[id.slot()] = node.leaf_count();
            collapse[id.slot()] = node.collapse();
        }

        let mut links = Vec::new();
        loop {
            // Weakest live internal node, skipping virtually collapsed subtrees.
            let mut weakest: Option<NodeId> = None;
            let mut stack = vec![NodeId::ROOT];
            while let Some(id) = stack.pop() {
                let node = &self[id];
                let (Some(left), Some(right)) = (node.left(), node.right()) else {
                    continue;
                };
                if collapsed[id.slot()] {
                    continue;
                }
                let better = match weakest {
                    None => true,
                    Some(w) => {
                        let (c, cw) = (collapse[id.slot()], collapse[w.slot()]);
                        c < cw || (c == cw && id < w)
                    }
                };
                if better {
                    weakest = Some(id);
                }
                stack.push(right);
                stack.push(left);
            }

            let Some(id) = weakest else {
                break;
            };
            let value = collapse[id.slot()];
            recorded[id.slot()] = Some(value);
            links.push((id, value.max(0.0)));
            if id == NodeId::ROOT {
                break;
            }

            collapsed[id.slot()] = true;
            leaf_risk[id.slot()] = self[id].risk();
            leaf_count[id.slot()] = 1;
            collapse[id.slot()] = f64::INFINITY;

            let mut parent = self[id].parent();
            while let Some(p) = parent {
                let node = &self[p];
                if let (Some(l), Some(r)) = (node.left(), node.right()) {
                    leaf_risk[p.slot()] = leaf_risk[l.slot()] + leaf_risk[r.slot()];
                    leaf_count[p.slot()] = leaf_count[l.slot()] + leaf_count[r.slot()];
                    collapse[p.slot()] = if leaf_count[p.slot()] <= 1 {
                        f64::INFINITY
                    } else {
                        (node.risk() - leaf_risk[p.slot()]) / (leaf_count[p.slot()] - 1) as f64
                    };
                }
                parent = node.parent();
            }
        }

        let scale = self.root().risk().abs().max(1.0);
        let mut raw: Vec<f64> = links.iter().map(|&(_, value)| value).collect();
        raw.sort_by(f64::total_cmp);
        let merged = merge_ties(&raw, scale);
        let canonical = |value: f64| merged.get(raw.partition_point(|&r| r < value)).copied().unwrap_or(value);
        for link in &mut links {
            link.1 = canonical(link.1);
        }

        // Parents come before children in preorder.
        let mut finals = vec![f64::INFINITY; n_slots];
        for &id in &order {
            if self[id].is_leaf() {
                continue;
            }
            let value = match recorded[id.slot()] {
                Some(value) => canonical(value.max(0.0)),
                None => self[id].parent().map_or(f64::INFINITY, |p| finals[p.slot()]),
            };
            finals[id.slot()] = value;
            self.node_mut(id).collapse = value;
        }

        debug!(n_links = links.len(), "collapse values finalized");
        links
    }

    /// Remove, top-down, every subtree whose root has `collapse <= cutoff`.
    ///
    /// Leaf statistics of the surviving nodes are recomputed and the cutoff is
    /// remembered as the committed one. Pruning twice with the same cutoff is a
    /// no-op the second time.
    #[instrument(skip(self), fields(n_nodes = self.n_nodes()))]
    pub fn prune(&mut self, cutoff: f64) {
        let mut stack = vec![NodeId::ROOT];
        while let Some(id) = stack.pop() {
            let node = &self[id];
            let (Some(left), Some(right)) = (node.left(), node.right()) else {
                continue;
            };
            if node.collapse() <= cutoff {
                self.remove_below(id);
            } else {
                stack.push(right);
                stack.push(left);
            }
        }
        self.refresh_leaf_stats();
        self.cutoff = Some(cutoff);
        debug!(n_nodes = self.n_nodes(), n_leaves = self.n_leaves(), "tree pruned");
    }

    /// Sorted, de-duplicated finite collapse values of the internal nodes.
    ///
    /// Values within rounding distance of each other are reported once.
    #[must_use]
    pub fn get_tuning(&self) -> Vec<f64> {
        let scale = self.root().risk().abs().max(1.0);
        let mut values: Vec<f64> = self
            .preorder()
            .into_iter()
            .map(|id| self[id].collapse())
            .filter(|c| c.is_finite())
            .collect();
        values.sort_by(f64::total_cmp);
        values.dedup_by(|later, kept| tied(*later, *kept, scale));
        values
    }
}
