use std::fmt;

use crate::split::SplitPoint;

/// One-based identifier of a node in a tree's arena. The root is always 1.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    serde::Serialize, serde::Deserialize,
)]
pub struct NodeId(usize);

impl NodeId {
    /// The root node.
    pub const ROOT: NodeId = NodeId(1);

    /// Create a node id from a one-based position.
    pub(crate) fn new(id: usize) -> Self {
        debug_assert!(id >= 1, "node ids are one-based");
        Self(id)
    }

    /// Return the one-based id.
    #[must_use]
    pub fn get(self) -> usize {
        self.0
    }

    /// Return the zero-based slot in the arena.
    pub(crate) fn slot(self) -> usize {
        self.0 - 1
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The prediction a node makes.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Decision {
    /// Majority class code.
    Class(usize),
    /// Fitted regression value.
    Value(f64),
}

impl Decision {
    /// Return the class code, if this is a classification decision.
    #[must_use]
    pub fn class(self) -> Option<usize> {
        match self {
            Decision::Class(c) => Some(c),
            Decision::Value(_) => None,
        }
    }

    /// Return the fitted value, if this is a regression decision.
    #[must_use]
    pub fn value(self) -> Option<f64> {
        match self {
            Decision::Value(v) => Some(v),
            Decision::Class(_) => None,
        }
    }
}

/// Covariate and split point of an internal node.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Split {
    /// Zero-based covariate index.
    pub variable: usize,
    /// Where observations go left.
    pub point: SplitPoint,
}

/// A node record in a [`DecisionTree`](crate::DecisionTree) arena.
///
/// A node is a leaf iff both child links are `None`; internal nodes always
/// have both children.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Node {
    pub(crate) parent: Option<NodeId>,
    pub(crate) left: Option<NodeId>,
    pub(crate) right: Option<NodeId>,
    pub(crate) split: Option<Split>,
    pub(crate) decision: Decision,
    pub(crate) class_counts: Vec<f64>,
    pub(crate) n_obs: usize,
    pub(crate) risk: f64,
    pub(crate) leaf_risk: f64,
    pub(crate) leaf_count: usize,
    pub(crate) collapse: f64,
}

impl Node {
    /// A fresh node: no children, no split, decision unset.
    pub(crate) fn empty(parent: Option<NodeId>) -> Self {
        Self {
            parent,
            left: None,
            right: None,
            split: None,
            decision: Decision::Value(0.0),
            class_counts: Vec::new(),
            n_obs: 0,
            risk: 0.0,
            leaf_risk: 0.0,
            leaf_count: 1,
            collapse: f64::INFINITY,
        }
    }

    /// Return `true` if this node has no children.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }

    /// Return the parent id (`None` for the root).
    #[must_use]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Return the left child id.
    #[must_use]
    pub fn left(&self) -> Option<NodeId> {
        self.left
    }

    /// Return the right child id.
    #[must_use]
    pub fn right(&self) -> Option<NodeId> {
        self.right
    }

    /// Return the split of an internal node.
    #[must_use]
    pub fn split(&self) -> Option<&Split> {
        self.split.as_ref()
    }

    /// Return the node's decision (valid for internal nodes too).
    #[must_use]
    pub fn decision(&self) -> Decision {
        self.decision
    }

    /// Per-class training counts (empty for regression).
    #[must_use]
    pub fn class_counts(&self) -> &[f64] {
        &self.class_counts
    }

    /// Number of training observations that reached this node.
    #[must_use]
    pub fn n_obs(&self) -> usize {
        self.n_obs
    }

    /// Node risk under the pruning risk function.
    #[must_use]
    pub fn risk(&self) -> f64 {
        self.risk
    }

    /// Summed risk of the leaves below (the node's own risk for a leaf).
    #[must_use]
    pub fn leaf_risk(&self) -> f64 {
        self.leaf_risk
    }

    /// Number of leaves below (1 for a leaf).
    #[must_use]
    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// Complexity parameter at which this node's subtree is collapsed.
    ///
    /// `+inf` for leaves.
    #[must_use]
    pub fn collapse(&self) -> f64 {
        self.collapse
    }

    /// Recompute `collapse` from `risk`, `leaf_risk` and `leaf_count`.
    pub(crate) fn refresh_collapse(&mut self) {
        self.collapse = if self.leaf_count <= 1 {
            f64::INFINITY
        } else {
            (self.risk - self.leaf_risk) / (self.leaf_count - 1) as f64
        };
    }
}
