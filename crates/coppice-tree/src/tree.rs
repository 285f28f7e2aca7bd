//! Arena-backed binary tree store.
//!
//! Nodes live in a growable array addressed by one-based [`NodeId`]. Ids freed
//! by pruning are kept on a free list and reused before the array grows.
//! Traversal only ever follows recorded child links, so gaps are never visited.

use std::collections::VecDeque;
use std::ops::Index;

use crate::node::{Node, NodeId};
use crate::table::{ColumnKind, TableSchema, Task};

/// Minimum number of slots reserved whenever the arena runs out of capacity.
const GROWTH_INCREMENT: usize = 32;

/// A CART decision tree (classification or regression).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DecisionTree {
    slots: Vec<Option<Node>>,
    free: Vec<NodeId>,
    pub(crate) schema: TableSchema,
    pub(crate) cutoff: Option<f64>,
}

impl DecisionTree {
    /// A tree holding only an empty root.
    pub(crate) fn with_root(schema: TableSchema) -> Self {
        let mut slots = Vec::with_capacity(GROWTH_INCREMENT);
        slots.push(Some(Node::empty(None)));
        Self {
            slots,
            free: Vec::new(),
            schema,
            cutoff: None,
        }
    }

    fn alloc(&mut self, parent: NodeId) -> NodeId {
        if let Some(id) = self.free.pop() {
            self.slots[id.slot()] = Some(Node::empty(Some(parent)));
            return id;
        }
        if self.slots.len() == self.slots.capacity() {
            self.slots.reserve(GROWTH_INCREMENT.max(self.slots.len()));
        }
        self.slots.push(Some(Node::empty(Some(parent))));
        NodeId::new(self.slots.len())
    }

    /// Allocate a left and a right child for `parent` and link them.
    pub(crate) fn alloc_children(&mut self, parent: NodeId) -> (NodeId, NodeId) {
        let left = self.alloc(parent);
        let right = self.alloc(parent);
        let node = self.node_mut(parent);
        node.left = Some(left);
        node.right = Some(right);
        (left, right)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        match self.slots.get_mut(id.slot()) {
            Some(Some(node)) => node,
            _ => panic!("node {id} is not live"),
        }
    }

    /// Return the node with the given id, if it is live.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.slots.get(id.slot()).and_then(Option::as_ref)
    }

    /// Return the root node.
    #[must_use]
    pub fn root(&self) -> &Node {
        &self[NodeId::ROOT]
    }

    /// Ids of all nodes reachable from the root, parents before children.
    #[must_use]
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.slots.len());
        let mut stack = vec![NodeId::ROOT];
        while let Some(id) = stack.pop() {
            order.push(id);
            let node = &self[id];
            if let (Some(left), Some(right)) = (node.left, node.right) {
                stack.push(right);
                stack.push(left);
            }
        }
        order
    }

    /// Remove every descendant of `id` and turn it into a leaf.
    pub(crate) fn remove_below(&mut self, id: NodeId) {
        let node = self.node_mut(id);
        let mut stack: Vec<NodeId> = node.left.take().into_iter().chain(node.right.take()).collect();
        node.split = None;
        node.leaf_risk = node.risk;
        node.leaf_count = 1;
        node.collapse = f64::INFINITY;
        while let Some(child) = stack.pop() {
            if let Some(removed) = self.slots[child.slot()].take() {
                stack.extend(removed.left.into_iter().chain(removed.right));
                self.free.push(child);
            }
        }
    }

    /// Recompute `leaf_risk` and `leaf_count` bottom-up for every live node.
    pub(crate) fn refresh_leaf_stats(&mut self) {
        for id in self.preorder().into_iter().rev() {
            let (left, right) = {
                let node = &self[id];
                (node.left, node.right)
            };
            let (leaf_risk, leaf_count) = match (left, right) {
                (Some(l), Some(r)) => (
                    self[l].leaf_risk + self[r].leaf_risk,
                    self[l].leaf_count + self[r].leaf_count,
                ),
                _ => (self[id].risk, 1),
            };
            let node = self.node_mut(id);
            node.leaf_risk = leaf_risk;
            node.leaf_count = leaf_count;
        }
    }

    /// Return the number of live nodes.
    #[must_use]
    pub fn n_nodes(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Return the number of leaves reachable from the root.
    #[must_use]
    pub fn n_leaves(&self) -> usize {
        self.preorder().into_iter().filter(|&id| self[id].is_leaf()).count()
    }

    /// Return the maximum depth; a lone root has depth 0.
    #[must_use]
    pub fn depth(&self) -> usize {
        let mut max_depth = 0usize;
        let mut queue = VecDeque::new();
        queue.push_back((NodeId::ROOT, 0usize));
        while let Some((id, d)) = queue.pop_front() {
            let node = &self[id];
            match (node.left, node.right) {
                (Some(l), Some(r)) => {
                    queue.push_back((l, d + 1));
                    queue.push_back((r, d + 1));
                }
                _ => max_depth = max_depth.max(d),
            }
        }
        max_depth
    }

    /// Return the schema of the table the tree was trained on.
    #[must_use]
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Return the learning task.
    #[must_use]
    pub fn task(&self) -> Task {
        self.schema.task()
    }

    /// Return the response levels for a classification tree.
    #[must_use]
    pub fn class_levels(&self) -> Option<&[String]> {
        match &self.schema.response().kind {
            ColumnKind::Categorical { levels } => Some(levels),
            ColumnKind::Numeric => None,
        }
    }

    /// Return the cutoff committed by [`prune`](Self::prune), if any.
    #[must_use]
    pub fn committed_cutoff(&self) -> Option<f64> {
        self.cutoff
    }

    /// Panic unless the structural invariants hold.
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        let reachable = self.preorder();
        assert_eq!(reachable.len(), self.n_nodes(), "unreachable live nodes");
        assert!(self.root().parent.is_none());
        for &id in &reachable {
            let node = &self[id];
            assert_eq!(node.left.is_some(), node.right.is_some(), "single-child node {id}");
            assert_eq!(node.is_leaf(), node.split.is_none(), "split/leaf mismatch at {id}");
            assert!(node.leaf_count >= 1);
            if let (Some(l), Some(r)) = (node.left, node.right) {
                assert_eq!(self[l].parent, Some(id));
                assert_eq!(self[r].parent, Some(id));
                assert_eq!(node.leaf_count, self[l].leaf_count + self[r].leaf_count);
            } else {
                assert_eq!(node.leaf_count, 1);
                assert!(node.collapse.is_infinite());
            }
        }
        assert_eq!(self.root().leaf_count, self.n_leaves());
    }
}

impl Index<NodeId> for DecisionTree {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        match self.node(id) {
            Some(node) => node,
            None => panic!("node {id} is not live"),
        }
    }
}
