//! Array-backed binary decision trees
//!
//! A fitted regression tree is stored as parallel arrays indexed by node id,
//! the same layout tree learners export: `children_left[i]`,
//! `children_right[i]`, `feature[i]` and `threshold[i]`. Node 0 is the root
//! and a left child of [`TREE_LEAF`] marks a leaf.

use crate::errors::{EncoderError, Result};
use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

/// Child sentinel meaning "no child"
pub const TREE_LEAF: i32 = -1;

/// Feature index stored on leaves by most exporters
pub const TREE_UNDEFINED: i32 = -2;

/// Convenience description of one node, used to build a [`Tree`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Node {
    /// Go left when `x[feature] <= threshold`, right otherwise
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    /// Terminal node with its prediction value
    Leaf { value: f64 },
}

impl Node {
    /// Create a new internal (split) node
    pub fn split(feature: usize, threshold: f64, left: usize, right: usize) -> Self {
        Node::Split {
            feature,
            threshold,
            left,
            right,
        }
    }

    /// Create a new leaf node
    pub fn leaf(value: f64) -> Self {
        Node::Leaf { value }
    }
}

/// A single decision tree stored as parallel arrays
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tree {
    /// Left child per node ([`TREE_LEAF`] for leaves)
    pub children_left: Vec<i32>,

    /// Right child per node ([`TREE_LEAF`] for leaves)
    pub children_right: Vec<i32>,

    /// Split feature per node ([`TREE_UNDEFINED`] for leaves)
    pub feature: Vec<i32>,

    /// Split threshold per node
    pub threshold: Vec<f64>,

    /// Prediction value per node; may be empty when only leaf routing is needed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub value: Vec<f64>,
}

impl Tree {
    /// Create a tree from raw arrays without leaf values
    pub fn new(
        children_left: Vec<i32>,
        children_right: Vec<i32>,
        feature: Vec<i32>,
        threshold: Vec<f64>,
    ) -> Self {
        Self {
            children_left,
            children_right,
            feature,
            threshold,
            value: Vec::new(),
        }
    }

    /// Build the parallel arrays from a list of nodes, node id = position
    pub fn from_nodes(nodes: &[Node]) -> Self {
        let mut tree = Tree {
            children_left: Vec::with_capacity(nodes.len()),
            children_right: Vec::with_capacity(nodes.len()),
            feature: Vec::with_capacity(nodes.len()),
            threshold: Vec::with_capacity(nodes.len()),
            value: Vec::with_capacity(nodes.len()),
        };

        for node in nodes {
            match *node {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    tree.children_left.push(left as i32);
                    tree.children_right.push(right as i32);
                    tree.feature.push(feature as i32);
                    tree.threshold.push(threshold);
                    tree.value.push(0.0);
                }
                Node::Leaf { value } => {
                    tree.children_left.push(TREE_LEAF);
                    tree.children_right.push(TREE_LEAF);
                    tree.feature.push(TREE_UNDEFINED);
                    tree.threshold.push(-2.0);
                    tree.value.push(value);
                }
            }
        }

        tree
    }

    /// A tree made of a single leaf (the root)
    pub fn stump(value: f64) -> Self {
        Self::from_nodes(&[Node::leaf(value)])
    }

    /// Number of nodes in the tree
    pub fn n_nodes(&self) -> usize {
        self.children_left.len()
    }

    /// A node is a leaf iff its left child is the sentinel
    pub fn is_leaf(&self, node: usize) -> bool {
        self.children_left[node] == TREE_LEAF
    }

    pub fn left_child(&self, node: usize) -> usize {
        self.children_left[node] as usize
    }

    pub fn right_child(&self, node: usize) -> usize {
        self.children_right[node] as usize
    }

    pub fn split_feature(&self, node: usize) -> usize {
        self.feature[node] as usize
    }

    pub fn split_threshold(&self, node: usize) -> f64 {
        self.threshold[node]
    }

    /// Prediction value of a node, if values were exported
    pub fn node_value(&self, node: usize) -> Option<f64> {
        self.value.get(node).copied()
    }

    /// Number of sentinel entries in the left-child array
    pub fn leaf_count(&self) -> usize {
        self.children_left.iter().filter(|&&c| c == TREE_LEAF).count()
    }

    /// Largest split feature index referenced by an internal node
    pub fn max_feature_index(&self) -> Option<usize> {
        (0..self.n_nodes())
            .filter(|&n| !self.is_leaf(n))
            .map(|n| self.split_feature(n))
            .max()
    }

    /// Maximum number of splits on any root-to-leaf path
    ///
    /// Expects a validated tree.
    pub fn depth(&self) -> usize {
        if self.n_nodes() == 0 {
            return 0;
        }

        let mut max_depth = 0;
        let mut stack = vec![(0usize, 0usize)];
        while let Some((node, depth)) = stack.pop() {
            if self.is_leaf(node) {
                max_depth = max_depth.max(depth);
            } else {
                stack.push((self.right_child(node), depth + 1));
                stack.push((self.left_child(node), depth + 1));
            }
        }
        max_depth
    }

    /// Validate tree structure
    ///
    /// Checks array lengths, child ranges, sentinel agreement, split features,
    /// thresholds, and that every node is reached from the root exactly once.
    pub fn validate(&self) -> Result<()> {
        let n = self.n_nodes();
        if n == 0 {
            return Err(EncoderError::Structural("Tree has no nodes".to_string()));
        }

        if self.children_right.len() != n || self.feature.len() != n || self.threshold.len() != n
        {
            return Err(EncoderError::Structural(format!(
                "Array lengths differ: children_left={}, children_right={}, feature={}, threshold={}",
                n,
                self.children_right.len(),
                self.feature.len(),
                self.threshold.len()
            )));
        }

        if !self.value.is_empty() && self.value.len() != n {
            return Err(EncoderError::Structural(format!(
                "Value array has {} entries for {} nodes",
                self.value.len(),
                n
            )));
        }

        for i in 0..n {
            let left = self.children_left[i];
            let right = self.children_right[i];

            if (left == TREE_LEAF) != (right == TREE_LEAF) {
                return Err(EncoderError::Structural(format!(
                    "Node {i} has only one child (left={left}, right={right})"
                )));
            }

            if left == TREE_LEAF {
                continue;
            }

            for (side, child) in [("left", left), ("right", right)] {
                if child <= 0 || child as usize >= n {
                    return Err(EncoderError::Structural(format!(
                        "Node {i} has invalid {side} child: {child}"
                    )));
                }
            }

            if self.feature[i] < 0 {
                return Err(EncoderError::Structural(format!(
                    "Internal node {} has invalid feature index: {}",
                    i, self.feature[i]
                )));
            }

            if !self.threshold[i].is_finite() {
                return Err(EncoderError::Structural(format!(
                    "Internal node {} has non-finite threshold: {}",
                    i, self.threshold[i]
                )));
            }
        }

        let mut visited = vec![false; n];
        let mut stack = vec![0usize];
        while let Some(node) = stack.pop() {
            if visited[node] {
                return Err(EncoderError::Structural(format!(
                    "Node {node} is reachable more than once"
                )));
            }
            visited[node] = true;
            if !self.is_leaf(node) {
                stack.push(self.right_child(node));
                stack.push(self.left_child(node));
            }
        }

        if let Some(orphan) = visited.iter().position(|&v| !v) {
            return Err(EncoderError::Structural(format!(
                "Node {orphan} is not reachable from the root"
            )));
        }

        Ok(())
    }

    /// Route one row from the root to a leaf and return the leaf node id
    ///
    /// `x[feature] <= threshold` goes left. NaN compares false and goes right.
    pub fn apply_row(&self, row: ArrayView1<'_, f64>) -> Result<usize> {
        let n = self.n_nodes();
        let mut idx = 0usize;

        // A valid tree never needs more steps than it has nodes.
        for _ in 0..=n {
            if idx >= n {
                return Err(EncoderError::Structural(format!(
                    "Traversal reached node {idx} outside a tree of {n} nodes"
                )));
            }

            if self.is_leaf(idx) {
                return Ok(idx);
            }

            let feature = self.split_feature(idx);
            let value = *row.get(feature).ok_or_else(|| {
                EncoderError::Configuration(format!(
                    "Row has {} features but node {} splits on feature {}",
                    row.len(),
                    idx,
                    feature
                ))
            })?;

            idx = if value <= self.split_threshold(idx) {
                self.left_child(idx)
            } else {
                self.right_child(idx)
            };
        }

        Err(EncoderError::Structural(
            "Traversal did not terminate; tree contains a cycle".to_string(),
        ))
    }

    /// Route every row of a batch, returning one leaf node id per row
    pub fn apply(&self, x: ArrayView2<'_, f64>) -> Result<Vec<usize>> {
        x.rows().into_iter().map(|row| self.apply_row(row)).collect()
    }
}
