//! Leaf enumeration and decision-path labels
//!
//! [`TreeWalker`] visits a tree depth-first, left subtree before right, and
//! emits one [`LeafRecord`] per leaf. Each record carries the synthetic name
//! `<prefix>_<tree_index>_<node_id>` and the conjunction of split conditions
//! on the path from the root, for example `age<=42.5 & income>1000.0`.

use crate::errors::{EncoderError, Result};
use crate::tree::Tree;

/// Separator between conditions in a decision-path label
pub const CONDITION_SEPARATOR: &str = " & ";

/// Default number of decimals used for thresholds in labels
pub const DEFAULT_LABEL_PRECISION: usize = 2;

/// One leaf of one tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafRecord {
    pub tree_index: usize,
    pub node_id: usize,
    pub name: String,
    pub label: String,
}

/// Synthetic, ensemble-unique name of a leaf
pub fn leaf_name(prefix: &str, tree_index: usize, node_id: usize) -> String {
    format!("{prefix}_{tree_index}_{node_id}")
}

/// Synthesized feature names `feature_0 .. feature_{n-1}`
pub fn default_feature_names(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("feature_{i}")).collect()
}

/// Round a threshold to `precision` decimals and render the rounded value in
/// its shortest form, e.g. `0.5`, `10.0` or `1e+307`.
///
/// Rounding is applied to the exact binary value with ties to even, so
/// `0.125` becomes `0.12`.
pub fn format_threshold(threshold: f64, precision: usize) -> String {
    if !threshold.is_finite() {
        return threshold.to_string();
    }
    let rounded = format!("{threshold:.precision$}")
        .parse::<f64>()
        .unwrap_or(threshold);
    shortest_repr(rounded)
}

/// Shortest round-trip digits; fixed notation for decimal exponents in
/// `-4..16`, scientific otherwise. Integral values keep a trailing `.0`.
fn shortest_repr(value: f64) -> String {
    let scientific = format!("{value:e}");
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return value.to_string();
    };
    let Ok(exponent) = exponent.parse::<i32>() else {
        return value.to_string();
    };
    let (sign, mantissa) = match mantissa.strip_prefix('-') {
        Some(unsigned) => ("-", unsigned),
        None => ("", mantissa),
    };
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();

    if (-4..16).contains(&exponent) {
        let point = exponent + 1;
        let body = if point <= 0 {
            format!("0.{}{}", "0".repeat(point.unsigned_abs() as usize), digits)
        } else if point as usize >= digits.len() {
            format!("{}{}.0", digits, "0".repeat(point as usize - digits.len()))
        } else {
            let (integral, fraction) = digits.split_at(point as usize);
            format!("{integral}.{fraction}")
        };
        format!("{sign}{body}")
    } else {
        let (lead, rest) = digits.split_at(1);
        let fraction = if rest.is_empty() {
            String::new()
        } else {
            format!(".{rest}")
        };
        let exponent_sign = if exponent < 0 { '-' } else { '+' };
        format!("{sign}{lead}{fraction}e{exponent_sign}{:02}", exponent.unsigned_abs())
    }
}

fn extend_label(label: &str, condition: &str) -> String {
    if label.is_empty() {
        condition.to_string()
    } else {
        format!("{label}{CONDITION_SEPARATOR}{condition}")
    }
}

/// Walks trees and names their leaves
#[derive(Debug, Clone)]
pub struct TreeWalker<'a> {
    feature_names: &'a [String],
    prefix: &'a str,
    precision: usize,
}

impl<'a> TreeWalker<'a> {
    pub fn new(feature_names: &'a [String], prefix: &'a str) -> Self {
        Self {
            feature_names,
            prefix,
            precision: DEFAULT_LABEL_PRECISION,
        }
    }

    /// Number of decimals used when rendering thresholds
    pub fn with_precision(mut self, precision: usize) -> Self {
        self.precision = precision;
        self
    }

    /// Enumerate every leaf of `tree` in pre-order, left before right
    ///
    /// Uses an explicit stack, so tree depth is bounded by memory only.
    pub fn walk(&self, tree: &Tree, tree_index: usize) -> Result<Vec<LeafRecord>> {
        tree.validate()?;

        let mut leaves = Vec::with_capacity(tree.leaf_count());
        let mut stack = vec![(0usize, String::new())];

        while let Some((node, label)) = stack.pop() {
            if tree.is_leaf(node) {
                leaves.push(LeafRecord {
                    tree_index,
                    node_id: node,
                    name: leaf_name(self.prefix, tree_index, node),
                    label,
                });
                continue;
            }

            let feature = tree.split_feature(node);
            let name = self.feature_names.get(feature).ok_or_else(|| {
                EncoderError::Configuration(format!(
                    "Tree {} node {} splits on feature {} but only {} feature names are known",
                    tree_index,
                    node,
                    feature,
                    self.feature_names.len()
                ))
            })?;
            let threshold = format_threshold(tree.split_threshold(node), self.precision);

            // Right goes on the stack first so the left subtree is emitted first.
            let right = extend_label(&label, &format!("{name}>{threshold}"));
            let left = extend_label(&label, &format!("{name}<={threshold}"));
            stack.push((tree.right_child(node), right));
            stack.push((tree.left_child(node), left));
        }

        Ok(leaves)
    }
}
