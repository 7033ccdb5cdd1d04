//! Ensemble-level leaf assignment
//!
//! [`EnsembleFeaturizer`] routes every input row through every tree and
//! records the name of the leaf it lands in, producing a
//! [`LeafAssignmentMatrix`] of shape `(rows, trees)`. In fit mode it also
//! walks each tree to build the [`LeafVocabulary`].
//!
//! Per-tree work is independent, so trees may be processed on the rayon
//! pool. Results are always assembled in tree-index order.

use crate::ensemble::Ensemble;
use crate::errors::{EncoderError, Result};
use crate::tree::Tree;
use crate::walker::{leaf_name, LeafRecord, TreeWalker, DEFAULT_LABEL_PRECISION};
use ndarray::{Array2, ArrayView1, ArrayView2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

/// Ordered leaf names of every tree plus their decision-path labels
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeafVocabulary {
    names: Vec<String>,
    labels: BTreeMap<String, String>,
    /// `tree_offsets[t]..tree_offsets[t + 1]` indexes tree `t`'s leaves
    tree_offsets: Vec<usize>,
}

impl LeafVocabulary {
    /// Concatenate per-tree leaf records; `per_tree[t]` belongs to tree `t`
    pub fn from_records(per_tree: Vec<Vec<LeafRecord>>) -> Self {
        let total = per_tree.iter().map(Vec::len).sum();
        let mut vocabulary = LeafVocabulary {
            names: Vec::with_capacity(total),
            labels: BTreeMap::new(),
            tree_offsets: Vec::with_capacity(per_tree.len() + 1),
        };

        vocabulary.tree_offsets.push(0);
        for records in per_tree {
            for record in records {
                vocabulary.labels.insert(record.name.clone(), record.label);
                vocabulary.names.push(record.name);
            }
            vocabulary.tree_offsets.push(vocabulary.names.len());
        }

        vocabulary
    }

    /// All leaf names, tree order then traversal order
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Leaf name to decision-path label
    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.labels.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn num_trees(&self) -> usize {
        self.tree_offsets.len().saturating_sub(1)
    }

    /// Leaf names of one tree, in traversal order
    pub fn tree_leaves(&self, tree_index: usize) -> &[String] {
        match (
            self.tree_offsets.get(tree_index),
            self.tree_offsets.get(tree_index + 1),
        ) {
            (Some(&start), Some(&end)) => &self.names[start..end],
            _ => &[],
        }
    }

    /// Leaf names grouped per tree
    pub fn per_tree(&self) -> Vec<Vec<String>> {
        (0..self.num_trees())
            .map(|t| self.tree_leaves(t).to_vec())
            .collect()
    }

    /// Checks that offsets, names and labels agree (used after deserializing)
    pub fn validate(&self) -> Result<()> {
        let offsets_ok = self.tree_offsets.first() == Some(&0)
            && self.tree_offsets.windows(2).all(|w| w[0] <= w[1])
            && self.tree_offsets.last() == Some(&self.names.len());

        if !offsets_ok || self.labels.len() != self.names.len() {
            return Err(EncoderError::Structural(format!(
                "Inconsistent leaf vocabulary: {} names, {} labels, offsets {:?}",
                self.names.len(),
                self.labels.len(),
                self.tree_offsets
            )));
        }

        if let Some(missing) = self.names.iter().find(|n| !self.labels.contains_key(*n)) {
            return Err(EncoderError::Structural(format!(
                "Leaf {missing} has no label"
            )));
        }

        Ok(())
    }
}

/// Row × tree matrix of reached leaf names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafAssignmentMatrix {
    cells: Array2<String>,
}

impl LeafAssignmentMatrix {
    /// Assemble from per-tree columns; `columns[t][r]` is row `r` in tree `t`
    pub fn from_columns(n_rows: usize, columns: Vec<Vec<String>>) -> Self {
        let cells = Array2::from_shape_fn((n_rows, columns.len()), |(r, t)| columns[t][r].clone());
        Self { cells }
    }

    pub fn nrows(&self) -> usize {
        self.cells.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.cells.ncols()
    }

    pub fn get(&self, row: usize, tree_index: usize) -> Option<&str> {
        self.cells.get((row, tree_index)).map(String::as_str)
    }

    /// Leaves reached by one row, one per tree
    pub fn row(&self, row: usize) -> ArrayView1<'_, String> {
        self.cells.row(row)
    }

    pub fn view(&self) -> ArrayView2<'_, String> {
        self.cells.view()
    }

    pub fn into_inner(self) -> Array2<String> {
        self.cells
    }
}

/// Computes leaf assignments (and, when fitting, the vocabulary)
#[derive(Debug, Clone)]
pub struct EnsembleFeaturizer<'a> {
    ensemble: &'a Ensemble,
    prefix: &'a str,
    parallel: bool,
    label_precision: usize,
}

impl<'a> EnsembleFeaturizer<'a> {
    pub fn new(ensemble: &'a Ensemble, prefix: &'a str) -> Self {
        Self {
            ensemble,
            prefix,
            parallel: false,
            label_precision: DEFAULT_LABEL_PRECISION,
        }
    }

    /// Process trees on the rayon thread pool
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_label_precision(mut self, precision: usize) -> Self {
        self.label_precision = precision;
        self
    }

    /// Fit mode: vocabulary plus leaf assignments for `x`
    #[instrument(skip_all, fields(rows = x.nrows(), trees = self.ensemble.num_trees()))]
    pub fn fit_featurize(
        &self,
        x: ArrayView2<'_, f64>,
        feature_names: &[String],
    ) -> Result<(LeafVocabulary, LeafAssignmentMatrix)> {
        self.check_width(x)?;
        let walker = TreeWalker::new(feature_names, self.prefix).with_precision(self.label_precision);

        let per_tree = self.map_trees(|tree_index, tree| {
            let column = self.leaf_column(tree_index, tree, x)?;
            let records = walker.walk(tree, tree_index)?;
            debug!(tree_index, leaves = records.len(), "walked tree");
            Ok((column, records))
        })?;

        let (columns, records): (Vec<_>, Vec<_>) = per_tree.into_iter().unzip();
        let vocabulary = LeafVocabulary::from_records(records);
        let matrix = LeafAssignmentMatrix::from_columns(x.nrows(), columns);

        debug!(leaves = vocabulary.len(), "built leaf vocabulary");
        Ok((vocabulary, matrix))
    }

    /// Transform mode: leaf assignments only, no vocabulary changes
    #[instrument(skip_all, fields(rows = x.nrows(), trees = self.ensemble.num_trees()))]
    pub fn featurize(&self, x: ArrayView2<'_, f64>) -> Result<LeafAssignmentMatrix> {
        self.check_width(x)?;
        let columns = self.map_trees(|tree_index, tree| self.leaf_column(tree_index, tree, x))?;
        Ok(LeafAssignmentMatrix::from_columns(x.nrows(), columns))
    }

    /// Walk every tree without routing any rows
    pub fn vocabulary(&self, feature_names: &[String]) -> Result<LeafVocabulary> {
        let walker = TreeWalker::new(feature_names, self.prefix).with_precision(self.label_precision);
        let records = self.map_trees(|tree_index, tree| walker.walk(tree, tree_index))?;
        Ok(LeafVocabulary::from_records(records))
    }

    /// Reached leaf per row, translated into ensemble-unique names
    fn leaf_column(&self, tree_index: usize, tree: &Tree, x: ArrayView2<'_, f64>) -> Result<Vec<String>> {
        Ok(tree
            .apply(x)?
            .into_iter()
            .map(|node_id| leaf_name(self.prefix, tree_index, node_id))
            .collect())
    }

    fn map_trees<T, F>(&self, f: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(usize, &Tree) -> Result<T> + Sync + Send,
    {
        if self.parallel {
            self.ensemble
                .trees
                .par_iter()
                .enumerate()
                .map(|(i, tree)| f(i, tree))
                .collect()
        } else {
            self.ensemble
                .trees
                .iter()
                .enumerate()
                .map(|(i, tree)| f(i, tree))
                .collect()
        }
    }

    fn check_width(&self, x: ArrayView2<'_, f64>) -> Result<()> {
        let expected = self.ensemble.num_features();
        if self.ensemble.num_trees() > 0 && x.ncols() != expected {
            return Err(EncoderError::Configuration(format!(
                "Input has {} features but the ensemble was trained on {}",
                x.ncols(),
                expected
            )));
        }
        Ok(())
    }
}
