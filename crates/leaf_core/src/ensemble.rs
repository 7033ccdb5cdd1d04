//! Fitted tree ensembles
//!
//! An [`Ensemble`] is the read-only collection of regression trees produced
//! by a gradient boosting learner, plus the metadata the encoder needs:
//! - the feature-importance vector, whose length is the trained feature count
//! - the additive prediction parameters (`learning_rate`, `init`)
//! - JSON persistence and a BLAKE3 fingerprint

use crate::artifact::{fingerprint_hex, read_json, write_json};
use crate::errors::{EncoderError, Result};
use crate::tree::Tree;
use ndarray::{Array1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Current on-disk format version
pub const FORMAT_VERSION: i32 = 1;

fn default_version() -> i32 {
    FORMAT_VERSION
}

fn default_learning_rate() -> f64 {
    1.0
}

/// Ordered sequence of fitted trees (the "estimators")
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ensemble {
    /// Model format version
    #[serde(default = "default_version")]
    pub version: i32,

    /// Member trees in boosting order
    pub trees: Vec<Tree>,

    /// One importance per input feature the ensemble was trained on
    pub feature_importances: Vec<f64>,

    /// Shrinkage applied to every tree's output
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,

    /// Initial (baseline) prediction
    #[serde(default)]
    pub init: f64,
}

impl Ensemble {
    /// Create an ensemble with unit learning rate and zero baseline
    pub fn new(trees: Vec<Tree>, feature_importances: Vec<f64>) -> Self {
        Self {
            version: FORMAT_VERSION,
            trees,
            feature_importances,
            learning_rate: 1.0,
            init: 0.0,
        }
    }

    /// Set the additive prediction parameters
    pub fn with_boosting(mut self, learning_rate: f64, init: f64) -> Self {
        self.learning_rate = learning_rate;
        self.init = init;
        self
    }

    /// Number of trees in the ensemble
    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    /// Feature count reported by the learner (length of the importance vector)
    pub fn num_features(&self) -> usize {
        self.feature_importances.len()
    }

    /// Largest split feature index used by any tree
    pub fn max_feature_index(&self) -> Option<usize> {
        self.trees.iter().filter_map(Tree::max_feature_index).max()
    }

    /// Total number of leaves across all trees
    pub fn total_leaves(&self) -> usize {
        self.trees.iter().map(Tree::leaf_count).sum()
    }

    /// Validate every tree and the reported feature count
    ///
    /// The importance vector length is only an ensemble-wide count, so it is
    /// checked against the split features the trees actually reference.
    pub fn validate(&self) -> Result<()> {
        if self.version != FORMAT_VERSION {
            return Err(EncoderError::Structural(format!(
                "Unsupported model version: {}",
                self.version
            )));
        }

        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate().map_err(|e| {
                EncoderError::Structural(format!("Tree {} validation failed: {}", i, e))
            })?;
        }

        if let Some(max_feature) = self.max_feature_index() {
            if max_feature >= self.num_features() {
                return Err(EncoderError::Configuration(format!(
                    "Trees split on feature {} but the ensemble reports {} features",
                    max_feature,
                    self.num_features()
                )));
            }
        }

        Ok(())
    }

    /// Additive prediction: `init + learning_rate * sum(leaf values)`
    pub fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        let mut out = Array1::from_elem(x.nrows(), self.init);

        for (tree_index, tree) in self.trees.iter().enumerate() {
            if tree.value.is_empty() {
                return Err(EncoderError::Configuration(format!(
                    "Tree {tree_index} carries no leaf values"
                )));
            }
            for (row, leaf) in tree.apply(x)?.into_iter().enumerate() {
                out[row] += self.learning_rate * tree.value[leaf];
            }
        }

        Ok(out)
    }

    /// BLAKE3 fingerprint of the serialized ensemble, hex encoded
    ///
    /// Any change to a tree array or to the boosting parameters changes it.
    pub fn hash_hex(&self) -> Result<String> {
        fingerprint_hex(self)
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_json(path.as_ref(), self)
    }

    /// Load and validate an ensemble from a JSON file
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let ensemble: Ensemble = read_json(path.as_ref())?;
        ensemble.validate()?;
        info!(
            "Loaded ensemble from {}: {} trees, {} features, {} leaves",
            path.as_ref().display(),
            ensemble.num_trees(),
            ensemble.num_features(),
            ensemble.total_leaves()
        );
        Ok(ensemble)
    }
}
