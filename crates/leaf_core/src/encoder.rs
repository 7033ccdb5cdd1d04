//! Gradient boosting leaf encoder
//!
//! [`GradientBoostingEncoder`] combines the pieces of this crate:
//! - [`EnsembleFeaturizer`] maps rows to leaf names, one per tree
//! - [`LeafVocabulary`] is learned once by walking every tree during fit
//! - [`OneHotExpander`] turns the leaf names into a dense indicator matrix
//!
//! The fitted state can be persisted as JSON and restored against the same
//! ensemble. Restoring re-walks the ensemble and rejects a state whose
//! vocabulary or categories do not match it.
//!
//! # Usage
//!
//! ```rust,no_run
//! use gbleaf_core::{Ensemble, EncoderConfig, GradientBoostingEncoder};
//! use ndarray::array;
//!
//! let ensemble = Ensemble::load_json("model.json").unwrap();
//! let config = EncoderConfig::default().with_feature_names(["age", "income"]);
//! let mut encoder = GradientBoostingEncoder::new(ensemble, config).unwrap();
//!
//! let x = array![[31.0, 1200.0], [58.0, 800.0]];
//! let encoded = encoder.fit_transform(x.view()).unwrap();
//! for name in encoder.classes().unwrap() {
//!     println!("{name}: {}", encoder.class_maps().unwrap()[name]);
//! }
//! # let _ = encoded;
//! ```

use crate::artifact::{read_json, write_json};
use crate::config::EncoderConfig;
use crate::ensemble::Ensemble;
use crate::errors::{EncoderError, Result};
use crate::expander::{CategorySource, OneHotExpander};
use crate::featurizer::{EnsembleFeaturizer, LeafAssignmentMatrix, LeafVocabulary};
use crate::walker::default_feature_names;
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument};

/// Persisted encoder state format version
pub const STATE_VERSION: i32 = 1;

/// Everything learned by `fit`, in serializable form
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncoderState {
    pub version: i32,
    /// Configuration with the resolved feature names
    pub config: EncoderConfig,
    pub vocabulary: LeafVocabulary,
    /// Per-tree categories of the expander
    pub categories: Vec<Vec<String>>,
    /// Hash of the ensemble the state was fitted against
    pub ensemble_hash: String,
}

impl EncoderState {
    /// Compact JSON document; equal states give identical strings
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_json(path.as_ref(), self)?;
        info!("Encoder state saved to: {}", path.as_ref().display());
        Ok(())
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let state: EncoderState = read_json(path.as_ref())?;
        if state.version != STATE_VERSION {
            return Err(EncoderError::Structural(format!(
                "Unsupported encoder state version: {}",
                state.version
            )));
        }
        state.vocabulary.validate()?;
        Ok(state)
    }
}

#[derive(Debug, Clone)]
struct Fitted {
    vocabulary: LeafVocabulary,
    expander: OneHotExpander,
}

/// Encodes rows as one-hot indicators of the leaves they reach
#[derive(Debug, Clone)]
pub struct GradientBoostingEncoder {
    ensemble: Arc<Ensemble>,
    config: EncoderConfig,
    feature_names: Vec<String>,
    ensemble_hash: String,
    fitted: Option<Fitted>,
}

impl GradientBoostingEncoder {
    /// Create an unfitted encoder
    ///
    /// The ensemble is validated and the feature-name table must have exactly
    /// one entry per feature the ensemble reports.
    pub fn new(ensemble: impl Into<Arc<Ensemble>>, config: EncoderConfig) -> Result<Self> {
        let ensemble = ensemble.into();
        ensemble.validate()?;
        config.validate()?;

        let feature_names = match &config.feature_names {
            Some(names) => names.clone(),
            None => default_feature_names(ensemble.num_features()),
        };

        if feature_names.len() != ensemble.num_features() {
            return Err(EncoderError::Configuration(format!(
                "{} feature names given but the ensemble reports {} features",
                feature_names.len(),
                ensemble.num_features()
            )));
        }

        let ensemble_hash = ensemble.hash_hex()?;

        Ok(Self {
            ensemble,
            config,
            feature_names,
            ensemble_hash,
            fitted: None,
        })
    }

    /// Restore a fitted encoder from persisted state
    ///
    /// The state must come from the same ensemble (checked by fingerprint)
    /// and its vocabulary and categories must match a fresh walk of it.
    pub fn from_state(ensemble: impl Into<Arc<Ensemble>>, state: EncoderState) -> Result<Self> {
        let mut encoder = Self::new(ensemble, state.config)?;

        if encoder.ensemble_hash != state.ensemble_hash {
            return Err(EncoderError::StateMismatch {
                expected: state.ensemble_hash,
                actual: encoder.ensemble_hash,
            });
        }

        let vocabulary = encoder.featurizer().vocabulary(&encoder.feature_names)?;
        if vocabulary != state.vocabulary {
            return Err(EncoderError::Structural(
                "Encoder state vocabulary does not match the leaves of the ensemble".to_string(),
            ));
        }
        check_categories(&vocabulary, &state.categories, encoder.config.categories)?;

        let mut expander = OneHotExpander::new(encoder.config.handle_unknown);
        expander.fit_categories(state.categories)?;
        encoder.fitted = Some(Fitted {
            vocabulary,
            expander,
        });

        Ok(encoder)
    }

    /// Load persisted state from `path` and restore against `ensemble`
    pub fn load_state<P: AsRef<Path>>(ensemble: impl Into<Arc<Ensemble>>, path: P) -> Result<Self> {
        Self::from_state(ensemble, EncoderState::load_json(path)?)
    }

    /// Learn the leaf vocabulary and expander categories from `x`
    pub fn fit(&mut self, x: ArrayView2<'_, f64>) -> Result<&mut Self> {
        self.fit_transform(x)?;
        Ok(self)
    }

    /// Fit on `x` and return its indicator matrix
    #[instrument(skip_all, fields(rows = x.nrows()))]
    pub fn fit_transform(&mut self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        let (vocabulary, leaves) = self
            .featurizer()
            .fit_featurize(x, &self.feature_names)?;

        let mut expander = OneHotExpander::new(self.config.handle_unknown);
        let encoded = match self.config.categories {
            CategorySource::Vocabulary => {
                expander.fit_categories(vocabulary.per_tree())?;
                expander.transform(leaves.view())?
            }
            CategorySource::Observed => expander.fit_transform(leaves.view())?,
        };

        info!(
            trees = self.ensemble.num_trees(),
            leaves = vocabulary.len(),
            columns = encoded.ncols(),
            "encoder fitted"
        );

        self.fitted = Some(Fitted {
            vocabulary,
            expander,
        });
        Ok(encoded)
    }

    /// Indicator matrix of `x` using the vocabulary learned during fit
    #[instrument(skip_all, fields(rows = x.nrows()))]
    pub fn transform(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        let fitted = self.fitted.as_ref().ok_or(EncoderError::NotFitted)?;
        let leaves = self.featurizer().featurize(x)?;
        fitted.expander.transform(leaves.view())
    }

    /// Leaf names reached by each row, without expansion
    pub fn apply(&self, x: ArrayView2<'_, f64>) -> Result<LeafAssignmentMatrix> {
        self.featurizer().featurize(x)
    }

    /// Ordered leaf-name vocabulary
    pub fn classes(&self) -> Result<&[String]> {
        Ok(self.fitted()?.vocabulary.names())
    }

    /// Leaf name to decision-path label
    pub fn class_maps(&self) -> Result<&BTreeMap<String, String>> {
        Ok(self.fitted()?.vocabulary.labels())
    }

    pub fn vocabulary(&self) -> Result<&LeafVocabulary> {
        Ok(&self.fitted()?.vocabulary)
    }

    /// Names of the output indicator columns
    pub fn output_feature_names(&self) -> Result<Vec<String>> {
        Ok(self.fitted()?.expander.feature_names())
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// Resolved input feature names
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    pub fn ensemble(&self) -> &Ensemble {
        &self.ensemble
    }

    /// Snapshot of the learned state
    pub fn state(&self) -> Result<EncoderState> {
        let fitted = self.fitted()?;
        let categories = fitted
            .expander
            .categories()
            .map(<[Vec<String>]>::to_vec)
            .ok_or(EncoderError::NotFitted)?;

        let mut config = self.config.clone();
        config.feature_names = Some(self.feature_names.clone());

        Ok(EncoderState {
            version: STATE_VERSION,
            config,
            vocabulary: fitted.vocabulary.clone(),
            categories,
            ensemble_hash: self.ensemble_hash.clone(),
        })
    }

    pub fn save_state<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.state()?.save_json(path)
    }

    fn fitted(&self) -> Result<&Fitted> {
        self.fitted.as_ref().ok_or(EncoderError::NotFitted)
    }

    fn featurizer(&self) -> EnsembleFeaturizer<'_> {
        EnsembleFeaturizer::new(&self.ensemble, &self.config.prefix)
            .with_parallel(self.config.parallel)
            .with_label_precision(self.config.label_precision)
    }
}

/// Persisted expander categories must be leaves of their own tree; with
/// [`CategorySource::Vocabulary`] they must be exactly those leaves.
fn check_categories(
    vocabulary: &LeafVocabulary,
    categories: &[Vec<String>],
    source: CategorySource,
) -> Result<()> {
    if categories.len() != vocabulary.num_trees() {
        return Err(EncoderError::Shape {
            expected: vocabulary.num_trees(),
            actual: categories.len(),
        });
    }

    for (tree_index, column) in categories.iter().enumerate() {
        let leaves = vocabulary.tree_leaves(tree_index);
        let consistent = match source {
            CategorySource::Vocabulary => column.as_slice() == leaves,
            CategorySource::Observed => column.iter().all(|c| leaves.contains(c)),
        };
        if !consistent {
            return Err(EncoderError::Structural(format!(
                "Encoder state categories of column {tree_index} are not leaves of tree {tree_index}"
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expander::UnknownPolicy;
    use crate::tree::{Node, Tree};
    use ndarray::array;

    /// Tree 0 splits once on feature 0, tree 1 is a single leaf
    fn two_tree_ensemble() -> Ensemble {
        let tree0 = Tree::from_nodes(&[
            Node::split(0, 0.5, 1, 2),
            Node::leaf(-1.0),
            Node::leaf(1.0),
        ]);
        Ensemble::new(vec![tree0, Tree::stump(0.1)], vec![1.0])
    }

    #[test]
    fn test_two_tree_scenario() {
        let mut encoder =
            GradientBoostingEncoder::new(two_tree_ensemble(), EncoderConfig::default()).unwrap();
        let x = array![[0.1], [0.9], [0.3]];
        let out = encoder.fit_transform(x.view()).unwrap();

        assert_eq!(encoder.classes().unwrap(), &["gbr_0_1", "gbr_0_2", "gbr_1_0"]);
        assert_eq!(out.shape(), &[3, 3]);
        assert_eq!(out, array![[1.0, 0.0, 1.0], [0.0, 1.0, 1.0], [1.0, 0.0, 1.0]]);

        let labels = encoder.class_maps().unwrap();
        assert_eq!(labels["gbr_0_1"], "feature_0<=0.5");
        assert_eq!(labels["gbr_0_2"], "feature_0>0.5");
        assert_eq!(labels["gbr_1_0"], "");
    }

    #[test]
    fn test_transform_before_fit() {
        let encoder =
            GradientBoostingEncoder::new(two_tree_ensemble(), EncoderConfig::default()).unwrap();
        let x = array![[0.1]];
        assert!(matches!(encoder.transform(x.view()), Err(EncoderError::NotFitted)));
        assert!(matches!(encoder.classes(), Err(EncoderError::NotFitted)));
        assert!(matches!(encoder.state(), Err(EncoderError::NotFitted)));
        assert!(!encoder.is_fitted());
    }

    #[test]
    fn test_fit_then_transform_identical() {
        let mut encoder =
            GradientBoostingEncoder::new(two_tree_ensemble(), EncoderConfig::default()).unwrap();
        let x = array![[0.1], [0.9], [0.5], [7.0]];
        let fitted = encoder.fit_transform(x.view()).unwrap();
        let transformed = encoder.transform(x.view()).unwrap();
        assert_eq!(fitted, transformed);
    }

    #[test]
    fn test_vocabulary_width_includes_unvisited_leaves() {
        let mut encoder =
            GradientBoostingEncoder::new(two_tree_ensemble(), EncoderConfig::default()).unwrap();
        // Every row goes left in tree 0; the right leaf still gets a column.
        let out = encoder.fit_transform(array![[0.0], [0.2]].view()).unwrap();
        assert_eq!(out.ncols(), 3);
        assert_eq!(out.column(1).sum(), 0.0);

        let new_rows = encoder.transform(array![[0.8]].view()).unwrap();
        assert_eq!(new_rows, array![[0.0, 1.0, 1.0]]);
    }

    #[test]
    fn test_observed_categories_zero_unseen_leaf() {
        let config = EncoderConfig::default().with_categories(CategorySource::Observed);
        let mut encoder = GradientBoostingEncoder::new(two_tree_ensemble(), config).unwrap();

        let out = encoder.fit_transform(array![[0.0], [0.2]].view()).unwrap();
        assert_eq!(out.shape(), &[2, 2]);

        // Right leaf of tree 0 never occurred during fit: zero block, same width.
        let new_rows = encoder.transform(array![[0.8], [0.1]].view()).unwrap();
        assert_eq!(new_rows, array![[0.0, 1.0], [1.0, 1.0]]);
        assert_eq!(encoder.classes().unwrap().len(), 3);
    }

    #[test]
    fn test_observed_categories_follow_node_order() {
        let config = EncoderConfig::default().with_categories(CategorySource::Observed);
        let mut encoder = GradientBoostingEncoder::new(two_tree_ensemble(), config).unwrap();

        // First row reaches the right leaf; columns still go left leaf first.
        let out = encoder.fit_transform(array![[0.9], [0.1]].view()).unwrap();
        assert_eq!(
            encoder.output_feature_names().unwrap(),
            vec!["gbr_0_1", "gbr_0_2", "gbr_1_0"]
        );
        assert_eq!(out, array![[0.0, 1.0, 1.0], [1.0, 0.0, 1.0]]);
    }

    #[test]
    fn test_observed_categories_error_policy() {
        let config = EncoderConfig::default()
            .with_categories(CategorySource::Observed)
            .with_handle_unknown(UnknownPolicy::Error);
        let mut encoder = GradientBoostingEncoder::new(two_tree_ensemble(), config).unwrap();
        encoder.fit(array![[0.0]].view()).unwrap();

        assert!(matches!(
            encoder.transform(array![[0.8]].view()),
            Err(EncoderError::UnknownCategory { column: 0, .. })
        ));
    }

    #[test]
    fn test_feature_name_count_must_match() {
        let config = EncoderConfig::default().with_feature_names(Vec::<String>::new());
        assert!(matches!(
            GradientBoostingEncoder::new(two_tree_ensemble(), config),
            Err(EncoderError::Configuration(_))
        ));

        let config = EncoderConfig::default().with_feature_names(["a", "b"]);
        assert!(matches!(
            GradientBoostingEncoder::new(two_tree_ensemble(), config),
            Err(EncoderError::Configuration(_))
        ));
    }

    #[test]
    fn test_custom_names_and_prefix() {
        let config = EncoderConfig::default()
            .with_prefix("leaf")
            .with_feature_names(["score"]);
        let mut encoder = GradientBoostingEncoder::new(two_tree_ensemble(), config).unwrap();
        encoder.fit(array![[1.0]].view()).unwrap();

        assert_eq!(encoder.classes().unwrap()[0], "leaf_0_1");
        assert_eq!(encoder.class_maps().unwrap()["leaf_0_2"], "score>0.5");
        assert_eq!(
            encoder.output_feature_names().unwrap(),
            vec!["leaf_0_1", "leaf_0_2", "leaf_1_0"]
        );
    }

    #[test]
    fn test_apply_returns_leaf_names() {
        let encoder =
            GradientBoostingEncoder::new(two_tree_ensemble(), EncoderConfig::default()).unwrap();
        let leaves = encoder.apply(array![[0.9]].view()).unwrap();
        assert_eq!(leaves.row(0).to_vec(), vec!["gbr_0_2", "gbr_1_0"]);
    }

    #[test]
    fn test_state_round_trip() {
        let mut encoder =
            GradientBoostingEncoder::new(two_tree_ensemble(), EncoderConfig::default()).unwrap();
        let x = array![[0.1], [0.9]];
        let expected = encoder.fit_transform(x.view()).unwrap();

        let state = encoder.state().unwrap();
        assert_eq!(state.config.feature_names, Some(vec!["feature_0".to_string()]));

        let restored = GradientBoostingEncoder::from_state(two_tree_ensemble(), state).unwrap();
        assert_eq!(restored.transform(x.view()).unwrap(), expected);
        assert_eq!(restored.classes().unwrap(), encoder.classes().unwrap());
    }

    #[test]
    fn test_state_rejects_other_ensemble() {
        let mut encoder =
            GradientBoostingEncoder::new(two_tree_ensemble(), EncoderConfig::default()).unwrap();
        encoder.fit(array![[0.1]].view()).unwrap();
        let state = encoder.state().unwrap();

        let mut other = two_tree_ensemble();
        other.trees[0].threshold[0] = 0.75;
        assert!(matches!(
            GradientBoostingEncoder::from_state(other, state),
            Err(EncoderError::StateMismatch { .. })
        ));
    }

    #[test]
    fn test_state_rejects_edited_categories() {
        let mut encoder =
            GradientBoostingEncoder::new(two_tree_ensemble(), EncoderConfig::default()).unwrap();
        encoder.fit(array![[0.1]].view()).unwrap();

        let mut state = encoder.state().unwrap();
        state.categories[0].reverse();
        assert!(matches!(
            GradientBoostingEncoder::from_state(two_tree_ensemble(), state.clone()),
            Err(EncoderError::Structural(_))
        ));

        state.categories.pop();
        assert!(matches!(
            GradientBoostingEncoder::from_state(two_tree_ensemble(), state),
            Err(EncoderError::Shape { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_state_rejects_edited_vocabulary() {
        let mut encoder =
            GradientBoostingEncoder::new(two_tree_ensemble(), EncoderConfig::default()).unwrap();
        encoder.fit(array![[0.1]].view()).unwrap();

        let mut state = encoder.state().unwrap();
        state.config.prefix = "other".to_string();
        assert!(matches!(
            GradientBoostingEncoder::from_state(two_tree_ensemble(), state),
            Err(EncoderError::Structural(_))
        ));
    }

    #[test]
    fn test_observed_state_round_trip() {
        let config = EncoderConfig::default().with_categories(CategorySource::Observed);
        let mut encoder = GradientBoostingEncoder::new(two_tree_ensemble(), config).unwrap();
        encoder.fit(array![[0.1]].view()).unwrap();

        let mut state = encoder.state().unwrap();
        assert_eq!(state.categories, vec![vec!["gbr_0_1"], vec!["gbr_1_0"]]);

        let restored =
            GradientBoostingEncoder::from_state(two_tree_ensemble(), state.clone()).unwrap();
        assert_eq!(
            restored.transform(array![[0.9]].view()).unwrap(),
            array![[0.0, 1.0]]
        );

        state.categories[1] = vec!["gbr_0_2".to_string()];
        assert!(matches!(
            GradientBoostingEncoder::from_state(two_tree_ensemble(), state),
            Err(EncoderError::Structural(_))
        ));
    }

    #[test]
    fn test_empty_ensemble_encodes_to_zero_columns() {
        let mut encoder =
            GradientBoostingEncoder::new(Ensemble::new(vec![], vec![]), EncoderConfig::default())
                .unwrap();
        let out = encoder.fit_transform(array![[1.0, 2.0], [3.0, 4.0]].view()).unwrap();
        assert_eq!(out.shape(), &[2, 0]);
        assert!(encoder.classes().unwrap().is_empty());
    }

    #[test]
    fn test_parallel_encoder_matches_sequential() {
        let x = array![[0.1], [0.9], [0.4]];
        let mut sequential =
            GradientBoostingEncoder::new(two_tree_ensemble(), EncoderConfig::default()).unwrap();
        let mut parallel = GradientBoostingEncoder::new(
            two_tree_ensemble(),
            EncoderConfig::default().with_parallel(true),
        )
        .unwrap();

        assert_eq!(
            sequential.fit_transform(x.view()).unwrap(),
            parallel.fit_transform(x.view()).unwrap()
        );
        assert_eq!(sequential.classes().unwrap(), parallel.classes().unwrap());
    }
}
