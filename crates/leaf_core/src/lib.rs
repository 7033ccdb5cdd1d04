//! Gradient boosting leaf encoder
//!
//! Turns a fitted tree ensemble into a categorical feature encoder: every row
//! is routed to one leaf per tree, and the reached leaves are one-hot
//! expanded into a dense indicator matrix. Each leaf also gets a readable
//! decision-path label such as `age<=42.5 & income>1000.0`.
//!
//! Modules:
//! - `tree`: Array-backed decision trees and row routing
//! - `ensemble`: Fitted ensembles, validation and JSON persistence
//! - `walker`: Leaf enumeration and decision-path labels
//! - `featurizer`: Per-tree leaf assignment and the leaf vocabulary
//! - `expander`: One-hot expansion of leaf names
//! - `encoder`: The public fit / transform surface and persisted state
//! - `config`: Encoder settings (TOML)
//! - `artifact`: JSON files and BLAKE3 fingerprints

pub mod artifact;
pub mod config;
pub mod encoder;
pub mod ensemble;
pub mod errors;
pub mod expander;
pub mod featurizer;
pub mod tree;
pub mod walker;

pub use config::{EncoderConfig, DEFAULT_PREFIX};
pub use encoder::{EncoderState, GradientBoostingEncoder};
pub use ensemble::Ensemble;
pub use errors::{EncoderError, Result};
pub use expander::{CategorySource, OneHotExpander, UnknownPolicy};
pub use featurizer::{EnsembleFeaturizer, LeafAssignmentMatrix, LeafVocabulary};
pub use tree::{Node, Tree, TREE_LEAF, TREE_UNDEFINED};
pub use walker::{leaf_name, LeafRecord, TreeWalker};

/// Crate version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
