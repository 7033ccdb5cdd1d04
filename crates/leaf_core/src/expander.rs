//! One-hot expansion of categorical string matrices
//!
//! Every column is categorical. Each column owns an ordered category list;
//! the output has one indicator column per (column, category) pair, laid
//! out column by column. Values outside a column's categories produce an
//! all-zero block, or an error under [`UnknownPolicy::Error`].

use crate::errors::{EncoderError, Result};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// Where a column's categories come from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategorySource {
    /// Every leaf of the tree, so the width is the total leaf count
    #[default]
    Vocabulary,
    /// Only the values seen in the fit matrix, ordered by leaf node id
    Observed,
}

/// What to do with a value that was not a category at fit time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownPolicy {
    /// Emit an all-zero block for that column
    #[default]
    Ignore,
    /// Fail with [`EncoderError::UnknownCategory`]
    Error,
}

/// Sort key of a learned category
///
/// Leaf names end in `_<node_id>`; they order by that id as a number, so
/// `gbr_0_2` comes before `gbr_0_10`. Values without a numeric suffix sort
/// first, by their text.
pub fn category_order(value: &str) -> (Option<u64>, &str) {
    let node_id = value
        .rsplit_once('_')
        .and_then(|(_, suffix)| suffix.parse::<u64>().ok());
    (node_id, value)
}

/// Dense one-hot encoder over string-valued columns
#[derive(Debug, Clone, Default)]
pub struct OneHotExpander {
    handle_unknown: UnknownPolicy,
    categories: Option<Vec<Vec<String>>>,
    lookup: Vec<HashMap<String, usize>>,
    offsets: Vec<usize>,
}

impl OneHotExpander {
    pub fn new(handle_unknown: UnknownPolicy) -> Self {
        Self {
            handle_unknown,
            ..Self::default()
        }
    }

    /// Fit with explicit per-column categories
    pub fn fit_categories(&mut self, categories: Vec<Vec<String>>) -> Result<&mut Self> {
        let mut lookup = Vec::with_capacity(categories.len());
        let mut offsets = Vec::with_capacity(categories.len() + 1);
        offsets.push(0);

        for (column, values) in categories.iter().enumerate() {
            let mut index = HashMap::with_capacity(values.len());
            for (position, value) in values.iter().enumerate() {
                if index.insert(value.clone(), position).is_some() {
                    return Err(EncoderError::Configuration(format!(
                        "Duplicate category {value:?} in column {column}"
                    )));
                }
            }
            lookup.push(index);
            offsets.push(offsets[column] + values.len());
        }

        self.lookup = lookup;
        self.offsets = offsets;
        self.categories = Some(categories);
        Ok(self)
    }

    /// Learn categories from the distinct values of each column
    ///
    /// Each column's categories are sorted by [`category_order`], so the
    /// layout does not depend on row order.
    pub fn fit(&mut self, matrix: ArrayView2<'_, String>) -> Result<&mut Self> {
        let categories = matrix
            .columns()
            .into_iter()
            .map(|column| {
                let mut values: Vec<String> = column.iter().cloned().collect();
                values.sort_unstable_by(|a, b| category_order(a).cmp(&category_order(b)));
                values.dedup();
                values
            })
            .collect();
        self.fit_categories(categories)
    }

    pub fn fit_transform(&mut self, matrix: ArrayView2<'_, String>) -> Result<Array2<f64>> {
        self.fit(matrix)?;
        self.transform(matrix)
    }

    /// Expand `matrix` into a dense indicator matrix
    pub fn transform(&self, matrix: ArrayView2<'_, String>) -> Result<Array2<f64>> {
        if self.categories.is_none() {
            return Err(EncoderError::NotFitted);
        }
        if matrix.ncols() != self.lookup.len() {
            return Err(EncoderError::Shape {
                expected: self.lookup.len(),
                actual: matrix.ncols(),
            });
        }

        let mut out = Array2::zeros((matrix.nrows(), self.n_output_columns()));
        let mut unknown = 0usize;

        for ((row, column), value) in matrix.indexed_iter() {
            match self.lookup[column].get(value) {
                Some(&position) => out[[row, self.offsets[column] + position]] = 1.0,
                None => match self.handle_unknown {
                    UnknownPolicy::Ignore => unknown += 1,
                    UnknownPolicy::Error => {
                        return Err(EncoderError::UnknownCategory {
                            column,
                            value: value.clone(),
                        })
                    }
                },
            }
        }

        if unknown > 0 {
            warn!(unknown, "unknown categories encoded as all-zero blocks");
        }

        Ok(out)
    }

    pub fn is_fitted(&self) -> bool {
        self.categories.is_some()
    }

    pub fn handle_unknown(&self) -> UnknownPolicy {
        self.handle_unknown
    }

    /// Per-column categories learned during fit
    pub fn categories(&self) -> Option<&[Vec<String>]> {
        self.categories.as_deref()
    }

    /// Total number of indicator columns
    pub fn n_output_columns(&self) -> usize {
        self.offsets.last().copied().unwrap_or(0)
    }

    /// Output column range belonging to input column `column`
    pub fn column_range(&self, column: usize) -> Option<std::ops::Range<usize>> {
        Some(*self.offsets.get(column)?..*self.offsets.get(column + 1)?)
    }

    /// Names of the indicator columns, in output order
    pub fn feature_names(&self) -> Vec<String> {
        self.categories
            .iter()
            .flatten()
            .flatten()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn matrix(rows: &[&[&str]]) -> Array2<String> {
        let ncols = rows.first().map_or(0, |r| r.len());
        let flat: Vec<String> = rows.iter().flat_map(|r| r.iter().map(|s| s.to_string())).collect();
        Array2::from_shape_vec((rows.len(), ncols), flat).unwrap()
    }

    fn cats(columns: &[&[&str]]) -> Vec<Vec<String>> {
        columns
            .iter()
            .map(|c| c.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_fit_transform_sorted_categories() {
        let m = matrix(&[&["b", "y"], &["a", "x"], &["b", "y"]]);
        let mut expander = OneHotExpander::new(UnknownPolicy::Ignore);
        let out = expander.fit_transform(m.view()).unwrap();

        assert_eq!(expander.categories().unwrap(), &cats(&[&["a", "b"], &["x", "y"]])[..]);
        assert_eq!(expander.feature_names(), vec!["a", "b", "x", "y"]);
        assert_eq!(out.shape(), &[3, 4]);
        assert_eq!(out.row(0).to_vec(), vec![0.0, 1.0, 0.0, 1.0]);
        assert_eq!(out.row(1).to_vec(), vec![1.0, 0.0, 1.0, 0.0]);
        assert_eq!(out.row(2).to_vec(), vec![0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_leaf_names_sort_by_node_id() {
        let m = matrix(&[&["gbr_0_10"], &["gbr_0_2"], &["gbr_0_10"], &["gbr_0_1"]]);
        let mut expander = OneHotExpander::new(UnknownPolicy::Ignore);
        expander.fit(m.view()).unwrap();
        assert_eq!(
            expander.categories().unwrap(),
            &cats(&[&["gbr_0_1", "gbr_0_2", "gbr_0_10"]])[..]
        );
    }

    #[test]
    fn test_row_order_does_not_change_layout() {
        let forward = matrix(&[&["gbr_0_2"], &["gbr_0_1"]]);
        let backward = matrix(&[&["gbr_0_1"], &["gbr_0_2"]]);

        let mut a = OneHotExpander::new(UnknownPolicy::Ignore);
        let mut b = OneHotExpander::new(UnknownPolicy::Ignore);
        let out_a = a.fit_transform(forward.view()).unwrap();
        b.fit(backward.view()).unwrap();

        assert_eq!(a.feature_names(), b.feature_names());
        assert_eq!(out_a, array![[0.0, 1.0], [1.0, 0.0]]);
    }

    #[test]
    fn test_category_order() {
        assert!(category_order("gbr_0_2") < category_order("gbr_0_10"));
        assert!(category_order("zeta") < category_order("gbr_0_0"));
        assert_eq!(category_order("gbr_3_17"), (Some(17), "gbr_3_17"));
    }

    #[test]
    fn test_explicit_categories_fix_width() {
        let mut expander = OneHotExpander::new(UnknownPolicy::Ignore);
        expander
            .fit_categories(cats(&[&["a", "b", "c"], &["z"]]))
            .unwrap();

        let out = expander.transform(matrix(&[&["c", "z"]]).view()).unwrap();
        assert_eq!(out.row(0).to_vec(), vec![0.0, 0.0, 1.0, 1.0]);
        assert_eq!(expander.n_output_columns(), 4);
        assert_eq!(expander.column_range(1), Some(3..4));
        assert_eq!(expander.column_range(2), None);
    }

    #[test]
    fn test_unknown_ignored_as_zero_block() {
        let mut expander = OneHotExpander::new(UnknownPolicy::Ignore);
        expander.fit_categories(cats(&[&["a", "b"], &["x"]])).unwrap();

        let out = expander.transform(matrix(&[&["q", "x"]]).view()).unwrap();
        assert_eq!(out.shape(), &[1, 3]);
        assert_eq!(out.row(0).to_vec(), vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_unknown_error_policy() {
        let mut expander = OneHotExpander::new(UnknownPolicy::Error);
        expander.fit_categories(cats(&[&["a"]])).unwrap();

        let err = expander.transform(matrix(&[&["b"]]).view()).unwrap_err();
        match err {
            EncoderError::UnknownCategory { column, value } => {
                assert_eq!(column, 0);
                assert_eq!(value, "b");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_transform_before_fit() {
        let expander = OneHotExpander::new(UnknownPolicy::Ignore);
        assert!(matches!(
            expander.transform(matrix(&[&["a"]]).view()),
            Err(EncoderError::NotFitted)
        ));
    }

    #[test]
    fn test_column_count_mismatch() {
        let mut expander = OneHotExpander::new(UnknownPolicy::Ignore);
        expander.fit_categories(cats(&[&["a"], &["b"]])).unwrap();
        assert!(matches!(
            expander.transform(matrix(&[&["a"]]).view()),
            Err(EncoderError::Shape { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_duplicate_category_rejected() {
        let mut expander = OneHotExpander::new(UnknownPolicy::Ignore);
        assert!(expander.fit_categories(cats(&[&["a", "a"]])).is_err());
    }

    #[test]
    fn test_zero_columns() {
        let mut expander = OneHotExpander::new(UnknownPolicy::Ignore);
        expander.fit_categories(Vec::new()).unwrap();
        let empty = Array2::<String>::from_shape_vec((3, 0), Vec::new()).unwrap();
        let out = expander.transform(empty.view()).unwrap();
        assert_eq!(out.shape(), &[3, 0]);
    }
}
