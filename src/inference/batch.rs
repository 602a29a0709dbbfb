//! Feature and prediction batches.

use std::collections::HashMap;

/// Named, equal-length numeric columns for one request's observations.
///
/// Key order carries no meaning; the engine assembles rows in the model's
/// declared schema order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureBatch {
    columns: HashMap<String, Vec<f64>>,
}

impl FeatureBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or replace) a feature column.
    pub fn insert(&mut self, name: impl Into<String>, values: Vec<f64>) {
        self.columns.insert(name.into(), values);
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    /// Number of observations, taken from the longest column.
    pub fn len(&self) -> usize {
        self.columns.values().map(Vec::len).max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_columns(self) -> HashMap<String, Vec<f64>> {
        self.columns
    }
}

impl FromIterator<(String, Vec<f64>)> for FeatureBatch {
    fn from_iter<I: IntoIterator<Item = (String, Vec<f64>)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}

/// Predictions index-aligned with the rows of a [`FeatureBatch`].
pub type PredictionBatch = Vec<f64>;
