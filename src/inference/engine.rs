//! Inference engine: scores feature batches against the loaded model.
//!
//! The engine is built once at startup and never mutated afterwards, so a
//! single instance is shared read-only by every request handler.

use std::path::Path;

use thiserror::Error;
use tracing::debug;

use crate::inference::batch::{FeatureBatch, PredictionBatch};
use crate::inference::model_loader::{load_artifact, ModelArtifact, ModelArtifactError};

#[derive(Error, Debug)]
pub enum InferenceError {
    /// A declared feature is absent from the batch. Request validation
    /// should make this unreachable.
    #[error("Feature '{0}' declared by the model is missing from the batch")]
    SchemaMismatch(String),

    #[error("Feature '{feature}' has {found} values, expected {expected}")]
    RaggedBatch {
        feature: String,
        expected: usize,
        found: usize,
    },
}

/// The inference engine.
#[derive(Debug)]
pub struct InferenceEngine {
    artifact: ModelArtifact,
}

impl InferenceEngine {
    pub fn new(artifact: ModelArtifact) -> Self {
        Self { artifact }
    }

    /// Load the model artifact at `path`. Any failure here is fatal to startup.
    pub fn load(path: &Path) -> Result<Self, ModelArtifactError> {
        Ok(Self::new(load_artifact(path)?))
    }

    /// Declared feature names, in the order the model consumes them.
    pub fn feature_names(&self) -> &[String] {
        &self.artifact.feature_names
    }

    /// Assemble the batch into a row-major matrix in schema order.
    ///
    /// Columns not in the schema are ignored; that the batch carries no
    /// extras is the request validator's job.
    pub fn to_matrix(&self, batch: &FeatureBatch) -> Result<(Vec<f64>, usize), InferenceError> {
        let names = self.feature_names();
        let columns = names
            .iter()
            .map(|name| {
                batch
                    .column(name)
                    .ok_or_else(|| InferenceError::SchemaMismatch(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let rows = columns.first().map_or(0, |c| c.len());
        for (name, column) in names.iter().zip(&columns) {
            if column.len() != rows {
                return Err(InferenceError::RaggedBatch {
                    feature: name.clone(),
                    expected: rows,
                    found: column.len(),
                });
            }
        }

        let width = columns.len();
        let mut matrix = vec![0.0; rows * width];
        for (j, column) in columns.iter().enumerate() {
            for (i, value) in column.iter().enumerate() {
                matrix[i * width + j] = *value;
            }
        }
        Ok((matrix, rows))
    }

    /// Score every observation in `batch`.
    ///
    /// The output has one prediction per row, index-aligned with the input.
    pub fn predict(&self, batch: &FeatureBatch) -> Result<PredictionBatch, InferenceError> {
        let (matrix, rows) = self.to_matrix(batch)?;
        let coefficients = &self.artifact.coefficients;

        let predictions: PredictionBatch = if coefficients.is_empty() {
            vec![self.artifact.link.apply(self.artifact.intercept); rows]
        } else {
            matrix
                .chunks_exact(coefficients.len())
                .map(|row| {
                    let z = row
                        .iter()
                        .zip(coefficients)
                        .fold(self.artifact.intercept, |acc, (x, w)| acc + x * w);
                    self.artifact.link.apply(z)
                })
                .collect()
        };

        debug!(rows, "Scored batch");
        Ok(predictions)
    }
}
