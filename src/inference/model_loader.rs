//! Versioned model artifact loading.
//!
//! A model artifact is a JSON document describing a fitted linear model:
//! its declared feature schema, one coefficient per feature, an intercept,
//! and the link function applied to the linear predictor. Every structural
//! property the engine relies on is checked here, so a loaded
//! [`ModelArtifact`] can be trusted for the rest of the process lifetime.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Artifact format versions this build can read.
pub const SUPPORTED_FORMAT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum ModelArtifactError {
    #[error("Model artifact not found: {0}")]
    FileNotFound(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Malformed model artifact: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Unsupported artifact format version {found} (expected {})", SUPPORTED_FORMAT_VERSION)]
    UnsupportedVersion { found: u32 },

    #[error("Invalid model artifact: {0}")]
    Invalid(String),
}

/// Link function mapping the linear predictor to the model output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Link {
    /// Logistic sigmoid: the output is a predicted probability.
    Logistic,
    /// No transformation.
    Identity,
}

impl Link {
    pub fn apply(&self, z: f64) -> f64 {
        match self {
            Link::Logistic => 1.0 / (1.0 + (-z).exp()),
            Link::Identity => z,
        }
    }
}

/// A fitted linear model with its declared feature schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format_version: u32,

    /// Human-readable model name.
    #[serde(default)]
    pub name: String,

    pub link: Link,

    /// Declared feature schema, in column order.
    pub feature_names: Vec<String>,

    /// One coefficient per entry of `feature_names`.
    pub coefficients: Vec<f64>,

    pub intercept: f64,
}

impl ModelArtifact {
    /// Parse and validate an artifact from its JSON text.
    pub fn from_json(text: &str) -> Result<Self, ModelArtifactError> {
        let mut artifact: ModelArtifact = serde_json::from_str(text)?;
        artifact.normalize();
        artifact.validate()?;
        Ok(artifact)
    }

    /// Feature names may be exported with spaces ("mean radius"); the API
    /// addresses them with underscores.
    fn normalize(&mut self) {
        for name in &mut self.feature_names {
            *name = name.trim().replace(' ', "_");
        }
    }

    fn validate(&self) -> Result<(), ModelArtifactError> {
        if self.format_version != SUPPORTED_FORMAT_VERSION {
            return Err(ModelArtifactError::UnsupportedVersion {
                found: self.format_version,
            });
        }
        if self.feature_names.is_empty() {
            return Err(ModelArtifactError::Invalid(
                "feature schema is empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for name in &self.feature_names {
            if name.is_empty() {
                return Err(ModelArtifactError::Invalid(
                    "feature name is empty".to_string(),
                ));
            }
            if !seen.insert(name.as_str()) {
                return Err(ModelArtifactError::Invalid(format!(
                    "duplicate feature name '{name}'"
                )));
            }
        }

        if self.coefficients.len() != self.feature_names.len() {
            return Err(ModelArtifactError::Invalid(format!(
                "{} coefficients for {} features",
                self.coefficients.len(),
                self.feature_names.len()
            )));
        }
        if !self.intercept.is_finite() || self.coefficients.iter().any(|c| !c.is_finite()) {
            return Err(ModelArtifactError::Invalid(
                "model parameters must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load a model artifact from disk.
pub fn load_artifact(path: &Path) -> Result<ModelArtifact, ModelArtifactError> {
    if !path.exists() {
        return Err(ModelArtifactError::FileNotFound(path.display().to_string()));
    }

    let text = std::fs::read_to_string(path)?;
    let artifact = ModelArtifact::from_json(&text)?;

    info!(
        path = %path.display(),
        name = artifact.name,
        link = ?artifact.link,
        features = artifact.feature_names.len(),
        "Loaded model artifact"
    );

    Ok(artifact)
}
