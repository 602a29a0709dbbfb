//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use serde_json::{json, Map, Value};

use clf_serve::config::{Config, Credentials};

pub const USERNAME: &str = "tester";
pub const PASSWORD: &str = "s3cret";

pub const FEATURES: [&str; 10] = [
    "mean_radius",
    "mean_texture",
    "mean_perimeter",
    "mean_area",
    "mean_smoothness",
    "mean_compactness",
    "mean_concavity",
    "mean_concave_points",
    "mean_symmetry",
    "mean_fractal_dimension",
];

pub fn credentials() -> Credentials {
    Credentials::new(USERNAME, PASSWORD)
}

/// Config pointing at the bundled model and a monitoring dir under `root`.
pub fn test_config(root: &Path, flush_threshold: usize) -> Config {
    let mut config = Config::default();
    config.model.artifact_path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("models/model.json");
    config.monitoring.storage_dir = root.join("monitoring");
    config.monitoring.flush_threshold = flush_threshold;
    config
}

/// A valid request body with `n` observations.
pub fn valid_body(n: usize) -> Value {
    let mut data = Map::new();
    for (j, name) in FEATURES.iter().enumerate() {
        let column: Vec<f64> = (0..n).map(|i| 0.1 * (i + j + 1) as f64).collect();
        data.insert(name.to_string(), json!(column));
    }
    let identifier: Vec<String> = (0..n).map(|i| format!("obs-{i}")).collect();
    json!({ "identifier": identifier, "data": data })
}

/// The single capture file written under `root`.
pub fn monitoring_file(root: &Path) -> PathBuf {
    let mut files: Vec<PathBuf> = std::fs::read_dir(root.join("monitoring"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(files.len(), 1, "expected exactly one monitoring file");
    files.pop().unwrap()
}

pub fn line_count(path: &Path) -> usize {
    std::fs::read_to_string(path).unwrap().lines().count()
}
