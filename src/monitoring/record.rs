//! Monitoring records and the group → row transform.
//!
//! The request path hands the dispatch queue one [`RecordGroup`] per accepted
//! request: the raw feature columns, the predictions, the caller identifiers
//! and a capture timestamp. The sink expands a group into one
//! [`MonitoringRecord`] per observation.

use std::collections::HashMap;

use chrono::{DateTime, Local};
use thiserror::Error;

/// Timestamp format of the `request_time` column.
pub const REQUEST_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Metadata columns appended after the feature columns.
pub const METADATA_COLUMNS: [&str; 3] = ["prediction", "identifier", "request_time"];

#[derive(Error, Debug, PartialEq)]
pub enum SinkTransformError {
    #[error("Column '{0}' is missing from the record group")]
    MissingColumn(String),

    #[error("Column '{column}' has {found} values, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        found: usize,
    },

    #[error("Record group is empty")]
    Empty,
}

/// Everything captured for one accepted prediction request.
#[derive(Debug, Clone)]
pub struct RecordGroup {
    pub features: HashMap<String, Vec<f64>>,
    pub predictions: Vec<f64>,
    pub identifiers: Vec<String>,
    pub request_time: DateTime<Local>,
}

impl RecordGroup {
    pub fn observations(&self) -> usize {
        self.predictions.len()
    }

    /// Expand the group into one record per observation, features in
    /// `schema` order.
    ///
    /// Fails without producing anything if a schema column is absent or any
    /// column disagrees with the prediction count.
    pub fn into_records(
        self,
        schema: &[String],
    ) -> Result<Vec<MonitoringRecord>, SinkTransformError> {
        let rows = self.predictions.len();
        if rows == 0 {
            return Err(SinkTransformError::Empty);
        }
        check_len("identifier", rows, self.identifiers.len())?;

        let columns = schema
            .iter()
            .map(|name| {
                let column = self
                    .features
                    .get(name)
                    .ok_or_else(|| SinkTransformError::MissingColumn(name.clone()))?;
                check_len(name, rows, column.len())?;
                Ok(column)
            })
            .collect::<Result<Vec<_>, SinkTransformError>>()?;

        let request_time = self.request_time.format(REQUEST_TIME_FORMAT).to_string();

        Ok(self
            .identifiers
            .into_iter()
            .zip(self.predictions)
            .enumerate()
            .map(|(i, (identifier, prediction))| MonitoringRecord {
                features: columns.iter().map(|c| c[i]).collect(),
                prediction,
                identifier,
                request_time: request_time.clone(),
            })
            .collect())
    }
}

fn check_len(column: &str, expected: usize, found: usize) -> Result<(), SinkTransformError> {
    if expected != found {
        return Err(SinkTransformError::LengthMismatch {
            column: column.to_string(),
            expected,
            found,
        });
    }
    Ok(())
}

/// One persisted observation.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoringRecord {
    /// Feature values in schema order.
    pub features: Vec<f64>,
    pub prediction: f64,
    pub identifier: String,
    pub request_time: String,
}

impl MonitoringRecord {
    /// Stringified values in schema-plus-metadata column order.
    pub fn to_row(&self) -> Vec<String> {
        let mut row: Vec<String> = self.features.iter().map(f64::to_string).collect();
        row.push(self.prediction.to_string());
        row.push(self.identifier.clone());
        row.push(self.request_time.clone());
        row
    }
}

/// Header row: schema feature names followed by the metadata columns.
pub fn header(schema: &[String]) -> Vec<String> {
    schema
        .iter()
        .cloned()
        .chain(METADATA_COLUMNS.iter().map(|c| c.to_string()))
        .collect()
}
