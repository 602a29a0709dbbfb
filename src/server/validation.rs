//! Request body validation for `POST /inference`.
//!
//! The body is checked against the expected shape in a single pass that
//! records every violation rather than stopping at the first one:
//!
//! ```text
//! {"identifier": [string, ...N], "data": {<schema feature>: [number, ...N], ...}}
//! ```
//!
//! No keys beyond `identifier` and `data` are accepted, and `data` must carry
//! exactly the model's declared features. All lists must be non-empty and of
//! the same length.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::inference::batch::FeatureBatch;

/// One entry in a 422 response's `errors` list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldViolation {
    pub field_name: String,
    pub error_msg: String,
    pub value_received: Value,
    pub expected_type: String,
}

impl FieldViolation {
    fn new(field: &str, msg: impl Into<String>, value: Value, kind: &str) -> Self {
        Self {
            field_name: field.to_string(),
            error_msg: msg.into(),
            value_received: value,
            expected_type: kind.to_string(),
        }
    }

    /// The body could not be read within `limit` bytes.
    pub fn body_too_large(limit: usize) -> Self {
        Self::new(
            "body",
            format!("Request body could not be read within the {limit} byte limit"),
            Value::Null,
            "body_too_large",
        )
    }
}

/// A body that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceRequest {
    pub identifier: Vec<String>,
    pub data: FeatureBatch,
}

impl InferenceRequest {
    pub fn observations(&self) -> usize {
        self.identifier.len()
    }
}

const IDENTIFIER: &str = "identifier";
const DATA: &str = "data";

/// Validate a raw request body against the model's feature schema.
pub fn validate_inference_request(
    body: &[u8],
    schema: &[String],
) -> Result<InferenceRequest, Vec<FieldViolation>> {
    let value: Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(e) => {
            return Err(vec![FieldViolation::new(
                "body",
                format!("JSON decode error: {e}"),
                Value::String(String::from_utf8_lossy(body).into_owned()),
                "json_invalid",
            )])
        }
    };

    let root = match value {
        Value::Object(root) => root,
        other => {
            return Err(vec![FieldViolation::new(
                "body",
                "Input should be a valid dictionary or object",
                other,
                "model_type",
            )])
        }
    };

    let mut violations = Vec::new();
    reject_extra_keys(&root, |k| k == IDENTIFIER || k == DATA, &mut violations);

    // (name, list) pairs whose lengths take part in the equal-length check,
    // features in schema order with the identifier last.
    let mut lists: Vec<(&str, &Vec<Value>)> = Vec::new();
    let mut features: Vec<(&str, Vec<f64>)> = Vec::new();

    match root.get(DATA) {
        None => violations.push(missing(DATA, &root)),
        Some(Value::Object(data)) => {
            reject_extra_keys(data, |k| schema.iter().any(|s| s == k), &mut violations);
            for name in schema {
                match data.get(name) {
                    None => violations.push(missing(name, data)),
                    Some(value) => {
                        if let Some(items) = expect_list(name, value, &mut violations) {
                            lists.push((name.as_str(), items));
                            if let Some(column) = parse_floats(name, items, &mut violations) {
                                features.push((name.as_str(), column));
                            }
                        }
                    }
                }
            }
        }
        Some(other) => violations.push(FieldViolation::new(
            DATA,
            "Input should be a valid dictionary or object",
            other.clone(),
            "model_type",
        )),
    }

    let mut identifier = None;
    match root.get(IDENTIFIER) {
        None => violations.push(missing(IDENTIFIER, &root)),
        Some(value) => {
            if let Some(items) = expect_list(IDENTIFIER, value, &mut violations) {
                lists.push((IDENTIFIER, items));
                identifier = parse_strings(items, &mut violations);
            }
        }
    }

    check_lengths(&lists, &mut violations);

    match (violations.is_empty(), identifier) {
        (true, Some(identifier)) => Ok(InferenceRequest {
            identifier,
            data: features
                .into_iter()
                .map(|(name, column)| (name.to_string(), column))
                .collect(),
        }),
        _ => Err(violations),
    }
}

fn missing(field: &str, parent: &Map<String, Value>) -> FieldViolation {
    FieldViolation::new(field, "Field required", Value::Object(parent.clone()), "missing")
}

fn reject_extra_keys(
    object: &Map<String, Value>,
    allowed: impl Fn(&str) -> bool,
    violations: &mut Vec<FieldViolation>,
) {
    for (key, value) in object {
        if !allowed(key) {
            violations.push(FieldViolation::new(
                key,
                "Extra inputs are not permitted",
                value.clone(),
                "extra_forbidden",
            ));
        }
    }
}

fn expect_list<'a>(
    field: &str,
    value: &'a Value,
    violations: &mut Vec<FieldViolation>,
) -> Option<&'a Vec<Value>> {
    match value {
        Value::Array(items) => Some(items),
        other => {
            violations.push(FieldViolation::new(
                field,
                "Input should be a valid list",
                other.clone(),
                "list_type",
            ));
            None
        }
    }
}

fn parse_floats(
    field: &str,
    items: &[Value],
    violations: &mut Vec<FieldViolation>,
) -> Option<Vec<f64>> {
    let before = violations.len();
    let values: Vec<f64> = items
        .iter()
        .enumerate()
        .filter_map(|(i, item)| {
            let parsed = lax_float(item);
            if parsed.is_none() {
                violations.push(FieldViolation::new(
                    field,
                    format!("Input should be a valid number (index {i})"),
                    item.clone(),
                    "float_type",
                ));
            }
            parsed
        })
        .collect();
    (violations.len() == before).then_some(values)
}

/// JSON numbers, or strings holding a finite decimal number ("12.5").
fn lax_float(item: &Value) -> Option<f64> {
    match item {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

fn parse_strings(items: &[Value], violations: &mut Vec<FieldViolation>) -> Option<Vec<String>> {
    let before = violations.len();
    let values: Vec<String> = items
        .iter()
        .enumerate()
        .filter_map(|(i, item)| match item {
            Value::String(s) => Some(s.clone()),
            other => {
                violations.push(FieldViolation::new(
                    IDENTIFIER,
                    format!("Input should be a valid string (index {i})"),
                    other.clone(),
                    "string_type",
                ));
                None
            }
        })
        .collect();
    (violations.len() == before).then_some(values)
}

/// Empty lists are reported individually. Among the rest, the most common
/// length wins (ties go to the earliest list) and every list that differs
/// from it is reported.
fn check_lengths(lists: &[(&str, &Vec<Value>)], violations: &mut Vec<FieldViolation>) {
    let mut counts: Vec<(usize, usize)> = Vec::new();
    for (name, items) in lists {
        if items.is_empty() {
            violations.push(FieldViolation::new(
                name,
                "List should have at least 1 item after validation, not 0",
                Value::Array(Vec::new()),
                "too_short",
            ));
            continue;
        }
        match counts.iter_mut().find(|(len, _)| *len == items.len()) {
            Some((_, count)) => *count += 1,
            None => counts.push((items.len(), 1)),
        }
    }

    let mut reference: Option<(usize, usize)> = None;
    for &(len, count) in &counts {
        if reference.map_or(true, |(_, best)| count > best) {
            reference = Some((len, count));
        }
    }
    let Some((expected, _)) = reference else {
        return;
    };

    for (name, items) in lists {
        if !items.is_empty() && items.len() != expected {
            violations.push(FieldViolation::new(
                name,
                format!(
                    "List has {} items, expected {expected} to match the other lists",
                    items.len()
                ),
                Value::Array(items.to_vec()),
                "length_mismatch",
            ));
        }
    }
}
