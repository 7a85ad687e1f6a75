//! # Structured Validation
//!
//! Declarative request validation independent of the compile-time request
//! types: a [`Schema`] maps field names to ordered [`Rule`] lists and
//! [`validate`] evaluates it against a JSON payload.
//!
//! ## Semantics
//!
//! - Nested objects are flattened to dot-path keys first
//!   (`{"profile": {"bio": "hi"}}` → `profile.bio`), so schemas are always
//!   flat. Arrays are leaves and are never recursed into.
//! - Every rule of a field runs, even after an earlier one failed; a field can
//!   contribute several messages.
//! - Rules other than [`Rule::Required`] skip empty values.
//! - The report is valid exactly when it carries no errors.

mod rules;
pub mod schemas;

use serde::Serialize;
use serde_json::{Map, Value};

pub use rules::{is_empty, Rule, RuleFn};

/// Ordered field → rules mapping.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<(String, Vec<Rule>)>,
}

impl Schema {
    /// An empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field and its rules. Field names may be dot-paths.
    pub fn field(mut self, name: impl Into<String>, rules: impl IntoIterator<Item = Rule>) -> Self {
        self.fields.push((name.into(), rules.into_iter().collect()));
        self
    }

    /// Iterate fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &[Rule])> {
        self.fields.iter().map(|(n, r)| (n.as_str(), r.as_slice()))
    }

    /// Whether the schema names `field`.
    pub fn contains(&self, field: &str) -> bool {
        self.fields.iter().any(|(n, _)| n == field)
    }
}

/// Outcome of evaluating a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }

    /// `Ok(())` when valid, otherwise the collected messages.
    pub fn into_result(self) -> Result<(), Vec<String>> {
        if self.is_valid {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

/// Flatten nested objects into dot-path keys.
///
/// A non-object root flattens to an empty map. Empty nested objects vanish.
pub fn flatten(value: &Value) -> Map<String, Value> {
    let mut out = Map::new();
    if let Value::Object(map) = value {
        flatten_into(map, "", &mut out);
    }
    out
}

fn flatten_into(map: &Map<String, Value>, prefix: &str, out: &mut Map<String, Value>) {
    for (key, value) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Object(inner) => flatten_into(inner, &path, out),
            other => {
                out.insert(path, other.clone());
            }
        }
    }
}

/// Evaluate `schema` against `data`, flattening nested objects first.
pub fn validate(data: &Value, schema: &Schema) -> ValidationReport {
    let flat = flatten(data);
    validate_flat(&flat, schema)
}

/// Evaluate `schema` against an already-flat map.
pub fn validate_flat(data: &Map<String, Value>, schema: &Schema) -> ValidationReport {
    let mut errors = Vec::new();
    for (field, rules) in schema.fields() {
        let value = data.get(field);
        errors.extend(rules.iter().filter_map(|rule| rule.check(value, field)));
    }
    ValidationReport::from_errors(errors)
}
