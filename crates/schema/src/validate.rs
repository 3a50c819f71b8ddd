//! JSON Schema validation (draft 2020-12) with a `$defs` registry
//! supplied out-of-band rather than embedded per-schema.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

use claij_domain::{Error, Result};

/// One structured validation failure: the JSON pointer into the
/// instance that failed, and a human-readable message.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
}

impl ValidationOutcome {
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }
}

/// Attach a `$defs` registry to `schema` so `#/$defs/<name>` pointers
/// resolve locally. The schema's own `$defs` (if any) take precedence
/// over the supplied registry for colliding names.
pub fn with_defs(schema: &Value, defs: &HashMap<String, Value>) -> Value {
    let Value::Object(_) = schema else {
        // `true`/`false` boolean schemas carry no $defs of their own.
        return schema.clone();
    };
    let mut merged = defs.clone();
    if let Some(own) = schema.get("$defs").and_then(|d| d.as_object()) {
        for (k, v) in own {
            merged.insert(k.clone(), v.clone());
        }
    }
    let mut out = schema.clone();
    if let Value::Object(map) = &mut out {
        map.insert(
            "$defs".to_string(),
            Value::Object(merged.into_iter().collect()),
        );
    }
    out
}

/// Validate `value` against `schema`, resolving `#/$defs/<name>` via
/// `defs`. Returns the full list of structured errors rather than
/// stopping at the first one.
pub fn validate(schema: &Value, value: &Value, defs: &HashMap<String, Value>) -> Result<ValidationOutcome> {
    let full_schema = with_defs(schema, defs);
    let validator =
        jsonschema::validator_for(&full_schema).map_err(|e| Error::Schema(e.to_string()))?;

    let errors: Vec<ValidationError> = validator
        .iter_errors(value)
        .map(|e| ValidationError {
            path: e.instance_path.to_string(),
            message: e.to_string(),
        })
        .collect();

    if errors.is_empty() {
        Ok(ValidationOutcome::ok())
    } else {
        Ok(ValidationOutcome {
            valid: false,
            errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_matching_value() {
        let schema = json!({"type": "object", "properties": {"n": {"type": "integer"}}, "required": ["n"]});
        let outcome = validate(&schema, &json!({"n": 1}), &HashMap::new()).unwrap();
        assert!(outcome.valid);
    }

    #[test]
    fn rejects_mismatched_value_with_path() {
        let schema = json!({"type": "object", "properties": {"n": {"type": "integer"}}, "required": ["n"]});
        let outcome = validate(&schema, &json!({"n": "x"}), &HashMap::new()).unwrap();
        assert!(!outcome.valid);
        assert!(!outcome.errors.is_empty());
    }

    #[test]
    fn resolves_ref_into_defs() {
        let schema = json!({"$ref": "#/$defs/point"});
        let mut defs = HashMap::new();
        defs.insert(
            "point".to_string(),
            json!({"type": "object", "properties": {"x": {"type": "number"}}, "required": ["x"]}),
        );
        let outcome = validate(&schema, &json!({"x": 1.0}), &defs).unwrap();
        assert!(outcome.valid);
    }

    #[test]
    fn schema_true_accepts_anything() {
        let outcome = validate(&json!(true), &json!(["anything", 1, null]), &HashMap::new()).unwrap();
        assert!(outcome.valid);
    }
}
