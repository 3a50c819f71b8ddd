//! `$ref` expansion: inline every `#/$defs/<name>` pointer into a
//! self-contained, ref-free schema.
//!
//! The `jsonschema` crate resolves `$ref`s internally while validating,
//! but never hands back a materialized copy — there's no API for it.
//! CLAIJ needs one anyway: the LLM action (C6) must hand a model a
//! schema it can read directly, and models cannot dereference JSON
//! Pointers.

use std::collections::HashMap;

use serde_json::Value;

const DEFS_PREFIX: &str = "#/$defs/";

/// Recursively inline every `#/$defs/<name>` reference in `schema`
/// using `defs`. Sibling keywords next to a `$ref` (legal in
/// draft 2020-12) are merged over the expanded target, so a narrowing
/// schema like `{"$ref": "#/$defs/point", "description": "..."}` keeps
/// its own `description`.
///
/// A schema with no `$ref`s is returned unchanged — expansion is
/// idempotent.
pub fn expand_refs(schema: &Value, defs: &HashMap<String, Value>) -> Value {
    expand(schema, defs, &mut Vec::new())
}

fn expand(schema: &Value, defs: &HashMap<String, Value>, stack: &mut Vec<String>) -> Value {
    match schema {
        Value::Object(map) => {
            if let Some(Value::String(r)) = map.get("$ref") {
                if let Some(name) = r.strip_prefix(DEFS_PREFIX) {
                    return expand_ref(name, map, defs, stack).unwrap_or_else(|| schema.clone());
                }
            }
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), expand(v, defs, stack));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| expand(v, defs, stack)).collect()),
        other => other.clone(),
    }
}

fn expand_ref(
    name: &str,
    siblings: &serde_json::Map<String, Value>,
    defs: &HashMap<String, Value>,
    stack: &mut Vec<String>,
) -> Option<Value> {
    if stack.iter().any(|s| s == name) {
        tracing::warn!(def = name, "cyclic $ref during expansion, leaving $ref in place");
        return None;
    }
    let target = defs.get(name)?;

    stack.push(name.to_string());
    let expanded_target = expand(target, defs, stack);
    stack.pop();

    let mut merged = expanded_target.as_object().cloned().unwrap_or_default();
    for (k, v) in siblings {
        if k != "$ref" {
            merged.insert(k.clone(), expand(v, defs, stack));
        }
    }
    Some(Value::Object(merged))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn defs() -> HashMap<String, Value> {
        let mut d = HashMap::new();
        d.insert(
            "point".to_string(),
            json!({"type": "object", "properties": {"x": {"type": "number"}}}),
        );
        d
    }

    #[test]
    fn inlines_a_top_level_ref() {
        let schema = json!({"$ref": "#/$defs/point"});
        let expanded = expand_refs(&schema, &defs());
        assert_eq!(expanded, json!({"type": "object", "properties": {"x": {"type": "number"}}}));
    }

    #[test]
    fn inlines_a_nested_ref_and_keeps_siblings() {
        let schema = json!({
            "type": "object",
            "properties": {
                "p": {"$ref": "#/$defs/point", "description": "a point"}
            }
        });
        let expanded = expand_refs(&schema, &defs());
        assert_eq!(
            expanded,
            json!({
                "type": "object",
                "properties": {
                    "p": {
                        "type": "object",
                        "properties": {"x": {"type": "number"}},
                        "description": "a point"
                    }
                }
            })
        );
    }

    #[test]
    fn missing_def_leaves_ref_untouched() {
        let schema = json!({"$ref": "#/$defs/missing"});
        let expanded = expand_refs(&schema, &defs());
        assert_eq!(expanded, schema);
    }

    #[test]
    fn cyclic_def_does_not_recurse_forever() {
        let mut cyclic = HashMap::new();
        cyclic.insert("a".to_string(), json!({"$ref": "#/$defs/b"}));
        cyclic.insert("b".to_string(), json!({"$ref": "#/$defs/a"}));
        let schema = json!({"$ref": "#/$defs/a"});
        // Must terminate; exact shape isn't load-bearing, only termination.
        let _ = expand_refs(&schema, &cyclic);
    }

    #[test]
    fn expansion_is_idempotent() {
        let schema = json!({
            "type": "object",
            "properties": {"p": {"$ref": "#/$defs/point"}}
        });
        let once = expand_refs(&schema, &defs());
        let twice = expand_refs(&once, &defs());
        assert_eq!(once, twice);
    }

    #[test]
    fn schema_without_refs_is_unchanged() {
        let schema = json!({"type": "string", "minLength": 1});
        assert_eq!(expand_refs(&schema, &defs()), schema);
    }

    proptest::proptest! {
        #[test]
        fn expand_is_always_idempotent(depth in 0u8..4, width in 0u8..3) {
            let schema = nested_ref_schema(depth, width);
            let once = expand_refs(&schema, &defs());
            let twice = expand_refs(&once, &defs());
            prop_assert_eq!(once, twice);
        }
    }

    fn nested_ref_schema(depth: u8, width: u8) -> Value {
        if depth == 0 {
            return json!({"$ref": "#/$defs/point"});
        }
        let props: serde_json::Map<String, Value> = (0..width)
            .map(|i| (format!("f{i}"), nested_ref_schema(depth - 1, width)))
            .collect();
        json!({"type": "object", "properties": Value::Object(props)})
    }
}
