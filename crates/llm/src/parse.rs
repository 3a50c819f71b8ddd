//! Small, independently unit-tested helpers the LLM action's reply
//! handling is built from (§4.6 steps 6-7).

use serde_json::Value;

/// Strip a leading/trailing markdown code fence, with or without a
/// language tag (`` ``` ``, `` ```json ``). Leaves unfenced content
/// untouched.
pub fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_prefix('\n').unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Parse a model reply as a JSON object. Anything that isn't valid JSON,
/// or valid JSON that isn't an object, is rejected with a message fit to
/// feed back to the model as retry guidance.
pub fn parse_structured_reply(content: &str) -> Result<Value, String> {
    let stripped = strip_code_fences(content);
    let value: Value = serde_json::from_str(stripped)
        .map_err(|e| format!("reply was not valid JSON: {e}"))?;
    if !value.is_object() {
        return Err("reply must be a single JSON object".to_string());
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_plain_fence() {
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
    }

    #[test]
    fn strips_json_tagged_fence() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
    }

    #[test]
    fn leaves_unfenced_content_alone() {
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn parses_valid_object() {
        let v = parse_structured_reply("{\"id\": [\"a\",\"b\"]}").unwrap();
        assert_eq!(v["id"], serde_json::json!(["a", "b"]));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(parse_structured_reply("{not json}").is_err());
    }

    #[test]
    fn rejects_non_object_json() {
        assert!(parse_structured_reply("[1,2,3]").is_err());
    }

    #[test]
    fn parses_fenced_object() {
        let v = parse_structured_reply("```json\n{\"id\": \"error\"}\n```").unwrap();
        assert_eq!(v["id"], serde_json::json!("error"));
    }
}
