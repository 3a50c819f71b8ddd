//! Engine-wide configuration (C10, ambient stack).
//!
//! This is *not* the out-of-scope CLI/file config loader (§1 Non-goals
//! exclude that) — it is the small, serde-deserializable settings bundle
//! the engine itself consults: retry limits, default LLM routing, and
//! timeout hints. Follows the teacher's one-struct-per-concern,
//! `#[serde(default)]`-everywhere config idiom.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum re-invocations of the same action per dispatcher
    /// invocation, applied independently to routing and validation
    /// failures (§4.3, §7).
    #[serde(default = "d_max_retries")]
    pub max_retries: u32,

    /// LLM service name used when an event/config/context chain leaves
    /// it unresolved (§4.6 step 1).
    #[serde(default)]
    pub default_llm_service: Option<String>,

    /// Model identifier used under the same fallback rule.
    #[serde(default)]
    pub default_model: Option<String>,

    /// Maximum JSON-parse retries inside the LLM action (§4.6 step 7).
    #[serde(default = "d_max_parse_retries")]
    pub max_parse_retries: u32,

    /// Wall-clock budget for a single LLM call.
    #[serde(default = "d_llm_timeout_ms")]
    pub llm_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries: d_max_retries(),
            default_llm_service: None,
            default_model: None,
            max_parse_retries: d_max_parse_retries(),
            llm_timeout_ms: d_llm_timeout_ms(),
        }
    }
}

fn d_max_retries() -> u32 {
    3
}

fn d_max_parse_retries() -> u32 {
    3
}

fn d_llm_timeout_ms() -> u64 {
    30_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let c = EngineConfig::default();
        assert_eq!(c.max_retries, 3);
        assert_eq!(c.max_parse_retries, 3);
    }

    #[test]
    fn deserializes_with_partial_overrides() {
        let c: EngineConfig = serde_json::from_str(r#"{"max_retries": 5}"#).unwrap();
        assert_eq!(c.max_retries, 5);
        assert_eq!(c.llm_timeout_ms, 30_000);
    }
}
