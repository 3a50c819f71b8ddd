//! `claij-schema` — JSON Schema (draft 2020-12) validation, `$ref`
//! expansion, and transition-schema resolution for CLAIJ.

pub mod expand;
pub mod prompts;
pub mod resolve;
pub mod validate;

pub use expand::expand_refs;
pub use prompts::{synthesize_initial_prompt, trail_to_prompts, Prompt, Role};
pub use resolve::{resolve_schema, state_schema, state_schema_for, Direction};
pub use validate::{validate, with_defs, ValidationError, ValidationOutcome};
