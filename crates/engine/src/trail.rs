//! `trail->prompts` (C5). The actual conversion lives in `claij-schema`
//! (it only needs `Machine`/`Trail`/schema resolution, not the
//! runtime) — re-exported here under the name the component table
//! expects.

pub use claij_schema::{synthesize_initial_prompt, trail_to_prompts, Prompt, Role};
