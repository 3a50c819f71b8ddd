//! `claij-engine` — the dispatcher and runtime that execute CLAIJ
//! machines: the schema-validated transition dispatcher (`xform`), the
//! FSM runtime (`start_fsm`), trail-to-prompt conversion, composition
//! (`lift`/`chain`/sub-machine), and hat expansion.

pub mod compose;
pub mod dispatch;
pub mod hats;
pub mod runtime;
pub mod trail;
pub mod types;

pub use compose::{chain, lift, ChainHandle, SubMachineActionFactory, TrailMode};
pub use dispatch::{xform, OutgoingChannel};
pub use runtime::{start_fsm, AwaitOutcome, RuntimeHandle};
pub use trail::{synthesize_initial_prompt, trail_to_prompts, Prompt, Role};
pub use types::Pushed;
