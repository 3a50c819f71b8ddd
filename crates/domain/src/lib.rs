//! `claij-domain` — the shared data model for CLAIJ: machines, states,
//! transitions, events, trails, the per-run context, and the action
//! contract every pluggable collaborator (LLM action, MCP bridge,
//! sub-machine composer) implements against.

pub mod action;
pub mod config;
pub mod context;
pub mod error;
pub mod hats;
pub mod machine;
pub mod store;
pub mod trail;

pub use action::{
    Action, ActionDescriptor, ActionFactory, BoxedAction, BoxedActionFactory, Continuation,
    ContinuationExt, NoopActionFactory,
};
pub use config::EngineConfig;
pub use context::{CompletionLatch, Context, SchemaResolverFn};
pub use error::{Error, Result};
pub use hats::{HatActivation, HatFragment, HatMaker, HatRegistry, StopHook};
pub use machine::{
    event_id, make_error_event, make_event, Event, EventId, HatDecl, Machine, SchemaRef, State,
    Transition, TransitionId, END, ERROR_ID, START,
};
pub use store::MachineStore;
pub use trail::{Trail, TrailEntry};
