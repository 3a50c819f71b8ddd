//! Action registry & contract (C2).
//!
//! An action is a curried factory: `(config, machine, state) -> runtime
//! function`. The runtime function is continuation-style — it takes
//! `(context, event, trail)` plus a continuation and must eventually
//! invoke it exactly once, possibly after asynchronous work.

use std::sync::Arc;

use serde_json::Value;

use crate::context::Context;
use crate::error::Result;
use crate::machine::{Event, Machine, State};
use crate::trail::Trail;

/// Declarative capability statement attached to an action factory.
/// Contracts are enforced via transition schemas, not this metadata —
/// these are used by composition tools and design-time checks only.
#[derive(Debug, Clone)]
pub struct ActionDescriptor {
    pub name: String,
    pub config_schema: Value,
    pub input_schema: Value,
    pub output_schema: Value,
}

fn any_schema() -> Value {
    Value::Bool(true)
}

impl ActionDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config_schema: any_schema(),
            input_schema: any_schema(),
            output_schema: any_schema(),
        }
    }

    pub fn with_config_schema(mut self, schema: Value) -> Self {
        self.config_schema = schema;
        self
    }

    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = schema;
        self
    }
}

/// The continuation an action's runtime function invokes when it has
/// produced an output event (possibly after asynchronous work). Invoked
/// at most once per dispatcher invocation; a second call is a logic
/// error in the action.
///
/// `trail_override`, when `Some`, replaces the trail the dispatcher will
/// append its own entry to — the spec's optional `[updated-trail]` slot.
/// Actions almost never need it; it exists for actions (e.g. the
/// sub-machine composer) that want to splice in a summarized child trail
/// before the dispatcher's own append.
#[async_trait::async_trait]
pub trait Continuation: Send + Sync {
    async fn complete(&self, context: Context, event: Event, trail_override: Option<Trail>);
}

/// Convenience for the common case of completing without a trail
/// override.
#[async_trait::async_trait]
pub trait ContinuationExt: Continuation {
    async fn complete_simple(&self, context: Context, event: Event) {
        self.complete(context, event, None).await;
    }
}
impl<T: Continuation + ?Sized> ContinuationExt for T {}

/// The runtime function a state delegates to when an event arrives.
#[async_trait::async_trait]
pub trait Action: Send + Sync {
    async fn run(&self, context: Context, event: Event, trail: Trail, cont: Arc<dyn Continuation>);
}

pub type BoxedAction = Arc<dyn Action>;

/// A factory closing over a state's declared `config`, the `machine`,
/// and the `state` itself, producing a runtime [`Action`].
///
/// Config is schema-validated against [`ActionDescriptor::config_schema`]
/// at machine-start time, before `build` is called.
pub trait ActionFactory: Send + Sync {
    fn descriptor(&self) -> &ActionDescriptor;
    fn build(&self, config: &Value, machine: &Machine, state: &State) -> Result<BoxedAction>;
}

pub type BoxedActionFactory = Arc<dyn ActionFactory>;

/// A minimal no-op action factory, used for states with no declared
/// `action` (e.g. `"start"`): it never produces an output event — the
/// dispatcher only invokes it expecting the runtime wiring (submit) to
/// have already pushed the event onward.
pub struct NoopActionFactory;

struct NoopAction;

#[async_trait::async_trait]
impl Action for NoopAction {
    async fn run(&self, _context: Context, _event: Event, _trail: Trail, _cont: Arc<dyn Continuation>) {
        // Intentionally does nothing: "start" has no inbound transitions,
        // so this is never actually invoked by the dispatcher in a
        // well-formed machine, but it is a valid, harmless stand-in.
    }
}

impl ActionFactory for NoopActionFactory {
    fn descriptor(&self) -> &ActionDescriptor {
        static DESC: std::sync::OnceLock<ActionDescriptor> = std::sync::OnceLock::new();
        DESC.get_or_init(|| ActionDescriptor::new("noop"))
    }

    fn build(&self, _config: &Value, _machine: &Machine, _state: &State) -> Result<BoxedAction> {
        Ok(Arc::new(NoopAction))
    }
}
