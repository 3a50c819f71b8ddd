//! The per-run shared environment (§3 Context, §9 "replace dynamic
//! keyword-keyed maps with a typed bundle").
//!
//! Context is treated as immutable by the dispatcher: every "derive a
//! new context" operation below returns a fresh value; nothing here
//! exposes `&mut` access to the shared tables. Cloning a `Context` is
//! cheap — the tables are `Arc`-wrapped and shared by reference.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{oneshot, Mutex};

use crate::action::BoxedActionFactory;
use crate::config::EngineConfig;
use crate::hats::HatRegistry;
use crate::machine::Transition;
use crate::store::MachineStore;
use crate::trail::Trail;

/// A dynamic transition-schema resolver, keyed by string in
/// [`Context::schema_resolvers`]. See C1 `resolve-schema`.
pub type SchemaResolverFn = dyn Fn(&Context, &Transition) -> Value + Send + Sync;

/// The completion latch `start_fsm` creates and the `end`-action
/// resolves exactly once (§4.4, "Completion exclusivity").
pub struct CompletionLatch {
    inner: Mutex<Option<oneshot::Sender<(Context, Trail)>>>,
}

impl CompletionLatch {
    pub fn new(tx: oneshot::Sender<(Context, Trail)>) -> Self {
        Self {
            inner: Mutex::new(Some(tx)),
        }
    }

    /// Resolve the latch. A second call (from a stray retry or a racing
    /// bail-out) is silently a no-op.
    pub async fn resolve(&self, context: Context, trail: Trail) {
        let mut guard = self.inner.lock().await;
        if let Some(tx) = guard.take() {
            let _ = tx.send((context, trail));
        }
    }
}

/// The per-run shared environment threaded through every dispatcher
/// invocation and action call.
#[derive(Clone)]
pub struct Context {
    /// action-name -> action factory.
    pub actions: Arc<HashMap<String, BoxedActionFactory>>,
    /// schema-key -> dynamic schema resolver function.
    pub schema_resolvers: Arc<HashMap<String, Arc<SchemaResolverFn>>>,
    /// Combined `$defs` registry: the machine's `schemas` merged with
    /// context-provided defs.
    pub defs: Arc<HashMap<String, Value>>,
    /// The completion latch, present once `start_fsm` has built it.
    pub completion: Option<Arc<CompletionLatch>>,
    /// Retry limits, default LLM routing, timeouts.
    pub engine: EngineConfig,
    /// Persistent FSM store, for the sub-machine composer (C7).
    pub store: Option<Arc<dyn MachineStore>>,
    /// Hat-maker registry, for hat expansion (C8). Absent means "skip
    /// hat expansion" per §4.4 step 1.
    pub hats: Option<Arc<dyn HatRegistry>>,
    /// Caller-supplied domain data that doesn't have a well-known slot.
    pub extra: Arc<HashMap<String, Value>>,
}

impl Context {
    pub fn new(actions: HashMap<String, BoxedActionFactory>, engine: EngineConfig) -> Self {
        Self {
            actions: Arc::new(actions),
            schema_resolvers: Arc::new(HashMap::new()),
            defs: Arc::new(HashMap::new()),
            completion: None,
            engine,
            store: None,
            hats: None,
            extra: Arc::new(HashMap::new()),
        }
    }

    pub fn with_schema_resolvers(mut self, resolvers: HashMap<String, Arc<SchemaResolverFn>>) -> Self {
        self.schema_resolvers = Arc::new(resolvers);
        self
    }

    pub fn with_defs(mut self, defs: HashMap<String, Value>) -> Self {
        self.defs = Arc::new(defs);
        self
    }

    pub fn with_completion(mut self, latch: Arc<CompletionLatch>) -> Self {
        self.completion = Some(latch);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn MachineStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_hats(mut self, hats: Arc<dyn HatRegistry>) -> Self {
        self.hats = Some(hats);
        self
    }

    /// Derive a new context with one extra entry merged into the side
    /// bag. Never mutates `self` — the dispatcher's "treated as
    /// immutable" invariant holds by construction.
    pub fn with_extra(&self, key: impl Into<String>, value: Value) -> Self {
        let mut extra = (*self.extra).clone();
        extra.insert(key.into(), value);
        Self {
            extra: Arc::new(extra),
            ..self.clone()
        }
    }

    pub fn get_extra(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_extra_does_not_mutate_original() {
        let ctx = Context::new(HashMap::new(), EngineConfig::default());
        let derived = ctx.with_extra("k", serde_json::json!(1));
        assert!(ctx.get_extra("k").is_none());
        assert_eq!(derived.get_extra("k").unwrap(), &serde_json::json!(1));
    }

    #[tokio::test]
    async fn completion_latch_resolves_once() {
        let (tx, rx) = oneshot::channel();
        let latch = Arc::new(CompletionLatch::new(tx));
        let ctx = Context::new(HashMap::new(), EngineConfig::default());
        latch.resolve(ctx.clone(), Trail::new()).await;
        // Second resolve is a no-op, not a panic.
        latch.resolve(ctx, Trail::new()).await;
        let (_, trail) = rx.await.unwrap();
        assert!(trail.is_empty());
    }
}
