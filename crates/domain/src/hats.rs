//! Hat expansion (C8): reusable fragments of states, transitions, and
//! prompts spliced into a machine at a named state before it starts.

use serde_json::Value;

use crate::error::Result;
use crate::machine::{State, Transition};

/// Additional states/transitions/prompts a hat contributes. Fragments
/// are merged into the host machine; a fragment's `prompts` are appended
/// to the host state's own prompts.
#[derive(Debug, Clone, Default)]
pub struct HatFragment {
    pub states: Vec<State>,
    pub transitions: Vec<Transition>,
    pub prompts: Vec<String>,
}

/// A hook run by `stop()`, in registration order, before channels close.
#[async_trait::async_trait]
pub trait StopHook: Send + Sync {
    async fn stop(&self);
}

/// The result of activating a hat on a given state: the fragment to
/// splice in, and an optional stop hook for cleanup.
pub struct HatActivation {
    pub fragment: HatFragment,
    pub stop_hook: Option<std::sync::Arc<dyn StopHook>>,
}

/// `(state_id, config) -> HatActivation`, applied once per `hats` entry
/// on a state, in declaration order.
pub trait HatMaker: Send + Sync {
    fn make(&self, state_id: &str, config: &Value) -> Result<HatActivation>;
}

/// Looks up a [`HatMaker`] by the name used in a state's `hats` list.
pub trait HatRegistry: Send + Sync {
    fn get(&self, name: &str) -> Option<std::sync::Arc<dyn HatMaker>>;
}
