//! `claij-store` — the in-memory reference implementation of
//! [`claij_domain::MachineStore`] (C13), used by the sub-machine composer
//! to load child machines by id/version.

use std::collections::HashMap;

use claij_domain::{Error, Machine, MachineStore, Result};
use parking_lot::RwLock;

/// Key a stored machine is addressed by: id plus an optional version tag.
/// `None` is its own slot, not a wildcard — callers that want "whatever
/// is current" must register under `None` explicitly via [`InMemoryMachineStore::put`].
type Key = (String, Option<String>);

/// An in-memory, process-local machine store backed by a `RwLock<HashMap<_>>`,
/// the same pattern the gateway's session store uses for in-memory state.
#[derive(Default)]
pub struct InMemoryMachineStore {
    machines: RwLock<HashMap<Key, Machine>>,
}

impl InMemoryMachineStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a machine under `id` and optional `version`.
    pub fn put(&self, id: impl Into<String>, version: Option<String>, machine: Machine) {
        let id = id.into();
        tracing::debug!(%id, ?version, "registered machine in store");
        self.machines.write().insert((id, version), machine);
    }
}

#[async_trait::async_trait]
impl MachineStore for InMemoryMachineStore {
    async fn get(&self, id: &str, version: Option<&str>) -> Result<Machine> {
        let key = (id.to_string(), version.map(|v| v.to_string()));
        self.machines
            .read()
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::Store(format!("no machine registered under id='{id}' version={version:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claij_domain::State;
    use std::collections::HashMap as StdHashMap;

    fn trivial_machine(id: &str) -> Machine {
        Machine {
            id: id.to_string(),
            description: None,
            version: None,
            schemas: StdHashMap::new(),
            schema: None,
            prompts: Vec::new(),
            hats: Vec::new(),
            states: vec![State::new("start"), State::new("end")],
            transitions: vec![
                claij_domain::Transition::new("start", "end"),
            ],
        }
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = InMemoryMachineStore::new();
        store.put("child", None, trivial_machine("child"));
        let got = store.get("child", None).await.unwrap();
        assert_eq!(got.id, "child");
    }

    #[tokio::test]
    async fn versioned_entries_are_distinct_slots() {
        let store = InMemoryMachineStore::new();
        store.put("child", Some("v1".into()), trivial_machine("child-v1"));
        store.put("child", Some("v2".into()), trivial_machine("child-v2"));
        assert_eq!(store.get("child", Some("v1")).await.unwrap().id, "child-v1");
        assert_eq!(store.get("child", Some("v2")).await.unwrap().id, "child-v2");
    }

    #[tokio::test]
    async fn missing_machine_is_a_store_error() {
        let store = InMemoryMachineStore::new();
        assert!(store.get("nope", None).await.is_err());
    }
}
