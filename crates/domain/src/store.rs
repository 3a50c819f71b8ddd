//! Persistent FSM store interface (C13, external collaborator per §1).
//!
//! The core only needs key/version lookup — how machines are persisted
//! (file, database, registry service) is deliberately out of scope; see
//! `claij-store` for an in-memory reference implementation.

use crate::error::Result;
use crate::machine::Machine;

#[async_trait::async_trait]
pub trait MachineStore: Send + Sync {
    /// Load a machine by id and optional version. `None` version means
    /// "whatever the store considers current".
    async fn get(&self, id: &str, version: Option<&str>) -> Result<Machine>;
}
