//! Hat expansion (C8): splice reusable fragments into a machine before
//! it starts.

use std::sync::Arc;

use claij_domain::{HatRegistry, Machine, Result, StopHook};

/// Apply every state's declared hats, in declaration order, additively.
/// Unregistered hat names are logged and skipped rather than failing
/// the whole expansion — a machine referencing a hat the embedding
/// process hasn't wired up yet should still start with that one
/// decoration missing, not refuse to run at all.
pub fn expand(machine: &Machine, registry: &dyn HatRegistry, stop_hooks: &mut Vec<Arc<dyn StopHook>>) -> Result<Machine> {
    let mut out = machine.clone();

    for state in &machine.states {
        for decl in &state.hats {
            let Some(maker) = registry.get(&decl.hat) else {
                tracing::warn!(hat = %decl.hat, state = %state.id, "unregistered hat, skipping");
                continue;
            };

            let activation = maker.make(&state.id, &decl.config)?;
            out.states.extend(activation.fragment.states);
            out.transitions.extend(activation.fragment.transitions);

            if let Some(host) = out.states.iter_mut().find(|s| s.id == state.id) {
                host.prompts.extend(activation.fragment.prompts);
            }

            if let Some(hook) = activation.stop_hook {
                stop_hooks.push(hook);
            }
        }
    }

    Ok(out)
}
