//! Shared wire types flowing across the per-transition channels.

use claij_domain::{Context, Event, Trail};

/// What travels down a transition's channel: the context as seen by
/// the destination state, the event, and the trail as of arrival.
#[derive(Debug)]
pub struct Pushed {
    pub context: Context,
    pub event: Event,
    pub trail: Trail,
}
