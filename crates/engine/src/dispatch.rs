//! The transition dispatcher (C3, `xform`): run a state's action, route
//! its output to a matching outgoing transition, retry on invalid
//! routing or schema failure, bail out to `end` on exhaustion.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tracing::Instrument;

use claij_domain::{
    event_id, make_event, BoxedAction, Context, Continuation, Event, EventId, Machine, State,
    Trail, TrailEntry, Transition, TransitionId,
};

use crate::types::Pushed;

/// One live outgoing transition plus the channel feeding its
/// destination state's consumer loop.
#[derive(Clone)]
pub struct OutgoingChannel {
    pub transition: Transition,
    pub sender: UnboundedSender<Pushed>,
}

/// Run one dispatcher invocation: invoke `state`'s action against
/// `event`/`trail`, then resolve the continuation per the C3 protocol.
/// Returns once the action has been handed off — the actual routing
/// decision happens asynchronously inside the supplied continuation,
/// which is invoked by the action exactly once (recursively reinvoking
/// the action itself on a retry).
pub async fn xform(
    machine: Arc<Machine>,
    state: Arc<State>,
    action: BoxedAction,
    outgoing: Arc<Vec<OutgoingChannel>>,
    context: Context,
    event: Event,
    trail: Trail,
) {
    let span = tracing::info_span!("fsm.dispatch", machine_id = %machine.id, state = %state.id, retry = 0u32);
    let cont = Arc::new(DispatchContinuation {
        machine,
        state,
        action: action.clone(),
        outgoing,
        event_in: event.clone(),
        trail_in: trail.clone(),
        retry: 0,
    });
    action.run(context, event, trail, cont).instrument(span).await;
}

struct DispatchContinuation {
    machine: Arc<Machine>,
    state: Arc<State>,
    action: BoxedAction,
    outgoing: Arc<Vec<OutgoingChannel>>,
    /// The event the action was invoked with — resent verbatim on retry.
    event_in: Event,
    /// The trail as of the action's invocation — the baseline a retry
    /// or success entry is appended onto when the continuation supplies
    /// no override.
    trail_in: Trail,
    retry: u32,
}

#[async_trait::async_trait]
impl Continuation for DispatchContinuation {
    async fn complete(&self, new_context: Context, output_event: Event, trail_override: Option<Trail>) {
        let baseline = trail_override.unwrap_or_else(|| self.trail_in.clone());
        let max_retries = new_context.engine.max_retries;

        match event_id(&output_event) {
            EventId::Error => {
                let error = output_event.get("error").cloned().unwrap_or(serde_json::json!(null));
                self.bail_out(new_context, baseline, "transport-error", error).await;
            }
            EventId::Transition(ox_id) => {
                self.route(new_context, output_event, baseline, ox_id, max_retries).await;
            }
            EventId::Other(raw) => {
                let valid_ids: Vec<String> = self.outgoing.iter().map(|oc| oc.transition.id.to_string()).collect();
                let message = format!(
                    "invalid transition id {raw:?}; valid ids are {valid_ids:?}"
                );
                self.retry_or_bail(new_context, baseline, "invalid-routing", message, max_retries)
                    .await;
            }
        }
    }
}

impl DispatchContinuation {
    async fn route(&self, new_context: Context, output_event: Event, baseline: Trail, ox_id: TransitionId, max_retries: u32) {
        let Some(oc) = self.outgoing.iter().find(|oc| oc.transition.id == ox_id) else {
            let valid_ids: Vec<String> = self.outgoing.iter().map(|oc| oc.transition.id.to_string()).collect();
            let message = format!("invalid transition id {ox_id}; valid ids are {valid_ids:?}");
            self.retry_or_bail(new_context, baseline, "invalid-routing", message, max_retries)
                .await;
            return;
        };

        let resolved_schema = claij_schema::resolve_schema(
            &new_context,
            &oc.transition,
            oc.transition.schema.as_ref(),
            Some((&self.state, claij_schema::Direction::Output)),
        );
        let outcome = match claij_schema::validate(&resolved_schema, &output_event, &new_context.defs) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.retry_or_bail(new_context, baseline, "schema-error", e.to_string(), max_retries)
                    .await;
                return;
            }
        };

        if outcome.valid {
            let trail = if oc.transition.omit {
                baseline
            } else {
                baseline.pushed(TrailEntry::taken(oc.transition.from(), oc.transition.to(), output_event.clone()))
            };
            let pushed = Pushed {
                context: new_context,
                event: output_event,
                trail,
            };
            // `send` only fails once the destination's receiver (and the
            // whole channel) has been dropped by `stop()`; a dropped
            // continuation at that point is the specified behaviour.
            let _ = oc.sender.send(pushed);
        } else {
            let message = format!(
                "schema validation failed: {}",
                outcome
                    .errors
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("; ")
            );
            self.retry_or_bail(new_context, baseline, "invalid-schema", message, max_retries)
                .await;
        }
    }

    async fn retry_or_bail(&self, new_context: Context, baseline: Trail, reason: &str, message: String, max_retries: u32) {
        if self.retry >= max_retries {
            let error = serde_json::json!({"reason": "max-retries-exceeded", "cause": reason, "message": message});
            self.bail_out(new_context, baseline, "max-retries-exceeded", error).await;
            return;
        }

        let error_value = serde_json::json!({"reason": reason, "message": message});
        let trail = baseline.pushed(TrailEntry::retry(
            self.state.id.clone(),
            self.state.id.clone(),
            self.event_in.clone(),
            error_value,
        ));

        let next = Arc::new(DispatchContinuation {
            machine: self.machine.clone(),
            state: self.state.clone(),
            action: self.action.clone(),
            outgoing: self.outgoing.clone(),
            event_in: self.event_in.clone(),
            trail_in: trail.clone(),
            retry: self.retry + 1,
        });
        tracing::warn!(state = %self.state.id, retry = self.retry + 1, reason, "retrying action after invalid output");
        self.action.run(new_context, self.event_in.clone(), trail, next).await;
    }

    async fn bail_out(&self, new_context: Context, baseline: Trail, reason: &str, error: serde_json::Value) {
        let Some(end_oc) = self.outgoing.iter().find(|oc| oc.transition.to() == claij_domain::END) else {
            tracing::error!(state = %self.state.id, reason, "no outgoing transition to 'end'; FSM will hang");
            return;
        };

        let bail_event = make_event(
            end_oc.transition.id.clone(),
            serde_json::json!({"error": error, "bail_out": true}),
        );
        let trail = if end_oc.transition.omit {
            baseline
        } else {
            baseline.pushed(TrailEntry::taken(end_oc.transition.from(), end_oc.transition.to(), bail_event.clone()))
        };
        tracing::warn!(state = %self.state.id, reason, "bailing out to end");
        let _ = end_oc.sender.send(Pushed {
            context: new_context,
            event: bail_event,
            trail,
        });
    }
}
