//! The FSM runtime (C4, `start-fsm`): wires per-transition channels,
//! spawns one consumer loop per state, and exposes `submit`/`await`/`stop`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as SyncMutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{oneshot, Mutex};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::{StreamExt, StreamMap};

use claij_domain::{
    Action, BoxedAction, CompletionLatch, Context, Continuation, Error, Event, HatRegistry,
    Machine, NoopActionFactory, Result, State, StopHook, Trail, TrailEntry, Transition,
    TransitionId, END, START,
};

use crate::dispatch::{self, OutgoingChannel};
use crate::hats;
use crate::types::Pushed;

/// The result of `await`: either the run completed, or the deadline
/// elapsed first. The machine keeps running in the latter case.
#[derive(Debug)]
pub enum AwaitOutcome {
    Completed(Context, Trail),
    TimedOut,
}

/// The handle `start_fsm` returns: submit the initial event, await
/// completion, and stop the machine when done with it.
pub struct RuntimeHandle {
    submit_sender: SyncMutex<Option<UnboundedSender<Pushed>>>,
    submit_transition: Transition,
    context: Context,
    completion_rx: Mutex<Option<oneshot::Receiver<(Context, Trail)>>>,
    all_senders: Mutex<Option<Vec<UnboundedSender<Pushed>>>>,
    stop_hooks: Vec<Arc<dyn StopHook>>,
    pub input_schema: Value,
    pub output_schema: Value,
}

impl RuntimeHandle {
    /// Push `event` onto the channel of the unique transition from
    /// `"start"`. If that transition isn't `omit`, the trail starts
    /// with one entry recording the `start -> first` hop.
    pub fn submit(&self, event: Event) {
        let trail = if self.submit_transition.omit {
            Trail::new()
        } else {
            Trail::new().pushed(TrailEntry::taken(
                self.submit_transition.from(),
                self.submit_transition.to(),
                event.clone(),
            ))
        };
        let sender = self.submit_sender.lock().expect("submit_sender lock poisoned").clone();
        if let Some(sender) = sender {
            let _ = sender.send(Pushed {
                context: self.context.clone(),
                event,
                trail,
            });
        }
    }

    /// Block on the completion latch, up to `timeout`. A `None`
    /// timeout waits indefinitely.
    pub async fn await_completion(&self, timeout: Option<Duration>) -> AwaitOutcome {
        let mut guard = self.completion_rx.lock().await;
        let Some(rx) = guard.take() else {
            // Already awaited once and consumed; a well-behaved caller
            // only awaits a run to completion once.
            return AwaitOutcome::TimedOut;
        };

        let result = match timeout {
            Some(d) => tokio::time::timeout(d, rx).await,
            None => Ok(rx.await),
        };

        match result {
            Ok(Ok((context, trail))) => AwaitOutcome::Completed(context, trail),
            Ok(Err(_recv_error)) => AwaitOutcome::TimedOut,
            Err(_elapsed) => AwaitOutcome::TimedOut,
        }
    }

    /// Run stop hooks (in registration order), then close every
    /// channel so every consumer loop observes end-of-stream and exits.
    /// `submit_sender` is dropped alongside `all_senders` — it is a
    /// clone of the entry transition's sender, and left open it would
    /// keep the first state's consumer loop (and everything downstream
    /// of it) alive after `stop()` returns.
    pub async fn stop(&self) {
        for hook in &self.stop_hooks {
            hook.stop().await;
        }
        self.submit_sender.lock().expect("submit_sender lock poisoned").take();
        let mut guard = self.all_senders.lock().await;
        guard.take();
    }
}

struct BuiltState {
    state: State,
    action: BoxedAction,
    inbound: Vec<UnboundedReceiver<Pushed>>,
    outgoing: Vec<OutgoingChannel>,
}

/// The synthetic action bound to `"end"`: resolves the completion latch
/// with whatever context/trail it's handed and never calls a
/// continuation — it is the one terminal action the spec carves out.
struct EndAction;

#[async_trait::async_trait]
impl Action for EndAction {
    async fn run(&self, context: Context, _event: Event, trail: Trail, _cont: Arc<dyn Continuation>) {
        if let Some(latch) = &context.completion {
            latch.resolve(context.clone(), trail).await;
        }
    }
}

fn combined_defs(machine: &Machine, context: &Context) -> HashMap<String, Value> {
    let mut defs = machine.schemas.clone();
    for (k, v) in context.defs.iter() {
        defs.insert(k.clone(), v.clone());
    }
    defs
}

/// Every state's action, built once at start time. `"end"` always gets
/// the engine's built-in [`EndAction`] and `"start"` (or any state with
/// no declared action) gets a no-op, regardless of what `state.action`
/// says — these two synthetic states are never routed through the
/// user's action registry.
fn build_action(machine: &Machine, state: &State, context: &Context) -> Result<BoxedAction> {
    if state.id == END {
        return Ok(Arc::new(EndAction));
    }
    if state.id == START || state.action.is_none() {
        return NoopActionFactory.build(&Value::Null, machine, state);
    }

    let action_name = state.action.as_ref().unwrap();
    let factory = context
        .actions
        .get(action_name)
        .ok_or_else(|| Error::InvalidMachine(format!("state '{}' names unknown action '{action_name}'", state.id)))?;

    let config = state.config.clone().unwrap_or(Value::Null);
    let outcome = claij_schema::validate(&factory.descriptor().config_schema, &config, &context.defs)?;
    if !outcome.valid {
        return Err(Error::InvalidConfig {
            action: action_name.clone(),
            errors: outcome.errors.iter().map(|e| e.to_string()).collect(),
        });
    }

    factory.build(&config, machine, state)
}

fn machine_output_schema(machine: &Machine, context: &Context) -> Value {
    let alternatives: Vec<Value> = machine
        .incoming(END)
        .map(|t| {
            let from_state = machine.state(t.from());
            claij_schema::resolve_schema(
                context,
                t,
                t.schema.as_ref(),
                from_state.map(|s| (s, claij_schema::Direction::Output)),
            )
        })
        .collect();
    match alternatives.len() {
        0 => Value::Bool(false),
        1 => alternatives.into_iter().next().unwrap(),
        _ => serde_json::json!({ "oneOf": alternatives }),
    }
}

/// Build channels, validate config, spawn consumer loops, and return a
/// handle ready to `submit`. Steps 1-9 of §4.4.
pub async fn start_fsm(mut context: Context, machine: Machine) -> Result<RuntimeHandle> {
    machine.validate_shape().map_err(Error::InvalidMachine)?;

    let mut stop_hooks: Vec<Arc<dyn StopHook>> = Vec::new();
    let machine = if let Some(registry) = context.hats.clone() {
        hats::expand(&machine, registry.as_ref() as &dyn HatRegistry, &mut stop_hooks)?
    } else {
        machine
    };

    let defs = combined_defs(&machine, &context);
    context = context.with_defs(defs);

    let (completion_tx, completion_rx) = oneshot::channel();
    context = context.with_completion(Arc::new(CompletionLatch::new(completion_tx)));

    let mut senders: HashMap<TransitionId, UnboundedSender<Pushed>> = HashMap::new();
    let mut receivers: HashMap<TransitionId, UnboundedReceiver<Pushed>> = HashMap::new();
    for t in &machine.transitions {
        let (tx, rx) = mpsc::unbounded_channel();
        senders.insert(t.id.clone(), tx);
        receivers.insert(t.id.clone(), rx);
    }

    let output_schema = machine_output_schema(&machine, &context);

    let machine = Arc::new(machine);
    let mut built_states = Vec::new();

    for state in &machine.states {
        if state.id == START {
            continue;
        }
        let inbound: Vec<UnboundedReceiver<Pushed>> = machine
            .incoming(&state.id)
            .filter_map(|t| receivers.remove(&t.id))
            .collect();
        if inbound.is_empty() {
            continue;
        }

        let outgoing: Vec<OutgoingChannel> = machine
            .outgoing(&state.id)
            .map(|t| OutgoingChannel {
                transition: t.clone(),
                sender: senders.get(&t.id).expect("sender created per transition").clone(),
            })
            .collect();

        let action = build_action(&machine, state, &context)?;

        built_states.push(BuiltState {
            state: state.clone(),
            action,
            inbound,
            outgoing,
        });
    }

    for built in built_states {
        let machine = machine.clone();
        let state = Arc::new(built.state);
        let action = built.action;
        let outgoing = Arc::new(built.outgoing);
        let inbound = built.inbound;

        tokio::spawn(async move {
            let mut map: StreamMap<usize, UnboundedReceiverStream<Pushed>> = StreamMap::new();
            for (i, rx) in inbound.into_iter().enumerate() {
                map.insert(i, UnboundedReceiverStream::new(rx));
            }
            while let Some((_, pushed)) = map.next().await {
                let machine = machine.clone();
                let state = state.clone();
                let action = action.clone();
                let outgoing = outgoing.clone();
                tokio::spawn(async move {
                    dispatch::xform(machine, state, action, outgoing, pushed.context, pushed.event, pushed.trail).await;
                });
            }
        });
    }

    let start_transition = machine
        .outgoing(START)
        .next()
        .cloned()
        .ok_or_else(|| Error::InvalidMachine("no transition from 'start'".into()))?;
    let submit_sender = senders
        .get(&start_transition.id)
        .expect("sender created per transition")
        .clone();

    let input_schema = claij_schema::resolve_schema(&context, &start_transition, start_transition.schema.as_ref(), None);

    Ok(RuntimeHandle {
        submit_sender: SyncMutex::new(Some(submit_sender)),
        submit_transition: start_transition,
        context,
        completion_rx: Mutex::new(Some(completion_rx)),
        all_senders: Mutex::new(Some(senders.into_values().collect())),
        stop_hooks,
        input_schema,
        output_schema,
    })
}
