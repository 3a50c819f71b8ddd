//! Composition (C7): `lift` a pure function into an action, `chain`
//! machines end-to-end, and run a child machine as a sub-machine
//! action.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::OnceCell;

use claij_domain::{
    make_error_event, make_event, Action, ActionDescriptor, ActionFactory, BoxedAction,
    BoxedActionFactory, Context, Continuation, ContinuationExt, Error, Event, Machine, Result,
    State, Trail, TransitionId,
};

use crate::runtime::{self, AwaitOutcome, RuntimeHandle};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// lift
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct LiftAction<F> {
    f: F,
}

#[async_trait::async_trait]
impl<F> Action for LiftAction<F>
where
    F: Fn(&Event) -> Event + Send + Sync + 'static,
{
    async fn run(&self, context: Context, event: Event, _trail: Trail, cont: Arc<dyn Continuation>) {
        let output = (self.f)(&event);
        cont.complete_simple(context, output).await;
    }
}

struct LiftActionFactory<F> {
    descriptor: ActionDescriptor,
    f: Arc<F>,
}

impl<F> ActionFactory for LiftActionFactory<F>
where
    F: Fn(&Event) -> Event + Send + Sync + 'static,
{
    fn descriptor(&self) -> &ActionDescriptor {
        &self.descriptor
    }

    fn build(&self, _config: &Value, _machine: &Machine, _state: &State) -> Result<BoxedAction> {
        let f = self.f.clone();
        Ok(Arc::new(LiftAction { f: move |e: &Event| (f)(e) }))
    }
}

/// Wrap a pure `event -> event` function as an action factory: its
/// runtime function calls the continuation with `f(event)` and never
/// touches the trail itself (the dispatcher appends the ordinary
/// success entry for whichever transition the result routes to).
pub fn lift<F>(name: impl Into<String>, f: F) -> BoxedActionFactory
where
    F: Fn(&Event) -> Event + Send + Sync + 'static,
{
    Arc::new(LiftActionFactory {
        descriptor: ActionDescriptor::new(name),
        f: Arc::new(f),
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// chain
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Runs `m1, m2, ..., mN` back to back: when `m_i` completes, the last
/// event of its trail is submitted to `m_{i+1}`. `submit` feeds `m1`;
/// `await_completion` resolves when `mN` completes.
pub struct ChainHandle {
    handles: Vec<Arc<RuntimeHandle>>,
}

impl ChainHandle {
    pub fn submit(&self, event: Event) {
        self.handles[0].submit(event);
    }

    pub async fn await_completion(&self, timeout: Option<Duration>) -> AwaitOutcome {
        self.handles
            .last()
            .expect("chain always has at least one machine")
            .await_completion(timeout)
            .await
    }

    pub async fn stop(&self) {
        for handle in &self.handles {
            handle.stop().await;
        }
    }
}

pub async fn chain(context: Context, machines: Vec<Machine>) -> Result<ChainHandle> {
    if machines.is_empty() {
        return Err(Error::InvalidMachine("chain requires at least one machine".into()));
    }

    let mut handles = Vec::with_capacity(machines.len());
    for machine in machines {
        handles.push(Arc::new(runtime::start_fsm(context.clone(), machine).await?));
    }

    for i in 0..handles.len() - 1 {
        let current = handles[i].clone();
        let next = handles[i + 1].clone();
        tokio::spawn(async move {
            if let AwaitOutcome::Completed(_, trail) = current.await_completion(None).await {
                let event = trail.last_event().cloned().unwrap_or(Value::Null);
                next.submit(event);
            }
        });
    }

    Ok(ChainHandle { handles })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sub-machine action
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How much of the child machine's trail is folded into the parent
/// event on completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrailMode {
    Omit,
    Summary,
    Full,
}

impl TrailMode {
    fn from_config(value: &Value) -> Self {
        match value.as_str() {
            Some("omit") => TrailMode::Omit,
            Some("full") => TrailMode::Full,
            _ => TrailMode::Summary,
        }
    }
}

fn summarize(trail: &Trail) -> Value {
    serde_json::json!({
        "steps": trail.len(),
        "last": trail.last().map(|e| serde_json::json!({"from": e.from, "to": e.to})),
    })
}

fn full_repr(trail: &Trail) -> Value {
    serde_json::to_value(trail.entries()).unwrap_or(Value::Null)
}

struct SubMachineAction {
    machine_id: String,
    version: Option<String>,
    success_to: String,
    trail_mode: TrailMode,
    child: OnceCell<Machine>,
}

#[async_trait::async_trait]
impl Action for SubMachineAction {
    async fn run(&self, context: Context, event: Event, _trail: Trail, cont: Arc<dyn Continuation>) {
        let state_id = event
            .get("id")
            .and_then(|v| v.as_array())
            .and_then(|a| a.get(1))
            .and_then(|v| v.as_str())
            .unwrap_or("submachine")
            .to_string();

        let child_machine = match self.load_child(&context).await {
            Ok(m) => m,
            Err(e) => {
                cont.complete_simple(context, make_error_event(serde_json::json!({"reason": "store", "message": e.to_string()})))
                    .await;
                return;
            }
        };

        let handle = match runtime::start_fsm(context.clone(), child_machine.clone()).await {
            Ok(h) => h,
            Err(e) => {
                cont.complete_simple(context, make_error_event(serde_json::json!({"reason": "child-start", "message": e.to_string()})))
                    .await;
                return;
            }
        };

        handle.submit(event);
        let outcome = handle.await_completion(None).await;
        handle.stop().await;

        match outcome {
            AwaitOutcome::Completed(_, child_trail) => {
                let last = child_trail.last_event().cloned().unwrap_or(Value::Null);
                let mut fields = match last {
                    Value::Object(map) => Value::Object(map),
                    other => serde_json::json!({ "result": other }),
                };
                match self.trail_mode {
                    TrailMode::Omit => {}
                    TrailMode::Summary => {
                        if let Value::Object(map) = &mut fields {
                            map.insert("child_trail".into(), summarize(&child_trail));
                        }
                    }
                    TrailMode::Full => {
                        if let Value::Object(map) = &mut fields {
                            map.insert("child_trail".into(), full_repr(&child_trail));
                        }
                    }
                }
                let output = make_event(TransitionId::new(state_id, self.success_to.clone()), fields);
                cont.complete_simple(context, output).await;
            }
            AwaitOutcome::TimedOut => {
                cont.complete_simple(context, make_error_event(serde_json::json!({"reason": "submachine-timeout"})))
                    .await;
            }
        }
    }
}

impl SubMachineAction {
    async fn load_child(&self, context: &Context) -> Result<Machine> {
        let machine_id = self.machine_id.clone();
        let version = self.version.clone();
        self.child
            .get_or_try_init(|| async {
                let store = context
                    .store
                    .as_ref()
                    .ok_or_else(|| Error::Store("no machine store registered in context".into()))?;
                store.get(&machine_id, version.as_deref()).await
            })
            .await
            .map(|m| m.clone())
    }
}

pub struct SubMachineActionFactory {
    descriptor: ActionDescriptor,
}

impl Default for SubMachineActionFactory {
    fn default() -> Self {
        Self {
            descriptor: ActionDescriptor::new("submachine").with_config_schema(serde_json::json!({
                "type": "object",
                "properties": {
                    "machine_id": {"type": "string"},
                    "version": {"type": "string"},
                    "success_to": {"type": "string"},
                    "trail_mode": {"type": "string", "enum": ["omit", "summary", "full"]}
                },
                "required": ["machine_id", "success_to"]
            })),
        }
    }
}

impl ActionFactory for SubMachineActionFactory {
    fn descriptor(&self) -> &ActionDescriptor {
        &self.descriptor
    }

    fn build(&self, config: &Value, _machine: &Machine, _state: &State) -> Result<BoxedAction> {
        let machine_id = config
            .get("machine_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::InvalidConfig {
                action: "submachine".into(),
                errors: vec!["missing 'machine_id'".into()],
            })?
            .to_string();
        let success_to = config
            .get("success_to")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::InvalidConfig {
                action: "submachine".into(),
                errors: vec!["missing 'success_to'".into()],
            })?
            .to_string();
        let version = config.get("version").and_then(|v| v.as_str()).map(str::to_string);
        let trail_mode = config
            .get("trail_mode")
            .map(TrailMode::from_config)
            .unwrap_or(TrailMode::Summary);

        Ok(Arc::new(SubMachineAction {
            machine_id,
            version,
            success_to,
            trail_mode,
            child: OnceCell::new(),
        }))
    }
}
