#![forbid(unsafe_code)]

//! Engine start-up and the session handle.
//!
//! [`start`] runs the binder once, indexes the bindings, performs the
//! initial model-to-view push, wires every view-change source and logical
//! event stream into a fresh engine, and returns the [`ModelSignal`] plus a
//! [`Session`]. Dropping the session (or calling [`Session::dispose`])
//! tears all of that wiring down and cancels in-flight async handlers.

use std::fmt;
use std::rc::{Rc, Weak};

use rebind_core::{Record, Value};
use tracing::{debug, info};
use web_time::Duration;

use crate::binding::{BindError, Binding};
use crate::config::{ConfigError, EngineConfig};
use crate::engine::{Engine, EngineState, EngineStats, Input};
use crate::events::EventStream;
use crate::handler::Handler;
use crate::notify::Subscription;
use crate::signal::ModelSignal;

/// Start a reconciliation engine for one view.
///
/// - `binder` declares the bindings; it runs exactly once, here.
/// - `events` lists the view's logical event streams; they are merged into
///   the engine's single input queue.
/// - `dispatcher` maps each logical event to a [`Handler`].
///
/// Declaration problems (bad paths, read-only targets, an invalid model
/// schema or engine policy, unreadable initial values) are returned as
/// [`BindError`] before anything is wired.
pub fn start<M, E, V>(
    binder: impl FnOnce(&V, &M) -> Result<Vec<Binding<M>>, BindError>,
    events: impl FnOnce(&V) -> Vec<EventStream<E>>,
    dispatcher: impl Fn(E) -> Handler<M> + 'static,
    view: &V,
    initial: M,
    config: EngineConfig,
) -> Result<(ModelSignal<M>, Session<M, E>), BindError>
where
    M: Record,
    E: Clone + 'static,
    V: ?Sized,
{
    let problems = config.policy.validate();
    if !problems.is_empty() {
        return Err(BindError::Policy(ConfigError::Validation(problems)));
    }
    M::schema().validate().map_err(|source| BindError::Schema {
        model: std::any::type_name::<M>(),
        source,
    })?;
    let bindings = binder(view, &initial)?;

    let initial_value = Value::new(initial.clone());
    for (position, binding) in bindings.iter().enumerate() {
        config.wire(&binding.descriptor(position));
        binding
            .push(&initial_value)
            .map_err(|source| BindError::InitialValue {
                label: binding.label().to_owned(),
                source,
            })?;
    }

    let signal = ModelSignal::new(initial.clone());
    let engine = Rc::new(Engine::new(
        initial,
        bindings,
        Box::new(dispatcher),
        signal.clone(),
        config,
    ));
    let mut wiring = Vec::new();

    for (position, binding) in engine.bindings().iter().enumerate() {
        let weak = Rc::downgrade(&engine);
        let sink = Box::new(move |value: Value| {
            submit(&weak, Input::View {
                binding: position,
                value,
            });
        });
        if let Some(subscription) = binding.subscribe_view(sink) {
            wiring.push(subscription);
        }
    }
    let observing = wiring.len();

    let streams = events(view);
    for stream in &streams {
        let weak = Rc::downgrade(&engine);
        debug!(target: "rebind.session", stream = stream.name(), "event stream wired");
        wiring.push(stream.subscribe(move |event: &E| {
            submit(&weak, Input::Event(event.clone()));
        }));
    }

    info!(
        target: "rebind.session",
        model = std::any::type_name::<M>(),
        bindings = engine.bindings().len(),
        observing,
        streams = streams.len(),
        "reconciliation engine started"
    );
    Ok((
        signal,
        Session {
            engine,
            wiring,
            _streams: streams,
        },
    ))
}

fn submit<M: Record, E: 'static>(engine: &Weak<Engine<M, E>>, input: Input<M, E>) {
    if let Some(engine) = engine.upgrade() {
        engine.submit(input);
    }
}

/// Handle to a running engine. Dropping it tears down all wiring.
#[must_use = "dropping a Session disposes the engine immediately"]
pub struct Session<M: Record, E: 'static> {
    engine: Rc<Engine<M, E>>,
    wiring: Vec<Subscription>,
    _streams: Vec<EventStream<E>>,
}

impl<M: Record, E: 'static> fmt::Debug for Session<M, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.engine.state())
            .field("in_flight", &self.engine.in_flight())
            .field("stats", &self.engine.stats())
            .finish()
    }
}

impl<M: Record, E: 'static> Session<M, E> {
    /// Commit async handler items that are already waiting. Call from the
    /// UI thread's idle loop. Returns how many items were committed.
    pub fn pump(&self) -> usize {
        self.engine.pump()
    }

    /// Pump until no async handler is in flight, or `timeout` passes.
    /// Returns `true` when every async handler finished.
    pub fn pump_until_idle(&self, timeout: Duration) -> bool {
        self.engine.pump_until_idle(timeout)
    }

    /// Async handlers still running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.engine.in_flight()
    }

    #[must_use]
    pub fn state(&self) -> EngineState {
        self.engine.state()
    }

    #[must_use]
    pub fn stats(&self) -> EngineStats {
        self.engine.stats()
    }

    /// Descriptors of every binding, in declaration order.
    #[must_use]
    pub fn descriptors(&self) -> Vec<crate::binding::BindingDescriptor> {
        self.engine
            .bindings()
            .iter()
            .enumerate()
            .map(|(position, binding)| binding.descriptor(position))
            .collect()
    }

    /// Tear down all wiring and cancel in-flight async handlers.
    pub fn dispose(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.engine.is_disposed() {
            return;
        }
        self.engine.dispose();
        self.wiring.clear();
        debug!(target: "rebind.session", "session disposed");
    }
}

impl<M: Record, E: 'static> Drop for Session<M, E> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
