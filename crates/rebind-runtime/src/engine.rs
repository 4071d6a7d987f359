#![forbid(unsafe_code)]

//! The reconciliation engine.
//!
//! Owns the canonical model, the bindings and their index, and serializes
//! every input through one queue on the UI thread:
//!
//! ```text
//!            ┌──────────── submit ────────────┐
//!  view change ─┐                             ▼
//!  logical event ├──▶ queue ──▶ Idle ──▶ Dispatching ──▶ Committing ──▶ Idle
//!  async yield ──┘        ▲                                   │
//!                         └──── inputs raised while busy ─────┘
//! ```
//!
//! Inputs submitted while the engine is not `Idle` (a binding echo, an
//! event emitted from a control write, a callback dispatching) are queued
//! and processed after the current one, so every mutation of the model is
//! totally ordered.
//!
//! # Invariants
//!
//! 1. Only the engine writes the model; it does so only in `Committing`.
//! 2. A view change never notifies the binding that raised it.
//! 3. Bindings are notified in declaration order.
//! 4. An async item is committed before its task is resumed.
//! 5. A committed model equals the one the handler returned; a handler
//!    change outside the schema is an error, never a partial commit.
//! 6. The queue never holds more than `max_queue_depth` waiting inputs;
//!    exceeding it is a panic, since it can only mean an input is
//!    feeding itself.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};

use rebind_core::{Change, Differ, PropertyChain, Record, Value, permute_record};
use tracing::field::Empty;
use tracing::{debug, debug_span, error, trace};
use web_time::{Duration, Instant};

use crate::binding::Binding;
use crate::cancellation::{CancelReason, CancellationToken};
use crate::config::{EngineConfig, SupersedePolicy};
use crate::handler::{Handler, HandlerError, ModelStream};
use crate::index::BindingIndex;
use crate::signal::ModelSignal;
use crate::task::{AsyncTask, TaskId, TaskPoll};

/// Where the engine is in its processing cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineState {
    Idle,
    /// A handler is running.
    Dispatching,
    /// Diff, permute and notify are in progress.
    Committing,
}

/// Monotonic counters for one engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Commits that changed at least one member.
    pub commits: u64,
    pub view_changes: u64,
    pub events: u64,
    /// `set_view` calls made by commits.
    pub bindings_notified: u64,
    pub async_started: u64,
    pub async_yields: u64,
    pub async_cancelled: u64,
    pub handler_errors: u64,
    /// Deepest the input queue has been.
    pub peak_queue_depth: usize,
}

pub(crate) enum Input<M, E> {
    View { binding: usize, value: Value },
    Event(E),
    Yield { task: TaskId, model: M },
}

type Dispatcher<M, E> = Box<dyn Fn(E) -> Handler<M>>;
type AsyncBody<M> = Box<dyn FnOnce(M, CancellationToken) -> ModelStream<M> + Send>;

pub(crate) struct Engine<M, E> {
    model: RefCell<M>,
    bindings: Vec<Binding<M>>,
    index: BindingIndex,
    differ: Differ<M>,
    signal: ModelSignal<M>,
    dispatcher: Dispatcher<M, E>,
    config: EngineConfig,
    state: Cell<EngineState>,
    queue: RefCell<VecDeque<Input<M, E>>>,
    tasks: RefCell<Vec<AsyncTask<M>>>,
    next_task: Cell<TaskId>,
    stats: Cell<EngineStats>,
    disposed: Cell<bool>,
}

/// Puts the engine back to `Idle` however processing ends.
struct IdleOnDrop<'a>(&'a Cell<EngineState>);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        self.0.set(EngineState::Idle);
    }
}

impl<M: Record, E: 'static> Engine<M, E> {
    pub(crate) fn new(
        initial: M,
        bindings: Vec<Binding<M>>,
        dispatcher: Dispatcher<M, E>,
        signal: ModelSignal<M>,
        config: EngineConfig,
    ) -> Self {
        let index = BindingIndex::build(
            bindings
                .iter()
                .enumerate()
                .filter(|(_, binding)| binding.writes_view())
                .map(|(position, binding)| (position, binding.chains())),
        );
        Self {
            model: RefCell::new(initial),
            bindings,
            index,
            differ: Differ::new(),
            signal,
            dispatcher,
            config,
            state: Cell::new(EngineState::Idle),
            queue: RefCell::new(VecDeque::new()),
            tasks: RefCell::new(Vec::new()),
            next_task: Cell::new(1),
            stats: Cell::new(EngineStats::default()),
            disposed: Cell::new(false),
        }
    }

    pub(crate) fn bindings(&self) -> &[Binding<M>] {
        &self.bindings
    }

    pub(crate) fn state(&self) -> EngineState {
        self.state.get()
    }

    pub(crate) fn stats(&self) -> EngineStats {
        self.stats.get()
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.tasks.borrow().len()
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    fn bump(&self, update: impl FnOnce(&mut EngineStats)) {
        let mut stats = self.stats.get();
        update(&mut stats);
        self.stats.set(stats);
    }

    /// Queue `input` and, if nothing is in progress, process the queue.
    pub(crate) fn submit(&self, input: Input<M, E>) {
        if self.disposed.get() {
            trace!(target: "rebind.engine", "input after dispose ignored");
            return;
        }
        let depth = {
            let mut queue = self.queue.borrow_mut();
            queue.push_back(input);
            queue.len()
        };
        self.bump(|s| s.peak_queue_depth = s.peak_queue_depth.max(depth));
        let limit = self.config.policy.max_queue_depth;
        if depth > limit {
            error!(target: "rebind.engine", depth, limit, "input queue overflow");
            panic!(
                "rebind input queue exceeded {limit} waiting inputs; \
                 a binding or handler is re-triggering itself"
            );
        }
        if self.state.get() != EngineState::Idle {
            debug!(
                target: "rebind.engine",
                depth,
                state = ?self.state.get(),
                "input queued behind in-flight work"
            );
            return;
        }
        self.drain();
    }

    fn drain(&self) {
        loop {
            let next = self.queue.borrow_mut().pop_front();
            let Some(input) = next else {
                break;
            };
            let _idle = IdleOnDrop(&self.state);
            match input {
                Input::View { binding, value } => self.view_change(binding, value),
                Input::Event(event) => self.dispatch(event),
                Input::Yield { task, model } => self.async_yield(task, model),
            }
        }
    }

    fn view_change(&self, origin: usize, value: Value) {
        self.state.set(EngineState::Committing);
        self.bump(|s| s.view_changes += 1);
        let binding = &self.bindings[origin];
        let Some(chain) = binding.chains().first().cloned() else {
            return;
        };
        let start = Instant::now();
        let span = debug_span!(
            "reconcile.view_change",
            binding = binding.label(),
            chain = %chain,
            changes = Empty,
            bindings_notified = Empty,
            duration_us = Empty,
        )
        .entered();

        match self.apply_view_change(&chain, value) {
            Ok((next, next_value, changes)) => {
                let notified = self.commit(next, &next_value, &changes, Some(origin));
                span.record("changes", changes.len());
                span.record("bindings_notified", notified);
            }
            Err(error) => self.route_error(error),
        }
        span.record("duration_us", start.elapsed().as_micros() as u64);
    }

    fn apply_view_change(
        &self,
        chain: &PropertyChain,
        value: Value,
    ) -> Result<(M, Value, Vec<Change>), HandlerError> {
        let previous = self.model.borrow().clone();
        let next = permute_record(&previous, &[Change::new(chain.clone(), value)])?;
        let next_value = Value::new(next.clone());
        let changes =
            self.differ
                .diff_computed_and(chain.head(), &Value::new(previous), &next_value)?;
        Ok((next, next_value, changes))
    }

    fn dispatch(&self, event: E) {
        self.state.set(EngineState::Dispatching);
        self.bump(|s| s.events += 1);
        let handler = (self.dispatcher)(event);
        let _span = debug_span!("reconcile.dispatch", handler = ?handler).entered();
        match handler {
            Handler::Sync(run) => {
                let current = self.model.borrow().clone();
                match catch_unwind(AssertUnwindSafe(move || run(&current))) {
                    Ok(Ok(next)) => self.commit_model(next),
                    Ok(Err(error)) => self.route_error(error),
                    Err(payload) => self.route_error(HandlerError::from_panic(payload)),
                }
            }
            Handler::Async(body) => self.start_task(body),
        }
    }

    /// Full diff of `next` against the current model, then permute and
    /// notify.
    fn commit_model(&self, next: M) {
        self.state.set(EngineState::Committing);
        let start = Instant::now();
        let span = debug_span!(
            "reconcile.commit",
            changes = Empty,
            bindings_notified = Empty,
            duration_us = Empty,
        )
        .entered();

        let previous = self.model.borrow().clone();
        let reconciled = self
            .differ
            .diff(&Value::new(previous.clone()), &Value::new(next.clone()))
            .and_then(|changes| {
                let committed = permute_record(&previous, &changes)?;
                Ok((committed, changes))
            });
        match reconciled {
            // Rebuilding from declared members must reproduce `next` exactly.
            Ok((committed, _)) if committed != next => {
                self.route_error(HandlerError::UndeclaredMember {
                    model: std::any::type_name::<M>(),
                });
            }
            Ok((committed, changes)) => {
                let committed_value = Value::new(committed.clone());
                let notified = self.commit(committed, &committed_value, &changes, None);
                span.record("changes", changes.len());
                span.record("bindings_notified", notified);
            }
            Err(error) => self.route_error(error.into()),
        }
        span.record("duration_us", start.elapsed().as_micros() as u64);
    }

    /// Install `next` and push it to every binding affected by `changes`,
    /// except `exclude`. Returns how many bindings were written.
    fn commit(
        &self,
        next: M,
        next_value: &Value,
        changes: &[Change],
        exclude: Option<usize>,
    ) -> usize {
        if changes.is_empty() {
            trace!(target: "rebind.engine", "no member changed; nothing to commit");
            return 0;
        }
        *self.model.borrow_mut() = next.clone();
        self.signal.publish(next);

        let mut notified = 0;
        for position in self.index.lookup_changes(changes, exclude) {
            match self.bindings[position].push(next_value) {
                Ok(true) => notified += 1,
                Ok(false) => {}
                Err(error) => self.route_error(error.into()),
            }
        }
        self.bump(|s| {
            s.commits += 1;
            s.bindings_notified += notified as u64;
        });
        debug!(
            target: "rebind.engine",
            changes = changes.len(),
            bindings_notified = notified,
            excluded = ?exclude,
            "commit"
        );
        notified
    }

    fn start_task(&self, body: AsyncBody<M>) {
        if self.config.policy.supersede == SupersedePolicy::CancelPrevious {
            let superseded: Vec<AsyncTask<M>> = self.tasks.borrow_mut().drain(..).collect();
            for task in &superseded {
                task.cancel(CancelReason::Superseded);
            }
            self.bump(|s| s.async_cancelled += superseded.len() as u64);
        }
        let id = self.next_task.get();
        self.next_task.set(id + 1);
        let snapshot = self.model.borrow().clone();
        match AsyncTask::spawn(id, &self.config.policy.worker_name_prefix, body, snapshot) {
            Ok(task) => {
                self.tasks.borrow_mut().push(task);
                self.bump(|s| s.async_started += 1);
            }
            Err(error) => self.route_error(error),
        }
    }

    fn async_yield(&self, task: TaskId, model: M) {
        let live = self
            .tasks
            .borrow()
            .iter()
            .any(|t| t.id() == task && !t.is_cancelled());
        if !live {
            debug!(target: "rebind.engine", task, "item from cancelled async handler dropped");
            return;
        }
        self.bump(|s| s.async_yields += 1);
        self.commit_model(model);
        if let Some(running) = self.tasks.borrow_mut().iter_mut().find(|t| t.id() == task) {
            running.resume();
        }
    }

    /// Commit whatever async items are ready, without blocking. Returns the
    /// number of items taken.
    pub(crate) fn pump(&self) -> usize {
        let polled: Vec<(TaskId, TaskPoll<M>)> = self
            .tasks
            .borrow_mut()
            .iter_mut()
            .map(|task| (task.id(), task.poll()))
            .collect();
        self.absorb(polled)
    }

    /// Pump until no async handler is in flight or `timeout` elapses.
    /// Returns `true` when idle.
    pub(crate) fn pump_until_idle(&self, timeout: Duration) -> bool {
        if self.state.get() != EngineState::Idle {
            debug!(target: "rebind.engine", "pump_until_idle called while busy");
            return false;
        }
        let deadline = Instant::now() + timeout;
        loop {
            self.pump();
            if self.tasks.borrow().is_empty() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let slice = (deadline - now).min(Duration::from_millis(10));
            let polled: Vec<(TaskId, TaskPoll<M>)> = {
                let mut tasks = self.tasks.borrow_mut();
                let mut polled = Vec::with_capacity(tasks.len());
                for (i, task) in tasks.iter_mut().enumerate() {
                    let poll = if i == 0 { task.wait(slice) } else { task.poll() };
                    polled.push((task.id(), poll));
                }
                polled
            };
            self.absorb(polled);
        }
    }

    fn absorb(&self, polled: Vec<(TaskId, TaskPoll<M>)>) -> usize {
        let mut taken = 0;
        for (task, poll) in polled {
            match poll {
                TaskPoll::Pending => {}
                TaskPoll::Yielded(model) => {
                    taken += 1;
                    self.submit(Input::Yield { task, model });
                }
                TaskPoll::Finished => self.finish_task(task),
                TaskPoll::Failed(error) => {
                    self.finish_task(task);
                    self.route_error(error);
                }
            }
        }
        taken
    }

    fn finish_task(&self, id: TaskId) {
        let finished = {
            let mut tasks = self.tasks.borrow_mut();
            tasks
                .iter()
                .position(|t| t.id() == id)
                .map(|position| tasks.remove(position))
        };
        if let Some(task) = finished {
            debug!(target: "rebind.engine", task = id, "async handler done");
            task.join();
        }
    }

    /// Hand `error` to the configured hook, or fail fast without one.
    fn route_error(&self, error: HandlerError) {
        self.bump(|s| s.handler_errors += 1);
        match &self.config.on_error {
            Some(hook) => {
                error!(target: "rebind.engine", error = %error, "handler error");
                hook(&error);
            }
            None => {
                error!(target: "rebind.engine", error = %error, "unhandled handler error");
                panic!("unhandled handler error: {error}");
            }
        }
    }

    /// Stop accepting input and cancel every async handler.
    pub(crate) fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        self.queue.borrow_mut().clear();
        let tasks: Vec<AsyncTask<M>> = self.tasks.borrow_mut().drain(..).collect();
        for task in &tasks {
            task.cancel(CancelReason::Disposed);
        }
        self.bump(|s| s.async_cancelled += tasks.len() as u64);
        debug!(target: "rebind.engine", cancelled = tasks.len(), "engine disposed");
    }
}
