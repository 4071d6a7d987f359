#![forbid(unsafe_code)]

//! Logical event sources.
//!
//! Controls raise *logical* events (button clicked, item activated) through
//! an [`EventSource<E>`] owned by the view. The application's events
//! function hands the engine one [`EventStream<E>`] per source; the engine
//! subscribes to all of them and merges their emissions into its single
//! ordered input queue.

use std::fmt;
use std::rc::Rc;

use crate::notify::{Notifier, Subscription};

/// UI-thread emitter of logical events.
pub struct EventSource<E> {
    notifier: Notifier<E>,
    name: &'static str,
}

impl<E> Clone for EventSource<E> {
    fn clone(&self) -> Self {
        Self {
            notifier: self.notifier.clone(),
            name: self.name,
        }
    }
}

impl<E> fmt::Debug for EventSource<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSource")
            .field("name", &self.name)
            .field("notifier", &self.notifier)
            .finish()
    }
}

impl<E: 'static> Default for EventSource<E> {
    fn default() -> Self {
        Self::new("events")
    }
}

impl<E: 'static> EventSource<E> {
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            notifier: Notifier::new(),
            name,
        }
    }

    /// Deliver `event` to every subscribed stream. Returns how many
    /// subscribers received it.
    pub fn emit(&self, event: E) -> usize {
        tracing::trace!(target: "rebind.events", source = self.name, "emit");
        self.notifier.notify(&event)
    }

    /// Subscribe-only handle for the engine.
    #[must_use]
    pub fn stream(&self) -> EventStream<E> {
        EventStream {
            notifier: self.notifier.clone(),
            name: self.name,
            _forward: None,
        }
    }
}

/// Subscribe-only view of an [`EventSource`].
pub struct EventStream<E> {
    notifier: Notifier<E>,
    name: &'static str,
    _forward: Option<Rc<Subscription>>,
}

impl<E> Clone for EventStream<E> {
    fn clone(&self) -> Self {
        Self {
            notifier: self.notifier.clone(),
            name: self.name,
            _forward: self._forward.clone(),
        }
    }
}

impl<E> fmt::Debug for EventStream<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("name", &self.name)
            .finish()
    }
}

impl<E: 'static> EventStream<E> {
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn subscribe(&self, callback: impl Fn(&E) + 'static) -> Subscription {
        self.notifier.subscribe(callback)
    }

    /// A stream of `f(event)`, for merging sources of different event types
    /// into the engine's single event type. The projection stays wired for
    /// as long as the returned stream (or a clone of it) lives.
    #[must_use]
    pub fn map<T: 'static>(self, f: impl Fn(&E) -> T + 'static) -> EventStream<T> {
        let mapped = Notifier::new();
        let sink = mapped.clone();
        let forward = self.subscribe(move |event| {
            sink.notify(&f(event));
        });
        EventStream {
            notifier: mapped,
            name: self.name,
            _forward: Some(Rc::new(forward)),
        }
    }
}
