#![forbid(unsafe_code)]

//! The committed model slot.
//!
//! [`ModelSignal<M>`] is returned by [`start`](crate::start). It exposes the
//! latest committed model and notifies UI-thread subscribers after each
//! commit. The engine is its single writer.
//!
//! The slot itself is an `arc-swap` cell, so a [`ModelReader<M>`] obtained
//! from [`ModelSignal::reader`] can read the latest snapshot from any
//! thread without locking, for example from inside an async handler that
//! needs to look at state committed after it started.
//!
//! # Invariants
//!
//! 1. `version()` increments exactly once per publish.
//! 2. Subscribers run after the slot has been updated, so `current()` inside
//!    a subscriber returns the model being announced.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwap;

use crate::notify::{Notifier, Subscription};

struct Slot<M> {
    model: ArcSwap<M>,
    version: AtomicU64,
}

/// Observable, single-writer holder of the current model.
pub struct ModelSignal<M> {
    slot: Arc<Slot<M>>,
    changed: Notifier<M>,
}

impl<M> Clone for ModelSignal<M> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
            changed: self.changed.clone(),
        }
    }
}

impl<M: fmt::Debug> fmt::Debug for ModelSignal<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSignal")
            .field("model", &*self.slot.model.load())
            .field("version", &self.slot.version.load(Ordering::Acquire))
            .finish()
    }
}

impl<M: Clone + Send + Sync + 'static> ModelSignal<M> {
    pub(crate) fn new(initial: M) -> Self {
        Self {
            slot: Arc::new(Slot {
                model: ArcSwap::from_pointee(initial),
                version: AtomicU64::new(0),
            }),
            changed: Notifier::new(),
        }
    }

    /// Clone of the latest committed model.
    #[must_use]
    pub fn current(&self) -> M {
        M::clone(&self.slot.model.load())
    }

    /// Shared handle to the latest committed model, without cloning it.
    #[must_use]
    pub fn load(&self) -> Arc<M> {
        self.slot.model.load_full()
    }

    /// Number of commits since start.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.slot.version.load(Ordering::Acquire)
    }

    /// Called on the UI thread after every commit.
    pub fn subscribe(&self, callback: impl Fn(&M) + 'static) -> Subscription {
        self.changed.subscribe(callback)
    }

    /// A `Send + Sync` read handle.
    #[must_use]
    pub fn reader(&self) -> ModelReader<M> {
        ModelReader {
            slot: Arc::clone(&self.slot),
        }
    }

    pub(crate) fn publish(&self, model: M) {
        self.slot.model.store(Arc::new(model.clone()));
        self.slot.version.fetch_add(1, Ordering::AcqRel);
        self.changed.notify(&model);
    }
}

/// Thread-safe, read-only view of a [`ModelSignal`].
pub struct ModelReader<M> {
    slot: Arc<Slot<M>>,
}

impl<M> Clone for ModelReader<M> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<M> fmt::Debug for ModelReader<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelReader")
            .field("version", &self.slot.version.load(Ordering::Acquire))
            .finish()
    }
}

impl<M: Clone + Send + Sync + 'static> ModelReader<M> {
    #[must_use]
    pub fn current(&self) -> M {
        M::clone(&self.slot.model.load())
    }

    #[must_use]
    pub fn load(&self) -> Arc<M> {
        self.slot.model.load_full()
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.slot.version.load(Ordering::Acquire)
    }
}
