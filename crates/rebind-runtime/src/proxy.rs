#![forbid(unsafe_code)]

//! Change proxy cells between controls and the reconciliation engine.
//!
//! A [`ChangeProxy<T>`] holds the last known value of one control property
//! and exposes two distinct notifications:
//!
//! - **view changed**: the user edited the control
//!   ([`ChangeProxy::raise_view_changed`]);
//! - **value set**: the engine wrote a model value into the control
//!   ([`ChangeProxy::set_view`]).
//!
//! # Invariants
//!
//! 1. `set_view` never fires view-changed subscribers, even when the
//!    underlying control reports the programmatic write as a change event
//!    while it is being applied.
//! 2. `raise_view_changed` with the last known value is a no-op.
//! 3. `version` increments exactly once per stored value change.
//! 4. A proxy built with [`ChangeProxy::detached`] never fires view-changed.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::control::{ControlProperty, ObservableControl, UpdateTrigger};
use crate::notify::{Notifier, Subscription};

struct ProxyInner<T> {
    value: RefCell<T>,
    version: Cell<u64>,
    setting: Cell<bool>,
    observes_view: bool,
    view_changed: Notifier<T>,
    value_set: Notifier<T>,
    wiring: RefCell<Vec<Subscription>>,
}

/// Uniform change-notification adapter around one control property.
pub struct ChangeProxy<T> {
    inner: Rc<ProxyInner<T>>,
}

impl<T> Clone for ChangeProxy<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ChangeProxy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeProxy")
            .field("value", &*self.inner.value.borrow())
            .field("version", &self.inner.version.get())
            .field("observes_view", &self.inner.observes_view)
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> ChangeProxy<T> {
    fn with_mode(initial: T, observes_view: bool) -> Self {
        Self {
            inner: Rc::new(ProxyInner {
                value: RefCell::new(initial),
                version: Cell::new(0),
                setting: Cell::new(false),
                observes_view,
                view_changed: Notifier::new(),
                value_set: Notifier::new(),
                wiring: RefCell::new(Vec::new()),
            }),
        }
    }

    /// A free-standing proxy that reports view changes raised on it.
    #[must_use]
    pub fn new(initial: T) -> Self {
        Self::with_mode(initial, true)
    }

    /// A free-standing proxy with no view-changed source.
    #[must_use]
    pub fn model_driven(initial: T) -> Self {
        Self::with_mode(initial, false)
    }

    /// Wire `control` both ways: user edits at `trigger` time surface as
    /// view changes, and [`set_view`](Self::set_view) writes the control.
    pub fn attach<C>(control: C, trigger: UpdateTrigger) -> Self
    where
        C: ObservableControl<Value = T>,
    {
        let control = Rc::new(control);
        let proxy = Self::wire_output(Rc::clone(&control), true);
        let weak: Weak<ProxyInner<T>> = Rc::downgrade(&proxy.inner);
        let native = control.subscribe(
            trigger,
            Box::new(move |value| {
                if let Some(inner) = weak.upgrade() {
                    ChangeProxy { inner }.raise_view_changed(value);
                }
            }),
        );
        proxy.inner.wiring.borrow_mut().push(native);
        proxy
    }

    /// Wire `control` for model-to-view writes only.
    pub fn detached<C>(control: C) -> Self
    where
        C: ControlProperty<Value = T>,
    {
        Self::wire_output(Rc::new(control), false)
    }

    fn wire_output<C>(control: Rc<C>, observes_view: bool) -> Self
    where
        C: ControlProperty<Value = T>,
    {
        let proxy = Self::with_mode(control.get(), observes_view);
        let writer = proxy.on_value_set(move |value| control.set(value.clone()));
        proxy.inner.wiring.borrow_mut().push(writer);
        proxy
    }

    /// Last known value.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.value.borrow().clone()
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    /// Whether this proxy can ever report a view change.
    #[must_use]
    pub fn observes_view(&self) -> bool {
        self.inner.observes_view
    }

    /// Whether a programmatic write is being applied right now.
    #[must_use]
    pub fn is_setting(&self) -> bool {
        self.inner.setting.get()
    }

    fn store(&self, value: &T) -> bool {
        if *self.inner.value.borrow() == *value {
            return false;
        }
        *self.inner.value.borrow_mut() = value.clone();
        self.inner.version.set(self.inner.version.get() + 1);
        true
    }

    /// The user edited the control.
    pub fn raise_view_changed(&self, value: T) {
        if self.inner.setting.get() {
            trace!(target: "rebind.proxy", "suppressed echo of programmatic write");
            return;
        }
        if !self.inner.observes_view {
            self.store(&value);
            return;
        }
        if self.store(&value) {
            self.inner.view_changed.notify(&value);
        }
    }

    /// Write a model value into the control without reporting a view change.
    pub fn set_view(&self, value: T) {
        if !self.store(&value) {
            return;
        }
        let previous = self.inner.setting.replace(true);
        let _reset = ResetOnDrop {
            flag: &self.inner.setting,
            value: previous,
        };
        self.inner.value_set.notify(&value);
    }

    /// Subscribe to user edits.
    pub fn on_view_changed(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        self.inner.view_changed.subscribe(callback)
    }

    /// Subscribe to programmatic writes.
    pub fn on_value_set(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        self.inner.value_set.subscribe(callback)
    }
}

struct ResetOnDrop<'a> {
    flag: &'a Cell<bool>,
    value: bool,
}

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        self.flag.set(self.value);
    }
}
