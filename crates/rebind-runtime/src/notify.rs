#![forbid(unsafe_code)]

//! UI-thread change notification with RAII subscriptions.
//!
//! [`Notifier<T>`] is the single subscriber-list primitive behind change
//! proxies, event sources and the model signal. Subscribers are stored as
//! `Weak` callbacks; the strong side lives inside the returned
//! [`Subscription`], so dropping the guard unsubscribes.
//!
//! # Invariants
//!
//! 1. Subscribers are notified in registration order.
//! 2. A dropped [`Subscription`] is never called again; its dead entry is
//!    pruned during the next `notify()`.
//! 3. `notify()` holds no borrow while callbacks run, so callbacks may
//!    subscribe, unsubscribe, or notify re-entrantly.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

type CallbackRc<T> = Rc<dyn Fn(&T)>;
type CallbackWeak<T> = Weak<dyn Fn(&T)>;

/// Registration-ordered list of weak subscriber callbacks.
pub struct Notifier<T> {
    subscribers: Rc<RefCell<Vec<CallbackWeak<T>>>>,
}

impl<T> Clone for Notifier<T> {
    fn clone(&self) -> Self {
        Self {
            subscribers: Rc::clone(&self.subscribers),
        }
    }
}

impl<T> Default for Notifier<T> {
    fn default() -> Self {
        Self {
            subscribers: Rc::new(RefCell::new(Vec::new())),
        }
    }
}

impl<T> fmt::Debug for Notifier<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("subscriber_count", &self.subscribers.borrow().len())
            .finish()
    }
}

impl<T: 'static> Notifier<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback`; it stays registered while the guard lives.
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        let strong: CallbackRc<T> = Rc::new(callback);
        self.subscribers.borrow_mut().push(Rc::downgrade(&strong));
        Subscription::new(strong)
    }

    /// Call every live subscriber with `value`. Returns how many ran.
    pub fn notify(&self, value: &T) -> usize {
        let callbacks: Vec<CallbackRc<T>> = {
            let mut subscribers = self.subscribers.borrow_mut();
            subscribers.retain(|w| w.strong_count() > 0);
            subscribers.iter().filter_map(Weak::upgrade).collect()
        };
        for callback in &callbacks {
            callback(value);
        }
        callbacks.len()
    }

    /// Registered subscribers, including dead ones not yet pruned.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.borrow().len()
    }

    /// Live subscribers only.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.subscribers
            .borrow()
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }
}

/// RAII guard that keeps a registration alive.
///
/// Dropping it releases the callback (or runs the teardown given to
/// [`Subscription::on_drop`]).
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    _guard: Box<dyn Any>,
}

struct OnDrop<F: FnOnce()>(Option<F>);

impl<F: FnOnce()> Drop for OnDrop<F> {
    fn drop(&mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

impl Subscription {
    /// Keep `guard` alive for as long as the subscription lives.
    pub fn new(guard: impl Any) -> Self {
        Self {
            _guard: Box::new(guard),
        }
    }

    /// Run `teardown` when the subscription is dropped.
    ///
    /// Toolkit adapters use this to detach native event handlers.
    pub fn on_drop(teardown: impl FnOnce() + 'static) -> Self {
        Self::new(OnDrop(Some(teardown)))
    }

    /// A subscription holding nothing.
    pub fn empty() -> Self {
        Self::new(())
    }

    /// Combine several guards into one.
    pub fn merge(subscriptions: Vec<Subscription>) -> Self {
        Self::new(subscriptions)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn notifies_in_registration_order() {
        let notifier = Notifier::<i32>::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let subs: Vec<_> = (0..3)
            .map(|i| {
                let log = Rc::clone(&log);
                notifier.subscribe(move |v| log.borrow_mut().push((i, *v)))
            })
            .collect();
        assert_eq!(notifier.notify(&5), 3);
        assert_eq!(*log.borrow(), vec![(0, 5), (1, 5), (2, 5)]);
        drop(subs);
    }

    #[test]
    fn dropped_subscription_is_pruned() {
        let notifier = Notifier::<()>::new();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let sub = notifier.subscribe(move |_| h.set(h.get() + 1));
        notifier.notify(&());
        drop(sub);
        assert_eq!(notifier.subscriber_count(), 1);
        assert_eq!(notifier.live_count(), 0);
        assert_eq!(notifier.notify(&()), 0);
        assert_eq!(notifier.subscriber_count(), 0);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn reentrant_subscribe_during_notify() {
        let notifier = Notifier::<u8>::new();
        let inner_subs = Rc::new(RefCell::new(Vec::new()));
        let n = notifier.clone();
        let holder = Rc::clone(&inner_subs);
        let _outer = notifier.subscribe(move |_| {
            holder.borrow_mut().push(n.subscribe(|_| {}));
        });
        notifier.notify(&1);
        assert_eq!(inner_subs.borrow().len(), 1);
        assert_eq!(notifier.live_count(), 2);
    }

    #[test]
    fn on_drop_runs_teardown_once() {
        let ran = Rc::new(Cell::new(0));
        let r = Rc::clone(&ran);
        let sub = Subscription::on_drop(move || r.set(r.get() + 1));
        assert_eq!(ran.get(), 0);
        drop(sub);
        assert_eq!(ran.get(), 1);
    }

    #[test]
    fn merged_subscriptions_release_together() {
        let notifier = Notifier::<()>::new();
        let merged = Subscription::merge(vec![
            notifier.subscribe(|_| {}),
            notifier.subscribe(|_| {}),
        ]);
        assert_eq!(notifier.live_count(), 2);
        drop(merged);
        assert_eq!(notifier.live_count(), 0);
    }
}
