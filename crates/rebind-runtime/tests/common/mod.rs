#![forbid(unsafe_code)]
#![allow(dead_code)]

//! A minimal in-memory toolkit for integration tests.
//!
//! [`Widget<T>`] behaves like a native control: it has a "changed" event
//! raised on every edit (and, like most toolkits, on programmatic writes
//! too) and a "validated" event raised when the user commits the value.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use rebind_runtime::{
    ControlKind, ControlProperty, Notifier, ObservableControl, Record, Schema, Subscription,
    UpdateTrigger, schema,
};

struct WidgetInner<T> {
    value: RefCell<T>,
    history: RefCell<Vec<T>>,
    changed: Notifier<T>,
    validated: Notifier<T>,
}

/// Test control. Clones share the same underlying widget.
pub struct Widget<T> {
    inner: Rc<WidgetInner<T>>,
    name: &'static str,
}

impl<T> Clone for Widget<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
            name: self.name,
        }
    }
}

impl<T: Clone + PartialEq + Default + 'static> Widget<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            inner: Rc::new(WidgetInner {
                value: RefCell::new(T::default()),
                history: RefCell::new(Vec::new()),
                changed: Notifier::new(),
                validated: Notifier::new(),
            }),
            name,
        }
    }
}

impl<T: Clone + PartialEq + 'static> Widget<T> {
    /// The user edits the value (keystroke, click).
    pub fn edit(&self, value: T) {
        *self.inner.value.borrow_mut() = value.clone();
        self.inner.changed.notify(&value);
    }

    /// The user commits the current value (focus loss).
    pub fn commit(&self) {
        let value = self.value();
        self.inner.validated.notify(&value);
    }

    /// Edit then commit.
    pub fn enter(&self, value: T) {
        self.edit(value);
        self.commit();
    }

    pub fn value(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Every programmatic write, in order.
    pub fn writes(&self) -> Vec<T> {
        self.inner.history.borrow().clone()
    }

    pub fn clear_writes(&self) {
        self.inner.history.borrow_mut().clear();
    }
}

impl<T: Clone + PartialEq + 'static> ControlProperty for Widget<T> {
    type Value = T;
    const KIND: ControlKind = ControlKind::Text;

    fn describe(&self) -> String {
        self.name.to_owned()
    }

    fn get(&self) -> T {
        self.value()
    }

    fn set(&self, value: T) {
        *self.inner.value.borrow_mut() = value.clone();
        self.inner.history.borrow_mut().push(value.clone());
        // Native toolkits raise their change event for programmatic writes.
        self.inner.changed.notify(&value);
    }
}

impl<T: Clone + PartialEq + 'static> ObservableControl for Widget<T> {
    fn subscribe(&self, trigger: UpdateTrigger, on_change: Box<dyn Fn(T)>) -> Subscription {
        let source = match trigger {
            UpdateTrigger::OnChange => &self.inner.changed,
            UpdateTrigger::OnValidation => &self.inner.validated,
        };
        source.subscribe(move |value| on_change(value.clone()))
    }
}

/// Counts calls; shared between a test and the closures it hands out.
#[derive(Clone, Default)]
pub struct Counter(Rc<Cell<usize>>);

impl Counter {
    pub fn hit(&self) {
        self.0.set(self.0.get() + 1);
    }

    pub fn get(&self) -> usize {
        self.0.get()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Person {
    pub name: String,
    pub nickname: Option<String>,
    pub age: Option<i32>,
    pub edits: u32,
}

impl Record for Person {
    fn schema() -> Schema<Self> {
        schema!(Person {
            name,
            nickname,
            age,
            edits,
            computed greeting = |p: &Person| format!("Hello {}", p.name),
        })
    }
}

impl Person {
    pub fn dan() -> Self {
        Self {
            name: "Dan".into(),
            nickname: None,
            age: Some(30),
            edits: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Team {
    pub name: String,
    pub score: u32,
}

impl Record for Team {
    fn schema() -> Schema<Self> {
        schema!(Team { name, score })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Game {
    pub home: Team,
    pub away: Team,
}

impl Record for Game {
    fn schema() -> Schema<Self> {
        schema!(Game {
            record home,
            record away,
            computed total = |g: &Game| g.home.score + g.away.score,
        })
    }
}

impl Game {
    pub fn level() -> Self {
        Self {
            home: Team {
                name: "Home".into(),
                score: 1,
            },
            away: Team {
                name: "Away".into(),
                score: 1,
            },
        }
    }
}
