#![forbid(unsafe_code)]

//! Type-erased, structurally comparable values.
//!
//! The differ and permuter walk records of many different types through a
//! single code path, so every field value crossing that path is carried as
//! a [`Value`]. A `Value` is immutable and cheap to clone (`Arc`-backed);
//! equality delegates to the concrete type's `PartialEq`, and two values of
//! different concrete types are never equal.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// Object-safe view over any field value the engine can carry.
///
/// Implemented for every `Clone + PartialEq + Debug + Send + Sync + 'static`
/// type; there is no reason to implement it by hand.
pub trait AnyValue: Any + fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn clone_boxed(&self) -> Box<dyn AnyValue>;
    fn dyn_eq(&self, other: &dyn AnyValue) -> bool;
    fn type_name(&self) -> &'static str;
}

impl<T> AnyValue for T
where
    T: Clone + PartialEq + fmt::Debug + Send + Sync + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn clone_boxed(&self) -> Box<dyn AnyValue> {
        Box::new(self.clone())
    }

    fn dyn_eq(&self, other: &dyn AnyValue) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| other == self)
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// An immutable, type-erased value.
#[derive(Clone)]
pub struct Value {
    inner: Arc<dyn AnyValue>,
}

impl Value {
    /// Wrap a concrete value.
    #[must_use]
    pub fn new<T>(value: T) -> Self
    where
        T: Clone + PartialEq + fmt::Debug + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(value),
        }
    }

    /// Rewrap an owned box produced by [`Value::to_owned_box`].
    #[must_use]
    pub fn from_boxed(boxed: Box<dyn AnyValue>) -> Self {
        Self {
            inner: Arc::from(boxed),
        }
    }

    /// Borrow the concrete value if it is a `T`.
    #[must_use]
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.inner.as_any().downcast_ref::<T>()
    }

    /// Clone out the concrete value if it is a `T`.
    #[must_use]
    pub fn downcast<T: Clone + 'static>(&self) -> Option<T> {
        self.downcast_ref::<T>().cloned()
    }

    /// Whether the concrete value is a `T`.
    #[must_use]
    pub fn is<T: 'static>(&self) -> bool {
        self.inner.as_any().is::<T>()
    }

    /// `TypeId` of the concrete value.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.inner.as_any().type_id()
    }

    /// Name of the concrete type, for diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.inner.type_name()
    }

    /// Borrow the erased value.
    #[must_use]
    pub fn as_dyn(&self) -> &dyn AnyValue {
        &*self.inner
    }

    /// Clone the concrete value into an owned, mutable box.
    ///
    /// Records are rebuilt by mutating this box once and rewrapping it with
    /// [`Value::from_boxed`].
    #[must_use]
    pub fn to_owned_box(&self) -> Box<dyn AnyValue> {
        self.inner.clone_boxed()
    }

    /// Whether both handles point at the same allocation.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.inner.dyn_eq(&*other.inner)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.inner, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_values_of_same_type_compare_equal() {
        assert_eq!(Value::new(3_i32), Value::new(3_i32));
        assert_ne!(Value::new(3_i32), Value::new(4_i32));
    }

    #[test]
    fn values_of_different_types_never_compare_equal() {
        assert_ne!(Value::new(3_i32), Value::new(3_i64));
        assert_ne!(Value::new(String::from("a")), Value::new("a"));
    }

    #[test]
    fn downcast_round_trips() {
        let value = Value::new(Some(30_u8));
        assert_eq!(value.downcast::<Option<u8>>(), Some(Some(30)));
        assert!(value.downcast_ref::<u8>().is_none());
        assert!(value.is::<Option<u8>>());
    }

    #[test]
    fn owned_box_is_independent_copy() {
        let value = Value::new(vec![1, 2, 3]);
        let mut owned = value.to_owned_box();
        owned
            .as_any_mut()
            .downcast_mut::<Vec<i32>>()
            .expect("vec")
            .push(4);
        let rebuilt = Value::from_boxed(owned);
        assert_eq!(value.downcast::<Vec<i32>>(), Some(vec![1, 2, 3]));
        assert_eq!(rebuilt.downcast::<Vec<i32>>(), Some(vec![1, 2, 3, 4]));
    }

    #[test]
    fn debug_shows_inner_value() {
        assert_eq!(format!("{:?}", Value::new("hi")), "\"hi\"");
    }
}
