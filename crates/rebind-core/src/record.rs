#![forbid(unsafe_code)]

//! Record types and their declared member schemas.
//!
//! A model is an immutable record: a plain Rust struct that is `Clone` and
//! `PartialEq`. Implementing [`Record`] declares, in order, which members
//! are primary constructor parameters (stored, possibly nested records) and
//! which are computed from the others. That declaration replaces run-time
//! reflection: it is the only place member names are spelled out.
//!
//! # Example
//!
//! ```
//! use rebind_core::{Record, Schema, schema};
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Team { name: String, score: u32 }
//!
//! impl Team {
//!     fn label(&self) -> String { format!("{} {}", self.name, self.score) }
//! }
//!
//! impl Record for Team {
//!     fn schema() -> Schema<Self> {
//!         schema!(Team { name, score, computed label = Team::label })
//!     }
//! }
//!
//! assert_eq!(Team::schema().computed_names(), ["label"]);
//! ```

use std::any::TypeId;
use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;

use crate::accessor::{Accessor, Fields, TypedField};
use crate::error::SchemaError;

/// Any value a record member can hold.
pub trait FieldValue: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {}

impl<T> FieldValue for T where T: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {}

/// An immutable record with a declared member schema.
pub trait Record: FieldValue {
    /// Members of this record, in declaration order.
    fn schema() -> Schema<Self>;
}

/// Ordered member declarations for record `R`.
pub struct Schema<R> {
    accessors: Vec<Accessor>,
    _marker: PhantomData<fn() -> R>,
}

impl<R: Record> Schema<R> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            accessors: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Declare a stored leaf member.
    #[must_use]
    pub fn field<A, G, S>(mut self, name: &'static str, get: G, set: S) -> Self
    where
        A: FieldValue,
        G: Fn(&R) -> &A + Send + Sync + 'static,
        S: Fn(&mut R, A) + Send + Sync + 'static,
    {
        let field = TypedField::stored(name, Box::new(move |r| get(r).clone()), Box::new(set));
        self.accessors.push(Accessor::new(field));
        self
    }

    /// Declare a stored member whose type is itself a record.
    ///
    /// The differ recurses into these and the permuter rebuilds them.
    #[must_use]
    pub fn record<A, G, S>(mut self, name: &'static str, get: G, set: S) -> Self
    where
        A: Record,
        G: Fn(&R) -> &A + Send + Sync + 'static,
        S: Fn(&mut R, A) + Send + Sync + 'static,
    {
        let field =
            TypedField::nested_record(name, Box::new(move |r| get(r).clone()), Box::new(set));
        self.accessors.push(Accessor::new(field));
        self
    }

    /// Declare a member derived from the others.
    #[must_use]
    pub fn computed<A, F>(mut self, name: &'static str, compute: F) -> Self
    where
        A: FieldValue,
        F: Fn(&R) -> A + Send + Sync + 'static,
    {
        let field = TypedField::computed(name, Box::new(compute));
        self.accessors.push(Accessor::new(field));
        self
    }

    /// Check the declarations for duplicates and emptiness.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let ty = std::any::type_name::<R>();
        if self.accessors.is_empty() {
            return Err(SchemaError::NoFields { ty });
        }
        let mut seen = HashSet::new();
        for accessor in &self.accessors {
            if !seen.insert(accessor.name()) {
                return Err(SchemaError::DuplicateField {
                    ty,
                    field: accessor.name(),
                });
            }
        }
        Ok(())
    }

    /// Names of the computed members, in declaration order.
    #[must_use]
    pub fn computed_names(&self) -> Vec<&'static str> {
        self.accessors
            .iter()
            .filter(|a| a.is_computed())
            .map(Accessor::name)
            .collect()
    }

    /// Erase into the shared field set used by chains and the differ.
    #[must_use]
    pub fn into_fields(self) -> Fields {
        Fields::new(std::any::type_name::<R>(), TypeId::of::<R>(), self.accessors)
    }
}

impl<R: Record> Default for Schema<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> fmt::Debug for Schema<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("accessors", &self.accessors)
            .finish()
    }
}

/// Declare a [`Schema`] from member names.
///
/// Plain identifiers are stored leaves, `record name` marks a nested record
/// member, and `computed name = expr` declares a derived member computed by
/// `expr: Fn(&R) -> A`.
///
/// ```
/// # use rebind_core::{Record, Schema, schema};
/// # #[derive(Debug, Clone, PartialEq)] struct Team { score: u32 }
/// # impl Record for Team { fn schema() -> Schema<Self> { schema!(Team { score }) } }
/// #[derive(Debug, Clone, PartialEq)]
/// struct Game { home: Team, away: Team, venue: String }
///
/// impl Record for Game {
///     fn schema() -> Schema<Self> {
///         schema!(Game {
///             record home,
///             record away,
///             venue,
///             computed total = |g: &Game| g.home.score + g.away.score,
///         })
///     }
/// }
/// # assert_eq!(Game::schema().computed_names(), ["total"]);
/// ```
#[macro_export]
macro_rules! schema {
    ($ty:ty { $($body:tt)* }) => {
        $crate::__schema_members!($crate::Schema::<$ty>::new(); $($body)*)
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __schema_members {
    ($schema:expr;) => {
        $schema
    };
    ($schema:expr; record $field:ident $(, $($rest:tt)*)?) => {
        $crate::__schema_members!(
            $schema.record(stringify!($field), |r| &r.$field, |r, v| r.$field = v);
            $($($rest)*)?
        )
    };
    ($schema:expr; computed $field:ident = $compute:expr $(, $($rest:tt)*)?) => {
        $crate::__schema_members!(
            $schema.computed(stringify!($field), $compute);
            $($($rest)*)?
        )
    };
    ($schema:expr; $field:ident $(, $($rest:tt)*)?) => {
        $crate::__schema_members!(
            $schema.field(stringify!($field), |r| &r.$field, |r, v| r.$field = v);
            $($($rest)*)?
        )
    };
}
