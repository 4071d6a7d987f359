#![forbid(unsafe_code)]

//! Property path resolver.
//!
//! Turns a member access expression rooted at a model type into a
//! [`PropertyChain`]. Three shapes are accepted:
//!
//! - a single member: `name`
//! - a nested path through stored record members: `address.city`
//! - a tuple selector for list displays: `(id, label)`
//!
//! Anything else (method calls, indexing, arithmetic) is rejected with a
//! [`PathError`]. Resolution happens while binders run, once at startup, so
//! every error here is a declaration mistake and should abort startup.
//!
//! The [`path!`](crate::path!) macro resolves a path written as Rust
//! tokens, so non-path expressions do not even compile.

use crate::accessor::Fields;
use crate::chain::{PropertyChain, TypedChain};
use crate::error::{ChainError, PathError};
use crate::record::{FieldValue, Record};

/// Resolve a dotted member path against `M`.
pub fn resolve<M: Record>(expr: &str) -> Result<PropertyChain, PathError> {
    let segments = split_path(expr)?;
    resolve_segments::<M>(&segments)
}

/// Resolve and check the leaf type.
pub fn resolve_typed<M: Record, A: FieldValue>(expr: &str) -> Result<TypedChain<M, A>, PathError> {
    TypedChain::new(resolve::<M>(expr)?)
}

/// Resolve already-split member names against `M`.
pub fn resolve_segments<M: Record>(segments: &[&str]) -> Result<PropertyChain, PathError> {
    let Some((last, init)) = segments.split_last() else {
        return Err(PathError::Empty);
    };
    let mut fields = Fields::of::<M>();
    let mut hops = Vec::with_capacity(segments.len());
    for segment in init {
        let hop = find(&fields, segment)?;
        let nested = hop.nested().cloned();
        hops.push(hop);
        fields = nested.ok_or_else(|| PathError::NotARecord {
            chain: join(&hops),
        })?;
    }
    hops.push(find(&fields, last)?);
    PropertyChain::from_hops(hops).ok_or(PathError::Empty)
}

/// [`resolve_segments`] with a leaf type check.
pub fn resolve_typed_segments<M: Record, A: FieldValue>(
    segments: &[&str],
) -> Result<TypedChain<M, A>, PathError> {
    TypedChain::new(resolve_segments::<M>(segments)?)
}

fn find(fields: &Fields, name: &str) -> Result<crate::Accessor, PathError> {
    fields
        .find(name)
        .cloned()
        .ok_or_else(|| PathError::UnknownField {
            ty: crate::accessor::short_type_name(fields.type_name()),
            field: name.to_owned(),
        })
}

fn join(hops: &[crate::Accessor]) -> String {
    hops.iter()
        .map(crate::Accessor::name)
        .collect::<Vec<_>>()
        .join(".")
}

fn split_path(expr: &str) -> Result<Vec<&str>, PathError> {
    let trimmed = expr.trim();
    if trimmed.is_empty() {
        return Err(PathError::Empty);
    }
    let not_a_path = |reason| PathError::NotAPropertyPath {
        expr: expr.to_owned(),
        reason,
    };
    trimmed
        .split('.')
        .map(|segment| {
            let segment = segment.trim();
            if segment.is_empty() {
                return Err(not_a_path("empty member name"));
            }
            if segment.contains('(') || segment.contains(')') {
                return Err(not_a_path("method calls are not member access"));
            }
            if segment.contains('[') || segment.contains(']') {
                return Err(not_a_path("indexing is not member access"));
            }
            if !is_identifier(segment) {
                return Err(not_a_path("member names must be identifiers"));
            }
            Ok(segment)
        })
        .collect()
}

fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    chars
        .next()
        .is_some_and(|c| c == '_' || c.is_alphabetic())
        && chars.all(|c| c == '_' || c.is_alphanumeric())
}

/// Value/display pair extracted from list items.
pub struct Selector<I, V, D> {
    value: TypedChain<I, V>,
    display: TypedChain<I, D>,
}

impl<I, V, D> Clone for Selector<I, V, D> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            display: self.display.clone(),
        }
    }
}

impl<I, V, D> std::fmt::Debug for Selector<I, V, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Selector({:?}, {:?})", self.value, self.display)
    }
}

impl<I: Record, V: FieldValue, D: FieldValue> Selector<I, V, D> {
    #[must_use]
    pub fn value_chain(&self) -> &TypedChain<I, V> {
        &self.value
    }

    #[must_use]
    pub fn display_chain(&self) -> &TypedChain<I, D> {
        &self.display
    }

    /// Project one item into its `(value, display)` pair.
    pub fn project(&self, item: &I) -> Result<(V, D), ChainError> {
        Ok((self.value.get(item)?, self.display.get(item)?))
    }
}

/// Resolve a `(value, display)` tuple selector against item type `I`.
pub fn resolve_selector<I, V, D>(expr: &str) -> Result<Selector<I, V, D>, PathError>
where
    I: Record,
    V: FieldValue,
    D: FieldValue,
{
    let expected_tuple = || PathError::ExpectedTuple {
        expr: expr.to_owned(),
    };
    let inner = expr
        .trim()
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(expected_tuple)?;
    let parts: Vec<&str> = inner.split(',').collect();
    let [value, display] = parts.as_slice() else {
        return Err(expected_tuple());
    };
    Ok(Selector {
        value: resolve_typed::<I, V>(value)?,
        display: resolve_typed::<I, D>(display)?,
    })
}

/// Resolve a member path written as Rust tokens into a [`TypedChain`].
///
/// Without a `: Leaf` suffix the leaf type is inferred from use, so an
/// untyped integer literal passed to `set` resolves against `i32`.
///
/// ```
/// use rebind_core::{Record, Schema, path, schema};
///
/// #[derive(Debug, Clone, PartialEq)]
/// struct Address { city: String }
/// impl Record for Address {
///     fn schema() -> Schema<Self> { schema!(Address { city }) }
/// }
///
/// #[derive(Debug, Clone, PartialEq)]
/// struct Person { address: Address }
/// impl Record for Person {
///     fn schema() -> Schema<Self> { schema!(Person { record address }) }
/// }
///
/// let p = Person { address: Address { city: "Oslo".into() } };
/// let city = path!(Person => address.city: String).unwrap();
/// assert_eq!(city.get(&p).unwrap(), "Oslo");
/// let inferred = path!(Person => address.city).unwrap();
/// let _: String = inferred.get(&p).unwrap();
/// ```
#[macro_export]
macro_rules! path {
    ($root:ty => $($segment:ident).+ : $leaf:ty) => {
        $crate::path::resolve_typed_segments::<$root, $leaf>(&[$(stringify!($segment)),+])
    };
    ($root:ty => $($segment:ident).+) => {
        $crate::path::resolve_typed_segments::<$root, _>(&[$(stringify!($segment)),+])
    };
}
