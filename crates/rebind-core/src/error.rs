#![forbid(unsafe_code)]

//! Error types for schema declaration, path resolution and chain access.

use thiserror::Error;

/// A record schema was declared inconsistently.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("field `{field}` is declared more than once on `{ty}`")]
    DuplicateField { ty: &'static str, field: &'static str },
    #[error("record `{ty}` declares no fields")]
    NoFields { ty: &'static str },
}

/// A property path expression could not be turned into a chain.
///
/// These are declaration-time errors: binders resolve their paths once, at
/// startup, and a failure here is a mistake in the binding declarations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("empty property path")]
    Empty,
    #[error("`{expr}` is not a property access path: {reason}")]
    NotAPropertyPath { expr: String, reason: &'static str },
    #[error("`{ty}` has no member named `{field}`")]
    UnknownField { ty: &'static str, field: String },
    #[error("cannot navigate past `{chain}`: it is not a nested record field")]
    NotARecord { chain: String },
    #[error("`{chain}` has type `{found}`, expected `{expected}`")]
    TypeMismatch {
        chain: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("`{expr}` is not a tuple selector of the form `(value, display)`")]
    ExpectedTuple { expr: String },
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Reading or writing through a chain met a value of an unexpected type.
///
/// Chains are resolved against record schemas, so these only appear when a
/// chain is applied to a root of the wrong type or fed a value of the wrong
/// type: both are programmer errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("accessor `{field}` expects an owner of type `{expected}`, found `{found}`")]
    OwnerMismatch {
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },
    #[error("field `{field}` holds `{expected}`, cannot assign `{found}`")]
    ValueMismatch {
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },
    #[error("computed member `{field}` cannot be assigned")]
    ReadOnly { field: &'static str },
}
