#![forbid(unsafe_code)]

//! Rebind Core
//!
//! Model-side machinery for the rebind reconciliation engine. Nothing in
//! this crate knows about controls or threads; it only understands
//! immutable records and the paths into them.
//!
//! # Key Components
//!
//! - [`Record`] / [`Schema`] - declared members of an immutable model type
//! - [`Value`] - type-erased, structurally comparable field value
//! - [`Accessor`] / [`PropertyChain`] / [`TypedChain`] - composed paths
//! - [`path`] - resolve member path expressions into chains
//! - [`diff()`] / [`Differ`] - minimal change list between two snapshots
//! - [`permute()`] - rebuild a snapshot with chosen leaves replaced
//!
//! # Role in rebind
//! `rebind-runtime` owns the canonical model and the bound controls; every
//! time a control edits the model or a handler returns a new one, it asks
//! this crate which chains changed and how to build the next snapshot.

pub mod accessor;
pub mod chain;
pub mod diff;
pub mod error;
pub mod path;
pub mod permute;
pub mod record;
pub mod value;

pub use accessor::{Accessor, AccessorId, FieldAccess, FieldKind, Fields};
pub use chain::{PropertyChain, TypedChain};
pub use diff::{Differ, diff, diff_records};
pub use error::{ChainError, PathError, SchemaError};
pub use path::{Selector, resolve, resolve_selector, resolve_typed};
pub use permute::{Change, permute, permute_record};
pub use record::{FieldValue, Record, Schema};
pub use value::{AnyValue, Value};
