#![forbid(unsafe_code)]

//! Property chains: composed accessor paths into (possibly nested) records.
//!
//! # Invariants
//!
//! 1. Get/set symmetry: `chain.get(&chain.set(&root, v)?)? == v` for every
//!    writable chain and every `v` of the leaf type.
//! 2. Two chains are equal iff their accessor sequences are equal,
//!    element-wise; hashing agrees with equality.
//! 3. A chain is never empty.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

use crate::accessor::{Accessor, FieldKind};
use crate::error::{ChainError, PathError};
use crate::permute::{Change, permute};
use crate::record::{FieldValue, Record};
use crate::value::Value;

/// An ordered, non-empty sequence of accessors from a root record to a leaf.
#[derive(Clone)]
pub struct PropertyChain {
    hops: Arc<[Accessor]>,
}

impl PropertyChain {
    /// A one-hop chain.
    #[must_use]
    pub fn single(accessor: Accessor) -> Self {
        Self {
            hops: Arc::from(vec![accessor]),
        }
    }

    /// Build from hops; `None` when `hops` is empty.
    #[must_use]
    pub fn from_hops(hops: Vec<Accessor>) -> Option<Self> {
        (!hops.is_empty()).then(|| Self { hops: hops.into() })
    }

    /// A new chain with `accessor` in front.
    #[must_use]
    pub fn prepend(&self, accessor: Accessor) -> Self {
        let mut hops = Vec::with_capacity(self.hops.len() + 1);
        hops.push(accessor);
        hops.extend(self.hops.iter().cloned());
        Self { hops: hops.into() }
    }

    /// A new chain with `accessor` at the end.
    #[must_use]
    pub fn append(&self, accessor: Accessor) -> Self {
        let mut hops = self.hops.to_vec();
        hops.push(accessor);
        Self { hops: hops.into() }
    }

    #[must_use]
    pub fn hops(&self) -> &[Accessor] {
        &self.hops
    }

    #[must_use]
    pub fn head(&self) -> &Accessor {
        &self.hops[0]
    }

    #[must_use]
    pub fn leaf(&self) -> &Accessor {
        &self.hops[self.hops.len() - 1]
    }

    /// Everything after the first hop, if anything.
    #[must_use]
    pub fn tail(&self) -> Option<Self> {
        Self::from_hops(self.hops[1..].to_vec())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.hops.len()
    }

    /// Always false; chains are non-empty by construction.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Whether every hop may be assigned (no computed member on the path).
    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.hops.iter().all(|hop| hop.kind() == FieldKind::Stored)
    }

    /// Whether the leaf is a computed member.
    #[must_use]
    pub fn is_computed(&self) -> bool {
        self.leaf().is_computed()
    }

    /// Whether `self` is a (non-strict) prefix of `other`.
    #[must_use]
    pub fn is_prefix_of(&self, other: &Self) -> bool {
        self.len() <= other.len() && self.hops.iter().zip(other.hops.iter()).all(|(a, b)| a == b)
    }

    /// Whether one chain is a prefix of the other: a change at either path
    /// alters the value seen at the other.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.is_prefix_of(other) || other.is_prefix_of(self)
    }

    /// Read the leaf value from `root`.
    pub fn get(&self, root: &Value) -> Result<Value, ChainError> {
        let mut current = root.clone();
        for hop in self.hops.iter() {
            current = hop.get(&current)?;
        }
        Ok(current)
    }

    /// A new root with the leaf replaced by `value`.
    pub fn set(&self, root: &Value, value: Value) -> Result<Value, ChainError> {
        permute(root, &[Change::new(self.clone(), value)])
    }

    /// Dotted member path, e.g. `home.score`.
    #[must_use]
    pub fn path(&self) -> String {
        self.to_string()
    }
}

impl PartialEq for PropertyChain {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.hops, &other.hops) || self.hops[..] == other.hops[..]
    }
}

impl Eq for PropertyChain {}

impl Hash for PropertyChain {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for hop in self.hops.iter() {
            hop.hash(state);
        }
    }
}

impl fmt::Display for PropertyChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, hop) in self.hops.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            f.write_str(hop.name())?;
        }
        Ok(())
    }
}

impl fmt::Debug for PropertyChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PropertyChain({self})")
    }
}

/// A [`PropertyChain`] checked to lead from `M` to a leaf of type `A`.
pub struct TypedChain<M, A> {
    chain: PropertyChain,
    _marker: PhantomData<fn(&M) -> A>,
}

impl<M, A> Clone for TypedChain<M, A> {
    fn clone(&self) -> Self {
        Self {
            chain: self.chain.clone(),
            _marker: PhantomData,
        }
    }
}

impl<M, A> fmt::Debug for TypedChain<M, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypedChain({})", self.chain)
    }
}

impl<M, A> PartialEq for TypedChain<M, A> {
    fn eq(&self, other: &Self) -> bool {
        self.chain == other.chain
    }
}

impl<M: Record, A: FieldValue> TypedChain<M, A> {
    /// Check that `chain` starts at `M` and ends at a member of type `A`.
    pub fn new(chain: PropertyChain) -> Result<Self, PathError> {
        let root = chain.head().id();
        if root.owner() != std::any::TypeId::of::<M>() {
            return Err(PathError::TypeMismatch {
                chain: chain.path(),
                expected: std::any::type_name::<M>(),
                found: root.owner_name(),
            });
        }
        let (leaf_type, leaf_name) = chain.leaf().value_type();
        if leaf_type != std::any::TypeId::of::<A>() {
            return Err(PathError::TypeMismatch {
                chain: chain.path(),
                expected: std::any::type_name::<A>(),
                found: leaf_name,
            });
        }
        Ok(Self {
            chain,
            _marker: PhantomData,
        })
    }

    #[must_use]
    pub fn chain(&self) -> &PropertyChain {
        &self.chain
    }

    #[must_use]
    pub fn erase(self) -> PropertyChain {
        self.chain
    }

    /// Read the leaf from `model`.
    pub fn get(&self, model: &M) -> Result<A, ChainError> {
        let value = self.chain.get(&Value::new(model.clone()))?;
        leaf_value(&self.chain, &value)
    }

    /// A new model with the leaf replaced.
    pub fn set(&self, model: &M, value: A) -> Result<M, ChainError> {
        let root = self.chain.set(&Value::new(model.clone()), Value::new(value))?;
        root.downcast::<M>().ok_or(ChainError::OwnerMismatch {
            field: self.chain.head().name(),
            expected: std::any::type_name::<M>(),
            found: root.type_name(),
        })
    }

    /// Downcast a leaf value read through this chain.
    pub fn value_of(&self, value: &Value) -> Result<A, ChainError> {
        leaf_value(&self.chain, value)
    }
}

fn leaf_value<A: FieldValue>(chain: &PropertyChain, value: &Value) -> Result<A, ChainError> {
    value.downcast::<A>().ok_or(ChainError::ValueMismatch {
        field: chain.leaf().name(),
        expected: std::any::type_name::<A>(),
        found: value.type_name(),
    })
}
