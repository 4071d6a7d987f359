#![forbid(unsafe_code)]

//! Model differ: the minimal `(chain, value)` list between two snapshots.
//!
//! # Invariants
//!
//! 1. `diff(props, m, m)` is empty.
//! 2. Output follows the declaration order of `props`, depth first into
//!    nested records, so notification order is reproducible.
//! 3. Stored record-typed members are recursed into; the resulting chains
//!    carry the outer member as their first hop.
//! 4. Computed members are compared as atomic leaves, even when their type
//!    is itself a record.
//! 5. `permute(m, diff(all stored members, m, m2)) == m2`.

use std::marker::PhantomData;

use crate::accessor::{Accessor, Fields};
use crate::chain::PropertyChain;
use crate::error::ChainError;
use crate::permute::Change;
use crate::record::Record;
use crate::value::Value;

/// Compare `props` between `previous` and `updated`.
pub fn diff(
    props: &[Accessor],
    previous: &Value,
    updated: &Value,
) -> Result<Vec<Change>, ChainError> {
    let mut changes = Vec::new();
    for prop in props {
        let old = prop.get(previous)?;
        let new = prop.get(updated)?;
        if old == new {
            continue;
        }
        let nested = if prop.is_computed() { None } else { prop.nested() };
        match nested {
            Some(fields) => {
                let inner = diff(fields.all(), &old, &new)?;
                if inner.is_empty() {
                    // Record equality saw something its schema does not
                    // declare: report the member as a whole.
                    changes.push(Change::new(PropertyChain::single(prop.clone()), new));
                } else {
                    changes.extend(
                        inner
                            .into_iter()
                            .map(|c| Change::new(c.chain.prepend(prop.clone()), c.value)),
                    );
                }
            }
            None => changes.push(Change::new(PropertyChain::single(prop.clone()), new)),
        }
    }
    Ok(changes)
}

/// Typed front end to [`diff`].
pub fn diff_records<M: Record>(
    props: &[Accessor],
    previous: &M,
    updated: &M,
) -> Result<Vec<Change>, ChainError> {
    diff(
        props,
        &Value::new(previous.clone()),
        &Value::new(updated.clone()),
    )
}

/// Differ for one model type with its property sets computed once.
pub struct Differ<M> {
    fields: Fields,
    computed: Vec<Accessor>,
    _marker: PhantomData<fn() -> M>,
}

impl<M> Clone for Differ<M> {
    fn clone(&self) -> Self {
        Self {
            fields: self.fields.clone(),
            computed: self.computed.clone(),
            _marker: PhantomData,
        }
    }
}

impl<M: Record> Differ<M> {
    #[must_use]
    pub fn new() -> Self {
        let fields = Fields::of::<M>();
        let computed = fields.computed().cloned().collect();
        Self {
            fields,
            computed,
            _marker: PhantomData,
        }
    }

    #[must_use]
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// The computed properties set of `M`.
    #[must_use]
    pub fn computed(&self) -> &[Accessor] {
        &self.computed
    }

    /// Diff every member of `M`.
    pub fn diff(&self, previous: &Value, updated: &Value) -> Result<Vec<Change>, ChainError> {
        diff(self.fields.all(), previous, updated)
    }

    /// Diff the computed members plus `extra`, keeping declaration order
    /// and never listing a member twice.
    pub fn diff_computed_and(
        &self,
        extra: &Accessor,
        previous: &Value,
        updated: &Value,
    ) -> Result<Vec<Change>, ChainError> {
        let props: Vec<Accessor> = self
            .fields
            .all()
            .iter()
            .filter(|a| a.is_computed() || *a == extra)
            .cloned()
            .collect();
        diff(&props, previous, updated)
    }
}

impl<M: Record> Default for Differ<M> {
    fn default() -> Self {
        Self::new()
    }
}
