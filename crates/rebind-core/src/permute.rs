#![forbid(unsafe_code)]

//! Model permuter: rebuild a record with chosen leaves replaced.
//!
//! Changes are grouped by their first hop. Each record level is cloned
//! exactly once and every change landing on that level is assigned into the
//! same owned copy, so several edits to one record never produce
//! intermediate copies. Multi-hop changes recurse into the nested record
//! first and the rebuilt sub-record is then assigned at the outer level.
//!
//! Changes aimed at computed members are skipped: the record recomputes
//! those itself. This makes the output of the differ, which reports
//! computed members as ordinary leaves, valid input here.

use tracing::debug;

use crate::accessor::Accessor;
use crate::chain::PropertyChain;
use crate::error::ChainError;
use crate::record::Record;
use crate::value::Value;

/// One `(chain, new value)` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub chain: PropertyChain,
    pub value: Value,
}

impl Change {
    #[must_use]
    pub fn new(chain: PropertyChain, value: Value) -> Self {
        Self { chain, value }
    }
}

#[derive(Default)]
struct Pending {
    replace: Option<Value>,
    nested: Vec<Change>,
}

/// A new model equal to `model` except for the leaves named in `changes`.
///
/// Later changes win over earlier ones targeting the same leaf. An empty
/// change list returns `model` unchanged.
pub fn permute(model: &Value, changes: &[Change]) -> Result<Value, ChainError> {
    if changes.is_empty() {
        return Ok(model.clone());
    }

    let mut groups: Vec<(Accessor, Pending)> = Vec::new();
    for change in changes {
        let head = change.chain.head();
        if head.is_computed() {
            debug!(
                target: "rebind.permute",
                chain = %change.chain,
                "skipping change to computed member"
            );
            continue;
        }
        let idx = match groups.iter().position(|(accessor, _)| accessor == head) {
            Some(idx) => idx,
            None => {
                groups.push((head.clone(), Pending::default()));
                groups.len() - 1
            }
        };
        let pending = &mut groups[idx].1;
        match change.chain.tail() {
            None => {
                pending.replace = Some(change.value.clone());
                pending.nested.clear();
            }
            Some(tail) => pending.nested.push(Change::new(tail, change.value.clone())),
        }
    }

    if groups.is_empty() {
        return Ok(model.clone());
    }

    let mut owned = model.to_owned_box();
    for (head, pending) in groups {
        let value = match (pending.replace, pending.nested.is_empty()) {
            (Some(value), true) => value,
            (None, true) => continue,
            (base, false) => {
                let base = match base {
                    Some(base) => base,
                    None => head.get(model)?,
                };
                permute(&base, &pending.nested)?
            }
        };
        head.set(&mut *owned, value)?;
    }
    Ok(Value::from_boxed(owned))
}

/// Typed front end to [`permute`].
pub fn permute_record<M: Record>(model: &M, changes: &[Change]) -> Result<M, ChainError> {
    let root = permute(&Value::new(model.clone()), changes)?;
    root.downcast::<M>().ok_or(ChainError::OwnerMismatch {
        field: changes.first().map_or("<root>", |c| c.chain.head().name()),
        expected: std::any::type_name::<M>(),
        found: root.type_name(),
    })
}
