#![forbid(unsafe_code)]

//! Property chain to bindings index.
//!
//! Built once from the binder's output and read-only afterwards. A binding
//! is indexed under every chain it reads; a change at chain `c` reaches
//! every binding indexed under a chain that overlaps `c` (one is a prefix of
//! the other), so a binding to `home` sees a change at `home.score` and a
//! binding to `home.score` sees a whole-`home` replacement.
//!
//! # Invariants
//!
//! 1. Lookups return binding positions in declaration order, each at most
//!    once.
//! 2. Bindings that never write the view are not indexed.

use ahash::AHashMap;
use rebind_core::{Change, PropertyChain};

/// Chain-keyed routing table from model changes to binding positions.
#[derive(Debug, Default, Clone)]
pub struct BindingIndex {
    by_chain: AHashMap<PropertyChain, Vec<usize>>,
    len: usize,
}

impl BindingIndex {
    /// Index `bindings`, given as `(position, chains)` pairs in declaration
    /// order.
    pub fn build<'a>(bindings: impl IntoIterator<Item = (usize, &'a [PropertyChain])>) -> Self {
        let mut by_chain: AHashMap<PropertyChain, Vec<usize>> = AHashMap::new();
        let mut len = 0;
        for (position, chains) in bindings {
            len += 1;
            for chain in chains {
                let slot = by_chain.entry(chain.clone()).or_default();
                if slot.last() != Some(&position) {
                    slot.push(position);
                }
            }
        }
        Self { by_chain, len }
    }

    /// Number of indexed bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Distinct chains with at least one binding.
    #[must_use]
    pub fn chain_count(&self) -> usize {
        self.by_chain.len()
    }

    /// Bindings affected by any of `changed`, in declaration order, without
    /// `exclude`.
    #[must_use]
    pub fn lookup<'a>(
        &self,
        changed: impl IntoIterator<Item = &'a PropertyChain> + Clone,
        exclude: Option<usize>,
    ) -> Vec<usize> {
        let mut hits: Vec<usize> = self
            .by_chain
            .iter()
            .filter(|(bound, _)| changed.clone().into_iter().any(|c| c.overlaps(bound)))
            .flat_map(|(_, positions)| positions.iter().copied())
            .filter(|position| Some(*position) != exclude)
            .collect();
        hits.sort_unstable();
        hits.dedup();
        hits
    }

    /// Convenience for a diff result.
    #[must_use]
    pub fn lookup_changes(&self, changes: &[Change], exclude: Option<usize>) -> Vec<usize> {
        self.lookup(changes.iter().map(|change| &change.chain), exclude)
    }
}
