//! Forward-reference tables.
//!
//! Two tables are kept because the resolution policies differ: storage cells
//! are rewritten on every resolution of their name for as long as the name
//! stays change-tracked, while pending symbol assignments of kind Variable
//! are discharged once and forgotten.

use crate::ast::Expression;
use crate::model::storage::{LineRef, StorageId};
use crate::symbol::{SymbolKind, SymbolName};

use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Storages whose cells reference a name that was undefined at emission.
#[derive(Debug, Default)]
pub(crate) struct StorageReferences {
    entries: BTreeMap<SymbolName, StorageEntry>,
}

#[derive(Debug, Default)]
struct StorageEntry {
    resolution_count: u32,
    storages: BTreeSet<StorageId>,
}

impl StorageReferences {
    pub(crate) fn record(&mut self, name: SymbolName, id: StorageId) {
        self.entries.entry(name).or_default().storages.insert(id);
    }

    pub(crate) fn storages_for(&self, name: &SymbolName) -> Option<Vec<StorageId>> {
        self.entries
            .get(name)
            .map(|entry| entry.storages.iter().copied().collect())
    }

    pub(crate) fn remove(&mut self, name: &SymbolName) {
        self.entries.remove(name);
    }

    pub(crate) fn increment(&mut self, name: &SymbolName) {
        if let Some(entry) = self.entries.get_mut(name) {
            entry.resolution_count += 1;
        }
    }

    /// Drop references to storages a convergence iteration wiped.
    pub(crate) fn purge_storages(&mut self, ids: &HashSet<StorageId>) {
        for entry in self.entries.values_mut() {
            entry.storages.retain(|id| !ids.contains(id));
        }
        self.entries.retain(|_, entry| !entry.storages.is_empty());
    }

    /// Names never resolved, with the storages that referenced them.
    pub(crate) fn unresolved(&self) -> impl Iterator<Item = (&SymbolName, &BTreeSet<StorageId>)> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.resolution_count == 0)
            .map(|(name, entry)| (name, &entry.storages))
    }
}

/// A symbol assignment that could not be completed when its line assembled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UnresolvableSymbol {
    /// The line the assignment appeared on.
    pub(crate) line: LineRef,
    /// Constant or Variable; labels are always assigned from `$`, which is
    /// always defined, so they never land here.
    pub(crate) kind: SymbolKind,
    /// The name being assigned.
    pub(crate) name: SymbolName,
    /// The right-hand side, re-evaluated as definitions arrive.
    pub(crate) expr: Expression,
}

/// Pending assignments keyed by the undefined names they are waiting for.
#[derive(Debug, Default)]
pub(crate) struct SymbolReferences {
    entries: BTreeMap<SymbolName, SymbolEntry>,
}

#[derive(Debug, Default)]
struct SymbolEntry {
    resolution_count: u32,
    symbols: Vec<UnresolvableSymbol>,
}

impl SymbolReferences {
    pub(crate) fn record(&mut self, name: SymbolName, symbol: UnresolvableSymbol) {
        let entry = self.entries.entry(name).or_default();
        if !entry.symbols.contains(&symbol) {
            entry.symbols.push(symbol);
        }
    }

    pub(crate) fn contains(&self, name: &SymbolName) -> bool {
        self.entries.contains_key(name)
    }

    pub(crate) fn symbols_for(&self, name: &SymbolName) -> Vec<UnresolvableSymbol> {
        self.entries
            .get(name)
            .map(|entry| entry.symbols.clone())
            .unwrap_or_default()
    }

    pub(crate) fn remove_symbol(&mut self, name: &SymbolName, symbol: &UnresolvableSymbol) {
        if let Some(entry) = self.entries.get_mut(name) {
            entry.symbols.retain(|candidate| candidate != symbol);
        }
    }

    pub(crate) fn remove(&mut self, name: &SymbolName) {
        self.entries.remove(name);
    }

    pub(crate) fn increment(&mut self, name: &SymbolName) {
        if let Some(entry) = self.entries.get_mut(name) {
            entry.resolution_count += 1;
        }
    }

    /// Names never resolved, with the pending assignments that wait on them.
    pub(crate) fn unresolved(&self) -> impl Iterator<Item = (&SymbolName, &[UnresolvableSymbol])> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.resolution_count == 0)
            .map(|(name, entry)| (name, entry.symbols.as_slice()))
    }
}
