//! Compiled-fragment cache

use crate::query::{Fingerprint, QueryFragment};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Map from fingerprint to compiled fragment
pub type FragmentMap = HashMap<Fingerprint, Arc<QueryFragment>>;

/// One generation of the compiled-fragment cache
///
/// Commits insert into the current generation; a purge builds the next one
/// and publishes it in a single pointer swap.
#[derive(Debug, Default)]
pub struct CompiledCache {
    entries: RwLock<FragmentMap>,
}

impl CompiledCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(entries: FragmentMap) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> Option<Arc<QueryFragment>> {
        self.entries.read().get(fingerprint).cloned()
    }

    pub fn insert(&self, fragment: Arc<QueryFragment>) {
        self.entries
            .write()
            .insert(fragment.fingerprint().clone(), fragment);
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.entries.read().contains_key(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
