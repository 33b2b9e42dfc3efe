//! Grow-only set of every value this node has seen.

use crate::Value;
use std::collections::HashSet;
use std::sync::RwLock;

/// Thread-safe grow-only value set.
///
/// Writers take the write lock, readers share the read lock. Values are
/// never removed, so a snapshot is always a subset of any later snapshot.
#[derive(Debug, Default)]
pub struct ValueStore {
    values: RwLock<HashSet<Value>>,
}

impl ValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value. Returns true if it was not already present.
    pub fn insert(&self, value: Value) -> bool {
        self.values
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(value)
    }

    pub fn contains(&self, value: &Value) -> bool {
        self.values
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(value)
    }

    /// Independent copy of every value currently known.
    pub fn snapshot(&self) -> HashSet<Value> {
        self.values
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Snapshot in ascending order, for stable replies and logs.
    pub fn snapshot_sorted(&self) -> Vec<Value> {
        let mut values: Vec<Value> = self
            .values
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .copied()
            .collect();
        values.sort_unstable();
        values
    }

    pub fn len(&self) -> usize {
        self.values.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
