use std::collections::{HashMap, HashSet};

use crate::schedule::entry::{CellKey, EditOperation, ShiftEntry};

/// Buffered operation plus the revision at which it was recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingChange {
    pub op: EditOperation,
    pub revision: u64,
}

/// Unsaved edits, one per key. Recording an operation for a key that is
/// already buffered replaces it in place, so iteration follows first-touch
/// order while the content is always the latest edit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingChangeSet {
    changes: Vec<PendingChange>,
    index: HashMap<CellKey, usize>,
    next_revision: u64,
}

impl PendingChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, op: EditOperation) {
        self.next_revision += 1;
        let change = PendingChange {
            op,
            revision: self.next_revision,
        };
        let key = change.op.key();
        match self.index.get(&key) {
            Some(&pos) => self.changes[pos] = change,
            None => {
                self.index.insert(key, self.changes.len());
                self.changes.push(change);
            }
        }
    }

    pub fn get(&self, key: &CellKey) -> Option<&EditOperation> {
        self.index.get(key).map(|&pos| &self.changes[pos].op)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingChange> {
        self.changes.iter()
    }

    pub fn operations(&self) -> Vec<EditOperation> {
        self.changes.iter().map(|c| c.op.clone()).collect()
    }

    /// Split into bulk-upsert rows and delete keys.
    pub fn partition(&self) -> (Vec<ShiftEntry>, Vec<CellKey>) {
        let mut upserts = Vec::new();
        let mut deletes = Vec::new();
        for change in &self.changes {
            match &change.op {
                EditOperation::Upsert(entry) => upserts.push(entry.clone()),
                EditOperation::Delete(key) => deletes.push(key.clone()),
            }
        }
        (upserts, deletes)
    }

    /// Drop the listed (key, revision) pairs whose buffered revision is
    /// unchanged. Keys edited again since the snapshot stay buffered.
    /// Returns the number of entries removed.
    pub fn remove_saved(&mut self, saved: &[(CellKey, u64)]) -> usize {
        let saved: HashSet<(CellKey, u64)> = saved.iter().cloned().collect();
        let before = self.changes.len();
        self.changes
            .retain(|c| !saved.contains(&(c.op.key(), c.revision)));
        self.rebuild_index();
        before - self.changes.len()
    }

    pub fn clear(&mut self) {
        self.changes.clear();
        self.index.clear();
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    fn rebuild_index(&mut self) {
        self.index = self
            .changes
            .iter()
            .enumerate()
            .map(|(pos, c)| (c.op.key(), pos))
            .collect();
    }
}
