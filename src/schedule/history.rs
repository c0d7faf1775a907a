use std::collections::VecDeque;

use crate::schedule::entry::{CellKey, EditOperation, ShiftEntry};

/// One mutated cell, with the value it held before and after the edit.
#[derive(Debug, Clone, PartialEq)]
pub struct CellChange {
    pub key: CellKey,
    pub before: Option<ShiftEntry>,
    pub after: Option<ShiftEntry>,
}

impl CellChange {
    pub fn forward(&self) -> EditOperation {
        EditOperation::to_state(&self.key, self.after.as_ref())
    }

    pub fn inverse(&self) -> EditOperation {
        EditOperation::to_state(&self.key, self.before.as_ref())
    }
}

/// Changes reverted and replayed as a unit.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HistoryBatch {
    pub changes: Vec<CellChange>,
}

impl HistoryBatch {
    pub fn single(change: CellChange) -> Self {
        Self {
            changes: vec![change],
        }
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Linear undo history. Recording a new batch discards the redo stack.
#[derive(Debug, Clone)]
pub struct EditHistory {
    undo: VecDeque<HistoryBatch>,
    redo: Vec<HistoryBatch>,
    limit: usize,
}

impl Default for EditHistory {
    fn default() -> Self {
        Self::new(100)
    }
}

impl EditHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            limit: limit.max(1),
        }
    }

    pub fn record(&mut self, batch: HistoryBatch) {
        if batch.is_empty() {
            return;
        }
        self.redo.clear();
        self.undo.push_back(batch);
        while self.undo.len() > self.limit {
            self.undo.pop_front();
        }
    }

    pub fn take_undo(&mut self) -> Option<HistoryBatch> {
        self.undo.pop_back()
    }

    pub fn take_redo(&mut self) -> Option<HistoryBatch> {
        self.redo.pop()
    }

    /// Park a batch that was just undone.
    pub fn push_redo(&mut self, batch: HistoryBatch) {
        self.redo.push(batch);
    }

    /// Return a redone batch without clearing the redo stack.
    pub fn push_undo(&mut self, batch: HistoryBatch) {
        self.undo.push_back(batch);
        while self.undo.len() > self.limit {
            self.undo.pop_front();
        }
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}
