use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::schedule::entry::{CellKey, EditOperation, ShiftEntry};

/// Working copy of the grid, keyed by (employee, date).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShiftStore {
    entries: BTreeMap<CellKey, ShiftEntry>,
}

impl ShiftStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from rows; a later row for the same key wins.
    pub fn from_entries<I: IntoIterator<Item = ShiftEntry>>(rows: I) -> Self {
        let mut store = Self::new();
        for row in rows {
            store.insert(row);
        }
        store
    }

    pub fn get(&self, key: &CellKey) -> Option<&ShiftEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &CellKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert or replace, returning the previous entry.
    pub fn insert(&mut self, entry: ShiftEntry) -> Option<ShiftEntry> {
        self.entries.insert(entry.key(), entry)
    }

    pub fn remove(&mut self, key: &CellKey) -> Option<ShiftEntry> {
        self.entries.remove(key)
    }

    /// Make `key` hold `value`, returning what was there before.
    pub fn set(&mut self, key: &CellKey, value: Option<ShiftEntry>) -> Option<ShiftEntry> {
        match value {
            Some(entry) => self.insert(entry),
            None => self.remove(key),
        }
    }

    pub fn apply(&mut self, op: &EditOperation) -> Option<ShiftEntry> {
        match op {
            EditOperation::Upsert(entry) => self.insert(entry.clone()),
            EditOperation::Delete(key) => self.remove(key),
        }
    }

    /// All entries in key order.
    pub fn entries(&self) -> impl Iterator<Item = &ShiftEntry> {
        self.entries.values()
    }

    pub fn entries_for_employee<'a>(
        &'a self,
        employee_id: &'a str,
    ) -> impl Iterator<Item = &'a ShiftEntry> + 'a {
        self.entries
            .values()
            .filter(move |e| e.employee_id == employee_id)
    }

    /// Sum of counted hours for one employee on the given dates.
    pub fn total_hours<I>(&self, employee_id: &str, dates: I) -> f64
    where
        I: IntoIterator<Item = NaiveDate>,
    {
        dates
            .into_iter()
            .filter_map(|d| self.get(&CellKey::new(employee_id, d)))
            .map(ShiftEntry::counted_hours)
            .sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
