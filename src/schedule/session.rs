use chrono::NaiveDate;

use crate::config::SessionConfig;
use crate::error::Result;
use crate::remote::ShiftRepository;
use crate::schedule::calendar::DateRange;
use crate::schedule::employee::Employee;
use crate::schedule::entry::{CellKey, EditOperation, ShiftEntry};
use crate::schedule::history::{CellChange, EditHistory, HistoryBatch};
use crate::schedule::pending::PendingChangeSet;
use crate::schedule::save::{SaveOutcome, SavePlan, SaveReport, ShiftNotice};
use crate::schedule::store::ShiftStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoFillOutcome {
    NothingToFill,
    Filled(usize),
}

/// Editing state for one schedule view: the working copy, the buffer of
/// unsaved edits and the undo history.
///
/// Mutations are synchronous and infallible apart from manual-entry
/// validation; only [`ScheduleSession::save_all`] touches the network.
#[derive(Debug, Clone)]
pub struct ScheduleSession {
    config: SessionConfig,
    employees: Vec<Employee>,
    range: DateRange,
    store: ShiftStore,
    /// Last state known to be persisted, per key
    baseline: ShiftStore,
    pending: PendingChangeSet,
    history: EditHistory,
    unsaved: bool,
}

impl ScheduleSession {
    pub fn new(config: SessionConfig, range: DateRange) -> Self {
        Self {
            history: EditHistory::new(config.history_limit),
            config,
            employees: Vec::new(),
            range,
            store: ShiftStore::new(),
            baseline: ShiftStore::new(),
            pending: PendingChangeSet::new(),
            unsaved: false,
        }
    }

    /// Replace the working copy with freshly loaded data. Buffer, history and
    /// the unsaved flag are reset.
    pub fn hydrate(&mut self, employees: Vec<Employee>, range: DateRange, shifts: Vec<ShiftEntry>) {
        let store = ShiftStore::from_entries(shifts.into_iter().map(ShiftEntry::normalized));
        tracing::info!(
            employees = employees.len(),
            shifts = store.len(),
            start = %range.start,
            end = %range.end,
            "Schedule hydrated"
        );
        self.employees = employees;
        self.range = range;
        self.baseline = store.clone();
        self.store = store;
        self.pending.clear();
        self.history.clear();
        self.unsaved = false;
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn employees(&self) -> &[Employee] {
        &self.employees
    }

    pub fn active_employees(&self) -> impl Iterator<Item = &Employee> {
        self.employees.iter().filter(|e| e.is_active)
    }

    pub fn range(&self) -> DateRange {
        self.range
    }

    pub fn store(&self) -> &ShiftStore {
        &self.store
    }

    pub fn entry(&self, employee_id: &str, work_date: NaiveDate) -> Option<&ShiftEntry> {
        self.store.get(&CellKey::new(employee_id, work_date))
    }

    pub fn pending(&self) -> &PendingChangeSet {
        &self.pending
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.unsaved
    }

    pub fn can_undo(&self) -> bool {
        self.history.undo_len() > 0
    }

    pub fn can_redo(&self) -> bool {
        self.history.redo_len() > 0
    }

    pub fn history(&self) -> &EditHistory {
        &self.history
    }

    /// Set a cell to `hours` of normal work, or clear it when `hours` is
    /// zero, missing or not a finite number.
    pub fn apply_cell_change(&mut self, employee_id: &str, work_date: NaiveDate, hours: Option<f64>) {
        let key = CellKey::new(employee_id, work_date);
        let value = hours
            .filter(|h| h.is_finite() && *h > 0.0)
            .map(|h| ShiftEntry::normal(employee_id, work_date, h));
        let change = self.mutate(&key, value);
        tracing::debug!(cell = %key, hours = ?hours, "Cell changed");
        self.history.record(HistoryBatch::single(change));
    }

    /// Manual entry of any kind. Rejected entries leave all state untouched.
    pub fn set_entry(&mut self, entry: ShiftEntry) -> Result<()> {
        entry.validate()?;
        let entry = entry.normalized();
        let key = entry.key();
        let change = self.mutate(&key, Some(entry));
        self.history.record(HistoryBatch::single(change));
        Ok(())
    }

    /// Revert the most recent batch. Returns false when there is nothing to undo.
    pub fn undo(&mut self) -> bool {
        let Some(batch) = self.history.take_undo() else {
            return false;
        };
        for change in batch.changes.iter().rev() {
            self.restore(change.inverse());
        }
        tracing::debug!(changes = batch.len(), "Undo");
        self.history.push_redo(batch);
        true
    }

    /// Replay the most recently undone batch.
    pub fn redo(&mut self) -> bool {
        let Some(batch) = self.history.take_redo() else {
            return false;
        };
        for change in &batch.changes {
            self.restore(change.forward());
        }
        tracing::debug!(changes = batch.len(), "Redo");
        self.history.push_undo(batch);
        true
    }

    /// Fill every empty weekday cell of every active employee with a normal
    /// shift of the configured length, as a single undoable batch.
    pub fn auto_generate(&mut self) -> AutoFillOutcome {
        let hours = self.config.autofill_hours;
        let targets: Vec<CellKey> = self
            .range
            .weekdays()
            .flat_map(|date| {
                self.employees
                    .iter()
                    .filter(|e| e.is_active)
                    .map(move |e| CellKey::new(e.id.clone(), date))
            })
            .filter(|key| !self.store.contains(key))
            .collect();

        if targets.is_empty() {
            tracing::info!("No empty weekday cells to fill");
            return AutoFillOutcome::NothingToFill;
        }

        let changes: Vec<CellChange> = targets
            .into_iter()
            .map(|key| {
                let entry = ShiftEntry::normal(key.employee_id.clone(), key.work_date, hours);
                self.mutate(&key, Some(entry))
            })
            .collect();
        let filled = changes.len();
        self.history.record(HistoryBatch { changes });
        tracing::info!(filled, hours, "Auto-filled empty weekday cells");
        AutoFillOutcome::Filled(filled)
    }

    /// Snapshot the buffer for persistence. `None` when there is nothing to save.
    pub fn prepare_save(&self) -> Option<SavePlan> {
        if self.pending.is_empty() {
            return None;
        }
        let (upserts, deletes) = self.pending.partition();
        Some(SavePlan {
            upserts,
            deletes,
            revisions: self
                .pending
                .iter()
                .map(|c| (c.op.key(), c.revision))
                .collect(),
            delete_chunk_size: self.config.delete_chunk_size,
        })
    }

    /// Record a successfully submitted plan: move the saved rows into the
    /// baseline and drop them from the buffer unless edited again since.
    pub fn commit_save(&mut self, plan: &SavePlan) -> SaveReport {
        let mut notices = Vec::new();
        for entry in &plan.upserts {
            match self.baseline.insert(entry.clone()) {
                None => notices.push(ShiftNotice::Added {
                    entry: entry.clone(),
                }),
                Some(prev) if prev != *entry => notices.push(ShiftNotice::Changed {
                    before: prev,
                    after: entry.clone(),
                }),
                Some(_) => {}
            }
        }
        for key in &plan.deletes {
            if let Some(prev) = self.baseline.remove(key) {
                notices.push(ShiftNotice::Removed { entry: prev });
            }
        }

        self.pending.remove_saved(&plan.revisions);
        self.unsaved = !self.pending.is_empty();

        SaveReport {
            upserted: plan.upserts.len(),
            deleted: plan.deletes.len(),
            notices,
        }
    }

    /// Persist every buffered edit. On failure the buffer and the unsaved
    /// flag are left exactly as they were so the call can be retried.
    pub async fn save_all(&mut self, repo: &dyn ShiftRepository) -> Result<SaveOutcome> {
        let Some(plan) = self.prepare_save() else {
            tracing::info!("Nothing to save");
            return Ok(SaveOutcome::NothingToSave);
        };
        let submitted = plan.submit(repo).await;
        self.finish_save(&plan, submitted).map(SaveOutcome::Saved)
    }

    /// Second half of a save whose plan was submitted elsewhere, possibly
    /// without holding this session. Commits on success; on failure logs
    /// and returns the error with the buffer untouched.
    pub fn finish_save(&mut self, plan: &SavePlan, submitted: Result<()>) -> Result<SaveReport> {
        match submitted {
            Ok(()) => {
                let report = self.commit_save(plan);
                tracing::info!(
                    upserted = report.upserted,
                    deleted = report.deleted,
                    notices = report.notices.len(),
                    "Changes saved"
                );
                Ok(report)
            }
            Err(e) => {
                tracing::error!(error = %e, changes = plan.len(), pending = self.pending.len(), "Saving failed, changes kept");
                Err(e)
            }
        }
    }

    /// Grid as CSV: one row per employee, hours per date and a total column.
    pub fn export_csv(&self) -> String {
        let dates: Vec<NaiveDate> = self.range.days().collect();
        let mut rows: Vec<Vec<String>> = Vec::with_capacity(self.employees.len() + 1);

        let mut header = vec!["Employee".to_string()];
        header.extend(dates.iter().map(|d| d.to_string()));
        header.push("TotalHours".to_string());
        rows.push(header);

        for employee in &self.employees {
            let mut row = vec![employee.name.clone()];
            for date in &dates {
                let hours = self
                    .entry(&employee.id, *date)
                    .map(ShiftEntry::counted_hours)
                    .unwrap_or(0.0);
                row.push(if hours > 0.0 {
                    format_hours(hours)
                } else {
                    String::new()
                });
            }
            let total = self.store.total_hours(&employee.id, dates.iter().copied());
            row.push(format_hours(total));
            rows.push(row);
        }

        rows.iter()
            .map(|r| {
                r.iter()
                    .map(|field| format!("\"{}\"", field.replace('"', "\"\"")))
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn mutate(&mut self, key: &CellKey, value: Option<ShiftEntry>) -> CellChange {
        let op = EditOperation::to_state(key, value.as_ref());
        let before = self.store.set(key, value.clone());
        self.pending.record(op);
        self.unsaved = true;
        CellChange {
            key: key.clone(),
            before,
            after: value,
        }
    }

    fn restore(&mut self, op: EditOperation) {
        self.store.apply(&op);
        self.pending.record(op);
        self.unsaved = true;
    }
}

fn format_hours(hours: f64) -> String {
    if hours.fract() == 0.0 {
        format!("{}", hours as i64)
    } else {
        format!("{}", hours)
    }
}
