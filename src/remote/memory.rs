use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::absence::AbsenceRequest;
use crate::error::{Result, RosterError};
use crate::notify::activity::ActivityEntry;
use crate::notify::job::{JobUpdate, MailJob, MailJobStatus, NewMailJob};
use crate::notify::settings::NotificationSettings;
use crate::remote::{
    AbsenceRepository, EmployeeDirectory, MailJobQueue, NotificationLog, SettingsStore,
    ShiftRepository,
};
use crate::schedule::{CellKey, DateRange, Employee, ShiftEntry};

#[derive(Debug, Default)]
struct Failures {
    upserts: bool,
    deletes: bool,
    enqueue: bool,
    record_attempt: bool,
    notifications: bool,
}

#[derive(Debug, Default)]
struct State {
    shifts: BTreeMap<CellKey, ShiftEntry>,
    employees: Vec<Employee>,
    absences: Vec<AbsenceRequest>,
    jobs: Vec<MailJob>,
    notifications: Vec<ActivityEntry>,
    next_job_id: i64,
    settings: Option<NotificationSettings>,
    failures: Failures,
    upsert_calls: usize,
    delete_calls: Vec<usize>,
    shift_latency: Option<Duration>,
}

/// In-process store used for offline runs and tests.
///
/// Failure switches make the next matching calls return a remote error.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
}

fn injected(what: &str) -> RosterError {
    RosterError::Remote {
        status: 503,
        message: format!("{} unavailable", what),
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn with_employees(self, employees: Vec<Employee>) -> Self {
        self.state().employees = employees;
        self
    }

    pub fn with_shifts(self, shifts: Vec<ShiftEntry>) -> Self {
        {
            let mut state = self.state();
            for s in shifts {
                state.shifts.insert(s.key(), s);
            }
        }
        self
    }

    pub fn set_settings(&self, settings: NotificationSettings) {
        self.state().settings = Some(settings);
    }

    /// Delay every shift read and write, to exercise requests that overlap
    /// an in-flight remote call.
    pub fn set_shift_latency(&self, latency: Option<Duration>) {
        self.state().shift_latency = latency;
    }

    async fn shift_delay(&self) {
        let latency = self.state().shift_latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    pub fn fail_upserts(&self, fail: bool) {
        self.state().failures.upserts = fail;
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.state().failures.deletes = fail;
    }

    pub fn fail_enqueue(&self, fail: bool) {
        self.state().failures.enqueue = fail;
    }

    pub fn fail_record_attempt(&self, fail: bool) {
        self.state().failures.record_attempt = fail;
    }

    pub fn fail_notifications(&self, fail: bool) {
        self.state().failures.notifications = fail;
    }

    /// Snapshot of stored shifts in key order.
    pub fn shifts(&self) -> Vec<ShiftEntry> {
        self.state().shifts.values().cloned().collect()
    }

    pub fn jobs(&self) -> Vec<MailJob> {
        self.state().jobs.clone()
    }

    pub fn absences(&self) -> Vec<AbsenceRequest> {
        self.state().absences.clone()
    }

    pub fn notifications(&self) -> Vec<ActivityEntry> {
        self.state().notifications.clone()
    }

    pub fn upsert_calls(&self) -> usize {
        self.state().upsert_calls
    }

    /// Size of each delete batch received, in call order.
    pub fn delete_calls(&self) -> Vec<usize> {
        self.state().delete_calls.clone()
    }

    /// Insert a job row directly, bypassing the failure switch.
    pub fn push_job(&self, job: NewMailJob) -> i64 {
        let mut state = self.state();
        state.next_job_id += 1;
        let id = state.next_job_id;
        state.jobs.push(MailJob {
            id,
            kind: job.kind,
            payload: job.payload,
            status: job.status,
            attempt_count: job.attempt_count,
            last_error: None,
            created_at: Utc::now(),
            processed_at: None,
        });
        id
    }
}

#[async_trait]
impl ShiftRepository for MemoryBackend {
    async fn fetch_shifts(&self, range: &DateRange) -> Result<Vec<ShiftEntry>> {
        self.shift_delay().await;
        Ok(self
            .state()
            .shifts
            .values()
            .filter(|s| range.contains(s.work_date))
            .cloned()
            .collect())
    }

    async fn upsert_shifts(&self, rows: &[ShiftEntry]) -> Result<()> {
        self.shift_delay().await;
        let mut state = self.state();
        state.upsert_calls += 1;
        if state.failures.upserts {
            return Err(injected("shift upsert"));
        }
        for row in rows {
            state.shifts.insert(row.key(), row.clone());
        }
        Ok(())
    }

    async fn delete_shifts(&self, keys: &[CellKey]) -> Result<()> {
        self.shift_delay().await;
        let mut state = self.state();
        state.delete_calls.push(keys.len());
        if state.failures.deletes {
            return Err(injected("shift delete"));
        }
        for key in keys {
            state.shifts.remove(key);
        }
        Ok(())
    }
}

#[async_trait]
impl EmployeeDirectory for MemoryBackend {
    async fn list_employees(&self) -> Result<Vec<Employee>> {
        Ok(self.state().employees.clone())
    }

    async fn find_employee(&self, id: &str) -> Result<Option<Employee>> {
        Ok(self.state().employees.iter().find(|e| e.id == id).cloned())
    }
}

#[async_trait]
impl AbsenceRepository for MemoryBackend {
    async fn insert_absence(&self, request: &AbsenceRequest) -> Result<()> {
        self.state().absences.push(request.clone());
        Ok(())
    }

    async fn update_absence(&self, request: &AbsenceRequest) -> Result<()> {
        let mut state = self.state();
        let row = state
            .absences
            .iter_mut()
            .find(|a| a.id == request.id)
            .ok_or_else(|| RosterError::NotFound(format!("absence request {}", request.id)))?;
        *row = request.clone();
        Ok(())
    }

    async fn find_absence(&self, id: Uuid) -> Result<Option<AbsenceRequest>> {
        Ok(self.state().absences.iter().find(|a| a.id == id).cloned())
    }

    async fn list_absences(&self) -> Result<Vec<AbsenceRequest>> {
        let mut rows = self.state().absences.clone();
        rows.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        Ok(rows)
    }
}

#[async_trait]
impl MailJobQueue for MemoryBackend {
    async fn enqueue(&self, job: &NewMailJob) -> Result<()> {
        if self.state().failures.enqueue {
            return Err(injected("mail queue"));
        }
        self.push_job(job.clone());
        Ok(())
    }

    async fn fetch_queued(&self, limit: usize) -> Result<Vec<MailJob>> {
        let mut queued: Vec<MailJob> = self
            .state()
            .jobs
            .iter()
            .filter(|j| j.status == MailJobStatus::Queued)
            .cloned()
            .collect();
        queued.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        queued.truncate(limit);
        Ok(queued)
    }

    async fn record_attempt(&self, id: i64, update: &JobUpdate) -> Result<()> {
        let mut state = self.state();
        if state.failures.record_attempt {
            return Err(injected("mail queue"));
        }
        let job = state
            .jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or_else(|| RosterError::NotFound(format!("mail job {}", id)))?;
        job.status = update.status;
        job.attempt_count = update.attempt_count;
        job.last_error = update.last_error.clone();
        job.processed_at = Some(update.processed_at);
        Ok(())
    }
}

#[async_trait]
impl NotificationLog for MemoryBackend {
    async fn insert_notification(&self, entry: &ActivityEntry) -> Result<()> {
        let mut state = self.state();
        if state.failures.notifications {
            return Err(injected("notification log"));
        }
        state.notifications.push(entry.clone());
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for MemoryBackend {
    async fn load_settings(&self) -> Result<NotificationSettings> {
        Ok(self.state().settings.clone().unwrap_or_default())
    }

    async fn save_settings(&self, settings: &NotificationSettings) -> Result<()> {
        self.set_settings(settings.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::job::MailJobKind;

    #[tokio::test]
    async fn fetch_queued_is_oldest_first_and_limited() {
        let backend = MemoryBackend::new();
        for _ in 0..3 {
            backend.push_job(NewMailJob::new(MailJobKind::EmployeeNewShift, serde_json::json!({})));
        }
        let jobs = backend.fetch_queued(2).await.unwrap();
        assert_eq!(jobs.iter().map(|j| j.id).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[tokio::test]
    async fn injected_upsert_failure_leaves_rows_untouched() {
        let date = "2025-08-18".parse().unwrap();
        let backend = MemoryBackend::new();
        backend.fail_upserts(true);
        let err = backend
            .upsert_shifts(&[ShiftEntry::normal("e1", date, 8.0)])
            .await
            .unwrap_err();
        assert!(matches!(err, RosterError::Remote { status: 503, .. }));
        assert!(backend.shifts().is_empty());
        assert_eq!(backend.upsert_calls(), 1);
    }

    #[tokio::test]
    async fn settings_default_until_saved() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.load_settings().await.unwrap(), NotificationSettings::default());
        let custom = NotificationSettings {
            schedule_changes: false,
            ..Default::default()
        };
        backend.save_settings(&custom).await.unwrap();
        assert!(!backend.load_settings().await.unwrap().schedule_changes);
    }
}
