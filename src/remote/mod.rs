//! Boundary to the hosted data store.
//!
//! Each concern gets its own trait so components depend only on what they
//! use. [`RestClient`] talks to the real service, [`MemoryBackend`] keeps
//! everything in process for offline runs and tests. Both implement every
//! trait and therefore [`Backend`].

pub mod memory;
pub mod rest;

use async_trait::async_trait;
use uuid::Uuid;

use crate::absence::AbsenceRequest;
use crate::error::Result;
use crate::notify::activity::ActivityEntry;
use crate::notify::job::{JobUpdate, MailJob, NewMailJob};
use crate::notify::settings::NotificationSettings;
use crate::schedule::{CellKey, DateRange, Employee, ShiftEntry};

pub use memory::MemoryBackend;
pub use rest::RestClient;

#[async_trait]
pub trait ShiftRepository: Send + Sync {
    async fn fetch_shifts(&self, range: &DateRange) -> Result<Vec<ShiftEntry>>;

    /// Insert or replace rows keyed on (employee_id, work_date).
    async fn upsert_shifts(&self, rows: &[ShiftEntry]) -> Result<()>;

    async fn delete_shifts(&self, keys: &[CellKey]) -> Result<()>;
}

#[async_trait]
pub trait EmployeeDirectory: Send + Sync {
    async fn list_employees(&self) -> Result<Vec<Employee>>;

    async fn find_employee(&self, id: &str) -> Result<Option<Employee>>;
}

#[async_trait]
pub trait AbsenceRepository: Send + Sync {
    async fn insert_absence(&self, request: &AbsenceRequest) -> Result<()>;

    async fn update_absence(&self, request: &AbsenceRequest) -> Result<()>;

    async fn find_absence(&self, id: Uuid) -> Result<Option<AbsenceRequest>>;

    async fn list_absences(&self) -> Result<Vec<AbsenceRequest>>;
}

#[async_trait]
pub trait MailJobQueue: Send + Sync {
    async fn enqueue(&self, job: &NewMailJob) -> Result<()>;

    /// Oldest queued jobs first.
    async fn fetch_queued(&self, limit: usize) -> Result<Vec<MailJob>>;

    async fn record_attempt(&self, id: i64, update: &JobUpdate) -> Result<()>;
}

/// The `notifications` table behind the dashboard activity feed.
#[async_trait]
pub trait NotificationLog: Send + Sync {
    async fn insert_notification(&self, entry: &ActivityEntry) -> Result<()>;
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Defaults when no settings row exists.
    async fn load_settings(&self) -> Result<NotificationSettings>;

    async fn save_settings(&self, settings: &NotificationSettings) -> Result<()>;
}

/// Everything the application needs from the data store.
pub trait Backend:
    ShiftRepository
    + EmployeeDirectory
    + AbsenceRepository
    + MailJobQueue
    + NotificationLog
    + SettingsStore
{
}

impl<T> Backend for T where
    T: ShiftRepository
        + EmployeeDirectory
        + AbsenceRepository
        + MailJobQueue
        + NotificationLog
        + SettingsStore
{
}
