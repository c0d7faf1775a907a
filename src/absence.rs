//! Absence requests: employees submit, admins approve or decline. Both steps
//! queue a mail job without waiting for it; decisions also land in the
//! in-app activity log.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, RosterError};
use crate::notify::activity;
use crate::notify::enqueue::NotificationSender;
use crate::notify::job::NewMailJob;
use crate::remote::{AbsenceRepository, EmployeeDirectory, NotificationLog};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AbsenceStatus {
    Pending,
    Approved,
    Declined,
}

impl std::fmt::Display for AbsenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbsenceStatus::Pending => write!(f, "pending"),
            AbsenceStatus::Approved => write!(f, "approved"),
            AbsenceStatus::Declined => write!(f, "declined"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AbsenceDecision {
    Approved,
    Declined,
}

impl From<AbsenceDecision> for AbsenceStatus {
    fn from(d: AbsenceDecision) -> Self {
        match d {
            AbsenceDecision::Approved => AbsenceStatus::Approved,
            AbsenceDecision::Declined => AbsenceStatus::Declined,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbsenceRequest {
    pub id: Uuid,
    pub employee_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub reason: Option<String>,
    pub status: AbsenceStatus,
    pub submitted_at: DateTime<Utc>,
    #[serde(default)]
    pub admin_message: Option<String>,
}

/// Form input for a new request. Fields are optional so that missing input
/// surfaces as a validation error rather than a parse failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewAbsenceRequest {
    #[serde(default)]
    pub employee_id: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl NewAbsenceRequest {
    pub fn validate(self) -> Result<AbsenceRequest> {
        let employee_id = self
            .employee_id
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| RosterError::validation("employee id is required"))?;
        let start_date = self
            .start_date
            .ok_or_else(|| RosterError::validation("start date is required"))?;
        let end_date = self.end_date.unwrap_or(start_date);
        if end_date < start_date {
            return Err(RosterError::validation(format!(
                "absence ends ({}) before it starts ({})",
                end_date, start_date
            )));
        }

        Ok(AbsenceRequest {
            id: Uuid::new_v4(),
            employee_id,
            start_date,
            end_date,
            reason: trimmed(self.reason),
            status: AbsenceStatus::Pending,
            submitted_at: Utc::now(),
            admin_message: None,
        })
    }
}

fn trimmed(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[derive(Clone)]
pub struct AbsenceService {
    repo: Arc<dyn AbsenceRepository>,
    directory: Arc<dyn EmployeeDirectory>,
    log: Arc<dyn NotificationLog>,
    notifier: NotificationSender,
}

impl AbsenceService {
    pub fn new<B>(backend: Arc<B>, notifier: NotificationSender) -> Self
    where
        B: AbsenceRepository + EmployeeDirectory + NotificationLog + 'static,
    {
        Self {
            repo: backend.clone(),
            directory: backend.clone(),
            log: backend,
            notifier,
        }
    }

    /// Validate and persist a request, then notify admins in the background.
    pub async fn submit(&self, input: NewAbsenceRequest) -> Result<AbsenceRequest> {
        let request = input.validate()?;
        self.repo.insert_absence(&request).await?;
        tracing::info!(
            absence_id = %request.id,
            employee_id = %request.employee_id,
            start = %request.start_date,
            end = %request.end_date,
            "Absence request submitted"
        );

        match NewMailJob::admin_new_absence(&request) {
            Ok(job) => {
                self.notifier.send(job);
            }
            Err(e) => tracing::warn!(absence_id = %request.id, error = %e, "Could not build admin notification"),
        }
        Ok(request)
    }

    pub async fn decide(
        &self,
        id: Uuid,
        decision: AbsenceDecision,
        admin_message: Option<String>,
    ) -> Result<AbsenceRequest> {
        let mut request = self
            .repo
            .find_absence(id)
            .await?
            .ok_or_else(|| RosterError::NotFound(format!("absence request {}", id)))?;

        if request.status != AbsenceStatus::Pending {
            tracing::warn!(absence_id = %id, previous = %request.status, "Re-deciding absence request");
        }
        request.status = decision.into();
        request.admin_message = trimmed(admin_message);
        self.repo.update_absence(&request).await?;
        tracing::info!(absence_id = %id, status = %request.status, "Absence request decided");

        activity::record_absence_decision(self.log.clone(), self.directory.clone(), request.clone());

        match NewMailJob::absence_decision(&request) {
            Ok(job) => {
                self.notifier.send(job);
            }
            Err(e) => tracing::warn!(absence_id = %id, error = %e, "Could not build decision notification"),
        }
        Ok(request)
    }

    pub async fn list(&self) -> Result<Vec<AbsenceRequest>> {
        self.repo.list_absences().await
    }
}
