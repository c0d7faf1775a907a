use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::absence::{AbsenceRequest, AbsenceStatus};
use crate::error::Result;
use crate::schedule::{ShiftKind, ShiftNotice};

/// Job type tag as stored in the queue table. Unknown tags are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MailJobKind {
    AdminNewAbsence,
    EmployeeNewShift,
    EmployeeShiftChanged,
    EmployeeShiftDeleted,
    EmployeeAbsenceDecision,
    Other(String),
}

impl MailJobKind {
    pub fn as_str(&self) -> &str {
        match self {
            MailJobKind::AdminNewAbsence => "admin_new_absence",
            MailJobKind::EmployeeNewShift => "employee_new_shift",
            MailJobKind::EmployeeShiftChanged => "employee_shift_changed",
            MailJobKind::EmployeeShiftDeleted => "employee_shift_deleted",
            MailJobKind::EmployeeAbsenceDecision => "employee_absence_decision",
            MailJobKind::Other(s) => s,
        }
    }
}

impl From<String> for MailJobKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "admin_new_absence" => MailJobKind::AdminNewAbsence,
            "employee_new_shift" => MailJobKind::EmployeeNewShift,
            "employee_shift_changed" => MailJobKind::EmployeeShiftChanged,
            "employee_shift_deleted" => MailJobKind::EmployeeShiftDeleted,
            "employee_absence_decision" => MailJobKind::EmployeeAbsenceDecision,
            _ => MailJobKind::Other(s),
        }
    }
}

impl From<MailJobKind> for String {
    fn from(kind: MailJobKind) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for MailJobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailJobStatus {
    Queued,
    Sent,
    Failed,
}

impl std::fmt::Display for MailJobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MailJobStatus::Queued => write!(f, "queued"),
            MailJobStatus::Sent => write!(f, "sent"),
            MailJobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Row of the `mail_jobs` queue table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailJob {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: MailJobKind,
    #[serde(default)]
    pub payload: Value,
    pub status: MailJobStatus,
    #[serde(default)]
    pub attempt_count: u32,
    #[serde(default)]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
}

/// Insert shape for a queue row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewMailJob {
    #[serde(rename = "type")]
    pub kind: MailJobKind,
    pub payload: Value,
    pub status: MailJobStatus,
    pub attempt_count: u32,
}

impl NewMailJob {
    pub fn new(kind: MailJobKind, payload: Value) -> Self {
        Self {
            kind,
            payload,
            status: MailJobStatus::Queued,
            attempt_count: 0,
        }
    }

    pub fn admin_new_absence(request: &AbsenceRequest) -> Result<Self> {
        let payload = AdminNewAbsencePayload {
            employee_id: request.employee_id.clone(),
            start_date: request.start_date,
            end_date: Some(request.end_date),
            reason: request.reason.clone(),
        };
        Ok(Self::new(
            MailJobKind::AdminNewAbsence,
            serde_json::to_value(payload)?,
        ))
    }

    pub fn absence_decision(request: &AbsenceRequest) -> Result<Self> {
        let payload = AbsenceDecisionPayload {
            employee_id: request.employee_id.clone(),
            start_date: request.start_date,
            end_date: Some(request.end_date),
            status: request.status,
            admin_message: request.admin_message.clone(),
        };
        Ok(Self::new(
            MailJobKind::EmployeeAbsenceDecision,
            serde_json::to_value(payload)?,
        ))
    }

    pub fn from_notice(notice: &ShiftNotice) -> Result<Self> {
        let (kind, payload) = match notice {
            ShiftNotice::Added { entry } => (
                MailJobKind::EmployeeNewShift,
                ShiftPayload {
                    employee_id: entry.employee_id.clone(),
                    work_date: Some(entry.work_date),
                    kind: Some(entry.kind),
                    hours: entry.hours,
                    ..Default::default()
                },
            ),
            ShiftNotice::Changed { before, after } => (
                MailJobKind::EmployeeShiftChanged,
                ShiftPayload {
                    employee_id: after.employee_id.clone(),
                    work_date: Some(after.work_date),
                    kind: Some(after.kind),
                    hours: after.hours,
                    old_kind: Some(before.kind),
                    old_hours: before.hours,
                },
            ),
            ShiftNotice::Removed { entry } => (
                MailJobKind::EmployeeShiftDeleted,
                ShiftPayload {
                    employee_id: entry.employee_id.clone(),
                    work_date: Some(entry.work_date),
                    kind: Some(entry.kind),
                    hours: entry.hours,
                    ..Default::default()
                },
            ),
        };
        Ok(Self::new(kind, serde_json::to_value(payload)?))
    }
}

/// Result of one delivery attempt, written back to the queue row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobUpdate {
    pub status: MailJobStatus,
    pub attempt_count: u32,
    pub last_error: Option<String>,
    pub processed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminNewAbsencePayload {
    #[serde(default)]
    pub employee_id: String,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Payload shared by the new/changed/deleted shift jobs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShiftPayload {
    #[serde(default)]
    pub employee_id: String,
    #[serde(default)]
    pub work_date: Option<NaiveDate>,
    #[serde(default)]
    pub kind: Option<ShiftKind>,
    #[serde(default)]
    pub hours: Option<f64>,
    #[serde(default)]
    pub old_kind: Option<ShiftKind>,
    #[serde(default)]
    pub old_hours: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbsenceDecisionPayload {
    #[serde(default)]
    pub employee_id: String,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    pub status: AbsenceStatus,
    #[serde(default)]
    pub admin_message: Option<String>,
}
