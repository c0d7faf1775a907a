//! In-app activity log: one `notifications` row per event worth showing in
//! the dashboard feed, written in the background alongside any mail job.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::absence::{AbsenceRequest, AbsenceStatus};
use crate::notify::templates::period;
use crate::remote::{EmployeeDirectory, NotificationLog};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    AbsenceApproved,
    AbsenceDeclined,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub title: String,
    pub message: String,
}

impl ActivityEntry {
    /// `None` for requests that are still pending.
    pub fn absence_decision(request: &AbsenceRequest, employee_name: &str) -> Option<Self> {
        let (kind, title) = match request.status {
            AbsenceStatus::Approved => (ActivityKind::AbsenceApproved, "Absence approved"),
            AbsenceStatus::Declined => (ActivityKind::AbsenceDeclined, "Absence declined"),
            AbsenceStatus::Pending => return None,
        };
        Some(Self {
            kind,
            title: title.to_string(),
            message: format!(
                "{} • {}",
                employee_name,
                period(request.start_date, Some(request.end_date), "–")
            ),
        })
    }
}

/// Write the decision row without blocking the caller. Lookup and insert
/// failures are logged and dropped.
pub fn record_absence_decision(
    log: Arc<dyn NotificationLog>,
    directory: Arc<dyn EmployeeDirectory>,
    request: AbsenceRequest,
) {
    tokio::spawn(async move {
        let name = match directory.find_employee(&request.employee_id).await {
            Ok(Some(employee)) => employee.name,
            Ok(None) => "Unknown".to_string(),
            Err(e) => {
                tracing::warn!(employee_id = %request.employee_id, error = %e, "Employee lookup failed");
                "Unknown".to_string()
            }
        };
        let Some(entry) = ActivityEntry::absence_decision(&request, &name) else {
            return;
        };
        match log.insert_notification(&entry).await {
            Ok(()) => tracing::debug!(absence_id = %request.id, kind = ?entry.kind, "Activity logged"),
            Err(e) => tracing::warn!(absence_id = %request.id, error = %e, "Failed to write activity log"),
        }
    });
}
