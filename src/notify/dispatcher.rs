use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::config::DispatcherConfig;
use crate::error::Result;
use crate::notify::job::{
    AbsenceDecisionPayload, AdminNewAbsencePayload, JobUpdate, MailJob, MailJobKind,
    MailJobStatus, ShiftPayload,
};
use crate::notify::mailer::EmailSender;
use crate::notify::settings::NotificationSettings;
use crate::notify::templates;
use crate::remote::{EmployeeDirectory, MailJobQueue, SettingsStore};
use crate::schedule::Employee;

/// What happened to a job that did not error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Sent,
    Skipped(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub processed: usize,
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Drains the `mail_jobs` queue and delivers each job by e-mail.
pub struct MailDispatcher {
    queue: Arc<dyn MailJobQueue>,
    directory: Arc<dyn EmployeeDirectory>,
    settings: Arc<dyn SettingsStore>,
    mailer: Arc<dyn EmailSender>,
    config: DispatcherConfig,
    dashboard_url: Option<String>,
}

fn skip(reason: impl Into<String>) -> Result<JobOutcome> {
    Ok(JobOutcome::Skipped(reason.into()))
}

fn truncate(msg: &str, max_chars: usize) -> String {
    msg.chars().take(max_chars).collect()
}

impl MailDispatcher {
    pub fn new(
        queue: Arc<dyn MailJobQueue>,
        directory: Arc<dyn EmployeeDirectory>,
        settings: Arc<dyn SettingsStore>,
        mailer: Arc<dyn EmailSender>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            queue,
            directory,
            settings,
            mailer,
            config,
            dashboard_url: None,
        }
    }

    pub fn with_dashboard_url(mut self, url: Option<String>) -> Self {
        self.dashboard_url = url;
        self
    }

    /// One pass over the oldest `limit` queued jobs.
    ///
    /// Settings and the queue fetch must succeed; individual job failures are
    /// recorded on the job row and counted.
    pub async fn process_queue(&self, limit: usize) -> Result<DispatchSummary> {
        let settings = self.settings.load_settings().await?;
        let jobs = self.queue.fetch_queued(limit).await?;

        let mut summary = DispatchSummary {
            processed: jobs.len(),
            ..Default::default()
        };
        if jobs.is_empty() {
            return Ok(summary);
        }

        for job in &jobs {
            let (update, outcome) = match self.process_job(job, &settings).await {
                Ok(JobOutcome::Sent) => {
                    summary.sent += 1;
                    (self.update(MailJobStatus::Sent, job, None), "sent")
                }
                Ok(JobOutcome::Skipped(reason)) => {
                    tracing::debug!(job_id = job.id, kind = %job.kind, reason = %reason, "Mail job skipped");
                    summary.skipped += 1;
                    (
                        self.update(MailJobStatus::Sent, job, Some(format!("skipped: {}", reason))),
                        "skipped",
                    )
                }
                Err(e) => {
                    tracing::warn!(job_id = job.id, kind = %job.kind, error = %e, "Mail job failed");
                    summary.failed += 1;
                    let msg = truncate(&e.to_string(), self.config.max_error_len);
                    (self.update(MailJobStatus::Failed, job, Some(msg)), "failed")
                }
            };

            if let Err(e) = self.queue.record_attempt(job.id, &update).await {
                tracing::warn!(job_id = job.id, outcome, error = %e, "Failed to record mail job attempt");
            }
        }

        tracing::info!(
            processed = summary.processed,
            sent = summary.sent,
            skipped = summary.skipped,
            failed = summary.failed,
            "Mail queue pass complete"
        );
        Ok(summary)
    }

    fn update(&self, status: MailJobStatus, job: &MailJob, last_error: Option<String>) -> JobUpdate {
        JobUpdate {
            status,
            attempt_count: job.attempt_count + 1,
            last_error,
            processed_at: Utc::now(),
        }
    }

    pub async fn process_job(
        &self,
        job: &MailJob,
        settings: &NotificationSettings,
    ) -> Result<JobOutcome> {
        match &job.kind {
            MailJobKind::AdminNewAbsence => self.admin_new_absence(job, settings).await,
            MailJobKind::EmployeeNewShift
            | MailJobKind::EmployeeShiftChanged
            | MailJobKind::EmployeeShiftDeleted => self.employee_shift(job, settings).await,
            MailJobKind::EmployeeAbsenceDecision => self.absence_decision(job, settings).await,
            MailJobKind::Other(kind) => skip(format!("unknown type {}", kind)),
        }
    }

    async fn admin_new_absence(
        &self,
        job: &MailJob,
        settings: &NotificationSettings,
    ) -> Result<JobOutcome> {
        if !settings.email_notifications {
            return skip("email_notifications=false");
        }
        if !settings.absence_requests {
            return skip("absence_requests=false");
        }
        let recipients = settings.admin_recipients();
        if recipients.is_empty() {
            return skip("no recipients");
        }

        let payload: AdminNewAbsencePayload = serde_json::from_value(job.payload.clone())?;
        let name = self
            .directory
            .find_employee(&payload.employee_id)
            .await?
            .map(|e| e.name)
            .unwrap_or_else(|| "Unknown".to_string());

        let message =
            templates::admin_new_absence(recipients, &name, &payload, self.dashboard_url.as_deref());
        self.mailer.send(&message).await?;
        Ok(JobOutcome::Sent)
    }

    async fn employee_shift(
        &self,
        job: &MailJob,
        settings: &NotificationSettings,
    ) -> Result<JobOutcome> {
        if !settings.email_notifications {
            return skip("email_notifications=false");
        }
        if !settings.schedule_changes {
            return skip("schedule_changes=false");
        }

        let payload: ShiftPayload = serde_json::from_value(job.payload.clone())?;
        let Some((employee, to)) = self.recipient(&payload.employee_id).await? else {
            return skip(if payload.employee_id.is_empty() {
                "no employee_id"
            } else {
                "employee has no email"
            });
        };

        let name = Some(employee.name.as_str());
        let message = match job.kind {
            MailJobKind::EmployeeNewShift => templates::employee_new_shift(to, name, &payload),
            MailJobKind::EmployeeShiftChanged => {
                templates::employee_shift_changed(to, name, &payload)
            }
            _ => templates::employee_shift_deleted(to, name, &payload),
        };
        self.mailer.send(&message).await?;
        Ok(JobOutcome::Sent)
    }

    async fn absence_decision(
        &self,
        job: &MailJob,
        settings: &NotificationSettings,
    ) -> Result<JobOutcome> {
        if !settings.email_notifications {
            return skip("email_notifications=false");
        }

        let payload: AbsenceDecisionPayload = serde_json::from_value(job.payload.clone())?;
        let Some((employee, to)) = self.recipient(&payload.employee_id).await? else {
            return skip("employee has no email");
        };

        let message = templates::employee_absence_decision(to, Some(&employee.name), &payload);
        self.mailer.send(&message).await?;
        Ok(JobOutcome::Sent)
    }

    /// Employee and address, or `None` when either is missing.
    async fn recipient(&self, employee_id: &str) -> Result<Option<(Employee, String)>> {
        if employee_id.is_empty() {
            return Ok(None);
        }
        let employee = self.directory.find_employee(employee_id).await?;
        Ok(employee.and_then(|e| {
            let to = e.mail_address()?.to_string();
            Some((e, to))
        }))
    }

    /// Poll on an interval, or earlier when `wake` fires, until cancelled.
    pub async fn run(&self, token: CancellationToken, wake: Arc<Notify>) {
        let period = Duration::from_millis(self.config.poll_interval_ms.max(1));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(poll_ms = self.config.poll_interval_ms, "Mail dispatcher started");
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {}
                _ = wake.notified() => {}
            }

            if let Err(e) = self.process_queue(self.config.batch_limit).await {
                tracing::error!(error = %e, "Mail queue pass failed");
            }
        }
        tracing::info!("Mail dispatcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_counts_chars_not_bytes() {
        let msg = "ä".repeat(600);
        let cut = truncate(&msg, 500);
        assert_eq!(cut.chars().count(), 500);
        assert_eq!(truncate("short", 500), "short");
    }
}
