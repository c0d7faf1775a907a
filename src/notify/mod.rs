//! E-mail notifications through a persistent job queue.
//!
//! Producers (absence workflow, schedule saves) push [`NewMailJob`]s through a
//! [`NotificationSender`] without waiting. The [`MailDispatcher`] drains the
//! `mail_jobs` table, applies the notification settings and sends each mail via
//! an [`EmailSender`].
//!
//! # Job lifecycle
//!
//! `queued` → `sent` (delivered, or skipped with the reason in `last_error`)
//! `queued` → `failed` (error text truncated, never retried automatically)

pub mod activity;
pub mod dispatcher;
pub mod enqueue;
pub mod job;
pub mod mailer;
pub mod settings;
pub mod templates;

pub use activity::{ActivityEntry, ActivityKind};
pub use dispatcher::{DispatchSummary, JobOutcome, MailDispatcher};
pub use enqueue::NotificationSender;
pub use job::{JobUpdate, MailJob, MailJobKind, MailJobStatus, NewMailJob};
pub use mailer::{EmailMessage, EmailSender, LogMailer, ResendMailer};
pub use settings::NotificationSettings;
