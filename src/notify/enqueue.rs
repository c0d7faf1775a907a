use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::notify::job::NewMailJob;
use crate::remote::MailJobQueue;
use crate::schedule::ShiftNotice;

/// Fire-and-forget handle for queueing mail jobs.
///
/// Jobs travel over a bounded channel to a background task that inserts them
/// into the queue table and wakes the dispatcher. Callers never wait on the
/// insert and never see its failures; a full or closed channel drops the job
/// with a warning.
#[derive(Debug, Clone)]
pub struct NotificationSender {
    tx: mpsc::Sender<NewMailJob>,
}

impl NotificationSender {
    /// Start the forwarding task. It ends once every sender clone is dropped.
    pub fn spawn(
        queue: Arc<dyn MailJobQueue>,
        wake: Arc<Notify>,
        capacity: usize,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(forward(rx, queue, wake));
        (Self { tx }, handle)
    }

    /// Returns whether the job was accepted by the channel.
    pub fn send(&self, job: NewMailJob) -> bool {
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(job)) => {
                tracing::warn!(kind = %job.kind, "Notification channel full, job dropped");
                false
            }
            Err(TrySendError::Closed(job)) => {
                tracing::warn!(kind = %job.kind, "Notification channel closed, job dropped");
                false
            }
        }
    }

    /// Queue one employee notification per saved shift change.
    pub fn send_notices(&self, notices: &[ShiftNotice]) -> usize {
        notices
            .iter()
            .filter_map(|notice| match NewMailJob::from_notice(notice) {
                Ok(job) => Some(job),
                Err(e) => {
                    tracing::warn!(employee_id = notice.employee_id(), error = %e, "Could not build shift notification");
                    None
                }
            })
            .filter(|job| self.send(job.clone()))
            .count()
    }
}

async fn forward(mut rx: mpsc::Receiver<NewMailJob>, queue: Arc<dyn MailJobQueue>, wake: Arc<Notify>) {
    while let Some(job) = rx.recv().await {
        match queue.enqueue(&job).await {
            Ok(()) => {
                tracing::debug!(kind = %job.kind, "Mail job queued");
                wake.notify_one();
            }
            Err(e) => {
                tracing::warn!(kind = %job.kind, error = %e, "Failed to queue mail job");
            }
        }
    }
    tracing::debug!("Notification sender closed");
}
