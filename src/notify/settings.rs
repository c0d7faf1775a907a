use serde::{Deserialize, Serialize};

/// Notification switches, stored as a single row of `app_settings`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    pub email_notifications: bool,
    pub admin_notification_emails: Vec<String>,
    pub absence_requests: bool,
    pub schedule_changes: bool,
    pub employee_updates: bool,
    pub system_updates: bool,
    pub daily_digest: bool,
    pub digest_time: String,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            email_notifications: true,
            admin_notification_emails: Vec::new(),
            absence_requests: true,
            schedule_changes: true,
            employee_updates: false,
            system_updates: false,
            daily_digest: false,
            digest_time: "08:00".to_string(),
        }
    }
}

impl NotificationSettings {
    /// Admin addresses with blanks removed.
    pub fn admin_recipients(&self) -> Vec<String> {
        self.admin_notification_emails
            .iter()
            .map(|e| e.trim())
            .filter(|e| !e.is_empty())
            .map(str::to_string)
            .collect()
    }
}
