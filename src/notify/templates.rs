//! Plain-text bodies for each mail job kind.

use chrono::NaiveDate;

use crate::absence::AbsenceStatus;
use crate::notify::job::{AbsenceDecisionPayload, AdminNewAbsencePayload, ShiftPayload};
use crate::notify::mailer::EmailMessage;
use crate::schedule::ShiftKind;

const SIGNATURE: &str = "Shift Roster";

pub(crate) fn period(start: NaiveDate, end: Option<NaiveDate>, sep: &str) -> String {
    match end {
        Some(end) if end != start => format!("{}{}{}", start, sep, end),
        _ => start.to_string(),
    }
}

fn greeting(name: Option<&str>) -> String {
    match name {
        Some(n) if !n.trim().is_empty() => format!("Hello {},", n.trim()),
        _ => "Hello,".to_string(),
    }
}

fn describe(kind: Option<ShiftKind>, hours: Option<f64>) -> String {
    match (kind, hours) {
        (Some(ShiftKind::Normal) | None, Some(h)) => format!("{} h", h),
        (Some(k), Some(h)) => format!("{} ({} h)", k, h),
        (Some(k), None) => k.to_string(),
        (None, None) => "-".to_string(),
    }
}

fn join(lines: Vec<Option<String>>) -> String {
    lines.into_iter().flatten().collect::<Vec<_>>().join("\n")
}

pub fn admin_new_absence(
    to: Vec<String>,
    employee_name: &str,
    payload: &AdminNewAbsencePayload,
    dashboard_url: Option<&str>,
) -> EmailMessage {
    let subject = format!(
        "New absence request: {} ({})",
        employee_name,
        period(payload.start_date, payload.end_date, "–")
    );
    let text = join(vec![
        Some(format!("Employee: {}", employee_name)),
        Some(format!(
            "Period: {}",
            period(payload.start_date, payload.end_date, " – ")
        )),
        payload.reason.as_ref().map(|r| format!("Reason: {}", r)),
        dashboard_url.map(|u| format!("Open the dashboard: {}", u)),
    ]);
    EmailMessage { to, subject, text }
}

pub fn employee_new_shift(to: String, name: Option<&str>, payload: &ShiftPayload) -> EmailMessage {
    let date = payload.work_date.map(|d| d.to_string()).unwrap_or_default();
    let text = join(vec![
        Some(greeting(name)),
        Some(String::new()),
        Some("A new shift has been added for you:".to_string()),
        Some(format!("Shift: {}", describe(payload.kind, payload.hours))),
        payload.work_date.map(|d| format!("Date: {}", d)),
        Some(String::new()),
        Some("Regards,".to_string()),
        Some(SIGNATURE.to_string()),
    ]);
    EmailMessage {
        to: vec![to],
        subject: format!("New shift added ({})", date),
        text,
    }
}

pub fn employee_shift_changed(
    to: String,
    name: Option<&str>,
    payload: &ShiftPayload,
) -> EmailMessage {
    let date = payload.work_date.map(|d| d.to_string()).unwrap_or_default();
    let had_old = payload.old_kind.is_some() || payload.old_hours.is_some();
    let text = join(vec![
        Some(greeting(name)),
        Some(String::new()),
        Some("Your shift has been updated:".to_string()),
        had_old.then(|| {
            format!(
                "Before: {}",
                describe(payload.old_kind, payload.old_hours)
            )
        }),
        Some(format!("Now:    {}", describe(payload.kind, payload.hours))),
        payload.work_date.map(|d| format!("Date:   {}", d)),
        Some(String::new()),
        Some("If this does not work for you, contact your supervisor.".to_string()),
        Some(String::new()),
        Some("Regards,".to_string()),
        Some(SIGNATURE.to_string()),
    ]);
    EmailMessage {
        to: vec![to],
        subject: format!("Your shift has changed ({})", date),
        text,
    }
}

pub fn employee_shift_deleted(
    to: String,
    name: Option<&str>,
    payload: &ShiftPayload,
) -> EmailMessage {
    let date = payload.work_date.map(|d| d.to_string()).unwrap_or_default();
    let text = join(vec![
        Some(greeting(name)),
        Some(String::new()),
        Some("A shift assigned to you has been removed.".to_string()),
        (payload.kind.is_some() || payload.hours.is_some())
            .then(|| format!("Shift: {}", describe(payload.kind, payload.hours))),
        payload.work_date.map(|d| format!("Date: {}", d)),
        Some(String::new()),
        Some("If this is a mistake, contact your supervisor.".to_string()),
        Some(String::new()),
        Some("Regards,".to_string()),
        Some(SIGNATURE.to_string()),
    ]);
    EmailMessage {
        to: vec![to],
        subject: format!("Your shift was cancelled ({})", date),
        text,
    }
}

pub fn employee_absence_decision(
    to: String,
    name: Option<&str>,
    payload: &AbsenceDecisionPayload,
) -> EmailMessage {
    let verdict = match payload.status {
        AbsenceStatus::Approved => "approved",
        AbsenceStatus::Declined => "declined",
        AbsenceStatus::Pending => "reopened",
    };
    let when = period(payload.start_date, payload.end_date, " – ");
    let text = join(vec![
        Some(greeting(name)),
        Some(String::new()),
        Some(format!("Your absence request for {} was {}.", when, verdict)),
        payload
            .admin_message
            .as_ref()
            .map(|m| format!("Message: {}", m)),
        Some(String::new()),
        Some("Regards,".to_string()),
        Some(SIGNATURE.to_string()),
    ]);
    EmailMessage {
        to: vec![to],
        subject: format!("Absence request {} ({})", verdict, when),
        text,
    }
}
