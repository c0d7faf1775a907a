use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use chrono::NaiveDate;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tokio::sync::Notify;
use tower::ServiceExt;

use shift_roster::config::SessionConfig;
use shift_roster::dashboard::{router, AppState};
use shift_roster::notify::{MailJobKind, NotificationSender};
use shift_roster::remote::MemoryBackend;
use shift_roster::schedule::{DateRange, Employee, ScheduleSession, ShiftEntry};

fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

fn range() -> DateRange {
    DateRange::new(date("2025-08-18"), date("2025-08-22")).unwrap()
}

/// Router over a memory backend seeded with two employees and one shift.
fn create_test_app() -> (Router, Arc<MemoryBackend>, AppState) {
    let employees = vec![
        Employee::new("e1", "Aino").with_email("aino@example.com"),
        Employee::new("e2", "Bea"),
    ];
    let seeded = vec![ShiftEntry::normal("e1", date("2025-08-18"), 8.0)];
    let backend = Arc::new(
        MemoryBackend::new()
            .with_employees(employees.clone())
            .with_shifts(seeded.clone()),
    );

    let mut session = ScheduleSession::new(SessionConfig::default(), range());
    session.hydrate(employees, range(), seeded);

    let (notifier, _task) = NotificationSender::spawn(backend.clone(), Arc::new(Notify::new()), 16);
    let state = AppState::new(session, backend.clone(), notifier);
    (router(state.clone()), backend, state)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(b) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

/// Jobs reach the backend through a background task; poll briefly.
async fn wait_for_jobs(backend: &MemoryBackend, n: usize) {
    for _ in 0..200 {
        if backend.jobs().len() >= n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn test_schedule_snapshot() {
    let (app, _, _) = create_test_app();
    let (status, json) = send(&app, "GET", "/api/schedule", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["start"], "2025-08-18");
    assert_eq!(json["end"], "2025-08-22");
    assert_eq!(json["employees"].as_array().unwrap().len(), 2);
    assert_eq!(json["entries"][0]["type"], "normal");
    assert_eq!(json["totals"][0]["hours"], 8.0);
    assert_eq!(json["unsaved"], false);
    assert_eq!(json["can_undo"], false);
}

#[tokio::test]
async fn test_cell_edit_then_undo_redo() {
    let (app, _, _) = create_test_app();
    let (status, json) = send(
        &app,
        "POST",
        "/api/cells",
        Some(json!({"employee_id": "e2", "work_date": "2025-08-19", "hours": 6})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["pending"], 1);
    assert_eq!(json["unsaved"], true);
    assert_eq!(json["entries"].as_array().unwrap().len(), 2);

    let (_, json) = send(&app, "POST", "/api/undo", None).await;
    assert_eq!(json["applied"], true);
    assert_eq!(json["schedule"]["entries"].as_array().unwrap().len(), 1);
    assert_eq!(json["schedule"]["can_redo"], true);

    let (_, json) = send(&app, "POST", "/api/redo", None).await;
    assert_eq!(json["applied"], true);
    assert_eq!(json["schedule"]["entries"].as_array().unwrap().len(), 2);

    let (_, json) = send(&app, "POST", "/api/redo", None).await;
    assert_eq!(json["applied"], false);
}

#[tokio::test]
async fn test_invalid_entry_is_bad_request() {
    let (app, _, state) = create_test_app();
    let (status, json) = send(
        &app,
        "PUT",
        "/api/entries",
        Some(json!({"employee_id": "e1", "work_date": "2025-08-20", "type": "locked", "hours": null})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("positive hour"));
    assert!(!state.session.read().await.has_unsaved_changes());
}

#[tokio::test]
async fn test_autofill_and_save_notifies_employees() {
    let (app, backend, _) = create_test_app();

    let (_, json) = send(&app, "POST", "/api/autofill", None).await;
    // 5 weekdays x 2 employees, one cell already filled
    assert_eq!(json["filled"], 9);

    let (status, json) = send(&app, "POST", "/api/save", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["saved"], true);
    assert_eq!(json["upserted"], 9);
    assert_eq!(json["notified"], 9);
    assert_eq!(backend.shifts().len(), 10);

    wait_for_jobs(&backend, 9).await;
    let jobs = backend.jobs();
    assert_eq!(jobs.len(), 9);
    assert!(jobs.iter().all(|j| j.kind == MailJobKind::EmployeeNewShift));

    let (_, json) = send(&app, "POST", "/api/save", None).await;
    assert_eq!(json["saved"], false);
}

#[tokio::test]
async fn test_failed_save_returns_generic_error_and_keeps_changes() {
    let (app, backend, state) = create_test_app();
    send(
        &app,
        "POST",
        "/api/cells",
        Some(json!({"employee_id": "e1", "work_date": "2025-08-18", "hours": null})),
    )
    .await;
    backend.fail_deletes(true);

    let (status, json) = send(&app, "POST", "/api/save", None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["error"], "Saving failed");

    let session = state.session.read().await;
    assert!(session.has_unsaved_changes());
    assert_eq!(session.pending().len(), 1);
}

#[tokio::test]
async fn test_load_refuses_to_drop_unsaved_edits() {
    let (app, _, _) = create_test_app();
    send(
        &app,
        "POST",
        "/api/cells",
        Some(json!({"employee_id": "e2", "work_date": "2025-08-19", "hours": 4})),
    )
    .await;

    let body = json!({"start": "2025-08-25", "end": "2025-08-29"});
    let (status, _) = send(&app, "POST", "/api/schedule/load", Some(body.clone())).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let mut discard = body;
    discard["discard"] = json!(true);
    let (status, json) = send(&app, "POST", "/api/schedule/load", Some(discard)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["start"], "2025-08-25");
    assert_eq!(json["pending"], 0);
    assert!(json["entries"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_load_rejects_inverted_range() {
    let (app, _, _) = create_test_app();
    let (status, _) = send(
        &app,
        "POST",
        "/api/schedule/load",
        Some(json!({"start": "2025-08-29", "end": "2025-08-25"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_export_csv() {
    let (app, _, _) = create_test_app();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/export.csv")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/csv"));
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let csv = String::from_utf8(bytes.to_vec()).unwrap();
    let mut lines = csv.lines();
    assert!(lines.next().unwrap().starts_with(r#""Employee","2025-08-18""#));
    assert_eq!(lines.next().unwrap(), r#""Aino","8","","","","","8""#);
}

#[tokio::test]
async fn test_absence_submit_and_decide() {
    let (app, backend, _) = create_test_app();
    let (status, created) = send(
        &app,
        "POST",
        "/api/absences",
        Some(json!({"employee_id": "e1", "start_date": "2025-09-01", "reason": "Flu"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "pending");
    assert_eq!(created["end_date"], "2025-09-01");

    let id = created["id"].as_str().unwrap();
    let (status, decided) = send(
        &app,
        "POST",
        &format!("/api/absences/{}/decision", id),
        Some(json!({"decision": "declined", "admin_message": "Short staffed"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decided["status"], "declined");

    let (_, list) = send(&app, "GET", "/api/absences", None).await;
    assert_eq!(list.as_array().unwrap().len(), 1);

    wait_for_jobs(&backend, 2).await;
    let kinds: Vec<MailJobKind> = backend.jobs().into_iter().map(|j| j.kind).collect();
    assert_eq!(
        kinds,
        vec![MailJobKind::AdminNewAbsence, MailJobKind::EmployeeAbsenceDecision]
    );
}

#[tokio::test]
async fn test_absence_validation_and_missing_request() {
    let (app, _, _) = create_test_app();
    let (status, _) = send(&app, "POST", "/api/absences", Some(json!({"employee_id": "e1"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/absences/{}/decision", uuid::Uuid::new_v4()),
        Some(json!({"decision": "approved"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_settings_round_trip() {
    let (app, _, _) = create_test_app();
    let (_, json) = send(&app, "GET", "/api/settings", None).await;
    assert_eq!(json["email_notifications"], true);

    let (status, _) = send(
        &app,
        "PUT",
        "/api/settings",
        Some(json!({"email_notifications": false, "admin_notification_emails": ["boss@example.com"]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, json) = send(&app, "GET", "/api/settings", None).await;
    assert_eq!(json["email_notifications"], false);
    assert_eq!(json["admin_notification_emails"][0], "boss@example.com");
    assert_eq!(json["schedule_changes"], true);
}

#[tokio::test]
async fn test_edit_during_reload_fetch_is_kept() {
    let (app, backend, state) = create_test_app();
    backend.set_shift_latency(Some(Duration::from_millis(200)));

    let reload = {
        let app = app.clone();
        tokio::spawn(async move {
            send(
                &app,
                "POST",
                "/api/schedule/load",
                Some(json!({"start": "2025-08-25", "end": "2025-08-29"})),
            )
            .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    let (status, _) = send(
        &app,
        "POST",
        "/api/cells",
        Some(json!({"employee_id": "e2", "work_date": "2025-08-20", "hours": 5})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = reload.await.unwrap();
    assert_eq!(status, StatusCode::CONFLICT);

    let session = state.session.read().await;
    assert_eq!(session.range().start, date("2025-08-18"));
    assert_eq!(session.entry("e2", date("2025-08-20")).unwrap().hours, Some(5.0));
    assert_eq!(session.pending().len(), 1);
}

#[tokio::test]
async fn test_reload_waits_for_save_in_flight() {
    let (app, backend, _) = create_test_app();
    send(
        &app,
        "POST",
        "/api/cells",
        Some(json!({"employee_id": "e2", "work_date": "2025-08-19", "hours": 4})),
    )
    .await;
    backend.set_shift_latency(Some(Duration::from_millis(200)));

    let save = {
        let app = app.clone();
        tokio::spawn(async move { send(&app, "POST", "/api/save", None).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    let (status, loaded) = send(
        &app,
        "POST",
        "/api/schedule/load",
        Some(json!({"start": "2025-08-18", "end": "2025-08-22", "discard": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, saved) = save.await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saved["saved"], true);

    // The reload ran after the save committed and sees the saved row
    assert_eq!(loaded["pending"], 0);
    assert_eq!(loaded["entries"].as_array().unwrap().len(), 2);
    backend.set_shift_latency(None);

    // Baseline matches the store, so a further edit is a change, not an addition
    send(
        &app,
        "POST",
        "/api/cells",
        Some(json!({"employee_id": "e2", "work_date": "2025-08-19", "hours": 6})),
    )
    .await;
    let (_, saved) = send(&app, "POST", "/api/save", None).await;
    assert_eq!(saved["notified"], 1);
    wait_for_jobs(&backend, 2).await;
    assert_eq!(backend.jobs()[1].kind, MailJobKind::EmployeeShiftChanged);
}
