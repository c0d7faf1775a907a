//! HTTP API over the schedule session, the absence workflow and the
//! notification settings.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::absence::{AbsenceDecision, AbsenceRequest, AbsenceService, NewAbsenceRequest};
use crate::error::{Result, RosterError};
use crate::notify::{NotificationSender, NotificationSettings};
use crate::remote::{Backend, EmployeeDirectory, SettingsStore, ShiftRepository};
use crate::schedule::{AutoFillOutcome, DateRange, Employee, ScheduleSession, ShiftEntry};

#[derive(Clone)]
pub struct AppState {
    pub session: Arc<RwLock<ScheduleSession>>,
    pub shifts: Arc<dyn ShiftRepository>,
    pub directory: Arc<dyn EmployeeDirectory>,
    pub settings: Arc<dyn SettingsStore>,
    pub absences: AbsenceService,
    pub notifier: NotificationSender,
    /// Serializes saves so two requests never submit overlapping plans.
    save_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new<B: Backend + 'static>(
        session: ScheduleSession,
        backend: Arc<B>,
        notifier: NotificationSender,
    ) -> Self {
        Self {
            session: Arc::new(RwLock::new(session)),
            shifts: backend.clone(),
            directory: backend.clone(),
            settings: backend.clone(),
            absences: AbsenceService::new(backend, notifier.clone()),
            notifier,
            save_lock: Arc::new(Mutex::new(())),
        }
    }
}

/// Error body returned by every failing endpoint.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<RosterError> for ApiError {
    fn from(e: RosterError) -> Self {
        match e {
            RosterError::Validation(msg) => ApiError::new(StatusCode::BAD_REQUEST, msg),
            RosterError::NotFound(msg) => ApiError::new(StatusCode::NOT_FOUND, msg),
            other => {
                tracing::error!(error = %other, "Request failed");
                ApiError::new(StatusCode::BAD_GATEWAY, "Remote store unavailable")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct Body {
            error: String,
        }
        (self.status, Json(Body { error: self.message })).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Serialize)]
pub struct EmployeeTotal {
    pub employee_id: String,
    pub hours: f64,
}

/// Grid snapshot returned by every schedule endpoint.
#[derive(Serialize)]
pub struct ScheduleView {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub employees: Vec<Employee>,
    pub entries: Vec<ShiftEntry>,
    pub totals: Vec<EmployeeTotal>,
    pub pending: usize,
    pub unsaved: bool,
    pub can_undo: bool,
    pub can_redo: bool,
}

impl ScheduleView {
    fn of(session: &ScheduleSession) -> Self {
        let range = session.range();
        let totals = session
            .employees()
            .iter()
            .map(|e| EmployeeTotal {
                employee_id: e.id.clone(),
                hours: session.store().total_hours(&e.id, range.days()),
            })
            .collect();
        Self {
            start: range.start,
            end: range.end,
            employees: session.employees().to_vec(),
            entries: session
                .store()
                .entries()
                .filter(|e| range.contains(e.work_date))
                .cloned()
                .collect(),
            totals,
            pending: session.pending().len(),
            unsaved: session.has_unsaved_changes(),
            can_undo: session.can_undo(),
            can_redo: session.can_redo(),
        }
    }
}

#[derive(Deserialize)]
struct LoadRequest {
    start: NaiveDate,
    end: NaiveDate,
    #[serde(default)]
    discard: bool,
}

#[derive(Deserialize)]
struct CellRequest {
    employee_id: String,
    work_date: NaiveDate,
    #[serde(default)]
    hours: Option<f64>,
}

#[derive(Serialize)]
struct StepResponse {
    applied: bool,
    schedule: ScheduleView,
}

#[derive(Serialize)]
struct AutoFillResponse {
    filled: usize,
    schedule: ScheduleView,
}

#[derive(Serialize)]
struct SaveResponse {
    saved: bool,
    upserted: usize,
    deleted: usize,
    notified: usize,
}

#[derive(Deserialize)]
struct DecisionRequest {
    decision: AbsenceDecision,
    #[serde(default)]
    admin_message: Option<String>,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index_handler))
        .route("/api/schedule", get(schedule_handler))
        .route("/api/schedule/load", post(load_handler))
        .route("/api/cells", post(cell_handler))
        .route("/api/entries", put(entry_handler))
        .route("/api/undo", post(undo_handler))
        .route("/api/redo", post(redo_handler))
        .route("/api/autofill", post(autofill_handler))
        .route("/api/save", post(save_handler))
        .route("/api/export.csv", get(export_handler))
        .route("/api/absences", get(list_absences_handler).post(submit_absence_handler))
        .route("/api/absences/{id}/decision", post(decide_absence_handler))
        .route("/api/settings", get(get_settings_handler).put(put_settings_handler))
        .layer(cors)
        .with_state(state)
}

pub async fn run_server(addr: SocketAddr, state: AppState, token: CancellationToken) -> Result<()> {
    let app = router(state);
    tracing::info!(addr = %addr, "Starting roster API server");

    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        tracing::error!(addr = %addr, error = %e, "Failed to bind API server");
        RosterError::Io(e)
    })?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await?;
    tracing::info!("API server stopped");
    Ok(())
}

async fn index_handler() -> Html<&'static str> {
    Html(include_str!("index.html"))
}

async fn schedule_handler(State(state): State<AppState>) -> Json<ScheduleView> {
    Json(ScheduleView::of(&*state.session.read().await))
}

/// Fetch employees and shifts for a new range and replace the working copy.
/// Refuses with 409 while unsaved edits exist unless `discard` is set. Holds
/// the save lock so an in-flight save commits before the session is replaced.
async fn load_handler(
    State(state): State<AppState>,
    Json(req): Json<LoadRequest>,
) -> ApiResult<Json<ScheduleView>> {
    let range = DateRange::new(req.start, req.end)?;
    let _guard = state.save_lock.lock().await;
    let conflict = || ApiError::new(StatusCode::CONFLICT, "Unsaved changes would be lost");
    if !req.discard && state.session.read().await.has_unsaved_changes() {
        return Err(conflict());
    }

    let employees = state.directory.list_employees().await?;
    let shifts = state.shifts.fetch_shifts(&range).await?;

    // Edits may have landed while the fetch was running
    let mut session = state.session.write().await;
    if !req.discard && session.has_unsaved_changes() {
        tracing::warn!(pending = session.pending().len(), "Edits arrived during reload, keeping them");
        return Err(conflict());
    }
    session.hydrate(employees, range, shifts);
    tracing::info!(start = %range.start, end = %range.end, "Schedule reloaded");
    Ok(Json(ScheduleView::of(&session)))
}

async fn cell_handler(
    State(state): State<AppState>,
    Json(req): Json<CellRequest>,
) -> Json<ScheduleView> {
    let mut session = state.session.write().await;
    session.apply_cell_change(&req.employee_id, req.work_date, req.hours);
    Json(ScheduleView::of(&session))
}

async fn entry_handler(
    State(state): State<AppState>,
    Json(entry): Json<ShiftEntry>,
) -> ApiResult<Json<ScheduleView>> {
    let mut session = state.session.write().await;
    session.set_entry(entry)?;
    Ok(Json(ScheduleView::of(&session)))
}

async fn undo_handler(State(state): State<AppState>) -> Json<StepResponse> {
    let mut session = state.session.write().await;
    let applied = session.undo();
    Json(StepResponse {
        applied,
        schedule: ScheduleView::of(&session),
    })
}

async fn redo_handler(State(state): State<AppState>) -> Json<StepResponse> {
    let mut session = state.session.write().await;
    let applied = session.redo();
    Json(StepResponse {
        applied,
        schedule: ScheduleView::of(&session),
    })
}

async fn autofill_handler(State(state): State<AppState>) -> Json<AutoFillResponse> {
    let mut session = state.session.write().await;
    let filled = match session.auto_generate() {
        AutoFillOutcome::NothingToFill => 0,
        AutoFillOutcome::Filled(n) => n,
    };
    Json(AutoFillResponse {
        filled,
        schedule: ScheduleView::of(&session),
    })
}

/// The session lock is released while the plan is submitted, so edits made
/// meanwhile stay pending after the commit.
async fn save_handler(State(state): State<AppState>) -> ApiResult<Json<SaveResponse>> {
    let _guard = state.save_lock.lock().await;

    let plan = state.session.read().await.prepare_save();
    let Some(plan) = plan else {
        return Ok(Json(SaveResponse {
            saved: false,
            upserted: 0,
            deleted: 0,
            notified: 0,
        }));
    };

    let submitted = plan.submit(state.shifts.as_ref()).await;
    let report = state
        .session
        .write()
        .await
        .finish_save(&plan, submitted)
        .map_err(|_| ApiError::new(StatusCode::BAD_GATEWAY, "Saving failed"))?;
    let notified = state.notifier.send_notices(&report.notices);
    tracing::debug!(notified, "Shift notifications queued");

    Ok(Json(SaveResponse {
        saved: true,
        upserted: report.upserted,
        deleted: report.deleted,
        notified,
    }))
}

async fn export_handler(State(state): State<AppState>) -> impl IntoResponse {
    let csv = state.session.read().await.export_csv();
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"schedule.csv\"",
            ),
        ],
        csv,
    )
}

async fn list_absences_handler(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<AbsenceRequest>>> {
    Ok(Json(state.absences.list().await?))
}

async fn submit_absence_handler(
    State(state): State<AppState>,
    Json(req): Json<NewAbsenceRequest>,
) -> ApiResult<(StatusCode, Json<AbsenceRequest>)> {
    let created = state.absences.submit(req).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn decide_absence_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<DecisionRequest>,
) -> ApiResult<Json<AbsenceRequest>> {
    let decided = state
        .absences
        .decide(id, req.decision, req.admin_message)
        .await?;
    Ok(Json(decided))
}

async fn get_settings_handler(
    State(state): State<AppState>,
) -> ApiResult<Json<NotificationSettings>> {
    Ok(Json(state.settings.load_settings().await?))
}

async fn put_settings_handler(
    State(state): State<AppState>,
    Json(settings): Json<NotificationSettings>,
) -> ApiResult<Json<NotificationSettings>> {
    state.settings.save_settings(&settings).await?;
    tracing::info!(
        email_notifications = settings.email_notifications,
        admins = settings.admin_recipients().len(),
        "Notification settings updated"
    );
    Ok(Json(settings))
}
