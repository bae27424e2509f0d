mod acl;
pub mod auth;
mod config;
pub mod scan;
mod sweep;

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use crate::server::auth::AuthCtx;
use crate::storage::models::{
    ChildProgress, GameSession, GuardianNotification, SafetyAlert, ThreatKeyword, TimeRecord,
};
use crate::storage::{AlertSpec, SessionReport, StorageError};
use axum::http::{HeaderName, HeaderValue};
use axum::middleware;
use axum::response::Response as AxumResponse;
use axum::{
    Json, Router,
    extract::{Extension, Path, Query, State},
    http::{Method, StatusCode, header},
    routing::{get, post, put},
};
use bcrypt::verify;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
pub use config::{AppConfig, ConfigError, Role, UserConfig};
use quizguard_shared::api::{self, ApiResponse};
use quizguard_shared::domain::{
    AlertType, DAILY_LIMIT_MAX, DAILY_LIMIT_MIN, EXTENSION_MAX, EXTENSION_MIN, Severity,
    ThreatCategory,
};
pub use sweep::spawn_retention_sweep;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Span, info_span};
use uuid::Uuid;

type ChildLockMap = Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: crate::storage::Store,
    tz: Tz,
    // Per-child serialization of time-record entry points; the daily reset
    // and usage increments must not interleave for the same child.
    child_locks: ChildLockMap,
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: AppConfig, store: crate::storage::Store, tz: Tz) -> Self {
        Self {
            config,
            store,
            tz,
            child_locks: Default::default(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Calendar date in the configured reference zone.
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.tz).date_naive()
    }

    pub fn now(&self) -> NaiveDateTime {
        Utc::now().naive_utc()
    }

    async fn child_lock(&self, child_id: &str) -> Arc<Mutex<()>> {
        let mut map = self.child_locks.lock().await;
        map.entry(child_id.to_string())
            .or_insert_with(Default::default)
            .clone()
    }
}

#[derive(Clone, Debug)]
struct ReqId(pub String);

type ApiResult<T> = Result<Json<ApiResponse<T>>, AppError>;

pub fn router(state: AppState) -> Router {
    let private = Router::new()
        .route("/api/children", get(api_list_children))
        .route("/api/children/{id}/time", get(api_time_status))
        .route("/api/children/{id}/time/limit", put(api_set_daily_limit))
        .route("/api/children/{id}/time/extension", post(api_grant_extension))
        .route(
            "/api/children/{id}/time/extension-request",
            post(api_request_extension),
        )
        .route("/api/children/{id}/sessions", post(api_start_session))
        .route(
            "/api/children/{id}/sessions/{session_id}/complete",
            post(api_complete_session),
        )
        .route("/api/children/{id}/progress", get(api_get_progress))
        .route("/api/children/{id}/points", get(api_list_points))
        .route("/api/children/{id}/messages", post(api_post_message))
        .route("/api/children/{id}/alerts", get(api_list_child_alerts))
        .route("/api/alerts", get(api_list_alerts))
        .route("/api/alerts/{id}/resolve", post(api_resolve_alert))
        .route("/api/notifications", get(api_list_notifications))
        .route("/api/notifications/{id}/read", post(api_mark_notification_read))
        .route("/api/threats", get(api_list_threats).post(api_add_threat))
        .route("/api/threats/{keyword}/deactivate", post(api_deactivate_threat))
        .with_state(state.clone())
        .layer(middleware::from_fn(set_auth_span_fields))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            acl::enforce_acl,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    // Trace with request context (method, path, request_id)
    let trace = TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
        let request_id = req
            .extensions()
            .get::<ReqId>()
            .map(|r| r.0.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        info_span!(
            "request",
            method = %req.method(),
            path = %req.uri().path(),
            request_id = %request_id,
            username = tracing::field::Empty,
            role = tracing::field::Empty,
            child_id = tracing::field::Empty
        )
    });

    let app = Router::new()
        .route("/healthz", get(health))
        .route("/api/auth/login", post(api_auth_login))
        .merge(private)
        .with_state(state.clone())
        .layer(trace)
        .layer(middleware::from_fn(add_response_headers))
        .layer(middleware::from_fn(add_request_id));

    // Optionally add CORS for dev if configured

    if let Some(origin) = &state.config.dev_cors_origin {
        let hv = header::HeaderValue::from_str(origin)
            .unwrap_or(header::HeaderValue::from_static("http://localhost:5173"));
        let cors = CorsLayer::new()
            .allow_origin(hv)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);
        app.layer(cors)
    } else {
        app
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn add_request_id(
    mut req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    let hdr = HeaderName::from_static("x-request-id");
    // Use provided x-request-id if present, else generate
    let rid = req
        .headers()
        .get(&hdr)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    // Put into request extensions for trace layer & handlers
    req.extensions_mut().insert(ReqId(rid.clone()));
    let mut resp = next.run(req).await;
    if let Ok(hv) = HeaderValue::from_str(&rid) {
        resp.headers_mut().insert(hdr, hv);
    }
    Ok(resp)
}

async fn add_response_headers(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    let path = req.uri().path().to_string();
    let mut resp = next.run(req).await;

    let headers = resp.headers_mut();
    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("SAMEORIGIN"),
    );

    // API responses carry live account state; never cache them.
    if path == "/healthz" || path.starts_with("/api/") || path == "/api" {
        headers.insert(
            HeaderName::from_static("cache-control"),
            HeaderValue::from_static("no-store, no-cache, must-revalidate, private"),
        );
    }

    Ok(resp)
}

async fn set_auth_span_fields(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    if let Some(auth) = req.extensions().get::<AuthCtx>() {
        let span = Span::current();
        span.record("username", tracing::field::display(&auth.claims.sub));
        span.record("role", tracing::field::debug(&auth.claims.role));
        if let Some(cid) = &auth.claims.child_id {
            span.record("child_id", tracing::field::display(cid));
        }
    }
    Ok(next.run(req).await)
}

async fn api_auth_login(
    State(state): State<AppState>,
    Json(body): Json<api::AuthReq>,
) -> ApiResult<api::AuthResp> {
    // Find user in config
    let user = state
        .config
        .users
        .iter()
        .find(|u| u.username == body.username)
        .ok_or_else(|| {
            tracing::warn!(username=%body.username, "login: unknown username");
            AppError::unauthorized()
        })?;
    if !verify(&body.password, &user.password_hash).map_err(|e| {
        tracing::error!(username=%body.username, error=%e, "login: bcrypt verify failed");
        AppError::internal(e)
    })? {
        tracing::warn!(username=%body.username, "login: invalid password");
        return Err(AppError::unauthorized());
    }
    let token =
        auth::issue_jwt_for_user(&state, &user.username, user.role, user.child_id.clone()).await?;
    Ok(Json(ApiResponse::ok(api::AuthResp { token })))
}

async fn api_list_children(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
) -> ApiResult<Vec<api::ChildDto>> {
    let rows = state.store.list_children().await?;
    let visible: Vec<_> = match auth.claims.role {
        Role::Admin => rows,
        Role::Guardian => {
            let linked = state.config.linked_children(&auth.claims.sub);
            rows.into_iter()
                .filter(|c| linked.iter().any(|l| l == &c.id))
                .collect()
        }
        Role::Child => return Err(AppError::forbidden()),
    };
    let items = visible
        .iter()
        .map(child_dto)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(ApiResponse::ok(items)))
}

// ---- Time Accounting --------------------------------------------------

async fn api_time_status(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(id): Path<String>,
) -> ApiResult<api::TimeStatusDto> {
    let lock = state.child_lock(&id).await;
    let _guard = lock.lock().await;

    let record = state.store.time_status(&id, state.today()).await?;
    Ok(Json(ApiResponse::ok(time_status_dto(&record))))
}

async fn api_set_daily_limit(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(id): Path<String>,
    Json(body): Json<api::SetLimitReq>,
) -> ApiResult<api::TimeStatusDto> {
    if !(DAILY_LIMIT_MIN..=DAILY_LIMIT_MAX).contains(&body.minutes) {
        return Err(AppError::bad_request(format!(
            "daily limit must be between {DAILY_LIMIT_MIN} and {DAILY_LIMIT_MAX} minutes"
        )));
    }
    let lock = state.child_lock(&id).await;
    let _guard = lock.lock().await;

    let record = state
        .store
        .set_daily_limit(&id, body.minutes, state.today())
        .await?;
    Ok(Json(ApiResponse::ok(time_status_dto(&record))))
}

async fn api_grant_extension(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(id): Path<String>,
    Json(body): Json<api::ExtensionReq>,
) -> ApiResult<api::TimeStatusDto> {
    validate_extension_minutes(body.minutes)?;
    let lock = state.child_lock(&id).await;
    let _guard = lock.lock().await;

    let record = state
        .store
        .grant_extension(&id, body.minutes, state.today())
        .await?;
    Ok(Json(ApiResponse::ok(time_status_dto(&record))))
}

async fn api_request_extension(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(id): Path<String>,
    Json(body): Json<api::ExtensionReq>,
) -> ApiResult<api::AlertDto> {
    validate_extension_minutes(body.minutes)?;
    let child = state
        .store
        .get_child(&id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("child not found: {id}")))?;
    let spec = AlertSpec {
        severity: Severity::Low,
        alert_type: AlertType::TimeExtensionRequest,
        message: format!(
            "{} requested {} extra minutes of screen time",
            child.display_name, body.minutes
        ),
        trigger_keyword: None,
    };
    let alert = state.store.create_alert(&id, spec, state.now()).await?;
    notify_guardian(&state, &alert).await;
    Ok(Json(ApiResponse::ok(alert_dto(&alert)?)))
}

fn validate_extension_minutes(minutes: i32) -> Result<(), AppError> {
    if !(EXTENSION_MIN..=EXTENSION_MAX).contains(&minutes) {
        return Err(AppError::bad_request(format!(
            "extension must be between {EXTENSION_MIN} and {EXTENSION_MAX} minutes"
        )));
    }
    Ok(())
}

// ---- Session Ledger ---------------------------------------------------

async fn api_start_session(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(id): Path<String>,
    Json(body): Json<api::StartSessionReq>,
) -> ApiResult<api::SessionDto> {
    let lock = state.child_lock(&id).await;
    let _guard = lock.lock().await;

    let session = state
        .store
        .start_session(&id, &body.game_id, state.now(), state.today())
        .await?;
    Ok(Json(ApiResponse::ok(session_dto(&session)?)))
}

#[derive(serde::Deserialize)]
struct SessionPath {
    id: String,
    session_id: String,
}

async fn api_complete_session(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(p): Path<SessionPath>,
    Json(body): Json<api::CompleteSessionReq>,
) -> ApiResult<api::CompleteSessionResp> {
    if body.score < 0 {
        return Err(AppError::bad_request("score must be non-negative"));
    }
    if body.correct_answers < 0 || body.questions_answered < 0 || body.hints_used < 0 {
        return Err(AppError::bad_request("session counters must be non-negative"));
    }
    if body.correct_answers > body.questions_answered {
        return Err(AppError::bad_request(
            "correct answers cannot exceed questions answered",
        ));
    }
    if let Some(badge) = body.badge_earned.as_deref()
        && badge.trim().is_empty()
    {
        return Err(AppError::bad_request("badge identifier must not be empty"));
    }

    let lock = state.child_lock(&p.id).await;
    let _guard = lock.lock().await;

    let report = SessionReport {
        score: body.score,
        correct_answers: body.correct_answers,
        questions_answered: body.questions_answered,
        hints_used: body.hints_used,
        badge_earned: body.badge_earned.clone(),
    };
    let outcome = state
        .store
        .complete_session(&p.session_id, &p.id, report, state.now(), state.today())
        .await?;
    Ok(Json(ApiResponse::ok(api::CompleteSessionResp {
        session: session_dto(&outcome.session)?,
        progress: progress_dto(&outcome.progress, outcome.achievements),
        time: time_status_dto(&outcome.time),
    })))
}

// ---- Child Progress & Points ------------------------------------------

async fn api_get_progress(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(id): Path<String>,
) -> ApiResult<api::ProgressDto> {
    let (progress, achievements) = state.store.get_progress(&id).await?;
    Ok(Json(ApiResponse::ok(progress_dto(&progress, achievements))))
}

#[derive(serde::Deserialize)]
struct PageOpts {
    page: Option<usize>,
    per_page: Option<usize>,
}

async fn api_list_points(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(id): Path<String>,
    Query(opts): Query<PageOpts>,
) -> ApiResult<Vec<api::PointsTransactionDto>> {
    let page = opts.page.unwrap_or(1);
    let per_page = opts.per_page.unwrap_or(20);
    let rows = state
        .store
        .list_points_transactions(&id, page, per_page)
        .await?;
    let items = rows
        .into_iter()
        .map(|t| api::PointsTransactionDto {
            amount: t.amount,
            reason: t.reason,
            occurred_at: rfc3339(t.occurred_at),
        })
        .collect();
    Ok(Json(ApiResponse::ok(items)))
}

// ---- Chat safety pipeline ---------------------------------------------

async fn api_post_message(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(id): Path<String>,
    Json(body): Json<api::MessageReq>,
) -> ApiResult<api::MessageResp> {
    if body.body.trim().is_empty() {
        return Err(AppError::bad_request("message body must not be empty"));
    }
    let child = state
        .store
        .get_child(&id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("child not found: {id}")))?;

    // Explicit pipeline: scan first, then persist the message together
    // with any resulting alert; fan-out only after the commit.
    let rows = state.store.active_threat_keywords().await?;
    let entries = threat_entries(&rows)?;
    let matches = scan::scan(&body.body, &entries);
    let spec = scan::alert_from_matches(&child.display_name, &matches);

    let (message, alert) = state
        .store
        .record_scanned_message(&id, &body.body, spec, state.now())
        .await?;
    let flagged = alert.is_some();
    if let Some(alert) = &alert {
        notify_guardian(&state, alert).await;
    }
    Ok(Json(ApiResponse::ok(api::MessageResp {
        message_id: message.id,
        flagged,
    })))
}

// ---- Alerts & notifications -------------------------------------------

async fn api_list_child_alerts(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(id): Path<String>,
) -> ApiResult<Vec<api::AlertDto>> {
    let rows = state.store.list_alerts_for_child(&id).await?;
    let items = rows.iter().map(alert_dto).collect::<Result<Vec<_>, _>>()?;
    Ok(Json(ApiResponse::ok(items)))
}

async fn api_list_alerts(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
) -> ApiResult<Vec<api::AlertDto>> {
    let rows = state.store.list_alerts().await?;
    let items = rows.iter().map(alert_dto).collect::<Result<Vec<_>, _>>()?;
    Ok(Json(ApiResponse::ok(items)))
}

async fn api_resolve_alert(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<String>,
) -> ApiResult<api::AlertDto> {
    let alert = state
        .store
        .get_alert(&id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("alert not found: {id}")))?;
    // Guardians may only resolve alerts for their linked children.
    if auth.claims.role == Role::Guardian
        && !state.config.is_guardian_of(&auth.claims.sub, &alert.child_id)
    {
        return Err(AppError::forbidden());
    }
    let resolved = state
        .store
        .resolve_alert(&id, &auth.claims.sub, state.now())
        .await?;
    Ok(Json(ApiResponse::ok(alert_dto(&resolved)?)))
}

async fn api_list_notifications(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
) -> ApiResult<Vec<api::NotificationDto>> {
    let rows = state.store.list_notifications(&auth.claims.sub).await?;
    let items = rows
        .iter()
        .map(|(n, a)| notification_dto(n, a))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(ApiResponse::ok(items)))
}

async fn api_mark_notification_read(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<i32>,
) -> ApiResult<()> {
    state
        .store
        .mark_notification_read(id, &auth.claims.sub, state.now())
        .await?;
    Ok(Json(ApiResponse::ok(())))
}

/// Fan out a freshly persisted alert to the child's linked guardian, if
/// any. Best-effort: the alert is the source of truth and survives a
/// failed or skipped notification.
async fn notify_guardian(state: &AppState, alert: &SafetyAlert) {
    let Some(guardian) = state.config.guardian_of(&alert.child_id) else {
        return;
    };
    if let Err(e) = state
        .store
        .create_notification(&guardian.username, &alert.id, state.now())
        .await
    {
        tracing::warn!(
            alert_id = %alert.id,
            guardian = %guardian.username,
            error = %e,
            "notification fan-out failed; alert persisted without it"
        );
    }
}

// ---- Threat dictionary ------------------------------------------------

async fn api_list_threats(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
) -> ApiResult<Vec<api::ThreatDto>> {
    let rows = state.store.list_threat_keywords().await?;
    let items = rows.iter().map(threat_dto).collect::<Result<Vec<_>, _>>()?;
    Ok(Json(ApiResponse::ok(items)))
}

async fn api_add_threat(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Json(body): Json<api::ThreatAddReq>,
) -> ApiResult<api::ThreatDto> {
    let normalized = crate::storage::normalize_keyword(&body.keyword);
    if normalized.is_empty() {
        return Err(AppError::bad_request("keyword must not be empty"));
    }
    let row = state
        .store
        .add_threat_keyword(&normalized, body.severity, body.category, state.now())
        .await?;
    Ok(Json(ApiResponse::ok(threat_dto(&row)?)))
}

async fn api_deactivate_threat(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(keyword): Path<String>,
) -> ApiResult<()> {
    let normalized = crate::storage::normalize_keyword(&keyword);
    state.store.deactivate_threat_keyword(&normalized).await?;
    Ok(Json(ApiResponse::ok(())))
}

// ---- DTO mapping -------------------------------------------------------

fn rfc3339(dt: NaiveDateTime) -> String {
    chrono::DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc).to_rfc3339()
}

fn parse_stored<T>(raw: &str) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(AppError::internal)
}

fn child_dto(c: &crate::storage::models::Child) -> Result<api::ChildDto, AppError> {
    Ok(api::ChildDto {
        id: c.id.clone(),
        display_name: c.display_name.clone(),
        age_group: parse_stored(&c.age_group)?,
    })
}

fn time_status_dto(record: &TimeRecord) -> api::TimeStatusDto {
    api::TimeStatusDto {
        child_id: record.child_id.clone(),
        allowed: record.allowed(),
        used_minutes_today: record.used_minutes_today,
        daily_limit_minutes: record.daily_limit_minutes,
        remaining_minutes: record.remaining_minutes(),
    }
}

fn session_dto(s: &GameSession) -> Result<api::SessionDto, AppError> {
    Ok(api::SessionDto {
        id: s.id.clone(),
        child_id: s.child_id.clone(),
        game_id: s.game_id.clone(),
        status: parse_stored(&s.status)?,
        started_at: rfc3339(s.started_at),
        completed_at: s.completed_at.map(rfc3339),
        raw_score: s.raw_score,
        points_awarded: s.points_awarded,
        questions_answered: s.questions_answered,
        correct_answers: s.correct_answers,
        hints_used: s.hints_used,
        badge_awarded: s.badge_awarded.clone(),
        duration_minutes: s.duration_minutes,
    })
}

fn progress_dto(p: &ChildProgress, achievements: Vec<String>) -> api::ProgressDto {
    api::ProgressDto {
        child_id: p.child_id.clone(),
        point_balance: p.point_balance,
        achievements,
        total_sessions_played: p.total_sessions_played,
        total_minutes_played: p.total_minutes_played,
    }
}

fn alert_dto(a: &SafetyAlert) -> Result<api::AlertDto, AppError> {
    Ok(api::AlertDto {
        id: a.id.clone(),
        child_id: a.child_id.clone(),
        severity: parse_stored(&a.severity)?,
        alert_type: parse_stored(&a.alert_type)?,
        message: a.message.clone(),
        trigger_keyword: a.trigger_keyword.clone(),
        resolved: a.resolved,
        resolved_at: a.resolved_at.map(rfc3339),
        resolved_by: a.resolved_by.clone(),
        created_at: rfc3339(a.created_at),
        expires_at: rfc3339(a.expires_at),
    })
}

fn notification_dto(
    n: &GuardianNotification,
    a: &SafetyAlert,
) -> Result<api::NotificationDto, AppError> {
    Ok(api::NotificationDto {
        id: n.id,
        alert_id: n.alert_id.clone(),
        child_id: a.child_id.clone(),
        severity: parse_stored(&a.severity)?,
        alert_type: parse_stored(&a.alert_type)?,
        alert_message: a.message.clone(),
        is_read: n.is_read,
        sent_at: rfc3339(n.sent_at),
        read_at: n.read_at.map(rfc3339),
    })
}

fn threat_dto(k: &ThreatKeyword) -> Result<api::ThreatDto, AppError> {
    Ok(api::ThreatDto {
        keyword: k.keyword.clone(),
        severity: parse_stored::<Severity>(&k.severity)?,
        category: parse_stored::<ThreatCategory>(&k.category)?,
        active: k.active,
        created_at: rfc3339(k.created_at),
    })
}

fn threat_entries(rows: &[ThreatKeyword]) -> Result<Vec<scan::ThreatEntry>, AppError> {
    rows.iter()
        .map(|r| {
            Ok(scan::ThreatEntry {
                keyword: r.keyword.clone(),
                severity: parse_stored(&r.severity)?,
                category: parse_stored(&r.category)?,
            })
        })
        .collect()
}

// ---- Error type --------------------------------------------------------

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized,
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl AppError {
    fn bad_request<T: Into<String>>(msg: T) -> Self {
        Self::BadRequest(msg.into())
    }
    fn unauthorized() -> Self {
        Self::Unauthorized
    }
    fn forbidden() -> Self {
        Self::Forbidden("forbidden".into())
    }
    fn not_found<T: Into<String>>(msg: T) -> Self {
        Self::NotFound(msg.into())
    }
    fn internal<E: std::fmt::Display>(e: E) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<StorageError> for AppError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::InvalidInput(m) => AppError::BadRequest(m),
            StorageError::NotFound(m) => AppError::NotFound(m),
            StorageError::NotAllowed(m) => AppError::Forbidden(m),
            StorageError::Conflict(m) => AppError::Conflict(m),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, msg, kind, detail) = match self {
            AppError::BadRequest(m) => (StatusCode::BAD_REQUEST, m, "bad_request", None),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized".into(),
                "unauthorized",
                None,
            ),
            AppError::Forbidden(m) => (StatusCode::FORBIDDEN, m, "forbidden", None),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, m, "not_found", None),
            AppError::Conflict(m) => (StatusCode::CONFLICT, m, "conflict", None),
            // Do not leak internal error details to clients, but log them
            AppError::Internal(m) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".into(),
                "internal",
                Some(m),
            ),
        };
        if let Some(detail) = detail {
            tracing::error!(status = %status, kind = kind, message = %msg, detail = %detail, "request failed");
        } else {
            tracing::error!(status = %status, kind = kind, message = %msg, "request failed");
        }
        let body = axum::Json(ApiResponse::<()>::fail(msg));
        (status, body).into_response()
    }
}
