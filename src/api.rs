//! HTTP status surface.
//!
//! `/`, `/qr` and `/health` are always served. `/generate-code` exists only in
//! sponsor pairing mode. Token-guarded routes (`/admin/codes`, session export and
//! import) exist only when an export token is set.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use okibot_core::{config::HttpConfig, error::OkibotError};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::commands::replies;
use crate::gateway::Shared;

/// Largest accepted session import.
const MAX_IMPORT_BYTES: usize = 64 * 1024 * 1024;

type ApiError = (StatusCode, Json<Value>);

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    shared: Arc<Shared>,
    export_token: Option<String>,
    show_qr: bool,
}

impl ApiState {
    pub fn new(shared: Arc<Shared>, config: &HttpConfig) -> Self {
        let export_token = Some(config.export_token.trim().to_string()).filter(|t| !t.is_empty());
        Self {
            shared,
            export_token,
            show_qr: config.show_qr,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateCodeRequest {
    phone: String,
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// Check bearer token auth. Without a configured token nothing is let through.
fn check_auth(headers: &HeaderMap, token: &Option<String>) -> Result<(), ApiError> {
    let Some(expected) = token else {
        return Err((StatusCode::NOT_FOUND, Json(json!({"error": "not found"}))));
    };
    let unauthorized = |msg: &str| (StatusCode::UNAUTHORIZED, Json(json!({ "error": msg })));

    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| unauthorized("missing Authorization header"))?
        .to_str()
        .map_err(|_| unauthorized("invalid Authorization header"))?;

    match value.strip_prefix("Bearer ") {
        Some(given) if constant_time_eq(given, expected) => Ok(()),
        _ => Err(unauthorized("invalid token")),
    }
}

fn qr_img(data_url: &str) -> String {
    format!(r#"<img src="{data_url}" alt="QR code WhatsApp" />"#)
}

/// `GET /`: status line, plus the pairing QR when exposed.
async fn index(State(state): State<ApiState>) -> Html<String> {
    let mut page = replies::status_line(&state.shared.bot_name);
    if state.show_qr {
        if let Some(data_url) = state
            .shared
            .session
            .pairing_artifact()
            .await
            .and_then(|a| a.data_url)
        {
            page.push_str("<br/>");
            page.push_str(&qr_img(&data_url));
        }
    }
    Html(page)
}

/// `GET /qr`: the current pairing QR, or a not-ready notice.
async fn qr(State(state): State<ApiState>) -> Html<String> {
    let artifact = if state.show_qr {
        state.shared.session.pairing_artifact().await
    } else {
        None
    };
    match artifact.and_then(|a| a.data_url) {
        Some(data_url) => Html(qr_img(&data_url)),
        None => Html(replies::QR_NOT_READY.to_string()),
    }
}

/// `GET /health`: connection state and uptime.
async fn health(State(state): State<ApiState>) -> Json<Value> {
    let current = state.shared.session.current().await;
    Json(json!({
        "status": "ok",
        "bot": state.shared.bot_name,
        "state": current.label(),
        "pairing": current.pairing_artifact().is_some(),
        "uptime_secs": state.shared.session.uptime_secs(),
    }))
}

/// `POST /generate-code`: issue a sponsor code for a phone number.
async fn generate_code(
    State(state): State<ApiState>,
    Json(body): Json<GenerateCodeRequest>,
) -> Result<Json<Value>, ApiError> {
    let registry = state.shared.sponsors.as_ref().ok_or((
        StatusCode::NOT_FOUND,
        Json(json!({"error": "sponsor mode disabled"})),
    ))?;
    let phone = body.phone.trim();
    if phone.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "'phone' must not be empty"})),
        ));
    }
    let issued = registry.issue(phone).await;
    Ok(Json(json!({
        "code": issued.code,
        "phone": issued.phone,
        "expires_at": issued.expires_at,
    })))
}

/// `GET /admin/codes`: active sponsor codes.
async fn admin_codes(
    headers: HeaderMap,
    State(state): State<ApiState>,
) -> Result<Json<Value>, ApiError> {
    check_auth(&headers, &state.export_token)?;
    let registry = state.shared.sponsors.as_ref().ok_or((
        StatusCode::NOT_FOUND,
        Json(json!({"error": "sponsor mode disabled"})),
    ))?;
    Ok(Json(json!({ "codes": registry.active().await })))
}

/// `GET /session/export`: download the latest snapshot archive.
async fn session_export(
    headers: HeaderMap,
    State(state): State<ApiState>,
) -> Result<Response, ApiError> {
    check_auth(&headers, &state.export_token)?;
    let internal = |e: OkibotError| {
        error!("session export failed: {e}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "export failed"})),
        )
    };

    let Some(record) = state.shared.snapshots.latest().await.map_err(internal)? else {
        return Err((
            StatusCode::NOT_FOUND,
            Json(json!({"error": "no snapshot available"})),
        ));
    };
    let bytes = tokio::fs::read(&record.path)
        .await
        .map_err(|e| internal(e.into()))?;
    info!("session export: {} ({} bytes)", record.name, bytes.len());

    let headers = [
        (header::CONTENT_TYPE, "application/gzip".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", record.name),
        ),
    ];
    Ok((headers, bytes).into_response())
}

/// `POST /session/import`: store an uploaded archive for the next startup.
async fn session_import(
    headers: HeaderMap,
    State(state): State<ApiState>,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    check_auth(&headers, &state.export_token)?;
    if body.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "empty body"})),
        ));
    }
    match state.shared.snapshots.import(body.to_vec()).await {
        Ok(record) => {
            info!("session import stored as {}", record.name);
            Ok((
                StatusCode::CREATED,
                Json(json!({
                    "stored": record.name,
                    "note": "restored at next startup",
                })),
            ))
        }
        Err(OkibotError::Snapshot(msg)) => {
            warn!("rejected session import: {msg}");
            Err((StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))))
        }
        Err(e) => {
            error!("session import failed: {e}");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "import failed"})),
            ))
        }
    }
}

/// Build the axum router with shared state.
pub fn build_router(state: ApiState) -> Router {
    let mut router = Router::new()
        .route("/", get(index))
        .route("/qr", get(qr))
        .route("/health", get(health));

    let sponsor_mode = state.shared.sponsors.is_some();
    if sponsor_mode {
        router = router.route("/generate-code", post(generate_code));
    }
    if sponsor_mode && state.export_token.is_some() {
        router = router.route("/admin/codes", get(admin_codes));
    }
    if state.export_token.is_some() {
        router = router
            .route("/session/export", get(session_export))
            .route("/session/import", post(session_import))
            .layer(axum::extract::DefaultBodyLimit::max(MAX_IMPORT_BYTES));
    }
    router.with_state(state)
}

/// Serve until `shutdown` is cancelled. Bind failures are logged, not fatal.
pub async fn serve(config: HttpConfig, state: ApiState, shutdown: CancellationToken) {
    let app = build_router(state);
    let addr = format!("{}:{}", config.host, config.port);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("HTTP server failed to bind to {addr}: {e}");
            return;
        }
    };
    info!("HTTP server listening on http://{addr}");

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await;
    if let Err(e) = result {
        error!("HTTP server error: {e}");
    }
}
