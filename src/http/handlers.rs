use super::state::{AppState, CallOwner};
use crate::conversation::ConversationMessage;
use crate::evaluation::SessionEvaluation;
use crate::persistence::{enrich, recent_sessions, SessionRecord};
use crate::session::{EndOutcome, SessionController, SessionError, Transition};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// Header carrying the signed-in user id (set by the auth proxy)
pub const USER_HEADER: &str = "x-user-id";

/// Header carrying the guest token returned by call start
pub const SESSION_HEADER: &str = "x-session-token";

const DEFAULT_LIST_LIMIT: usize = 10;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct StartCallResponse {
    pub companion_id: String,
    pub call_id: String,
    pub status: String,

    /// Guest token to send as `x-session-token` on the other call routes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MuteResponse {
    pub companion_id: String,
    pub muted: bool,
}

#[derive(Debug, Serialize)]
pub struct EndCallResponse {
    pub companion_id: String,
    pub call_id: Option<String>,
    pub status: String,
    pub evaluation: Option<SessionEvaluation>,
    pub record: Option<SessionRecord>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn user_id(headers: &HeaderMap) -> Option<String> {
    header_value(headers, USER_HEADER)
}

/// Signed-in user first, then the guest token
fn caller(headers: &HeaderMap) -> Option<CallOwner> {
    user_id(headers)
        .map(CallOwner::User)
        .or_else(|| header_value(headers, SESSION_HEADER).map(CallOwner::Guest))
}

fn unauthorized() -> Response {
    error_response(
        StatusCode::UNAUTHORIZED,
        format!("Missing {} or {} header", USER_HEADER, SESSION_HEADER),
    )
}

/// Controller for a call route, or the error response to return
async fn call_controller(
    state: &AppState,
    headers: &HeaderMap,
    companion_id: &str,
) -> Result<Arc<SessionController>, Response> {
    let owner = caller(headers).ok_or_else(unauthorized)?;
    state.controller(&owner, companion_id).await.ok_or_else(|| {
        error_response(
            StatusCode::NOT_FOUND,
            format!("No call with companion {}", companion_id),
        )
    })
}

fn session_error_response(e: SessionError) -> Response {
    let status = match &e {
        SessionError::Connection(_) => StatusCode::BAD_GATEWAY,
        SessionError::Persistence(_) | SessionError::ControllerClosed => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    error_response(status, e.to_string())
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /companions/:companion_id/call/start
/// Start a voice call with a companion
pub async fn start_call(
    State(state): State<AppState>,
    Path(companion_id): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let owner = caller(&headers).unwrap_or_else(CallOwner::new_guest);
    info!("Starting call with companion {} ({})", companion_id, owner);

    let controller = match state.controller_or_create(&owner, &companion_id).await {
        Ok(Some(controller)) => controller,
        Ok(None) => {
            return error_response(
                StatusCode::NOT_FOUND,
                format!("Companion {} not found", companion_id),
            )
        }
        Err(e) => {
            error!("Failed to load companion {}: {}", companion_id, e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
        }
    };

    match controller.start_call().await {
        Ok(Transition::Started { call_id }) => (
            StatusCode::OK,
            Json(StartCallResponse {
                companion_id,
                call_id,
                status: "active".to_string(),
                session_token: match owner {
                    CallOwner::Guest(token) => Some(token),
                    CallOwner::User(_) => None,
                },
            }),
        )
            .into_response(),
        Ok(Transition::Ignored(status)) => error_response(
            StatusCode::CONFLICT,
            format!("Call with companion {} is {}", companion_id, status),
        ),
        Err(e) => {
            error!("Failed to start call: {}", e);
            session_error_response(e)
        }
    }
}

/// POST /companions/:companion_id/call/mute
/// Toggle the microphone of the active call
pub async fn toggle_mute(
    State(state): State<AppState>,
    Path(companion_id): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let controller = match call_controller(&state, &headers, &companion_id).await {
        Ok(controller) => controller,
        Err(response) => return response,
    };

    match controller.toggle_mute().await {
        Ok(Some(muted)) => (StatusCode::OK, Json(MuteResponse { companion_id, muted })).into_response(),
        Ok(None) => error_response(
            StatusCode::CONFLICT,
            format!("Call with companion {} is not active", companion_id),
        ),
        Err(e) => session_error_response(e),
    }
}

/// POST /companions/:companion_id/call/end
/// End the active call, evaluate and save it
pub async fn end_call(
    State(state): State<AppState>,
    Path(companion_id): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    info!("Ending call with companion {}", companion_id);

    let controller = match call_controller(&state, &headers, &companion_id).await {
        Ok(controller) => controller,
        Err(response) => return response,
    };

    match controller.end_call().await {
        Ok(EndOutcome::Ended {
            call_id,
            evaluation,
            record,
        }) => (
            StatusCode::OK,
            Json(EndCallResponse {
                companion_id,
                call_id,
                status: "finished".to_string(),
                evaluation,
                record,
            }),
        )
            .into_response(),
        Ok(EndOutcome::Ignored(status)) => error_response(
            StatusCode::CONFLICT,
            format!("Call with companion {} is {}", companion_id, status),
        ),
        Err(e) => {
            error!("Failed to save session: {}", e);
            session_error_response(e)
        }
    }
}

/// GET /companions/:companion_id/call/status
/// Get state of the call with a companion
pub async fn call_status(
    State(state): State<AppState>,
    Path(companion_id): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    match call_controller(&state, &headers, &companion_id).await {
        Ok(controller) => (StatusCode::OK, Json(controller.snapshot())).into_response(),
        Err(response) => response,
    }
}

/// GET /companions/:companion_id/call/transcript
/// Get transcript of the current (or just-ended) call
pub async fn call_transcript(
    State(state): State<AppState>,
    Path(companion_id): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    match call_controller(&state, &headers, &companion_id).await {
        Ok(controller) => {
            let transcript: Vec<ConversationMessage> = controller.transcript();
            (StatusCode::OK, Json(transcript)).into_response()
        }
        Err(response) => response,
    }
}

/// GET /companions?limit=N
/// Companion catalog with the user's latest session per companion
pub async fn list_companions(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let user = user_id(&headers);
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);

    let companions = match state.catalog.list_companions(limit).await {
        Ok(companions) => companions,
        Err(e) => {
            error!("Failed to list companions: {}", e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
        }
    };

    let summaries = enrich(state.sessions.as_ref(), companions, user.as_deref()).await;
    (StatusCode::OK, Json(summaries)).into_response()
}

/// GET /sessions/recent?limit=N
/// Companions from the user's most recent sessions
pub async fn list_recent_sessions(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let user = user_id(&headers);
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);

    match recent_sessions(
        state.sessions.as_ref(),
        state.catalog.as_ref(),
        user.as_deref(),
        limit,
    )
    .await
    {
        Ok(summaries) => (StatusCode::OK, Json(summaries)).into_response(),
        Err(e) => {
            error!("Failed to load recent sessions: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
