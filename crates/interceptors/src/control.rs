//! Session control endpoints
//!
//! A test harness marks the start and end of each test execution here.
//! Mount the router next to the service's own routes:
//!
//! ```ignore
//! let app = Router::new()
//!     .merge(interceptors::session_routes(instrumentation.registry().clone()));
//! ```

use std::sync::Arc;

use application::{SessionRegistry, SessionSnapshot};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::put,
};
use domain::SessionId;
use serde::Serialize;
use thiserror::Error;
use tower_http::trace::TraceLayer;

/// Session control router
///
/// - `PUT /filibuster/sessions/{id}`: start (201 when new, 200 when already live)
/// - `GET /filibuster/sessions/{id}`: snapshot
/// - `DELETE /filibuster/sessions/{id}`: end and return the final snapshot
pub fn session_routes(registry: Arc<SessionRegistry>) -> Router {
    Router::new()
        .route(
            "/filibuster/sessions/{id}",
            put(start_session).get(get_session).delete(end_session),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(registry)
}

/// Session control error
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("Invalid session id: {0}")]
    InvalidSessionId(String),

    #[error("Session not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            Self::InvalidSessionId(_) => (StatusCode::BAD_REQUEST, "invalid_session_id"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        };
        let body = ErrorResponse {
            error: self.to_string(),
            code,
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionStarted {
    session_id: SessionId,
    created: bool,
}

fn parse_id(id: String) -> Result<SessionId, ControlError> {
    SessionId::parse(id.clone()).map_err(|_| ControlError::InvalidSessionId(id))
}

async fn start_session(
    State(registry): State<Arc<SessionRegistry>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<SessionStarted>), ControlError> {
    let id = parse_id(id)?;
    let (session, created) = registry.start(id);
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((
        status,
        Json(SessionStarted {
            session_id: session.id().clone(),
            created,
        }),
    ))
}

async fn get_session(
    State(registry): State<Arc<SessionRegistry>>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>, ControlError> {
    let id = parse_id(id)?;
    registry
        .snapshot(&id)
        .map(Json)
        .ok_or_else(|| ControlError::NotFound(id.to_string()))
}

async fn end_session(
    State(registry): State<Arc<SessionRegistry>>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>, ControlError> {
    let id = parse_id(id)?;
    registry
        .end(&id)
        .map(Json)
        .ok_or_else(|| ControlError::NotFound(id.to_string()))
}
