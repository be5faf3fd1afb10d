//! Route handlers

use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive},
        IntoResponse, Response, Sse,
    },
    Json,
};
use futures::{Stream, StreamExt};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::time::Duration;
use tracing::{debug, error};

use crate::error::Error;
use crate::gateway::protocol::{
    Ack, ErrorResponse, HealthResponse, InputRequest, ModulesCheckRequest, RunRequest, SessionsResponse,
    StopRequest, StopResponse,
};
use crate::runner::{ExecutionMode, ExecutionResult, ModuleStatus, RunnerService, StreamEvent};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub service: RunnerService,
    pub keepalive: Duration,
}

/// Error returned from a handler
pub struct AppError(pub Error);

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::NoActiveProcess(_) | Error::StdinClosed(_) => StatusCode::NOT_FOUND,
            e if e.is_client_error() => StatusCode::BAD_REQUEST,
            e => {
                error!("Request failed: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = ErrorResponse {
            success: false,
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// POST /run
pub async fn run(
    State(state): State<AppState>,
    Json(request): Json<RunRequest>,
) -> Result<Json<ExecutionResult>, AppError> {
    let result = state
        .service
        .run_once(request.into_execution(ExecutionMode::OneShot))
        .await?;
    Ok(Json(result))
}

/// POST /run/stream
pub async fn run_stream(
    State(state): State<AppState>,
    Json(request): Json<RunRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let events = state
        .service
        .run_interactive(request.into_execution(ExecutionMode::Interactive))
        .await?;
    debug!("Streaming session {}", events.session_id());

    let stream = events.map(|event| Ok::<_, Infallible>(to_sse(&event)));
    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(state.keepalive)))
}

fn to_sse(event: &StreamEvent) -> Event {
    Event::default()
        .event(event.kind())
        .json_data(event)
        .unwrap_or_else(|e| Event::default().event("error").data(e.to_string()))
}

/// POST /input
pub async fn input(
    State(state): State<AppState>,
    Json(request): Json<InputRequest>,
) -> Result<Json<Ack>, AppError> {
    state
        .service
        .deliver_input(&request.session_id, &request.input_text)
        .await?;
    Ok(Json(Ack { success: true }))
}

/// POST /stop
pub async fn stop(State(state): State<AppState>, Json(request): Json<StopRequest>) -> Json<StopResponse> {
    let stopped = state.service.stop(&request.session_id).await;
    Json(StopResponse {
        success: true,
        stopped,
    })
}

/// POST /modules/check
pub async fn check_modules(
    State(state): State<AppState>,
    Json(request): Json<ModulesCheckRequest>,
) -> Json<BTreeMap<String, ModuleStatus>> {
    Json(state.service.check_modules(&request.module_names).await)
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let report = state.service.health().await;
    Json(HealthResponse {
        status: if report.interpreter_available { "ok" } else { "degraded" },
        version: crate::VERSION,
        report,
    })
}

/// GET /sessions
pub async fn sessions(State(state): State<AppState>) -> Json<SessionsResponse> {
    let sessions = state.service.sessions().await;
    Json(SessionsResponse {
        count: sessions.len(),
        sessions,
    })
}
