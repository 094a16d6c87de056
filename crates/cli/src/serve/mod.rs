//! `goldi serve` -- HTTP JSON API over the generation pipeline.
//!
//! Endpoints:
//! - GET   /health                            - Server status
//! - POST  /problems/validate                 - Validate a problem statement
//! - POST  /workflows/personas                - Regenerate personas
//! - POST  /workflows/pain-points             - Regenerate one persona's pain points
//! - POST  /workflows/solutions               - Regenerate one persona's solutions
//! - POST  /workflows/user-stories            - Generate stories and data flows
//! - POST  /workflows/architecture            - Generate the architecture sketch
//! - POST  /locks                             - Lock or unlock a row
//! - PUT   /projects/{id}/selected-solutions  - Replace the solution selection
//! - PATCH /user-stories/{id}                 - Edit a story
//! - GET   /projects/{id}/events              - State events in sequence order
//! - GET   /projects/{id}/executions          - Execution log
//!
//! Errors answer `{"error": {"message", "code"}}`.

mod handlers;
mod middleware;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::DefaultBodyLimit;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post, put};
use axum::{middleware as axum_middleware, Json, Router};
use goldi_pipeline::{LlmClient, WorkflowError, WorkflowRunner};
use goldi_storage::InMemoryStorage;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error, info};

use crate::config::GoldiConfig;

use self::handlers::{
    handle_architecture, handle_edit_user_story, handle_events, handle_executions, handle_health,
    handle_lock, handle_not_found, handle_pain_points, handle_personas, handle_select_solutions,
    handle_solutions, handle_user_stories, handle_validate_problem,
};
use self::middleware::{rate_limit_middleware, trace_middleware};
use self::state::{AppState, RateLimiter};

/// Maximum request body size: 1 MB.
const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Rate limit window duration in seconds (1 minute).
const RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// Construct a JSON error response.
fn json_error(status: StatusCode, code: &str, message: &str) -> impl IntoResponse {
    (
        status,
        Json(serde_json::json!({ "error": { "message": message, "code": code } })),
    )
}

/// Everything a handler can fail with.
#[derive(Debug)]
pub(crate) enum ApiError {
    Workflow(WorkflowError),
    Body(JsonRejection),
}

impl From<WorkflowError> for ApiError {
    fn from(e: WorkflowError) -> Self {
        ApiError::Workflow(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError::Body(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Workflow(e) => {
                let status =
                    StatusCode::from_u16(e.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                if status.is_server_error() {
                    error!(code = e.code(), error = %e, "request failed");
                } else {
                    debug!(code = e.code(), error = %e, "request rejected");
                }
                json_error(status, e.code(), &e.to_string()).into_response()
            }
            ApiError::Body(rejection) => {
                let status = if rejection.status().is_client_error() {
                    StatusCode::BAD_REQUEST
                } else {
                    rejection.status()
                };
                json_error(status, "INVALID_BODY", &rejection.body_text()).into_response()
            }
        }
    }
}

fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/problems/validate", post(handle_validate_problem))
        .route("/workflows/personas", post(handle_personas))
        .route("/workflows/pain-points", post(handle_pain_points))
        .route("/workflows/solutions", post(handle_solutions))
        .route("/workflows/user-stories", post(handle_user_stories))
        .route("/workflows/architecture", post(handle_architecture))
        .route("/locks", post(handle_lock))
        .route("/projects/{id}/selected-solutions", put(handle_select_solutions))
        .route("/user-stories/{id}", patch(handle_edit_user_story))
        .route("/projects/{id}/events", get(handle_events))
        .route("/projects/{id}/executions", get(handle_executions))
        .fallback(handle_not_found)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(axum_middleware::from_fn(trace_middleware))
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

fn app_state(config: &GoldiConfig, client: Arc<dyn LlmClient>) -> Arc<AppState> {
    let storage = Arc::new(InMemoryStorage::new());
    Arc::new(AppState {
        runner: WorkflowRunner::new(storage, client, config.pipeline_config()),
        rate_limiter: RateLimiter::new(config.server.rate_limit),
    })
}

/// Serve until Ctrl+C.
pub(crate) async fn start_server(
    config: GoldiConfig,
    client: Arc<dyn LlmClient>,
) -> Result<(), Box<dyn std::error::Error>> {
    let state = app_state(&config, client);
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        %addr,
        rate_limit = config.server.rate_limit,
        model = %config.llm.model,
        "goldi listening"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        // Without a signal handler the server runs until killed.
        error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use goldi_pipeline::{CompletionRequest, LlmError, Stage};
    use serde_json::{json, Value};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    /// Answers every problem validation as valid and nothing else.
    struct StubLlm;

    #[async_trait]
    impl LlmClient for StubLlm {
        async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
            match request.stage {
                Stage::ProblemValidation => Ok(json!({
                    "isValid": true,
                    "feedback": "Specific enough",
                    "refinedProblem": "Clinics double-book patients"
                })
                .to_string()),
                other => Err(LlmError::Network(format!("no reply scripted for {other}"))),
            }
        }
    }

    async fn spawn_app(rate_limit: u64) -> SocketAddr {
        let config = GoldiConfig {
            server: crate::config::ServerConfig {
                port: 0,
                rate_limit,
            },
            ..GoldiConfig::default()
        };
        let app = router(app_state(&config, Arc::new(StubLlm)));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });
        addr
    }

    async fn send(addr: SocketAddr, method: &str, path: &str, body: Option<&str>) -> (u16, Value) {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let body = body.unwrap_or("");
        let request = format!(
            "{method} {path} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\n\
             Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut raw = String::new();
        stream.read_to_string(&mut raw).await.unwrap();

        let status: u16 = raw
            .split_whitespace()
            .nth(1)
            .and_then(|s| s.parse().ok())
            .unwrap();
        let body = raw.split_once("\r\n\r\n").map(|(_, b)| b).unwrap_or("");
        (status, serde_json::from_str(body).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn health_reports_version() {
        let addr = spawn_app(60).await;
        let (status, body) = send(addr, "GET", "/health", None).await;
        assert_eq!(status, 200);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn unknown_route_uses_error_envelope() {
        let addr = spawn_app(60).await;
        let (status, body) = send(addr, "GET", "/nope", None).await;
        assert_eq!(status, 404);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn problem_validation_then_events() {
        let addr = spawn_app(60).await;
        let (status, body) = send(
            addr,
            "POST",
            "/problems/validate",
            Some(r#"{"projectId":"p-http","problemInput":"clinics keep double booking"}"#),
        )
        .await;
        assert_eq!(status, 200, "{body}");
        assert_eq!(body["project"]["id"], "p-http");
        assert_eq!(body["project"]["status"], "problem_validated");
        assert_eq!(
            body["coreProblem"]["validated_problem"],
            "Clinics double-book patients"
        );

        let (status, body) = send(addr, "GET", "/projects/p-http/events", None).await;
        assert_eq!(status, 200);
        assert_eq!(body["events"].as_array().unwrap().len(), 1);
        assert_eq!(body["events"][0]["sequence_number"], 1);

        let (status, body) = send(addr, "GET", "/projects/p-http/executions", None).await;
        assert_eq!(status, 200);
        assert_eq!(body["executions"][0]["status"], "success");
    }

    #[tokio::test]
    async fn missing_project_is_unprocessable() {
        let addr = spawn_app(60).await;
        let (status, body) = send(
            addr,
            "POST",
            "/workflows/personas",
            Some(r#"{"projectId":"ghost"}"#),
        )
        .await;
        assert_eq!(status, 422);
        assert_eq!(body["error"]["code"], "PROJECT_NOT_FOUND");
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let addr = spawn_app(60).await;
        let (status, body) = send(addr, "POST", "/workflows/solutions", Some("{not json")).await;
        assert_eq!(status, 400);
        assert_eq!(body["error"]["code"], "INVALID_BODY");

        let (status, _) = send(addr, "POST", "/locks", Some(r#"{"entity":"story"}"#)).await;
        assert_eq!(status, 400);
    }

    #[tokio::test]
    async fn locking_a_missing_row_is_reported() {
        let addr = spawn_app(60).await;
        let (status, body) = send(
            addr,
            "POST",
            "/locks",
            Some(r#"{"entity":"persona","id":"per-x","locked":true}"#),
        )
        .await;
        assert_eq!(status, 400);
        assert_eq!(body["error"]["code"], "RECORD_NOT_FOUND");
    }

    #[tokio::test]
    async fn generation_failure_is_bad_gateway() {
        let addr = spawn_app(60).await;
        send(
            addr,
            "POST",
            "/problems/validate",
            Some(r#"{"projectId":"p-gw","problemInput":"clinics keep double booking"}"#),
        )
        .await;
        let (status, body) = send(
            addr,
            "POST",
            "/workflows/personas",
            Some(r#"{"projectId":"p-gw"}"#),
        )
        .await;
        assert_eq!(status, 502);
        assert_eq!(body["error"]["code"], "GENERATION_FAILED");
    }

    #[tokio::test]
    async fn rate_limit_applies_per_client() {
        let addr = spawn_app(2).await;
        assert_eq!(send(addr, "GET", "/health", None).await.0, 200);
        assert_eq!(send(addr, "GET", "/health", None).await.0, 200);
        let (status, body) = send(addr, "GET", "/health", None).await;
        assert_eq!(status, 429);
        assert_eq!(body["error"]["code"], "RATE_LIMITED");
    }
}
