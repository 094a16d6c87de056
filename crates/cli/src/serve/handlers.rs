//! Route handlers: health, workflows, curation, history.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use goldi_pipeline::curation::{self, LockTarget, UserStoryPatch};
use goldi_pipeline::workflow::{
    ArchitectureOutcome, PainPointsOutcome, PainPointsRequest, PersonasOutcome, PersonasRequest,
    ProblemOutcome, ProjectRequest, SolutionsOutcome, SolutionsRequest, UserStoriesOutcome,
    ValidateProblemRequest,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::state::AppState;
use super::{json_error, ApiError};

type Body<T> = Result<Json<T>, JsonRejection>;

pub(crate) async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "NOT_FOUND", "not found")
}

/// GET /health
pub(crate) async fn handle_health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// POST /problems/validate
pub(crate) async fn handle_validate_problem(
    State(state): State<Arc<AppState>>,
    body: Body<ValidateProblemRequest>,
) -> Result<Json<ProblemOutcome>, ApiError> {
    let Json(request) = body?;
    Ok(Json(state.runner.validate_problem(request).await?))
}

/// POST /workflows/personas
pub(crate) async fn handle_personas(
    State(state): State<Arc<AppState>>,
    body: Body<PersonasRequest>,
) -> Result<Json<PersonasOutcome>, ApiError> {
    let Json(request) = body?;
    Ok(Json(state.runner.generate_personas(request).await?))
}

/// POST /workflows/pain-points
pub(crate) async fn handle_pain_points(
    State(state): State<Arc<AppState>>,
    body: Body<PainPointsRequest>,
) -> Result<Json<PainPointsOutcome>, ApiError> {
    let Json(request) = body?;
    Ok(Json(state.runner.generate_pain_points(request).await?))
}

/// POST /workflows/solutions
pub(crate) async fn handle_solutions(
    State(state): State<Arc<AppState>>,
    body: Body<SolutionsRequest>,
) -> Result<Json<SolutionsOutcome>, ApiError> {
    let Json(request) = body?;
    Ok(Json(state.runner.generate_solutions(request).await?))
}

/// POST /workflows/user-stories
pub(crate) async fn handle_user_stories(
    State(state): State<Arc<AppState>>,
    body: Body<ProjectRequest>,
) -> Result<Json<UserStoriesOutcome>, ApiError> {
    let Json(request) = body?;
    Ok(Json(state.runner.generate_user_stories(request).await?))
}

/// POST /workflows/architecture
pub(crate) async fn handle_architecture(
    State(state): State<Arc<AppState>>,
    body: Body<ProjectRequest>,
) -> Result<Json<ArchitectureOutcome>, ApiError> {
    let Json(request) = body?;
    Ok(Json(state.runner.generate_architecture(request).await?))
}

#[derive(Debug, Deserialize)]
pub(crate) struct LockRequest {
    entity: LockTarget,
    id: String,
    locked: bool,
}

/// POST /locks
pub(crate) async fn handle_lock(
    State(state): State<Arc<AppState>>,
    body: Body<LockRequest>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = body?;
    let storage = state.runner.storage();
    curation::set_locked(storage.as_ref(), request.entity, &request.id, request.locked).await?;
    Ok(Json(json!({ "id": request.id, "locked": request.locked })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SelectionRequest {
    solution_ids: Vec<String>,
}

/// PUT /projects/{id}/selected-solutions
pub(crate) async fn handle_select_solutions(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    body: Body<SelectionRequest>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = body?;
    let storage = state.runner.storage();
    let solutions =
        curation::select_solutions(storage.as_ref(), &project_id, &request.solution_ids).await?;
    Ok(Json(json!({ "solutions": solutions })))
}

/// PATCH /user-stories/{id}
pub(crate) async fn handle_edit_user_story(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Body<UserStoryPatch>,
) -> Result<Json<Value>, ApiError> {
    let Json(patch) = body?;
    let story = curation::edit_user_story(state.runner.storage().as_ref(), &id, patch).await?;
    Ok(Json(json!({ "userStory": story })))
}

/// GET /projects/{id}/events
pub(crate) async fn handle_events(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let events = curation::list_events(state.runner.storage().as_ref(), &project_id).await?;
    Ok(Json(json!({ "events": events })))
}

/// GET /projects/{id}/executions
pub(crate) async fn handle_executions(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let executions =
        curation::list_executions(state.runner.storage().as_ref(), &project_id).await?;
    Ok(Json(json!({ "executions": executions })))
}
