use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::board::{self, Actor};
use crate::error::{EngineError, ErrorCode};
use crate::schedule::{GenerationOutcome, generate_for_template};
use crate::timezone::{local_today, resolve_user_timezone};
use crate::tree::{Rollup, TreeItem, TreeNode, assemble_forest};
use crate::types::{Board, Client, ClientTask, ClientTaskStatus, MonthRef, Task};

/// Header carrying the authenticated owner's id (set by the fronting auth layer).
const USER_HEADER: &str = "x-user-id";

/// Engine error rendered as a JSON error body.
#[derive(Debug)]
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        ApiError(e)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError(EngineError::Storage(e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.code() {
            ErrorCode::ValidationError | ErrorCode::TimezoneResolutionError => {
                StatusCode::BAD_REQUEST
            }
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Conflict | ErrorCode::InvalidTransition => StatusCode::CONFLICT,
            ErrorCode::ExternalDependencyError | ErrorCode::StorageError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        }
        (status, Json(self.0.to_body())).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn owner(headers: &HeaderMap) -> Result<Actor, ApiError> {
    let user_id = headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| EngineError::forbidden("missing x-user-id header"))?;
    Ok(Actor::Owner {
        user_id: user_id.to_string(),
    })
}

/// Require the request to come from `user_id`.
fn require_owner(headers: &HeaderMap, user_id: &str) -> Result<(), ApiError> {
    match owner(headers)? {
        Actor::Owner { user_id: caller } if caller == user_id => Ok(()),
        _ => Err(EngineError::forbidden("resource belongs to another user").into()),
    }
}

/// Load a client and require the request to come from its owner.
fn owned_client(state: &AppState, headers: &HeaderMap, client_id: &str) -> Result<Client, ApiError> {
    owner(headers)?;
    let client = state
        .db()
        .get_client(client_id)?
        .ok_or_else(|| EngineError::not_found("client", client_id))?;
    require_owner(headers, &client.user_id)?;
    Ok(client)
}

#[derive(Serialize)]
pub(super) struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

pub(super) async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Debug, Deserialize)]
pub(super) struct RolloverParams {
    date: Option<NaiveDate>,
}

/// Roll over every user. Per-user failures are reported in the body, not the status.
pub(super) async fn run_rollover(
    State(state): State<AppState>,
    Query(params): Query<RolloverParams>,
) -> Result<Response, ApiError> {
    let summary = state.engine().run_all(Utc::now(), params.date).await?;
    Ok(Json(summary).into_response())
}

#[derive(Debug, Deserialize)]
pub(super) struct GenerateParams {
    month: Option<MonthRef>,
}

pub(super) async fn generate(
    State(state): State<AppState>,
    Path((client_id, template_id)): Path<(String, String)>,
    Query(params): Query<GenerateParams>,
    headers: HeaderMap,
) -> ApiResult<GenerationOutcome> {
    let client = owned_client(&state, &headers, &client_id)?;
    let month = match params.month {
        Some(month) => month,
        None => current_month(&state, &client)?,
    };
    let outcome = generate_for_template(state.store(), &client_id, &template_id, month)?;
    Ok(Json(outcome))
}

/// The month it currently is for the client's owner.
fn current_month(state: &AppState, client: &Client) -> Result<MonthRef, ApiError> {
    let user = state.db().get_user(&client.user_id)?;
    let tz = resolve_user_timezone(
        &client.user_id,
        user.as_ref().and_then(|u| u.timezone.as_deref()),
        state.engine().settings().default_timezone,
    );
    Ok(MonthRef::of(local_today(Utc::now(), tz)))
}

/// A tree node annotated with its rollup.
#[derive(Serialize)]
pub(super) struct TreeView<'a, T: Serialize> {
    #[serde(flatten)]
    item: &'a T,
    rollup: Rollup,
    completion_ratio: f64,
    subtasks: Vec<TreeView<'a, T>>,
}

fn tree_view<T: TreeItem + Serialize>(node: &TreeNode<T>) -> TreeView<'_, T> {
    TreeView {
        item: &node.item,
        rollup: node.rollup(),
        completion_ratio: node.completion_ratio(),
        subtasks: node.subtasks.iter().map(tree_view).collect(),
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct TreeParams {
    board: Option<Board>,
}

pub(super) async fn user_tree(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(params): Query<TreeParams>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    owner(&headers)?;
    if state.db().get_user(&user_id)?.is_none() {
        return Err(EngineError::not_found("user", &user_id).into());
    }
    require_owner(&headers, &user_id)?;
    let tasks = state.db().list_tasks(&user_id, params.board)?;
    let forest = assemble_forest(tasks);
    let view: Vec<TreeView<'_, Task>> = forest.iter().map(tree_view).collect();
    Ok(Json(view).into_response())
}

pub(super) async fn client_tree(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    owned_client(&state, &headers, &client_id)?;
    let tasks = state.db().list_client_tasks(&client_id)?;
    let forest = assemble_forest(tasks);
    let view: Vec<TreeView<'_, ClientTask>> = forest.iter().map(tree_view).collect();
    Ok(Json(view).into_response())
}

pub(super) async fn complete_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Task> {
    let actor = owner(&headers)?;
    let task = board::complete_task(state.store(), &actor, &task_id)?;
    Ok(Json(task))
}

#[derive(Debug, Deserialize)]
pub(super) struct MoveRequest {
    board: Board,
}

pub(super) async fn move_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<MoveRequest>,
) -> ApiResult<Task> {
    let actor = owner(&headers)?;
    let task = board::move_task_board(state.store(), &actor, &task_id, request.board)?;
    Ok(Json(task))
}

#[derive(Debug, Deserialize)]
pub(super) struct StatusRequest {
    status: ClientTaskStatus,
}

pub(super) async fn client_task_status(
    State(state): State<AppState>,
    Path(client_task_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<StatusRequest>,
) -> ApiResult<ClientTask> {
    let actor = owner(&headers)?;
    let task =
        board::transition_client_task(state.store(), &actor, &client_task_id, request.status)?;
    Ok(Json(task))
}

pub(super) async fn public_review(
    State(state): State<AppState>,
    Path((token, client_task_id)): Path<(String, String)>,
    Json(request): Json<StatusRequest>,
) -> ApiResult<ClientTask> {
    let task = board::review_via_link(state.store(), &token, &client_task_id, request.status)?;
    Ok(Json(task))
}
