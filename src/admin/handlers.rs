use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    routing::{get, put},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::{dto::UserSummary, extractors::AdminUser},
    error::AppResult,
    issues::{
        dto::{AssignQuery, IssueQuery},
        repo_types::Issue,
        services,
    },
    state::AppState,
    stats::{self, AdminStats},
};

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/issues", get(list_issues))
        .route("/admin/issues/:id", get(get_issue))
        .route("/admin/issues/:id/assign", put(assign_issue))
        .route("/admin/stats", get(admin_stats))
        .route("/admin/users", get(list_users))
}

#[instrument(skip_all, fields(admin_id = %admin.id))]
pub async fn list_issues(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    query: Result<Query<IssueQuery>, QueryRejection>,
) -> AppResult<Json<Vec<Issue>>> {
    let Query(query) = query?;
    Ok(Json(services::list_issues(&state, &admin, &query).await?))
}

#[instrument(skip_all, fields(admin_id = %admin.id))]
pub async fn get_issue(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<Issue>> {
    let Path(id) = id?;
    Ok(Json(services::get_issue(&state, &admin, id).await?))
}

#[instrument(skip_all, fields(admin_id = %admin.id))]
pub async fn assign_issue(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    id: Result<Path<Uuid>, PathRejection>,
    query: Result<Query<AssignQuery>, QueryRejection>,
) -> AppResult<Json<Value>> {
    let Path(id) = id?;
    let Query(AssignQuery { assignee_id }) = query?;
    services::assign_issue(&state, id, assignee_id).await?;
    Ok(Json(json!({ "message": "Issue assigned successfully" })))
}

#[instrument(skip_all, fields(admin_id = %admin.id))]
pub async fn admin_stats(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
) -> AppResult<Json<AdminStats>> {
    Ok(Json(stats::global_stats(&state).await?))
}

#[instrument(skip_all, fields(admin_id = %admin.id))]
pub async fn list_users(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
) -> AppResult<Json<Vec<UserSummary>>> {
    let users = state.users.list().await?;
    Ok(Json(users.into_iter().map(UserSummary::from).collect()))
}
