use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post, put},
    Json, Router,
};
use tracing::instrument;

use super::{
    dto::{AuthResponse, LoginRequest, PublicUser, RegisterRequest},
    extractors::CurrentUser,
    repo_types::ProfileUpdate,
    services,
};
use crate::{
    error::AppResult,
    state::AppState,
    stats::{self, UserStats},
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/me", get(get_me))
        .route("/auth/profile", put(update_profile))
        .route("/auth/stats", get(my_stats))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> AppResult<Json<AuthResponse>> {
    let Json(payload) = payload?;
    let (token, user) = services::register(&state, payload).await?;
    Ok(Json(AuthResponse::bearer(token, user)))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<Json<AuthResponse>> {
    let Json(payload) = payload?;
    let (token, user) = services::login(&state, payload).await?;
    Ok(Json(AuthResponse::bearer(token, user)))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn get_me(CurrentUser(user): CurrentUser) -> Json<PublicUser> {
    Json(user.into())
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn update_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    payload: Result<Json<ProfileUpdate>, JsonRejection>,
) -> AppResult<Json<PublicUser>> {
    let Json(update) = payload?;
    let user = services::update_profile(&state, user.id, update).await?;
    Ok(Json(user.into()))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn my_stats(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<UserStats>> {
    Ok(Json(stats::compute_stats(&state, &user).await?))
}
