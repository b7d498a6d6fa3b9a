use axum::{
    extract::{Path, State},
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use tracing::instrument;

use super::services::{is_servable_key, presign};
use crate::{
    error::{AppError, AppResult},
    state::AppState,
};

pub fn upload_routes() -> Router<AppState> {
    Router::new().route("/uploads/*key", get(get_upload))
}

/// Temporary redirect to a short-lived presigned URL of the stored image.
#[instrument(skip(state))]
pub async fn get_upload(State(state): State<AppState>, Path(key): Path<String>) -> AppResult<Response> {
    if !is_servable_key(&key) {
        return Err(AppError::NotFound("Image not found".into()));
    }
    let url = presign(&state, &key).await?;
    Ok(Redirect::temporary(&url).into_response())
}
