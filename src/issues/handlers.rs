use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::{JsonRejection, PathRejection, QueryRejection},
        DefaultBodyLimit, Multipart, Path, Query, State,
    },
    http::{header::LOCATION, HeaderMap, HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use tracing::{instrument, warn};
use uuid::Uuid;

use super::{
    dto::{CommentRequest, IssueQuery, NewIssueInput, ProgressRequest},
    repo_types::{Comment, Issue, IssueUpdate, Location, ProgressUpdate},
    services,
};
use crate::{
    auth::extractors::CurrentUser,
    error::{AppError, AppResult},
    images::services::{discard_uploads, upload_images, UploadItem},
    state::AppState,
};

const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

pub fn issue_routes() -> Router<AppState> {
    Router::new()
        .route("/issues", get(list_issues).post(create_issue))
        .route("/issues/:id", get(get_issue).put(update_issue))
        .route("/issues/:id/comments", post(add_comment))
        .route("/issues/:id/progress", post(add_progress))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

/// Text fields of the create form, collected before validation.
#[derive(Default)]
struct IssueForm {
    title: Option<String>,
    description: Option<String>,
    category: Option<String>,
    priority: Option<String>,
    location: Option<String>,
    files: Vec<UploadItem>,
}

impl IssueForm {
    async fn read(mut mp: Multipart) -> AppResult<Self> {
        let mut form = IssueForm::default();
        while let Some(field) = mp.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "images" | "images[]" => {
                    let content_type = field
                        .content_type()
                        .map(str::to_string)
                        .unwrap_or_else(|| "application/octet-stream".into());
                    let has_name = field.file_name().is_some_and(|f| !f.is_empty());
                    let body = field.bytes().await?;
                    if has_name && !body.is_empty() {
                        form.files.push(UploadItem { body, content_type });
                    }
                }
                "title" => form.title = Some(field.text().await?),
                "description" => form.description = Some(field.text().await?),
                "category" => form.category = Some(field.text().await?),
                "priority" => form.priority = Some(field.text().await?),
                "location" => form.location = Some(field.text().await?),
                other => warn!(field = other, "ignoring unknown form field"),
            }
        }
        Ok(form)
    }
}

fn required(value: Option<String>, field: &str) -> AppResult<String> {
    value.ok_or_else(|| AppError::validation(format!("{field} is required")))
}

/// Everything except the images, which are stored only after this passes.
fn validate_form(form: &mut IssueForm) -> AppResult<NewIssueInput> {
    let location_raw = required(form.location.take(), "location")?;
    let location: Location = serde_json::from_str(&location_raw)
        .map_err(|e| AppError::validation(format!("malformed location: {e}")))?;
    location.validate().map_err(AppError::Validation)?;

    Ok(NewIssueInput {
        title: required(form.title.take(), "title")?,
        description: required(form.description.take(), "description")?,
        category: required(form.category.take(), "category")?
            .parse()
            .map_err(AppError::Validation)?,
        priority: required(form.priority.take(), "priority")?
            .parse()
            .map_err(AppError::Validation)?,
        location,
        images: Vec::new(),
    })
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn create_issue(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    mp: Result<Multipart, MultipartRejection>,
) -> AppResult<(StatusCode, HeaderMap, Json<Issue>)> {
    let mut form = IssueForm::read(mp?).await?;
    let mut input = validate_form(&mut form)?;

    let keys = upload_images(&state, user.id, std::mem::take(&mut form.files)).await?;
    input.images = keys.iter().map(|k| crate::images::services::public_url(k)).collect();

    let issue = match services::create_issue(&state, &user, input).await {
        Ok(issue) => issue,
        Err(e) => {
            discard_uploads(&state, &keys).await;
            return Err(e);
        }
    };

    let mut headers = HeaderMap::new();
    if let Ok(location) = HeaderValue::from_str(&format!("/issues/{}", issue.id)) {
        headers.insert(LOCATION, location);
    }
    Ok((StatusCode::CREATED, headers, Json(issue)))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn list_issues(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    query: Result<Query<IssueQuery>, QueryRejection>,
) -> AppResult<Json<Vec<Issue>>> {
    let Query(query) = query?;
    Ok(Json(services::list_issues(&state, &user, &query).await?))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn get_issue(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<Issue>> {
    let Path(id) = id?;
    Ok(Json(services::get_issue(&state, &user, id).await?))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn update_issue(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<IssueUpdate>, JsonRejection>,
) -> AppResult<Json<Issue>> {
    let Path(id) = id?;
    let Json(update) = payload?;
    Ok(Json(services::update_issue(&state, &user, id, update).await?))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn add_comment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<CommentRequest>, JsonRejection>,
) -> AppResult<Json<Comment>> {
    let Path(id) = id?;
    let Json(req) = payload?;
    let comment = services::add_comment(&state, &user, id, &req.text, req.is_internal).await?;
    Ok(Json(comment))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn add_progress(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<ProgressRequest>, JsonRejection>,
) -> AppResult<Json<ProgressUpdate>> {
    let Path(id) = id?;
    let Json(req) = payload?;
    let progress = services::add_progress(&state, &user, id, req.status, &req.description).await?;
    Ok(Json(progress))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(location: &str, category: &str) -> IssueForm {
        IssueForm {
            title: Some("Pothole".into()),
            description: Some("Big one".into()),
            category: Some(category.into()),
            priority: Some("high".into()),
            location: Some(location.into()),
            files: Vec::new(),
        }
    }

    const GOOD_LOCATION: &str = r#"{"address":"MG Road","coordinates":{"lat":12.9,"lng":77.6}}"#;

    #[test]
    fn validate_form_accepts_well_formed_input() {
        let input = validate_form(&mut form(GOOD_LOCATION, "pothole")).unwrap();
        assert_eq!(input.location.address, "MG Road");
        assert_eq!(input.category.as_str(), "pothole");
    }

    #[test]
    fn validate_form_rejects_bad_enum_and_location() {
        assert!(matches!(
            validate_form(&mut form(GOOD_LOCATION, "volcano")),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            validate_form(&mut form("{not json", "pothole")),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            validate_form(&mut form(r#"{"address":"x"}"#, "pothole")),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn validate_form_requires_fields() {
        let mut f = form(GOOD_LOCATION, "pothole");
        f.title = None;
        let err = validate_form(&mut f).err().unwrap();
        assert_eq!(err.to_string(), "title is required");
    }
}
