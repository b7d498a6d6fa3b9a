use serde::Deserialize;
use uuid::Uuid;

use super::repo_types::{IssueCategory, IssuePriority, IssueStatus, Location};

/// Query string of the issue listings. Values are parsed in the service so
/// bad enum values surface as validation errors.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IssueQuery {
    pub search: Option<String>,
    pub status: Option<String>,
    pub category: Option<String>,
    pub time: Option<String>,
}

/// Validated multipart form of `POST /issues`, with images already stored.
#[derive(Debug, Clone)]
pub struct NewIssueInput {
    pub title: String,
    pub description: String,
    pub category: IssueCategory,
    pub priority: IssuePriority,
    pub location: Location,
    pub images: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub text: String,
    #[serde(default)]
    pub is_internal: bool,
}

#[derive(Debug, Deserialize)]
pub struct ProgressRequest {
    pub status: IssueStatus,
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct AssignQuery {
    pub assignee_id: Uuid,
}
