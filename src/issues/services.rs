use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    dto::{IssueQuery, NewIssueInput},
    repo_types::{
        Comment, Issue, IssueCategory, IssueFilter, IssueStatus, IssueUpdate, ProgressUpdate, TimeWindow,
    },
};
use crate::{
    auth::repo_types::User,
    error::{AppError, AppResult},
    notify::Notification,
    state::AppState,
};

fn not_found() -> AppError {
    AppError::NotFound("Issue not found".into())
}

fn require_text(field: &str, value: &str) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

/// Citizens may only touch issues they reported; admins touch everything.
pub fn ensure_can_access(caller: &User, issue: &Issue) -> AppResult<()> {
    if caller.is_admin() || issue.reported_by == caller.id {
        Ok(())
    } else {
        warn!(user_id = %caller.id, issue_id = %issue.id, "issue access refused");
        Err(AppError::Forbidden("Not enough permissions".into()))
    }
}

fn non_empty(raw: &Option<String>) -> Option<&str> {
    raw.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Turns query-string filters into a store filter, applying the citizen scope.
pub fn build_filter(caller: &User, query: &IssueQuery, now: OffsetDateTime) -> AppResult<IssueFilter> {
    let status = non_empty(&query.status)
        .map(str::parse::<IssueStatus>)
        .transpose()
        .map_err(AppError::Validation)?;
    let category = non_empty(&query.category)
        .map(str::parse::<IssueCategory>)
        .transpose()
        .map_err(AppError::Validation)?;
    let window = non_empty(&query.time)
        .map(str::parse::<TimeWindow>)
        .transpose()
        .map_err(AppError::Validation)?;

    Ok(IssueFilter {
        reporter: (!caller.is_admin()).then_some(caller.id),
        search: non_empty(&query.search).map(str::to_string),
        status,
        category,
        created_since: window.map(|w| w.since(now)),
    })
}

pub async fn create_issue(state: &AppState, reporter: &User, input: NewIssueInput) -> AppResult<Issue> {
    let title = require_text("title", &input.title)?;
    let description = require_text("description", &input.description)?;
    input.location.validate().map_err(AppError::Validation)?;

    let now = OffsetDateTime::now_utc();
    let issue = Issue {
        id: Uuid::new_v4(),
        title,
        description,
        category: input.category,
        priority: input.priority,
        status: IssueStatus::Pending,
        location: input.location,
        images: input.images,
        reported_by: reporter.id,
        assigned_to: None,
        created_at: now,
        updated_at: now,
        resolved_at: None,
        comments: Vec::new(),
        progress: Vec::new(),
    };
    state.issues.insert(&issue).await?;
    info!(issue_id = %issue.id, reporter = %reporter.id, category = %issue.category, "issue created");
    Ok(issue)
}

pub async fn list_issues(state: &AppState, caller: &User, query: &IssueQuery) -> AppResult<Vec<Issue>> {
    let filter = build_filter(caller, query, OffsetDateTime::now_utc())?;
    state.issues.list(&filter).await
}

pub async fn get_issue(state: &AppState, caller: &User, id: Uuid) -> AppResult<Issue> {
    let issue = state.issues.find(id).await?.ok_or_else(not_found)?;
    ensure_can_access(caller, &issue)?;
    Ok(issue)
}

pub async fn update_issue(
    state: &AppState,
    caller: &User,
    id: Uuid,
    update: IssueUpdate,
) -> AppResult<Issue> {
    get_issue(state, caller, id).await?;

    let update = IssueUpdate {
        title: update.title.map(|t| require_text("title", &t)).transpose()?,
        description: update
            .description
            .map(|d| require_text("description", &d))
            .transpose()?,
        ..update
    };
    let issue = state
        .issues
        .update(id, &update, OffsetDateTime::now_utc())
        .await?
        .ok_or_else(not_found)?;
    info!(issue_id = %id, user_id = %caller.id, "issue updated");
    Ok(issue)
}

pub async fn add_comment(
    state: &AppState,
    caller: &User,
    id: Uuid,
    text: &str,
    is_internal: bool,
) -> AppResult<Comment> {
    let text = require_text("text", text)?;
    get_issue(state, caller, id).await?;

    let comment = Comment {
        id: Uuid::new_v4(),
        text,
        author: caller.id,
        author_name: caller.name.clone(),
        created_at: OffsetDateTime::now_utc(),
        is_internal,
    };
    if !state.issues.push_comment(id, &comment).await? {
        return Err(not_found());
    }
    info!(issue_id = %id, user_id = %caller.id, internal = is_internal, "comment added");
    Ok(comment)
}

/// Appends a progress entry; this is what moves an issue through its lifecycle.
pub async fn add_progress(
    state: &AppState,
    caller: &User,
    id: Uuid,
    status: IssueStatus,
    description: &str,
) -> AppResult<ProgressUpdate> {
    let description = require_text("description", description)?;
    get_issue(state, caller, id).await?;

    let progress = ProgressUpdate {
        id: Uuid::new_v4(),
        status,
        description,
        updated_by: caller.id,
        updated_by_name: caller.name.clone(),
        created_at: OffsetDateTime::now_utc(),
    };
    let issue = state
        .issues
        .push_progress(id, &progress)
        .await?
        .ok_or_else(not_found)?;
    info!(issue_id = %id, user_id = %caller.id, status = %status, "progress recorded");

    notify_reporter(state, &issue, &progress);
    Ok(progress)
}

/// Reporter lookup and delivery both run off the request path.
fn notify_reporter(state: &AppState, issue: &Issue, progress: &ProgressUpdate) {
    let state = state.clone();
    let issue_id = issue.id;
    let reporter_id = issue.reported_by;
    let issue_title = issue.title.clone();
    let status = progress.status;
    let message = progress.description.clone();
    tokio::spawn(async move {
        let reporter = match state.users.find_by_id(reporter_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                warn!(issue_id = %issue_id, "reporter missing; skipping issue update mail");
                return;
            }
            Err(e) => {
                warn!(issue_id = %issue_id, error = %e, "reporter lookup failed; skipping issue update mail");
                return;
            }
        };
        state.notifier.notify(
            &reporter.email,
            Notification::IssueUpdate {
                name: reporter.name,
                issue_id,
                issue_title,
                status,
                message,
            },
        );
    });
}

/// Assignee existence is checked before the write, not enforced by it.
pub async fn assign_issue(state: &AppState, id: Uuid, assignee_id: Uuid) -> AppResult<()> {
    if state.users.find_by_id(assignee_id).await?.is_none() {
        return Err(AppError::NotFound("Assignee not found".into()));
    }
    if !state
        .issues
        .assign(id, assignee_id, OffsetDateTime::now_utc())
        .await?
    {
        return Err(not_found());
    }
    info!(issue_id = %id, assignee = %assignee_id, "issue assigned");
    Ok(())
}
