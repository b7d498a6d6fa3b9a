use async_trait::async_trait;
use sqlx::{types::Json, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{
    Comment, Issue, IssueCategory, IssueCounts, IssueFilter, IssuePriority, IssueRow, IssueStatus,
    IssueUpdate, ProgressUpdate,
};
use crate::error::AppResult;

const ISSUE_COLUMNS: &str = "id, title, description, category, priority, status, \
     location_address, location_lat, location_lng, images, reported_by, assigned_to, \
     created_at, updated_at, resolved_at, comments, progress";

/// Persistence seam for issues. Every mutating call is a single-row write.
#[async_trait]
pub trait IssueStore: Send + Sync {
    async fn insert(&self, issue: &Issue) -> AppResult<()>;
    async fn find(&self, id: Uuid) -> AppResult<Option<Issue>>;
    /// Matching issues, newest first.
    async fn list(&self, filter: &IssueFilter) -> AppResult<Vec<Issue>>;
    async fn update(
        &self,
        id: Uuid,
        update: &IssueUpdate,
        now: OffsetDateTime,
    ) -> AppResult<Option<Issue>>;
    /// Appends and bumps `updated_at`; `false` when the issue is gone.
    async fn push_comment(&self, id: Uuid, comment: &Comment) -> AppResult<bool>;
    /// Appends and moves `status` in the same write; stamps `resolved_at`
    /// when the target is `completed`.
    async fn push_progress(&self, id: Uuid, progress: &ProgressUpdate) -> AppResult<Option<Issue>>;
    async fn assign(&self, id: Uuid, assignee: Uuid, now: OffsetDateTime) -> AppResult<bool>;
    /// Grouped counts, optionally restricted to one reporter.
    async fn counts(&self, reporter: Option<Uuid>) -> AppResult<IssueCounts>;
}

#[derive(Clone)]
pub struct PgIssueStore {
    db: PgPool,
}

impl PgIssueStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

/// Escapes LIKE metacharacters so user input matches literally.
pub(crate) fn like_pattern(search: &str) -> String {
    let mut escaped = String::with_capacity(search.len() + 2);
    escaped.push('%');
    for ch in search.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

#[async_trait]
impl IssueStore for PgIssueStore {
    async fn insert(&self, issue: &Issue) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO issues (id, title, description, category, priority, status,
                                location_address, location_lat, location_lng, images,
                                reported_by, assigned_to, created_at, updated_at, resolved_at,
                                comments, progress)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(issue.id)
        .bind(&issue.title)
        .bind(&issue.description)
        .bind(issue.category)
        .bind(issue.priority)
        .bind(issue.status)
        .bind(&issue.location.address)
        .bind(issue.location.coordinates.lat)
        .bind(issue.location.coordinates.lng)
        .bind(&issue.images)
        .bind(issue.reported_by)
        .bind(issue.assigned_to)
        .bind(issue.created_at)
        .bind(issue.updated_at)
        .bind(issue.resolved_at)
        .bind(Json(&issue.comments))
        .bind(Json(&issue.progress))
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn find(&self, id: Uuid) -> AppResult<Option<Issue>> {
        let sql = format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE id = $1");
        let row = sqlx::query_as::<_, IssueRow>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.map(Issue::from))
    }

    async fn list(&self, filter: &IssueFilter) -> AppResult<Vec<Issue>> {
        let sql = format!(
            r#"
            SELECT {ISSUE_COLUMNS}
              FROM issues
             WHERE ($1::uuid IS NULL OR reported_by = $1)
               AND ($2::text IS NULL
                    OR title ILIKE $2 ESCAPE '\'
                    OR description ILIKE $2 ESCAPE '\')
               AND ($3::issue_status IS NULL OR status = $3)
               AND ($4::issue_category IS NULL OR category = $4)
               AND ($5::timestamptz IS NULL OR created_at >= $5)
             ORDER BY created_at DESC
            "#
        );
        let rows = sqlx::query_as::<_, IssueRow>(&sql)
            .bind(filter.reporter)
            .bind(filter.search.as_deref().map(like_pattern))
            .bind(filter.status)
            .bind(filter.category)
            .bind(filter.created_since)
            .fetch_all(&self.db)
            .await?;
        Ok(rows.into_iter().map(Issue::from).collect())
    }

    async fn update(
        &self,
        id: Uuid,
        update: &IssueUpdate,
        now: OffsetDateTime,
    ) -> AppResult<Option<Issue>> {
        let sql = format!(
            r#"
            UPDATE issues
               SET title = COALESCE($2, title),
                   description = COALESCE($3, description),
                   category = COALESCE($4, category),
                   priority = COALESCE($5, priority),
                   status = COALESCE($6, status),
                   assigned_to = COALESCE($7, assigned_to),
                   updated_at = $8
             WHERE id = $1
            RETURNING {ISSUE_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, IssueRow>(&sql)
            .bind(id)
            .bind(&update.title)
            .bind(&update.description)
            .bind(update.category)
            .bind(update.priority)
            .bind(update.status)
            .bind(update.assigned_to)
            .bind(now)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.map(Issue::from))
    }

    async fn push_comment(&self, id: Uuid, comment: &Comment) -> AppResult<bool> {
        let res = sqlx::query(
            r#"
            UPDATE issues
               SET comments = comments || jsonb_build_array($2::jsonb),
                   updated_at = $3
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(Json(comment))
        .bind(comment.created_at)
        .execute(&self.db)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn push_progress(&self, id: Uuid, progress: &ProgressUpdate) -> AppResult<Option<Issue>> {
        let sql = format!(
            r#"
            UPDATE issues
               SET progress = progress || jsonb_build_array($2::jsonb),
                   status = $3,
                   updated_at = $4,
                   resolved_at = CASE WHEN $3 = 'completed'::issue_status THEN $4 ELSE resolved_at END
             WHERE id = $1
            RETURNING {ISSUE_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, IssueRow>(&sql)
            .bind(id)
            .bind(Json(progress))
            .bind(progress.status)
            .bind(progress.created_at)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.map(Issue::from))
    }

    async fn assign(&self, id: Uuid, assignee: Uuid, now: OffsetDateTime) -> AppResult<bool> {
        let res = sqlx::query("UPDATE issues SET assigned_to = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(assignee)
            .bind(now)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn counts(&self, reporter: Option<Uuid>) -> AppResult<IssueCounts> {
        let by_status = sqlx::query_as::<_, (IssueStatus, i64)>(
            r#"
            SELECT status, COUNT(*) FROM issues
             WHERE ($1::uuid IS NULL OR reported_by = $1)
             GROUP BY status
            "#,
        )
        .bind(reporter)
        .fetch_all(&self.db)
        .await?;

        let by_category = sqlx::query_as::<_, (IssueCategory, i64)>(
            r#"
            SELECT category, COUNT(*) FROM issues
             WHERE ($1::uuid IS NULL OR reported_by = $1)
             GROUP BY category
            "#,
        )
        .bind(reporter)
        .fetch_all(&self.db)
        .await?;

        let by_priority = sqlx::query_as::<_, (IssuePriority, i64)>(
            r#"
            SELECT priority, COUNT(*) FROM issues
             WHERE ($1::uuid IS NULL OR reported_by = $1)
             GROUP BY priority
            "#,
        )
        .bind(reporter)
        .fetch_all(&self.db)
        .await?;

        let (total, responded) = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE jsonb_array_length(comments) > 0
                                       OR jsonb_array_length(progress) > 0)
              FROM issues
             WHERE ($1::uuid IS NULL OR reported_by = $1)
            "#,
        )
        .bind(reporter)
        .fetch_one(&self.db)
        .await?;

        Ok(IssueCounts {
            total,
            by_status: by_status.into_iter().collect(),
            by_category: by_category.into_iter().collect(),
            by_priority: by_priority.into_iter().collect(),
            responded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::like_pattern;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("pothole"), "%pothole%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }
}
