use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    auth::{
        repo::UserStore,
        repo_types::{NewUser, ProfileUpdate, User},
    },
    error::{AppError, AppResult},
    issues::{
        repo::IssueStore,
        repo_types::{Comment, Issue, IssueCounts, IssueFilter, IssueStatus, IssueUpdate, ProgressUpdate},
    },
};

/// Process-local store for tests and `DATA_BACKEND=memory`.
/// Each mutation holds the write lock for the whole read-modify-write.
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<Uuid, User>>,
    issues: RwLock<HashMap<Uuid, Issue>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn create(&self, new: NewUser, now: OffsetDateTime) -> AppResult<User> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == new.email) {
            return Err(AppError::Conflict("Email already registered".into()));
        }
        let user = User {
            id: Uuid::new_v4(),
            email: new.email,
            name: new.name,
            role: new.role,
            phone: new.phone,
            address: new.address,
            password_hash: new.password_hash,
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_profile(
        &self,
        id: Uuid,
        update: &ProfileUpdate,
        now: OffsetDateTime,
    ) -> AppResult<Option<User>> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = &update.name {
            user.name = name.clone();
        }
        if let Some(phone) = &update.phone {
            user.phone = Some(phone.clone());
        }
        if let Some(address) = &update.address {
            user.address = Some(address.clone());
        }
        user.updated_at = now;
        Ok(Some(user.clone()))
    }

    async fn list(&self) -> AppResult<Vec<User>> {
        let mut users: Vec<User> = self.users.read().await.values().cloned().collect();
        users.sort_by_key(|u| u.created_at);
        Ok(users)
    }
}

#[async_trait]
impl IssueStore for MemoryStore {
    async fn insert(&self, issue: &Issue) -> AppResult<()> {
        self.issues.write().await.insert(issue.id, issue.clone());
        Ok(())
    }

    async fn find(&self, id: Uuid) -> AppResult<Option<Issue>> {
        Ok(self.issues.read().await.get(&id).cloned())
    }

    async fn list(&self, filter: &IssueFilter) -> AppResult<Vec<Issue>> {
        let issues = self.issues.read().await;
        let mut out: Vec<Issue> = issues.values().filter(|i| filter.matches(i)).cloned().collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn update(
        &self,
        id: Uuid,
        update: &IssueUpdate,
        now: OffsetDateTime,
    ) -> AppResult<Option<Issue>> {
        let mut issues = self.issues.write().await;
        Ok(issues.get_mut(&id).map(|issue| {
            update.apply(issue, now);
            issue.clone()
        }))
    }

    async fn push_comment(&self, id: Uuid, comment: &Comment) -> AppResult<bool> {
        let mut issues = self.issues.write().await;
        let Some(issue) = issues.get_mut(&id) else {
            return Ok(false);
        };
        issue.comments.push(comment.clone());
        issue.updated_at = comment.created_at;
        Ok(true)
    }

    async fn push_progress(&self, id: Uuid, progress: &ProgressUpdate) -> AppResult<Option<Issue>> {
        let mut issues = self.issues.write().await;
        let Some(issue) = issues.get_mut(&id) else {
            return Ok(None);
        };
        issue.progress.push(progress.clone());
        issue.status = progress.status;
        issue.updated_at = progress.created_at;
        if progress.status == IssueStatus::Completed {
            issue.resolved_at = Some(progress.created_at);
        }
        Ok(Some(issue.clone()))
    }

    async fn assign(&self, id: Uuid, assignee: Uuid, now: OffsetDateTime) -> AppResult<bool> {
        let mut issues = self.issues.write().await;
        let Some(issue) = issues.get_mut(&id) else {
            return Ok(false);
        };
        issue.assigned_to = Some(assignee);
        issue.updated_at = now;
        Ok(true)
    }

    async fn counts(&self, reporter: Option<Uuid>) -> AppResult<IssueCounts> {
        let issues = self.issues.read().await;
        Ok(IssueCounts::tally(
            issues
                .values()
                .filter(|i| reporter.map_or(true, |r| i.reported_by == r)),
        ))
    }
}
