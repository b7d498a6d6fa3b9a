use std::collections::BTreeMap;

use serde::Serialize;
use tracing::instrument;

use crate::{
    auth::repo_types::User,
    error::AppResult,
    issues::repo_types::{IssueCategory, IssueCounts, IssuePriority, IssueStatus},
    state::AppState,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdminStats {
    pub total: i64,
    pub pending: i64,
    pub in_progress: i64,
    pub completed: i64,
    pub rejected: i64,
    pub category_stats: BTreeMap<IssueCategory, i64>,
    pub priority_stats: BTreeMap<IssuePriority, i64>,
    /// Percentage of issues with any comment or progress entry.
    pub response_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CitizenStats {
    pub total: i64,
    pub pending: i64,
    pub in_progress: i64,
    pub completed: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum UserStats {
    Admin(AdminStats),
    Citizen(CitizenStats),
}

pub fn response_rate(responded: i64, total: i64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let pct = responded as f64 / total as f64 * 100.0;
    (pct * 100.0).round() / 100.0
}

pub fn admin_stats(counts: &IssueCounts) -> AdminStats {
    AdminStats {
        total: counts.total,
        pending: counts.status(IssueStatus::Pending),
        in_progress: counts.status(IssueStatus::InProgress),
        completed: counts.status(IssueStatus::Completed),
        rejected: counts.status(IssueStatus::Rejected),
        category_stats: counts.by_category.clone(),
        priority_stats: counts.by_priority.clone(),
        response_rate: response_rate(counts.responded, counts.total),
    }
}

pub fn citizen_stats(counts: &IssueCounts) -> CitizenStats {
    CitizenStats {
        total: counts.total,
        pending: counts.status(IssueStatus::Pending),
        in_progress: counts.status(IssueStatus::InProgress),
        completed: counts.status(IssueStatus::Completed),
    }
}

pub async fn global_stats(st: &AppState) -> AppResult<AdminStats> {
    let counts = st.issues.counts(None).await?;
    Ok(admin_stats(&counts))
}

/// Admins get the global view, citizens only their own issues.
#[instrument(skip(st, user), fields(user_id = %user.id))]
pub async fn compute_stats(st: &AppState, user: &User) -> AppResult<UserStats> {
    if user.is_admin() {
        return Ok(UserStats::Admin(global_stats(st).await?));
    }
    let counts = st.issues.counts(Some(user.id)).await?;
    Ok(UserStats::Citizen(citizen_stats(&counts)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::repo_types::Role,
        issues::repo_types::{Comment, Coordinates, Issue, Location},
        test_support::{fake_state, seed_user},
    };
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn issue(reporter: Uuid, status: IssueStatus, category: IssueCategory) -> Issue {
        let now = OffsetDateTime::now_utc();
        Issue {
            id: Uuid::new_v4(),
            title: "t".into(),
            description: "d".into(),
            category,
            priority: IssuePriority::Medium,
            status,
            location: Location {
                address: "a".into(),
                coordinates: Coordinates { lat: 0.0, lng: 0.0 },
            },
            images: vec![],
            reported_by: reporter,
            assigned_to: None,
            created_at: now,
            updated_at: now,
            resolved_at: None,
            comments: vec![],
            progress: vec![],
        }
    }

    #[test]
    fn response_rate_rounds_and_handles_empty() {
        assert_eq!(response_rate(0, 0), 0.0);
        assert_eq!(response_rate(1, 3), 33.33);
        assert_eq!(response_rate(2, 3), 66.67);
        assert_eq!(response_rate(4, 4), 100.0);
    }

    #[tokio::test]
    async fn four_issue_breakdown() {
        let st = fake_state();
        let citizen = seed_user(&st, "c@x.com", Role::Citizen).await;
        let admin = seed_user(&st, "admin@x.com", Role::Admin).await;

        let mut answered = issue(citizen.id, IssueStatus::Pending, IssueCategory::Pothole);
        answered.comments.push(Comment {
            id: Uuid::new_v4(),
            text: "seen".into(),
            author: admin.id,
            author_name: admin.name.clone(),
            created_at: OffsetDateTime::now_utc(),
            is_internal: false,
        });
        for i in [
            answered,
            issue(citizen.id, IssueStatus::Pending, IssueCategory::Pothole),
            issue(citizen.id, IssueStatus::InProgress, IssueCategory::Water),
            issue(citizen.id, IssueStatus::Completed, IssueCategory::Road),
        ] {
            st.issues.insert(&i).await.unwrap();
        }

        let UserStats::Citizen(mine) = compute_stats(&st, &citizen).await.unwrap() else {
            panic!("citizen should get the scoped view");
        };
        assert_eq!(
            mine,
            CitizenStats { total: 4, pending: 2, in_progress: 1, completed: 1 }
        );

        let UserStats::Admin(all) = compute_stats(&st, &admin).await.unwrap() else {
            panic!("admin should get the global view");
        };
        assert_eq!(all.total, 4);
        assert_eq!(all.rejected, 0);
        assert_eq!(all.category_stats.get(&IssueCategory::Pothole), Some(&2));
        assert!(!all.category_stats.contains_key(&IssueCategory::Sewage));
        assert_eq!(all.response_rate, 25.0);
    }

    #[tokio::test]
    async fn citizen_view_excludes_other_reporters() {
        let st = fake_state();
        let me = seed_user(&st, "me@x.com", Role::Citizen).await;
        let other = seed_user(&st, "other@x.com", Role::Citizen).await;
        st.issues
            .insert(&issue(other.id, IssueStatus::Pending, IssueCategory::Garbage))
            .await
            .unwrap();

        let stats = compute_stats(&st, &me).await.unwrap();
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["total"], 0);
        assert!(json.get("response_rate").is_none());
    }
}
