use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};
use time::{Duration, OffsetDateTime, Time};
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "issue_category", rename_all = "snake_case")]
pub enum IssueCategory {
    Pothole,
    Garbage,
    Streetlight,
    Water,
    Electricity,
    Road,
    Sewage,
    Other,
}

impl IssueCategory {
    pub const ALL: &'static [IssueCategory] = &[
        IssueCategory::Pothole,
        IssueCategory::Garbage,
        IssueCategory::Streetlight,
        IssueCategory::Water,
        IssueCategory::Electricity,
        IssueCategory::Road,
        IssueCategory::Sewage,
        IssueCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IssueCategory::Pothole => "pothole",
            IssueCategory::Garbage => "garbage",
            IssueCategory::Streetlight => "streetlight",
            IssueCategory::Water => "water",
            IssueCategory::Electricity => "electricity",
            IssueCategory::Road => "road",
            IssueCategory::Sewage => "sewage",
            IssueCategory::Other => "other",
        }
    }
}

impl fmt::Display for IssueCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Looks `raw` up among the wire names of `all`; the error lists what is accepted.
fn parse_variant<T: Copy>(
    all: &[T],
    name: fn(&T) -> &'static str,
    kind: &str,
    raw: &str,
) -> Result<T, String> {
    let raw = raw.trim();
    all.iter().copied().find(|v| name(v) == raw).ok_or_else(|| {
        let accepted: Vec<&str> = all.iter().map(name).collect();
        format!("invalid {kind} `{raw}`, expected one of: {}", accepted.join(", "))
    })
}

impl FromStr for IssueCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_variant(Self::ALL, Self::as_str, "category", s)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "issue_priority", rename_all = "snake_case")]
pub enum IssuePriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl IssuePriority {
    pub const ALL: &'static [IssuePriority] = &[
        IssuePriority::Low,
        IssuePriority::Medium,
        IssuePriority::High,
        IssuePriority::Urgent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IssuePriority::Low => "low",
            IssuePriority::Medium => "medium",
            IssuePriority::High => "high",
            IssuePriority::Urgent => "urgent",
        }
    }
}

impl fmt::Display for IssuePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IssuePriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_variant(Self::ALL, Self::as_str, "priority", s)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "issue_status", rename_all = "snake_case")]
pub enum IssueStatus {
    Pending,
    InProgress,
    Completed,
    Rejected,
}

impl IssueStatus {
    pub const ALL: &'static [IssueStatus] = &[
        IssueStatus::Pending,
        IssueStatus::InProgress,
        IssueStatus::Completed,
        IssueStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IssueStatus::Pending => "pending",
            IssueStatus::InProgress => "in_progress",
            IssueStatus::Completed => "completed",
            IssueStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IssueStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_variant(Self::ALL, Self::as_str, "status", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub address: String,
    pub coordinates: Coordinates,
}

impl Location {
    pub fn validate(&self) -> Result<(), String> {
        if self.address.trim().is_empty() {
            return Err("location address is required".into());
        }
        let Coordinates { lat, lng } = self.coordinates;
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(format!("latitude {lat} out of range"));
        }
        if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
            return Err(format!("longitude {lng} out of range"));
        }
        Ok(())
    }
}

/// Comment on an issue. `author_name` is a snapshot taken when written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub text: String,
    pub author: Uuid,
    pub author_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub is_internal: bool,
}

/// Audit entry recording a status change. `updated_by_name` is a write-time snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub id: Uuid,
    pub status: IssueStatus,
    pub description: String,
    pub updated_by: Uuid,
    pub updated_by_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: IssueCategory,
    pub priority: IssuePriority,
    pub status: IssueStatus,
    pub location: Location,
    pub images: Vec<String>,
    pub reported_by: Uuid,
    pub assigned_to: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub resolved_at: Option<OffsetDateTime>,
    pub comments: Vec<Comment>,
    pub progress: Vec<ProgressUpdate>,
}

impl Issue {
    pub fn has_response(&self) -> bool {
        !self.comments.is_empty() || !self.progress.is_empty()
    }
}

/// Flat row as stored in Postgres.
#[derive(Debug, FromRow)]
pub struct IssueRow {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: IssueCategory,
    pub priority: IssuePriority,
    pub status: IssueStatus,
    pub location_address: String,
    pub location_lat: f64,
    pub location_lng: f64,
    pub images: Vec<String>,
    pub reported_by: Uuid,
    pub assigned_to: Option<Uuid>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub resolved_at: Option<OffsetDateTime>,
    pub comments: Json<Vec<Comment>>,
    pub progress: Json<Vec<ProgressUpdate>>,
}

impl From<IssueRow> for Issue {
    fn from(r: IssueRow) -> Self {
        Self {
            id: r.id,
            title: r.title,
            description: r.description,
            category: r.category,
            priority: r.priority,
            status: r.status,
            location: Location {
                address: r.location_address,
                coordinates: Coordinates {
                    lat: r.location_lat,
                    lng: r.location_lng,
                },
            },
            images: r.images,
            reported_by: r.reported_by,
            assigned_to: r.assigned_to,
            created_at: r.created_at,
            updated_at: r.updated_at,
            resolved_at: r.resolved_at,
            comments: r.comments.0,
            progress: r.progress.0,
        }
    }
}

/// Partial edit; `None` means "leave unchanged".
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IssueUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<IssueCategory>,
    pub priority: Option<IssuePriority>,
    pub status: Option<IssueStatus>,
    pub assigned_to: Option<Uuid>,
}

impl IssueUpdate {
    pub fn apply(&self, issue: &mut Issue, now: OffsetDateTime) {
        if let Some(title) = &self.title {
            issue.title = title.clone();
        }
        if let Some(description) = &self.description {
            issue.description = description.clone();
        }
        if let Some(category) = self.category {
            issue.category = category;
        }
        if let Some(priority) = self.priority {
            issue.priority = priority;
        }
        if let Some(status) = self.status {
            issue.status = status;
        }
        if let Some(assignee) = self.assigned_to {
            issue.assigned_to = Some(assignee);
        }
        issue.updated_at = now;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeWindow {
    Today,
    Week,
    Month,
}

impl TimeWindow {
    /// Lower bound on `created_at` for this window.
    pub fn since(&self, now: OffsetDateTime) -> OffsetDateTime {
        match self {
            TimeWindow::Today => now.replace_time(Time::MIDNIGHT),
            TimeWindow::Week => now - Duration::days(7),
            TimeWindow::Month => now - Duration::days(30),
        }
    }
}

impl FromStr for TimeWindow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "today" => Ok(TimeWindow::Today),
            "week" => Ok(TimeWindow::Week),
            "month" => Ok(TimeWindow::Month),
            other => Err(format!("invalid time window `{other}`")),
        }
    }
}

/// Store-level query. `reporter` is the hard citizen scope.
#[derive(Debug, Clone, Default)]
pub struct IssueFilter {
    pub reporter: Option<Uuid>,
    pub search: Option<String>,
    pub status: Option<IssueStatus>,
    pub category: Option<IssueCategory>,
    pub created_since: Option<OffsetDateTime>,
}

impl IssueFilter {
    pub fn matches(&self, issue: &Issue) -> bool {
        if self.reporter.is_some_and(|r| r != issue.reported_by) {
            return false;
        }
        if let Some(needle) = &self.search {
            let needle = needle.to_lowercase();
            if !issue.title.to_lowercase().contains(&needle)
                && !issue.description.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        if self.status.is_some_and(|s| s != issue.status) {
            return false;
        }
        if self.category.is_some_and(|c| c != issue.category) {
            return false;
        }
        if self.created_since.is_some_and(|t| issue.created_at < t) {
            return false;
        }
        true
    }
}

/// Raw grouped counts; stats are derived from these.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IssueCounts {
    pub total: i64,
    pub by_status: BTreeMap<IssueStatus, i64>,
    pub by_category: BTreeMap<IssueCategory, i64>,
    pub by_priority: BTreeMap<IssuePriority, i64>,
    /// Issues with at least one comment or progress entry.
    pub responded: i64,
}

impl IssueCounts {
    pub fn status(&self, status: IssueStatus) -> i64 {
        self.by_status.get(&status).copied().unwrap_or(0)
    }

    pub fn tally<'a>(issues: impl IntoIterator<Item = &'a Issue>) -> Self {
        let mut counts = IssueCounts::default();
        for issue in issues {
            counts.total += 1;
            *counts.by_status.entry(issue.status).or_default() += 1;
            *counts.by_category.entry(issue.category).or_default() += 1;
            *counts.by_priority.entry(issue.priority).or_default() += 1;
            if issue.has_response() {
                counts.responded += 1;
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn enums_parse_and_print_wire_names() {
        assert_eq!("in_progress".parse::<IssueStatus>(), Ok(IssueStatus::InProgress));
        assert_eq!(IssueStatus::InProgress.to_string(), "in_progress");
        assert_eq!("streetlight".parse::<IssueCategory>(), Ok(IssueCategory::Streetlight));
        assert!("sinkhole".parse::<IssueCategory>().is_err());
        assert!("critical".parse::<IssuePriority>().is_err());
        assert_eq!(
            serde_json::to_string(&IssueStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
        assert_eq!(IssueCategory::ALL.len(), 8);
        assert_eq!(IssueStatus::ALL.len(), 4);
        assert_eq!(
            "critical".parse::<IssuePriority>().unwrap_err(),
            "invalid priority `critical`, expected one of: low, medium, high, urgent"
        );
        assert_eq!(" road ".parse::<IssueCategory>(), Ok(IssueCategory::Road));
    }

    #[test]
    fn location_bounds_are_checked() {
        let mut loc = Location {
            address: "1 Main St".into(),
            coordinates: Coordinates { lat: 12.9, lng: 77.6 },
        };
        assert!(loc.validate().is_ok());
        loc.coordinates.lat = 91.0;
        assert!(loc.validate().is_err());
        loc.coordinates.lat = 0.0;
        loc.coordinates.lng = -181.0;
        assert!(loc.validate().is_err());
        loc.coordinates.lng = 0.0;
        loc.address = "   ".into();
        assert!(loc.validate().is_err());
    }

    #[test]
    fn time_windows() {
        let now = datetime!(2024-05-10 15:30:00 UTC);
        assert_eq!(TimeWindow::Today.since(now), datetime!(2024-05-10 00:00:00 UTC));
        assert_eq!(TimeWindow::Week.since(now), datetime!(2024-05-03 15:30:00 UTC));
        assert_eq!(TimeWindow::Month.since(now), datetime!(2024-04-10 15:30:00 UTC));
        assert!("year".parse::<TimeWindow>().is_err());
    }
}
