//! Best-effort transactional email.
//!
//! Notifications are rendered and handed to a [`Mailer`] on a detached task;
//! the triggering request never waits for, or fails because of, delivery.

mod mailer;
mod templates;

use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{auth::repo_types::Role, issues::repo_types::IssueStatus};

pub use mailer::{LogMailer, SendGridMailer};

#[derive(Debug, Clone)]
pub enum Notification {
    Welcome {
        name: String,
        role: Role,
    },
    Login {
        name: String,
        at: OffsetDateTime,
    },
    IssueUpdate {
        name: String,
        issue_id: Uuid,
        issue_title: String,
        status: IssueStatus,
        message: String,
    },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::Welcome { .. } => "welcome",
            Notification::Login { .. } => "login",
            Notification::IssueUpdate { .. } => "issue_update",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct Dispatcher {
    mailer: Arc<dyn Mailer>,
    base_url: Arc<str>,
}

impl Dispatcher {
    pub fn new(mailer: Arc<dyn Mailer>, base_url: &str) -> Self {
        Self {
            mailer,
            base_url: Arc::from(base_url.trim_end_matches('/')),
        }
    }

    /// Fire-and-forget. The handle is only useful to tests.
    pub fn notify(&self, recipient: &str, notification: Notification) -> JoinHandle<()> {
        let email = templates::render(recipient, &notification, &self.base_url);
        let mailer = self.mailer.clone();
        let kind = notification.kind();
        tokio::spawn(async move {
            match mailer.send(&email).await {
                Ok(()) => info!(kind, to = %email.to, "notification sent"),
                Err(e) => warn!(kind, to = %email.to, error = %e, "notification failed"),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FailingMailer, RecordingMailer};

    #[tokio::test]
    async fn failures_are_absorbed() {
        let dispatcher = Dispatcher::new(Arc::new(FailingMailer), "http://app");
        let handle = dispatcher.notify(
            "a@x.com",
            Notification::Welcome { name: "A".into(), role: Role::Citizen },
        );
        // the task completes normally even though the mailer errored
        handle.await.expect("task should not panic");
    }

    #[tokio::test]
    async fn delivers_rendered_mail() {
        let mailer = Arc::new(RecordingMailer::default());
        let dispatcher = Dispatcher::new(mailer.clone(), "http://app/");
        dispatcher
            .notify(
                "a@x.com",
                Notification::IssueUpdate {
                    name: "A".into(),
                    issue_id: Uuid::nil(),
                    issue_title: "Lamp out".into(),
                    status: IssueStatus::Completed,
                    message: "Replaced bulb".into(),
                },
            )
            .await
            .unwrap();
        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "a@x.com");
        assert!(sent[0].text.contains("http://app/issue/00000000-0000-0000-0000-000000000000"));
    }
}
