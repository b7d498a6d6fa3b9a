use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::info;

use super::{Mailer, OutgoingEmail};
use crate::config::MailConfig;

const SENDGRID_API_URL: &str = "https://api.sendgrid.com/v3/mail/send";

#[derive(Serialize)]
struct SendGridAddress<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Serialize)]
struct SendGridPersonalization<'a> {
    to: Vec<SendGridAddress<'a>>,
}

#[derive(Serialize)]
struct SendGridContent<'a> {
    #[serde(rename = "type")]
    content_type: &'static str,
    value: &'a str,
}

#[derive(Serialize)]
struct SendGridRequest<'a> {
    personalizations: Vec<SendGridPersonalization<'a>>,
    from: SendGridAddress<'a>,
    subject: &'a str,
    content: Vec<SendGridContent<'a>>,
}

/// Sends through the SendGrid v3 HTTP API.
pub struct SendGridMailer {
    client: Client,
    api_key: String,
    from_email: String,
    from_name: String,
}

impl SendGridMailer {
    pub fn new(api_key: String, cfg: &MailConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("build mail http client")?;
        Ok(Self {
            client,
            api_key,
            from_email: cfg.from_email.clone(),
            from_name: cfg.from_name.clone(),
        })
    }

    fn request<'a>(&'a self, email: &'a OutgoingEmail) -> SendGridRequest<'a> {
        SendGridRequest {
            personalizations: vec![SendGridPersonalization {
                to: vec![SendGridAddress { email: &email.to, name: None }],
            }],
            from: SendGridAddress {
                email: &self.from_email,
                name: Some(self.from_name.as_str()),
            },
            subject: &email.subject,
            // text/plain must precede text/html
            content: vec![
                SendGridContent { content_type: "text/plain", value: &email.text },
                SendGridContent { content_type: "text/html", value: &email.html },
            ],
        }
    }
}

#[async_trait]
impl Mailer for SendGridMailer {
    async fn send(&self, email: &OutgoingEmail) -> anyhow::Result<()> {
        let res = self
            .client
            .post(SENDGRID_API_URL)
            .bearer_auth(&self.api_key)
            .json(&self.request(email))
            .send()
            .await
            .context("sendgrid request")?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            anyhow::bail!("sendgrid returned {status}: {body}");
        }
        Ok(())
    }
}

/// Used when no mail provider is configured: records the mail in the log only.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &OutgoingEmail) -> anyhow::Result<()> {
        info!(to = %email.to, subject = %email.subject, "mail provider disabled; not sending");
        Ok(())
    }
}
