//! Shared fixtures for unit and router tests.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use time::OffsetDateTime;

use crate::{
    auth::repo_types::{NewUser, Role, User},
    config::{AppConfig, DataBackend, JwtConfig, MailConfig, StorageConfig},
    memory::MemoryStore,
    notify::{Dispatcher, Mailer, OutgoingEmail},
    state::AppState,
    storage::StorageClient,
};

pub fn test_config() -> AppConfig {
    AppConfig {
        data_backend: DataBackend::Memory,
        database_url: None,
        jwt: JwtConfig {
            secret: "test-secret".into(),
            issuer: "civictrack-test".into(),
            audience: "civictrack-test-users".into(),
            ttl_minutes: 30,
        },
        storage: StorageConfig {
            endpoint: "http://fake".into(),
            bucket: "fake".into(),
            access_key: "fake".into(),
            secret_key: "fake".into(),
            region: "us-east-1".into(),
        },
        mail: MailConfig {
            sendgrid_api_key: None,
            from_email: "noreply@test.local".into(),
            from_name: "Test".into(),
            app_base_url: "http://app.test".into(),
        },
    }
}

fn build(mailer: Arc<dyn Mailer>, storage: Arc<dyn StorageClient>) -> AppState {
    let config = Arc::new(test_config());
    let store = Arc::new(MemoryStore::new());
    AppState {
        notifier: Dispatcher::new(mailer, &config.mail.app_base_url),
        config,
        db: None,
        users: store.clone(),
        issues: store,
        storage,
    }
}

pub fn fake_state() -> AppState {
    build(Arc::new(RecordingMailer::default()), Arc::new(FakeStorage::default()))
}

pub fn fake_state_with_mailer(mailer: Arc<dyn Mailer>) -> AppState {
    build(mailer, Arc::new(FakeStorage::default()))
}

pub fn fake_state_with_storage(storage: Arc<dyn StorageClient>) -> AppState {
    build(Arc::new(RecordingMailer::default()), storage)
}

/// Inserts a user straight into the store; no mail, no real password hash.
pub async fn seed_user(state: &AppState, email: &str, role: Role) -> User {
    let name = email.split('@').next().unwrap_or(email).to_string();
    state
        .users
        .create(
            NewUser {
                email: email.into(),
                name,
                role,
                phone: None,
                address: None,
                password_hash: "$argon2id$seeded".into(),
            },
            OffsetDateTime::now_utc(),
        )
        .await
        .expect("seed user")
}

#[derive(Default)]
pub struct FakeStorage {
    objects: Mutex<HashMap<String, Bytes>>,
}

impl FakeStorage {
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl StorageClient for FakeStorage {
    async fn put_object(&self, key: &str, body: Bytes, _content_type: &str) -> anyhow::Result<()> {
        self.objects.lock().unwrap().insert(key.to_string(), body);
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn presign_get(&self, key: &str, seconds: u64) -> anyhow::Result<String> {
        Ok(format!("https://fake.local/{key}?expires={seconds}"))
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().unwrap().clone()
    }

    /// Notifications are sent from detached tasks; poll until `n` arrive.
    pub async fn wait_for(&self, n: usize) -> Vec<OutgoingEmail> {
        for _ in 0..200 {
            let sent = self.sent();
            if sent.len() >= n {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {n} emails, got {}", self.sent().len());
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &OutgoingEmail) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

pub struct FailingMailer;

#[async_trait]
impl Mailer for FailingMailer {
    async fn send(&self, _email: &OutgoingEmail) -> anyhow::Result<()> {
        anyhow::bail!("smtp is down")
    }
}
