use std::sync::Arc;

use anyhow::Context;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::{
    auth::repo::{PgUserStore, UserStore},
    config::{AppConfig, DataBackend},
    db,
    issues::repo::{IssueStore, PgIssueStore},
    memory::MemoryStore,
    notify::{Dispatcher, LogMailer, Mailer, SendGridMailer},
    storage::{S3Storage, StorageClient},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    /// `None` when running on the in-memory backend.
    pub db: Option<PgPool>,
    pub users: Arc<dyn UserStore>,
    pub issues: Arc<dyn IssueStore>,
    pub storage: Arc<dyn StorageClient>,
    pub notifier: Dispatcher,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let (db, users, issues): (Option<PgPool>, Arc<dyn UserStore>, Arc<dyn IssueStore>) =
            match config.data_backend {
                DataBackend::Postgres => {
                    let url = config
                        .database_url
                        .as_deref()
                        .context("DATABASE_URL is required when DATA_BACKEND=postgres")?;
                    let pool = db::connect(url).await?;
                    db::migrate(&pool).await?;
                    (
                        Some(pool.clone()),
                        Arc::new(PgUserStore::new(pool.clone())),
                        Arc::new(PgIssueStore::new(pool)),
                    )
                }
                DataBackend::Memory => {
                    warn!("using in-memory data backend; nothing will be persisted");
                    let store = Arc::new(MemoryStore::new());
                    (None, store.clone(), store)
                }
            };

        let s3 = S3Storage::new(&config.storage).await?;
        s3.ensure_bucket().await?;
        let storage = Arc::new(s3) as Arc<dyn StorageClient>;

        let mailer: Arc<dyn Mailer> = match &config.mail.sendgrid_api_key {
            Some(key) => Arc::new(SendGridMailer::new(key.clone(), &config.mail)?),
            None => {
                warn!("SENDGRID_API_KEY not set; notifications will only be logged");
                Arc::new(LogMailer)
            }
        };
        let notifier = Dispatcher::new(mailer, &config.mail.app_base_url);

        Ok(Self {
            config,
            db,
            users,
            issues,
            storage,
            notifier,
        })
    }

    pub async fn close(&self) {
        if let Some(pool) = &self.db {
            pool.close().await;
            info!("database pool closed");
        }
    }
}
