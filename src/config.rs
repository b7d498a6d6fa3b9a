use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    /// SendGrid key; mail is only logged when absent.
    pub sendgrid_api_key: Option<String>,
    pub from_email: String,
    pub from_name: String,
    /// Frontend origin used for links inside emails.
    pub app_base_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub data_backend: DataBackend,
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
    pub mail: MailConfig,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let data_backend = match env_or("DATA_BACKEND", "postgres").to_lowercase().as_str() {
            "postgres" => DataBackend::Postgres,
            "memory" => DataBackend::Memory,
            other => anyhow::bail!("unknown DATA_BACKEND `{other}`"),
        };
        let database_url = std::env::var("DATABASE_URL").ok();
        if data_backend == DataBackend::Postgres && database_url.is_none() {
            anyhow::bail!("DATABASE_URL is required when DATA_BACKEND=postgres");
        }

        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET is required")?,
            issuer: env_or("JWT_ISSUER", "civictrack"),
            audience: env_or("JWT_AUDIENCE", "civictrack-users"),
            ttl_minutes: std::env::var("JWT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(30),
        };

        let storage = StorageConfig {
            endpoint: env_or("MINIO_ENDPOINT", "http://localhost:9000"),
            bucket: env_or("MINIO_BUCKET", "civictrack"),
            access_key: env_or("MINIO_ACCESS_KEY", "minioadmin"),
            secret_key: env_or("MINIO_SECRET_KEY", "minioadmin"),
            region: env_or("MINIO_REGION", "us-east-1"),
        };

        let mail = MailConfig {
            sendgrid_api_key: std::env::var("SENDGRID_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            from_email: env_or("FROM_EMAIL", "noreply@civictrack.local"),
            from_name: env_or("FROM_NAME", "Citizen Issue Tracker"),
            app_base_url: env_or("APP_BASE_URL", "http://localhost:3001"),
        };

        Ok(Self {
            data_backend,
            database_url,
            jwt,
            storage,
            mail,
        })
    }
}
