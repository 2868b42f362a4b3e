use serde::Deserialize;
use std::env;

const DEV_JWT_SECRET: &str = "storefront-development-secret-change-me";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_port: String,
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub jwt_ttl_minutes: i64,
    pub notify_webhook_url: Option<String>,
    pub seed_file: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let server_port = env::var("SERVER_PORT").unwrap_or_else(|_| "3000".into());
        let database_url = env::var("DATABASE_URL").ok();
        let jwt_secret = match env::var("JWT_SECRET") {
            Ok(secret) if secret.len() >= 32 => secret,
            Ok(_) => anyhow::bail!("JWT_SECRET must be at least 32 characters long"),
            Err(_) => {
                tracing::warn!("JWT_SECRET not set, using the development secret");
                DEV_JWT_SECRET.to_string()
            }
        };
        let jwt_ttl_minutes = match env::var("JWT_TTL_MINUTES") {
            Ok(raw) => raw
                .parse()
                .map_err(|e| anyhow::anyhow!("JWT_TTL_MINUTES {raw:?}: {e}"))?,
            Err(_) => 1440,
        };
        let notify_webhook_url = env::var("NOTIFY_WEBHOOK_URL").ok().filter(|s| !s.is_empty());
        let seed_file = env::var("SEED_FILE").ok().filter(|s| !s.is_empty());
        Ok(Self {
            server_port,
            database_url,
            jwt_secret,
            jwt_ttl_minutes,
            notify_webhook_url,
            seed_file,
        })
    }
}
