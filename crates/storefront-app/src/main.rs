use std::sync::Arc;

use storefront_hex::application::seed::{load_seed, SeedData};
use storefront_hex::auth::JwtAuth;
use storefront_hex::config::Config;
use storefront_hex::inbound::http::{AppState, HttpServer, HttpServerConfig};
use storefront_hex::outbound::{LogNotifier, WebhookNotifier};
use storefront_hex::ports::notifier::Notifier;
use storefront_repo::{build_repo, Repo};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env for DATABASE_URL / SERVER_PORT / JWT_SECRET when present.
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "debug".to_string()))
        .init();

    let config = Config::from_env()?;
    let repo: Repo = build_repo(config.database_url.as_deref()).await?;

    if let Some(path) = &config.seed_file {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| anyhow::anyhow!("reading seed file {path}: {e}"))?;
        let data = SeedData::from_json(&raw)?;
        load_seed(&repo, data)
            .await
            .map_err(|e| anyhow::anyhow!("seeding from {path}: {e}"))?;
    }

    let notifier: Arc<dyn Notifier> = match &config.notify_webhook_url {
        Some(url) => {
            tracing::info!(url, "notifications go to webhook");
            Arc::new(WebhookNotifier::new(url.clone())?)
        }
        None => Arc::new(LogNotifier),
    };

    let auth = JwtAuth::new(&config.jwt_secret, config.jwt_ttl_minutes);
    let state = AppState::new(Arc::new(repo), notifier, auth);

    let server_cfg = HttpServerConfig {
        port: config.server_port.clone(),
    };

    let http = HttpServer::new(state, server_cfg).await?;
    http.run().await
}
