//! wplive daemon
//!
//! Loads one blog, then polls it and logs every change as a JSON event.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use wplive::config::{Config, LogFormat};
use wplive::db::{self, Loader, Multisite};
use wplive::watcher::Watcher;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }

    tracing::info!("Starting wplive");
    tracing::info!("Database: {}", db::redact(&config.database_url));
    tracing::info!("Table prefix: {}", config.qualified_prefix());
    tracing::info!("Poll interval: {:?}", config.poll_interval);

    let pool = db::connect(&config.database_url).await?;

    if let Some(id) = config.blog_id {
        let blog = Multisite::new(pool.clone(), config.network_prefix())
            .blog(id)
            .await?;
        tracing::info!("Watching blog {} ({})", blog.id, blog.name);
    }

    let loader = Loader::from_config(pool, &config);

    let (watcher, mut events) = Watcher::new(loader);
    let handle = watcher.start(config.poll_interval);

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                match serde_json::to_string(&event) {
                    Ok(json) => tracing::info!(target: "wplive::event", "{}", json),
                    Err(e) => tracing::error!("Failed to serialize event: {}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}
