//! Spiral - boots the local platform and tails the feed

use anyhow::{bail, Result};
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use spiral::{config::Config, services::ServiceError, SpiralClient};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "spiral=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Spiral...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    let client = SpiralClient::connect(&config).await?;
    tracing::info!("Platform ready: {}", config.database.url);

    // Session cleanup task (runs every hour)
    {
        let backend = client.backend().clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(3600));
            loop {
                interval.tick().await;
                match backend.auth.cleanup_expired_sessions().await {
                    Ok(0) => {}
                    Ok(n) => tracing::info!("Removed {} expired sessions", n),
                    Err(e) => tracing::warn!("Session cleanup failed: {}", e),
                }
            }
        });
    }

    let (Ok(email), Ok(password)) = (
        std::env::var("SPIRAL_EMAIL"),
        std::env::var("SPIRAL_PASSWORD"),
    ) else {
        bail!("Set SPIRAL_EMAIL and SPIRAL_PASSWORD to sign in");
    };

    let session = match client.session().sign_in(&email, &password).await {
        Ok(session) => session,
        Err(ServiceError::Unauthenticated(_)) => {
            tracing::info!("No account for {}, signing up", email);
            client.session().sign_up(&email, &password, None).await?
        }
        Err(e) => return Err(e.into()),
    };
    tracing::info!("Signed in as {}", session.user_id);

    let feed = match client.feed().await {
        Ok(feed) => feed,
        Err(route) => bail!("Redirected to {}", route.path()),
    };

    let mut version = feed.watch();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            changed = version.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = feed.snapshot();
                tracing::info!(
                    "Feed v{}: {} posts ({:?})",
                    *version.borrow_and_update(),
                    snapshot.posts.len(),
                    feed.state()
                );
                if let Some(latest) = snapshot.posts.first() {
                    tracing::info!(
                        "Latest by {}: {}",
                        latest.author.display_name(),
                        latest.post.content
                    );
                }
            }
            _ = &mut shutdown => {
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    feed.unmount().await;
    client.sign_out().await;
    client.backend().close().await;

    Ok(())
}
