use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};

use notecast_api::config::ApiConfig;
use notecast_api::mailer::{LogMailer, Mailer, WebhookMailer};
use notecast_api::media::DiskMediaStore;
use notecast_api::{AppState, AppStateInner, digest, router};
use notecast_db::Database;
use notecast_gateway::SessionRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "notecast=debug,tower_http=debug".into()),
        )
        .init();

    let config = ApiConfig::from_env()?;
    if config.mode.is_development() {
        warn!("Running in development mode, error details are exposed to clients");
    }

    let db = Arc::new(Database::open(&config.db_path)?);
    for email in &config.admin_emails {
        if db.set_user_role(email, "admin")? {
            info!("Promoted {} to admin", email);
        } else {
            warn!("Admin email {} has no account yet", email);
        }
    }

    let media = DiskMediaStore::new(config.media_dir.clone(), &config.public_url).await?;
    let mailer: Arc<dyn Mailer> = match &config.mail_webhook {
        Some(url) => {
            info!("Sending mail through {}", url);
            Arc::new(WebhookMailer::new(url.clone(), config.mail_from.clone()))
        }
        None => {
            warn!("NOTECAST_MAIL_WEBHOOK not set, mail will only be logged");
            Arc::new(LogMailer)
        }
    };

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    let state: AppState = Arc::new(AppStateInner::new(db, config, mailer, Arc::new(media)));
    tokio::spawn(digest::run_digest_loop(state.clone()));

    let registry = state.registry.clone();
    let app = router(state);

    info!("Notecast server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(registry.clone()))
        .await?;

    registry.clear();
    info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM. Live gateway sessions are ended right
/// away so the server does not wait on them.
async fn shutdown_signal(registry: SessionRegistry) {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }

    info!("Closing {} gateway session(s)", registry.len());
    registry.clear();
}
