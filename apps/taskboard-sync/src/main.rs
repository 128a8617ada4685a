use std::path::Path;
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use taskboard_sync::api::ApiClient;
use taskboard_sync::commands;
use taskboard_sync::config::{Config, Credentials};
use taskboard_sync::gateway::WsConnector;
use taskboard_sync::session::SessionManager;
use taskboard_sync::store::{StoreChange, SyncStore, TaskScope};

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing, env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let credentials = Credentials::from_env();
    tracing::info!(api_url = %config.api_url, gateway_url = %config.gateway_url, "taskboard-sync configured");

    let api = ApiClient::new(&config.api_url);
    let identity = match api.login(&credentials.username, &credentials.password).await {
        Ok(identity) => identity,
        Err(err) => {
            tracing::error!(%err, "login failed");
            std::process::exit(1);
        }
    };

    let store = SyncStore::new();
    let sessions = SessionManager::new(
        config,
        Arc::new(api.clone()),
        Arc::new(WsConnector),
        store.clone(),
    );
    api.set_unauthorized_hook(sessions.unauthorized_hook());
    sessions.on_notification(|n| {
        tracing::info!(notification_id = n.id, title = %n.title, "new notification");
    });

    // Log every store change with the size of what changed.
    let mut changes = store.subscribe();
    let watched = store.clone();
    tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(StoreChange::Tasks(scope)) => {
                    tracing::info!(%scope, count = watched.tasks(scope).len(), "tasks changed");
                }
                Ok(StoreChange::Notifications) => {
                    tracing::info!(unread = watched.unread_count(), "notifications changed");
                }
                Ok(StoreChange::Comments(task_id)) => {
                    tracing::info!(task_id, count = watched.comments(task_id).len(), "comments changed");
                }
                Ok(StoreChange::Cleared) => tracing::info!("store cleared"),
                Err(RecvError::Lagged(skipped)) => tracing::warn!(skipped, "store listener lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    sessions.start(identity);

    if let Err(err) = commands::refresh_tasks(&api, &store, TaskScope::All).await {
        tracing::warn!(%err, "initial task load failed");
    }
    if let Err(err) = commands::load_notifications(&api, &store).await {
        tracing::warn!(%err, "initial notification load failed");
    }

    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "failed to listen for shutdown signal");
    }
    tracing::info!("shutting down");
    sessions.logout();
    api.clear_token();
}
