//! Examhub portal - local front-end shell.
//!
//! Serves the sign-in forms and the four role dashboards on port 3000,
//! backed by one process-wide session.
//!
//! # Architecture
//!
//! - Axum web framework, Askama templates
//! - Hosted backend for identity and the `profiles`/`schools` tables
//! - A JSON file for the persisted auth session and the profile cache

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use examhub_core::{Email, SessionState};
use examhub_portal::baas::BaasClient;
use examhub_portal::config::PortalConfig;
use examhub_portal::error::{clear_sentry_user, set_sentry_user};
use examhub_portal::session::{SessionCache, SessionController};
use examhub_portal::state::AppState;
use examhub_portal::storage::{FileStore, KeyValueStore};
use sentry::integrations::tracing as sentry_tracing;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &PortalConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: Some(std::borrow::Cow::Owned(config.sentry_environment.clone())),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

/// Keep the Sentry user in step with the session.
async fn track_sentry_user(mut states: watch::Receiver<SessionState>) {
    loop {
        {
            let state = states.borrow_and_update();
            match &state.user {
                Some(user) => set_sentry_user(&user.id, user.email.as_ref().map(Email::as_str)),
                None => clear_sentry_user(),
            }
        }
        if states.changed().await.is_err() {
            break;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration from environment (needed for Sentry init)
    let config = PortalConfig::from_env()?;

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    // Defaults to info level for our crate if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "examhub_portal=info,tower_http=debug".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(&config.storage_path)?);
    tracing::info!(path = %config.storage_path.display(), "Storage opened");

    let client = BaasClient::new(&config.baas, Arc::clone(&store))?;
    let auto_refresh = client.spawn_auto_refresh();

    let client = Arc::new(client);
    let controller = SessionController::with_refresh_delay(
        client.clone(),
        client,
        SessionCache::new(store),
        config.refresh_delay,
    );
    controller.start().await;
    tokio::spawn(track_sentry_user(controller.subscribe()));

    let app = examhub_portal::app(AppState::new(controller.clone()))
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction());

    let addr = config.socket_addr();
    tracing::info!("portal listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    controller.dispose();
    auto_refresh.abort();
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
