//! IUTCart server binary.
//!
//! Serves the JSON API on port 5000 by default.
//!
//! # Architecture
//!
//! - Axum web framework, routes built by [`iutcart_server::app`]
//! - `PostgreSQL` for users, orders and catalog counts
//! - Transactional email through a bounded queue and an SMTP relay
//!
//! Migrations are NOT run on startup. Apply them with
//! `sqlx migrate run --source crates/server/migrations`.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::net::SocketAddr;
use std::sync::Arc;

use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use iutcart_server::app;
use iutcart_server::config::ServerConfig;
use iutcart_server::db::{self, Stores};
use iutcart_server::services::{LogMailer, Mailer, NotificationQueue, SmtpMailer};
use iutcart_server::state::AppState;

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ServerConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
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

/// SMTP when configured, otherwise log emails.
fn build_mailer(config: &ServerConfig) -> Result<Arc<dyn Mailer>, Box<dyn std::error::Error>> {
    match &config.email {
        Some(email) => {
            tracing::info!(smtp_host = %email.smtp_host, "Sending email over SMTP");
            Ok(Arc::new(SmtpMailer::new(email, &config.email_from)?))
        }
        None => {
            tracing::warn!("SMTP_HOST not set, emails will only be logged");
            Ok(Arc::new(LogMailer::new(&config.email_from)?))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration from environment (needed for Sentry init)
    let config = ServerConfig::from_env()?;

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    // Defaults to info level for our crate if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "iutcart_server=info,tower_http=debug".into());

    let json_layer = config
        .json_logs
        .then(|| tracing_subscriber::fmt::layer().json().flatten_event(true));
    let text_layer = (!config.json_logs).then(tracing_subscriber::fmt::layer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let pool = db::create_pool(&config.database_url, config.statement_timeout).await?;
    tracing::info!("Database pool created");

    let mailer = build_mailer(&config)?;
    let (notifier, worker) = NotificationQueue::spawn(mailer, config.notifications);

    let addr = config.socket_addr();
    let state = AppState::new(config, Stores::postgres(pool), notifier);
    let router = app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("iutcart-server listening on http://{}", addr);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // The router (and every queue sender with it) is gone; let the worker
    // finish what is queued.
    tracing::info!("Draining notification queue");
    if let Err(e) = worker.await {
        tracing::error!(error = %e, "Notification worker failed");
    }

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
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
