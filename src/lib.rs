//! Gas Station ERP backend
//!
//! Serves the station's mobile pages: a session-gated JSON API in front of
//! the serverless function host, plus the screen endpoints that compute
//! pump inventories, register rows, lubricant and sales tables.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod addstocks;
mod api;
mod auth;
mod config;
mod db;
mod diagnostics;
mod dispensers;
mod employees;
mod error;
mod format;
mod inventory;
mod lubricants;
mod purchase_orders;
mod routes;
mod sales;

use api::UpstreamClient;
use auth::AuthState;
use config::Config;
use db::DbState;

/// How often expired sessions are swept.
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Everything a handler needs, shared behind one `Arc`.
pub struct AppState {
    pub config: Config,
    pub upstream: UpstreamClient,
    pub auth: AuthState,
    pub db: DbState,
}

fn init_logging(config: &Config) -> tracing_appender::non_blocking::WorkerGuard {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,gas_station_erp_lib=debug"));

    let log_dir = diagnostics::ensure_log_dir(&config.log_dir);
    let pruned = diagnostics::prune_old_logs(&log_dir);

    let file_appender = tracing_appender::rolling::daily(&log_dir, diagnostics::LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    let console_layer = fmt::layer().with_target(true);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    if pruned > 0 {
        debug!("Pruned {pruned} old log file(s)");
    }
    guard
}

fn load_users(config: &Config) -> anyhow::Result<Vec<auth::StationUser>> {
    match &config.users_file {
        Some(path) => {
            let users = auth::load_users_file(path)
                .with_context(|| format!("loading users from {}", path.display()))?;
            info!("Loaded {} station user(s) from {}", users.len(), path.display());
            Ok(users)
        }
        None => {
            warn!("ERP_USERS_FILE not set, using the built-in demo accounts");
            Ok(auth::demo_users(bcrypt::DEFAULT_COST)?)
        }
    }
}

fn spawn_session_sweeper(state: Arc<AppState>, cancel: CancellationToken) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Session sweeper stopped");
                    break;
                }
                _ = tokio::time::sleep(SESSION_SWEEP_INTERVAL) => {
                    let removed = state.auth.prune_expired();
                    if removed > 0 {
                        debug!("Removed {removed} expired session(s)");
                    }
                }
            }
        }
    });
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    cancel.cancel();
}

pub async fn run() -> anyhow::Result<()> {
    // A missing .env is normal outside development.
    let _ = dotenvy::dotenv();

    let config = Config::load().map_err(anyhow::Error::msg)?;
    let _guard = init_logging(&config);

    info!("Starting Gas Station ERP v{}", env!("CARGO_PKG_VERSION"));
    info!(
        station = %config.station_api_url,
        backoffice = %config.backoffice_api_url,
        "Upstream function host"
    );

    let db = db::init(&config.data_dir).map_err(anyhow::Error::msg)?;
    let users = load_users(&config)?;
    let auth = AuthState::new(users, &config.allowed_locations);
    let upstream = UpstreamClient::new(config.upstream_timeout)?;

    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(AppState {
        config,
        upstream,
        auth,
        db,
    });

    let cancel = CancellationToken::new();
    spawn_session_sweeper(state.clone(), cancel.clone());

    let app = routes::router(state);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding {bind_addr}"))?;
    info!("Listening on {bind_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel))
        .await
        .context("server error")?;

    info!("Server stopped");
    Ok(())
}

/// In-memory state for handler tests. bcrypt cost 4 keeps logins fast.
#[cfg(test)]
pub(crate) fn test_state(config: Config) -> Arc<AppState> {
    let users = auth::demo_users(4).expect("demo users");
    let auth = AuthState::new(users, &config.allowed_locations);
    let upstream = UpstreamClient::new(config.upstream_timeout).expect("client");
    let db = db::init_in_memory().expect("db");
    Arc::new(AppState {
        config,
        upstream,
        auth,
        db,
    })
}
