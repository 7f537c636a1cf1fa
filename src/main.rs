use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use efika_site::auth::{IdentityProvider, LocalIdentityProvider, spawn_session_sweep};
use efika_site::config::ServerConfig;
use efika_site::server::{AppState, app_router};
use efika_site::store::{Database, LibSqlBackend};

const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env().context("invalid configuration")?;

    // Keep the guard alive so buffered file logs are flushed on exit.
    let _log_guard = init_tracing(&config);

    eprintln!("🛡️  Efika site v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API:     http://0.0.0.0:{}/api", config.port);
    eprintln!("   Chat WS: ws://0.0.0.0:{}/ws/chat", config.port);
    eprintln!("   Database: {}", config.db_path.display());

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("failed to open database at {}", config.db_path.display()))?,
    );

    // ── Identity ─────────────────────────────────────────────────────────
    let provider: Arc<dyn IdentityProvider> = Arc::new(LocalIdentityProvider::new(
        Arc::clone(&db),
        config.session_ttl,
        config.service_role_key.clone(),
    ));
    let _sweep_handle = spawn_session_sweep(Arc::clone(&db), SESSION_SWEEP_INTERVAL);

    // ── HTTP / WS ────────────────────────────────────────────────────────
    let state = AppState::new(Arc::clone(&db), provider, config.service_role_key.clone());
    let app = app_router(state, config.chat_pacing, config.cors_origin.as_deref());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("failed to bind port {}", config.port))?;
    tracing::info!(port = config.port, "Server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down");
        })
        .await
        .context("server error")?;

    Ok(())
}

fn init_tracing(config: &ServerConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match &config.log_dir {
        Some(dir) => {
            use tracing_subscriber::layer::SubscriberExt;
            use tracing_subscriber::util::SubscriberInitExt;

            let appender = tracing_appender::rolling::daily(dir, "efika-site.log");
            let (file_writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter())
                .with(tracing_subscriber::fmt::layer().with_target(false))
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(false)
                        .with_ansi(false)
                        .with_writer(file_writer),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_target(false)
                .init();
            None
        }
    }
}
