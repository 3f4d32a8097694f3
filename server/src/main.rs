use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use tts_server::config::ServerConfig;
use tts_server::http_backend::HttpBackendFactory;
use tts_server::{build_router, load_settings, routes, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let _ = dotenv::dotenv();

    async_main().await
}

async fn async_main() -> anyhow::Result<()> {
    info!("Starting speech server...");
    routes::mark_start();

    let config = ServerConfig::from_env();
    let settings = Arc::new(load_settings(&config));
    info!(
        "Loaded {} voice profile(s), {} enabled",
        settings.all_profiles().len(),
        tts_core::SettingsSource::enabled_profiles(settings.as_ref()).len()
    );

    let factory = Arc::new(HttpBackendFactory::new(config.synth_backend_url.clone()));
    let state = AppState::new(config.clone(), settings, factory);
    let coordinator = state.coordinator.clone();

    info!(
        "Server configuration loaded: port={}, rate_limit={}/min, backend={}, output={} Hz",
        config.port, config.rate_limit_per_minute, config.synth_backend_url, config.output_sample_rate
    );

    let app = build_router(state)?;
    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!("Failed to bind {addr}: {e}. Try a different PORT.")
    })?;

    info!("Server listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    coordinator.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {e}");
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
                tracing::error!("Failed to install SIGTERM handler: {e}");
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
    info!("Shutdown signal received");
}
