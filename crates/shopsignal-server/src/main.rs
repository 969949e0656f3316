use anyhow::Context;
use shopsignal_core::ShopSignalConfig;
use shopsignal_queue::QueueWorker;
use shopsignal_server::{app_with_state, state::AppState};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = ShopSignalConfig::from_env()?;
    let state = AppState::from_config(&config).await?;
    if state.queue.is_degraded() {
        warn!(dir = %config.queue.storage_dir.display(), "storage unavailable, queue is memory-only");
    }

    let worker = QueueWorker::new(state.queue.clone(), config.queue.drain_interval()).start();

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(
        %addr,
        ingest = %config.endpoints.ingest_url,
        event_logs = %config.server.event_log_dir.display(),
        "shopsignal listening"
    );

    axum::serve(listener, app_with_state(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    worker.shutdown().await;
    info!("shopsignal stopped");
    Ok(())
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(env_filter);

    let json = std::env::var("SHOPSIGNAL_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
