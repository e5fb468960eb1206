use std::sync::Arc;

use tracing::info;

use agent_console::cache::{Revalidator, ThreadListCache};
use agent_console::config::Config;
use agent_console::hub::TranscriptHub;
use agent_console::invoke::HttpAgentInvoker;
use agent_console::routes::router;
use agent_console::service::console_service::ConsoleService;
use agent_console::source::HttpEventSource;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present (development convenience)
    dotenvy::dotenv().ok();

    // Initialise tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agent_console=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;
    info!(upstream = %config.upstream_url, "using agent platform");

    // ── Dependency wiring ─────────────────────────────────────────────────────
    let client = reqwest::Client::new();
    let events = Arc::new(HttpEventSource::new(client.clone(), &config.upstream_url));
    let invoker = Arc::new(HttpAgentInvoker::new(client.clone(), &config.upstream_url));
    let threads = Arc::new(ThreadListCache::new(client, &config.upstream_url));
    let revalidator = Arc::new(Revalidator::new(threads.clone()));
    let hub = Arc::new(TranscriptHub::new(events, config.replay));
    let service = ConsoleService::new(hub.clone(), invoker, revalidator, threads);

    // ── Listen ────────────────────────────────────────────────────────────────
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{addr}/");

    axum::serve(listener, router(service))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    hub.shutdown().await;
    Ok(())
}
