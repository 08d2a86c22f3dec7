use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ocn_plexus::app::create_app;
use ocn_plexus::config::ServiceConfig;
use ocn_plexus::metrics::{setup_metrics_recorder, spawn_metrics_exporter};
use ocn_plexus::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "ocn_plexus=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServiceConfig::from_env();
    let bind_addr = config.bind_addr;
    let metrics_addr = config.metrics_addr;

    let state = AppState::in_memory(config)?;

    if let Some(addr) = metrics_addr {
        let handle = setup_metrics_recorder();
        spawn_metrics_exporter(handle, addr);
        tracing::info!("metrics exporter listening on {}", addr);
    }

    // Periodic sweep turning lapsed inbox issuances into EXPIRED events.
    let inbox = state.inbox.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            if let Err(e) = inbox.expire_due(chrono::Utc::now()).await {
                tracing::warn!("issuance expiry sweep failed: {}", e);
            }
        }
    });

    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("plexus listening on {}", bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
