/// Main entry point for the insider detection service

use anyhow::Result;
use tokio::signal;
use tokio::time::{interval, Duration};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use polysentry::handlers::SystemOrchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_file(false)
                .with_line_number(false),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "polysentry=info,warn".into()),
        )
        .init();

    info!("🕵️ Starting Polysentry - Prediction Market Insider Detection");

    let mut orchestrator = SystemOrchestrator::init().await?;
    orchestrator.start().await?;

    let status = orchestrator.get_status().await;
    info!("📋 System Status:\n{}", status);

    let mut status_interval = interval(Duration::from_secs(300));
    status_interval.tick().await; // consume the immediate tick

    tokio::select! {
        _ = async {
            loop {
                status_interval.tick().await;
                let status = orchestrator.get_status().await;
                info!("📊 Status Update:\n{}", status);
            }
        } => {},

        _ = signal::ctrl_c() => {
            info!("🛑 Shutdown signal received");
        }
    }

    orchestrator.shutdown().await?;

    info!("👋 Polysentry shutdown complete");
    Ok(())
}
