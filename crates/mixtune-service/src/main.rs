//! MixTune Service Binary
//!
//! Adaptive weight tuning for multi-node setups

use std::net::SocketAddr;

use anyhow::Result;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mixtune_service::{build_state, build_store, router, MixtuneConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    info!("Starting MixTune Service v{}", mixtune_common::VERSION);

    let config = MixtuneConfig::load()?;
    info!("Loaded configuration: {:?}", config);

    let store = build_store(&config).await?;
    let app = router(build_state(&config, store));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("MixTune HTTP server listening on {}", addr);
    info!(
        "Engine config: explore_threshold={}, top_k={}, sample_batch={}",
        config.engine.explore_threshold, config.engine.top_k, config.engine.sample_batch
    );

    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal"),
            Err(e) => error!("Failed to install CTRL+C signal handler: {}", e),
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Shutting down MixTune service");
    Ok(())
}
