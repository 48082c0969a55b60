//! # MixTune Service
//!
//! HTTP front end for the MixTune proposal engine.
//!
//! ## Endpoints
//!
//! - `POST /weights_gen/`: propose the next weight vector for a session
//! - `POST /weights_update/`: record an observation
//! - `POST /weights_update_delete/`: delete a session
//! - `POST /weights_log/`: validate and echo a weight vector
//! - `GET /`, `GET /health`, `GET /api/v1/version`

pub mod api;
pub mod config;

use mixtune_engine::{InMemoryStore, KeyValueStore, RedisStore, SessionEngine};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub use api::{router, AppState};
pub use config::MixtuneConfig;

/// Open the configured store: Redis when a URL is set, in-memory otherwise
pub async fn build_store(config: &MixtuneConfig) -> anyhow::Result<Arc<dyn KeyValueStore>> {
    match &config.storage.redis_url {
        Some(url) => {
            let store = RedisStore::new(url)
                .await?
                .with_timeout(Duration::from_millis(config.storage.op_timeout_ms));
            info!("Using Redis session store");
            Ok(Arc::new(store))
        }
        None => {
            info!("No MIXTUNE_REDIS_URL set, using in-memory session store");
            Ok(Arc::new(InMemoryStore::new()))
        }
    }
}

/// Assemble handler state from a configuration and an open store
pub fn build_state(config: &MixtuneConfig, store: Arc<dyn KeyValueStore>) -> AppState {
    AppState {
        engine: Arc::new(SessionEngine::new(store, &config.engine)),
        weight_sum_tolerance: config.weight_sum_tolerance,
    }
}
