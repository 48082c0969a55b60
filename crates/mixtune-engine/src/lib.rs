//! # MixTune Engine
//!
//! Adaptive weight-proposal engine for multi-node mixture tuning.
//!
//! A caller records `(weights, performance_metric)` observations into a
//! session and asks for the next weight vector to try. Early on the engine
//! explores the simplex uniformly; once enough data exists it fits a
//! Dirichlet to the best observations and samples near them.
//!
//! ## Components
//!
//! ```text
//! SessionEngine ──► SessionLedger ──► KeyValueStore (Redis / in-memory)
//!       │
//!       └──► ProposalPolicy ──► DirichletFitter
//!                   └─────────► SimplexSampler
//! ```

pub mod engine;
pub mod fitter;
pub mod ledger;
pub mod locks;
pub mod policy;
pub mod sampler;
pub mod store;

use mixtune_common::{
    DEFAULT_EXPLORE_THRESHOLD, DEFAULT_KEY_PREFIX, DEFAULT_SAMPLE_BATCH, DEFAULT_TOP_K,
};
use serde::{Deserialize, Serialize};

pub use engine::{SessionEngine, UpdateResult};
pub use fitter::DirichletFitter;
pub use ledger::SessionLedger;
pub use policy::{Proposal, ProposalMode, ProposalPolicy, ProposalResult};
pub use sampler::SimplexSampler;
pub use store::{InMemoryStore, KeyValueStore, RedisStore};

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Sessions with at most this many observations are explored
    pub explore_threshold: usize,
    /// Best observations used for the posterior fit
    pub top_k: usize,
    /// Dirichlet draws per rejection batch
    pub sample_batch: usize,
    /// Rejection batches before giving up
    pub max_batches: usize,
    /// Log-likelihood change that ends the fit
    pub fit_tolerance: f64,
    /// Mean/precision rounds before the fit is declared divergent
    pub fit_max_iterations: usize,
    /// Store key prefix for session ledgers
    pub key_prefix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            explore_threshold: DEFAULT_EXPLORE_THRESHOLD,
            top_k: DEFAULT_TOP_K,
            sample_batch: DEFAULT_SAMPLE_BATCH,
            max_batches: 1,
            fit_tolerance: 1e-7,
            fit_max_iterations: 1000,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}
