//! # MixTune Common
//!
//! Shared types, errors, and input validation for the MixTune weight tuner.
//!
//! ## Core Types
//!
//! - [`WeightVector`]: per-node mixture weights on the probability simplex
//! - [`MaxWeightConstraint`]: per-node upper bounds for proposed weights
//! - [`Observation`]: a recorded `(weights, performance_metric)` pair
//! - [`Session`]: the history and best result of one tuning run
//!
//! ## Errors
//!
//! - [`MixtuneError`]: unified error type, with a stable [`ErrorKind`]

pub mod error;
pub mod types;
pub mod validation;

// Re-export commonly used types at crate root
pub use error::{ErrorKind, MixtuneError, Result, SamplingError, SessionError};
pub use types::{
    session::{Observation, RecordOutcome, Session},
    weights::{MaxWeightConstraint, WeightVector},
};
pub use validation::{validate_max_weightings, validate_metric, validate_weights};

/// MixTune version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Smallest node count a session may declare
pub const MIN_NUMBER_OF_NODES: usize = 2;

/// Sessions with at most this many observations are explored, not exploited
pub const DEFAULT_EXPLORE_THRESHOLD: usize = 50;

/// Number of best observations the posterior is fitted on
pub const DEFAULT_TOP_K: usize = 20;

/// Dirichlet draws per rejection-sampling batch
pub const DEFAULT_SAMPLE_BATCH: usize = 1000;

/// Allowed deviation of a submitted weight sum from 1.0
pub const DEFAULT_WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Default store key prefix for session ledgers
pub const DEFAULT_KEY_PREFIX: &str = "session_";
