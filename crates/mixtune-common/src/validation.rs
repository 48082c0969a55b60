//! Request input validation
//!
//! The transport layer calls these before anything reaches the engine.
//! Messages are part of the HTTP contract; clients match on them.

use crate::error::{MixtuneError, Result};
use crate::MIN_NUMBER_OF_NODES;

/// Validate a submitted weight vector against its declared node count.
///
/// `tolerance` bounds `|sum - 1|`; pass `0.0` for exact equality.
pub fn validate_weights(number_of_nodes: usize, weights: &[f64], tolerance: f64) -> Result<()> {
    if number_of_nodes < MIN_NUMBER_OF_NODES {
        return Err(MixtuneError::InvalidInput(format!(
            "number_of_nodes must be greater than or equal to {}.",
            MIN_NUMBER_OF_NODES
        )));
    }
    if weights.is_empty() {
        return Err(MixtuneError::InvalidInput(
            "Weights list cannot be empty.".to_string(),
        ));
    }
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(MixtuneError::InvalidInput(
            "Weights must be finite and non-negative.".to_string(),
        ));
    }

    let weight_sum: f64 = weights.iter().sum();
    if (weight_sum - 1.0).abs() > tolerance {
        return Err(MixtuneError::InvalidInput(format!(
            "Sum of weights must be 1.0, but got {}.",
            weight_sum
        )));
    }

    if weights.len() != number_of_nodes {
        return Err(MixtuneError::InvalidInput(format!(
            "Number of weights must equal number_of_nodes ({}), but got {}.",
            number_of_nodes,
            weights.len()
        )));
    }

    Ok(())
}

/// Validate per-node upper bounds: one per node, each in (0, 1]
pub fn validate_max_weightings(number_of_nodes: usize, max_weightings: &[f64]) -> Result<()> {
    if max_weightings.len() != number_of_nodes {
        return Err(MixtuneError::InvalidInput(format!(
            "Number of max_weightings must equal number_of_nodes ({}), but got {}.",
            number_of_nodes,
            max_weightings.len()
        )));
    }
    if let Some(bad) = max_weightings
        .iter()
        .find(|b| !b.is_finite() || **b <= 0.0 || **b > 1.0)
    {
        return Err(MixtuneError::InvalidInput(format!(
            "max_weightings entries must lie in (0, 1], but got {}.",
            bad
        )));
    }
    Ok(())
}

/// A NaN or infinite metric would poison best-result comparisons
pub fn validate_metric(performance_metric: f64) -> Result<()> {
    if !performance_metric.is_finite() {
        return Err(MixtuneError::InvalidInput(format!(
            "performance_metric must be finite, but got {}.",
            performance_metric
        )));
    }
    Ok(())
}
