//! Simplex weight vectors and per-node bounds

use serde::{Deserialize, Serialize};
use std::ops::Deref;

/// Mixture weights, one per node, summing to 1.0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeightVector(Vec<f64>);

impl WeightVector {
    pub fn new(weights: Vec<f64>) -> Self {
        Self(weights)
    }

    /// Equal weight on every node
    pub fn uniform(number_of_nodes: usize) -> Self {
        let mut weights = vec![1.0 / number_of_nodes as f64; number_of_nodes];
        close_simplex(&mut weights);
        Self(weights)
    }

    pub fn number_of_nodes(&self) -> usize {
        self.0.len()
    }

    pub fn sum(&self) -> f64 {
        self.0.iter().sum()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }

    /// Whether every entry is non-negative and the sum is within `tolerance` of 1
    pub fn is_on_simplex(&self, tolerance: f64) -> bool {
        !self.0.is_empty()
            && self.0.iter().all(|w| w.is_finite() && *w >= 0.0)
            && (self.sum() - 1.0).abs() <= tolerance
    }
}

impl Deref for WeightVector {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        &self.0
    }
}

impl From<Vec<f64>> for WeightVector {
    fn from(weights: Vec<f64>) -> Self {
        Self(weights)
    }
}

/// Recompute the last coordinate as `1 - sum(others)` so the vector closes exactly
pub fn close_simplex(weights: &mut [f64]) {
    if let Some((last, rest)) = weights.split_last_mut() {
        *last = 1.0 - rest.iter().sum::<f64>();
    }
}

/// Per-node upper bounds on a proposed weight vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaxWeightConstraint(Vec<f64>);

impl MaxWeightConstraint {
    pub fn new(bounds: Vec<f64>) -> Self {
        Self(bounds)
    }

    /// No effective bound: every node may take up to the full mass
    pub fn unbounded(number_of_nodes: usize) -> Self {
        Self(vec![1.0; number_of_nodes])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Strict admission test: every coordinate below its bound
    pub fn admits(&self, weights: &[f64]) -> bool {
        weights.len() == self.0.len() && weights.iter().zip(&self.0).all(|(w, b)| w < b)
    }

    /// A vector summing to 1 with every entry strictly below its bound
    /// exists only when the bounds sum to more than 1
    pub fn is_feasible(&self) -> bool {
        self.0.iter().sum::<f64>() > 1.0
    }
}
