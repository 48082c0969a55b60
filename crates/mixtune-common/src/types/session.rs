//! Session history and best-result bookkeeping
//!
//! A session is one tuning run. It is created by its first observation,
//! grows by appending observations in arrival order, and keeps the best
//! observation seen so far. The best metric never decreases.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::weights::WeightVector;
use crate::error::SessionError;

/// A measured `(weights, performance_metric)` pair. Higher metric is better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub weights: WeightVector,
    pub performance_metric: f64,
}

impl Observation {
    pub fn new(weights: impl Into<WeightVector>, performance_metric: f64) -> Self {
        Self {
            weights: weights.into(),
            performance_metric,
        }
    }
}

/// State of one tuning session
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    number_of_nodes: usize,
    best_performance_metric: f64,
    best_weights: WeightVector,
    history: Vec<Observation>,
}

/// What a single `record` call did to the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordOutcome {
    /// The observation replaced the previous best
    pub best_changed: bool,
    /// History length after the append
    pub num_observations: usize,
}

impl Session {
    /// Start a session from its first observation
    pub fn seeded(observation: Observation) -> Self {
        Self {
            number_of_nodes: observation.weights.number_of_nodes(),
            best_performance_metric: observation.performance_metric,
            best_weights: observation.weights.clone(),
            history: vec![observation],
        }
    }

    /// Rebuild a session from stored parts, checking the ledger invariants
    pub fn from_parts(
        session_id: &str,
        number_of_nodes: usize,
        best_performance_metric: f64,
        best_weights: WeightVector,
        history: Vec<Observation>,
    ) -> Result<Self, SessionError> {
        let corrupt = |reason: String| SessionError::CorruptLedger {
            session_id: session_id.to_string(),
            reason,
        };

        if history.is_empty() {
            return Err(corrupt("history is empty".to_string()));
        }
        if best_weights.number_of_nodes() != number_of_nodes {
            return Err(corrupt(format!(
                "best_weights has {} entries, expected {}",
                best_weights.number_of_nodes(),
                number_of_nodes
            )));
        }
        if let Some((idx, obs)) = history
            .iter()
            .enumerate()
            .find(|(_, o)| o.weights.number_of_nodes() != number_of_nodes)
        {
            return Err(corrupt(format!(
                "observation {} has {} weights, expected {}",
                idx,
                obs.weights.number_of_nodes(),
                number_of_nodes
            )));
        }

        Ok(Self {
            number_of_nodes,
            best_performance_metric,
            best_weights,
            history,
        })
    }

    pub fn number_of_nodes(&self) -> usize {
        self.number_of_nodes
    }

    pub fn best_performance_metric(&self) -> f64 {
        self.best_performance_metric
    }

    pub fn best_weights(&self) -> &WeightVector {
        &self.best_weights
    }

    pub fn history(&self) -> &[Observation] {
        &self.history
    }

    pub fn num_observations(&self) -> usize {
        self.history.len()
    }

    /// Fail if a request declares a different node count than the session
    pub fn check_dimension(&self, session_id: &str, declared: usize) -> Result<(), SessionError> {
        if declared != self.number_of_nodes {
            return Err(SessionError::DimensionMismatch {
                session_id: session_id.to_string(),
                stored: self.number_of_nodes,
                declared,
            });
        }
        Ok(())
    }

    /// Append an observation, replacing the best only on strict improvement.
    ///
    /// The caller checks the dimension first; see [`Session::check_dimension`].
    pub fn record(&mut self, observation: Observation) -> RecordOutcome {
        let best_changed = observation.performance_metric > self.best_performance_metric;
        if best_changed {
            self.best_performance_metric = observation.performance_metric;
            self.best_weights = observation.weights.clone();
        }
        self.history.push(observation);

        RecordOutcome {
            best_changed,
            num_observations: self.history.len(),
        }
    }

    /// The `k` best observations, highest metric first
    pub fn top_k(&self, k: usize) -> Vec<&Observation> {
        let mut ranked: Vec<&Observation> = self.history.iter().collect();
        ranked.sort_by(|a, b| {
            b.performance_metric
                .partial_cmp(&a.performance_metric)
                .unwrap_or(Ordering::Equal)
        });
        ranked.truncate(k);
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(w: &[f64], metric: f64) -> Observation {
        Observation::new(w.to_vec(), metric)
    }

    #[test]
    fn test_seeded_session() {
        let session = Session::seeded(obs(&[0.5, 0.5], 10.0));
        assert_eq!(session.number_of_nodes(), 2);
        assert_eq!(session.num_observations(), 1);
        assert_eq!(session.best_performance_metric(), 10.0);
        assert_eq!(session.best_weights().as_slice(), &[0.5, 0.5]);
    }

    #[test]
    fn test_record_updates_best_on_improvement() {
        let mut session = Session::seeded(obs(&[0.5, 0.5], 10.0));

        let outcome = session.record(obs(&[0.3, 0.7], 12.0));
        assert!(outcome.best_changed);
        assert_eq!(outcome.num_observations, 2);
        assert_eq!(session.best_weights().as_slice(), &[0.3, 0.7]);

        let outcome = session.record(obs(&[0.4, 0.6], 5.0));
        assert!(!outcome.best_changed);
        assert_eq!(outcome.num_observations, 3);
        assert_eq!(session.best_performance_metric(), 12.0);
    }

    #[test]
    fn test_equal_metric_keeps_first_best() {
        let mut session = Session::seeded(obs(&[0.5, 0.5], 10.0));
        let outcome = session.record(obs(&[0.2, 0.8], 10.0));
        assert!(!outcome.best_changed);
        assert_eq!(session.best_weights().as_slice(), &[0.5, 0.5]);
    }

    #[test]
    fn test_dimension_check() {
        let session = Session::seeded(obs(&[0.5, 0.5], 1.0));
        assert!(session.check_dimension("s1", 2).is_ok());
        let err = session.check_dimension("s1", 3).unwrap_err();
        assert!(matches!(
            err,
            SessionError::DimensionMismatch {
                stored: 2,
                declared: 3,
                ..
            }
        ));
    }

    #[test]
    fn test_top_k_orders_descending() {
        let mut session = Session::seeded(obs(&[0.5, 0.5], 1.0));
        session.record(obs(&[0.1, 0.9], 3.0));
        session.record(obs(&[0.2, 0.8], 2.0));
        session.record(obs(&[0.3, 0.7], 4.0));

        let top: Vec<f64> = session
            .top_k(2)
            .iter()
            .map(|o| o.performance_metric)
            .collect();
        assert_eq!(top, vec![4.0, 3.0]);
        assert_eq!(session.top_k(10).len(), 4);
    }

    #[test]
    fn test_from_parts_rejects_ragged_history() {
        let err = Session::from_parts(
            "s1",
            2,
            1.0,
            WeightVector::new(vec![0.5, 0.5]),
            vec![obs(&[0.5, 0.5], 1.0), obs(&[0.2, 0.3, 0.5], 0.5)],
        )
        .unwrap_err();
        assert!(matches!(err, SessionError::CorruptLedger { .. }));
    }
}
