//! Session engine
//!
//! Orchestrates ledger reads and writes for the three request-facing
//! operations. `record` and `delete` hold the session's lock across the
//! whole read-modify-write; `propose` reads a snapshot without locking.
//!
//! Every error path returns before the single `set` call, so a failed
//! request never leaves a partially written ledger behind.

use mixtune_common::{
    MaxWeightConstraint, MixtuneError, Observation, Result, Session, WeightVector,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::fitter::DirichletFitter;
use crate::ledger::SessionLedger;
use crate::locks::SessionLocks;
use crate::policy::{Proposal, ProposalPolicy};
use crate::sampler::SimplexSampler;
use crate::store::KeyValueStore;
use crate::EngineConfig;

/// Result of recording one observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateResult {
    /// This call created the session
    pub created: bool,
    /// This call replaced the best observation
    pub best_changed: bool,
    pub best_performance_metric: f64,
    pub best_weights: WeightVector,
    pub num_observations: usize,
}

/// Adaptive weight-proposal engine over a key-value store
pub struct SessionEngine {
    ledger: SessionLedger,
    locks: SessionLocks,
    policy: ProposalPolicy,
}

impl SessionEngine {
    pub fn new(store: Arc<dyn KeyValueStore>, config: &EngineConfig) -> Self {
        let policy = ProposalPolicy::new(
            config.explore_threshold,
            config.top_k,
            SimplexSampler::new(config.sample_batch, config.max_batches),
            DirichletFitter::new(config.fit_tolerance, config.fit_max_iterations),
        );

        Self {
            ledger: SessionLedger::new(store, config.key_prefix.clone()),
            locks: SessionLocks::new(),
            policy,
        }
    }

    pub fn ledger(&self) -> &SessionLedger {
        &self.ledger
    }

    /// Current snapshot of a session
    pub async fn session(&self, session_id: &str) -> Result<Option<Session>> {
        self.ledger.load(session_id).await
    }

    /// Record an observation, creating the session on first use
    #[instrument(skip(self, weights))]
    pub async fn record(
        &self,
        session_id: &str,
        number_of_nodes: usize,
        weights: WeightVector,
        performance_metric: f64,
    ) -> Result<UpdateResult> {
        if weights.number_of_nodes() != number_of_nodes {
            return Err(MixtuneError::InvalidInput(format!(
                "Number of weights must equal number_of_nodes ({}), but got {}.",
                number_of_nodes,
                weights.number_of_nodes()
            )));
        }
        mixtune_common::validate_metric(performance_metric)?;

        let observation = Observation::new(weights, performance_metric);
        let _guard = self.locks.acquire(session_id).await;

        let Some(mut session) = self.ledger.load(session_id).await? else {
            let session = Session::seeded(observation);
            self.ledger.save(session_id, &session).await?;
            info!(session_id, "Created session");
            return Ok(UpdateResult {
                created: true,
                best_changed: true,
                best_performance_metric: session.best_performance_metric(),
                best_weights: session.best_weights().clone(),
                num_observations: session.num_observations(),
            });
        };

        session.check_dimension(session_id, number_of_nodes)?;
        let outcome = session.record(observation);
        self.ledger.save(session_id, &session).await?;

        debug!(
            session_id,
            num_observations = outcome.num_observations,
            best_changed = outcome.best_changed,
            "Recorded observation"
        );

        Ok(UpdateResult {
            created: false,
            best_changed: outcome.best_changed,
            best_performance_metric: session.best_performance_metric(),
            best_weights: session.best_weights().clone(),
            num_observations: outcome.num_observations,
        })
    }

    /// Delete a session; `false` if it did not exist
    #[instrument(skip(self))]
    pub async fn delete(&self, session_id: &str) -> Result<bool> {
        let _guard = self.locks.acquire(session_id).await;
        let removed = self.ledger.remove(session_id).await?;
        if removed {
            info!(session_id, "Deleted session");
        }
        Ok(removed)
    }

    /// Propose the next weight vector to try
    #[instrument(skip(self, bound))]
    pub async fn propose(
        &self,
        session_id: &str,
        number_of_nodes: usize,
        bound: &MaxWeightConstraint,
    ) -> Result<Proposal> {
        let snapshot = self.snapshot_for(session_id, number_of_nodes, bound).await?;
        self.policy
            .propose(&mut rand::thread_rng(), snapshot.as_ref(), bound)
            .map_err(MixtuneError::from)
    }

    /// [`SessionEngine::propose`] with a caller-supplied random source
    pub async fn propose_with_rng<R: Rng + Send>(
        &self,
        rng: &mut R,
        session_id: &str,
        number_of_nodes: usize,
        bound: &MaxWeightConstraint,
    ) -> Result<Proposal> {
        let snapshot = self.snapshot_for(session_id, number_of_nodes, bound).await?;
        self.policy
            .propose(rng, snapshot.as_ref(), bound)
            .map_err(MixtuneError::from)
    }

    /// Load the session and check the request against it.
    ///
    /// A corrupt ledger or a dimension mismatch is surfaced, never masked
    /// by a random proposal.
    async fn snapshot_for(
        &self,
        session_id: &str,
        number_of_nodes: usize,
        bound: &MaxWeightConstraint,
    ) -> Result<Option<Session>> {
        if bound.len() != number_of_nodes {
            return Err(MixtuneError::InvalidInput(format!(
                "Number of max_weightings must equal number_of_nodes ({}), but got {}.",
                number_of_nodes,
                bound.len()
            )));
        }

        let snapshot = self.ledger.load(session_id).await?;
        if let Some(session) = &snapshot {
            session.check_dimension(session_id, number_of_nodes)?;
        }
        Ok(snapshot)
    }
}
