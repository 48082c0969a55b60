//! Explore/exploit proposal policy
//!
//! The mode is decided fresh on every request from the session's
//! observation count. Nothing here touches the store.
//!
//! - `num_observations <= explore_threshold`: sample from `Dirichlet(1, ..., 1)`
//! - otherwise: fit a Dirichlet to the `top_k` best observations and sample
//!   from the fit; a fit or sampling failure falls back to exploration and
//!   is reported on the proposal

use mixtune_common::{
    ErrorKind, MaxWeightConstraint, SamplingError, Session, WeightVector,
    DEFAULT_EXPLORE_THRESHOLD, DEFAULT_TOP_K,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::fitter::DirichletFitter;
use crate::sampler::SimplexSampler;

/// Which branch of the policy a request takes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalMode {
    Explore,
    Exploit,
}

/// How a proposal was produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ProposalResult {
    /// Sampled from a Dirichlet fitted to the best observations
    Fitted { concentration: Vec<f64> },
    /// Exploitation failed; sampled from the uninformative prior instead
    RandomAfterFitFailure { kind: ErrorKind, message: String },
    /// Too few observations to exploit
    RandomInsufficientData,
}

impl ProposalResult {
    pub fn tag(&self) -> &'static str {
        match self {
            ProposalResult::Fitted { .. } => "fitted",
            ProposalResult::RandomAfterFitFailure { .. } => "random_after_fit_failure",
            ProposalResult::RandomInsufficientData => "random_insufficient_data",
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, ProposalResult::RandomAfterFitFailure { .. })
    }
}

/// A proposed weight vector and how it was obtained
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub weights: WeightVector,
    #[serde(flatten)]
    pub result: ProposalResult,
}

/// Decides between exploration and exploitation for one request
#[derive(Debug, Clone)]
pub struct ProposalPolicy {
    explore_threshold: usize,
    top_k: usize,
    sampler: SimplexSampler,
    fitter: DirichletFitter,
}

impl Default for ProposalPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_EXPLORE_THRESHOLD,
            DEFAULT_TOP_K,
            SimplexSampler::default(),
            DirichletFitter::default(),
        )
    }
}

impl ProposalPolicy {
    pub fn new(
        explore_threshold: usize,
        top_k: usize,
        sampler: SimplexSampler,
        fitter: DirichletFitter,
    ) -> Self {
        Self {
            explore_threshold,
            top_k,
            sampler,
            fitter,
        }
    }

    pub fn mode_for(&self, num_observations: usize) -> ProposalMode {
        if num_observations <= self.explore_threshold {
            ProposalMode::Explore
        } else {
            ProposalMode::Exploit
        }
    }

    /// Propose the next weight vector for a session snapshot.
    ///
    /// `session` is `None` for a session with no recorded observations.
    /// Only an exploration failure is returned as an error.
    pub fn propose<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        session: Option<&Session>,
        bound: &MaxWeightConstraint,
    ) -> Result<Proposal, SamplingError> {
        let num_observations = session.map_or(0, Session::num_observations);

        let session = match (self.mode_for(num_observations), session) {
            (ProposalMode::Exploit, Some(session)) => session,
            _ => {
                debug!(num_observations, mode = "explore", "Not enough data to fit");
                let weights = self.sampler.sample_uniform(rng, bound)?;
                return Ok(Proposal {
                    weights,
                    result: ProposalResult::RandomInsufficientData,
                });
            }
        };

        match self.exploit(rng, session, bound) {
            Ok(proposal) => Ok(proposal),
            Err(e) if e.is_recoverable() => {
                warn!(
                    num_observations,
                    error = %e,
                    "Exploitation failed, falling back to exploration"
                );
                let weights = self.sampler.sample_uniform(rng, bound)?;
                Ok(Proposal {
                    weights,
                    result: ProposalResult::RandomAfterFitFailure {
                        kind: e.kind(),
                        message: e.to_string(),
                    },
                })
            }
            Err(e) => Err(e),
        }
    }

    fn exploit<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        session: &Session,
        bound: &MaxWeightConstraint,
    ) -> Result<Proposal, SamplingError> {
        let best: Vec<&[f64]> = session
            .top_k(self.top_k)
            .into_iter()
            .map(|o| o.weights.as_slice())
            .collect();

        let concentration = self.fitter.fit(&best)?;
        debug!(?concentration, mode = "exploit", "Fitted concentration");

        let weights = self.sampler.sample(rng, &concentration, bound)?;
        Ok(Proposal {
            weights,
            result: ProposalResult::Fitted { concentration },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mixtune_common::Observation;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Dirichlet, Distribution};

    fn session_with(n: usize, seed: u64) -> Session {
        let dirichlet = Dirichlet::new(&[6.0, 2.0][..]).unwrap();
        let mut rng = StdRng::seed_from_u64(seed);
        let mut draw = || -> Observation {
            let w: Vec<f64> = dirichlet.sample(&mut rng);
            // Closer to [0.9, 0.1] scores higher
            let metric = 1.0 / ((w[0] - 0.9).powi(2) + (w[1] - 0.1).powi(2));
            Observation::new(w, metric)
        };

        let mut session = Session::seeded(draw());
        for _ in 1..n {
            session.record(draw());
        }
        session
    }

    #[test]
    fn test_mode_boundary() {
        let policy = ProposalPolicy::default();
        assert_eq!(policy.mode_for(0), ProposalMode::Explore);
        assert_eq!(policy.mode_for(50), ProposalMode::Explore);
        assert_eq!(policy.mode_for(51), ProposalMode::Exploit);
    }

    #[test]
    fn test_missing_session_explores() {
        let policy = ProposalPolicy::default();
        let mut rng = StdRng::seed_from_u64(1);
        let bound = MaxWeightConstraint::unbounded(2);

        let proposal = policy.propose(&mut rng, None, &bound).unwrap();
        assert_eq!(proposal.result, ProposalResult::RandomInsufficientData);
        assert!((proposal.weights.sum() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_fifty_observations_explore() {
        let policy = ProposalPolicy::default();
        let session = session_with(50, 2);
        let mut rng = StdRng::seed_from_u64(2);
        let proposal = policy
            .propose(&mut rng, Some(&session), &MaxWeightConstraint::unbounded(2))
            .unwrap();
        assert_eq!(proposal.result.tag(), "random_insufficient_data");
    }

    #[test]
    fn test_fifty_one_observations_exploit() {
        let policy = ProposalPolicy::default();
        let session = session_with(51, 3);
        let mut rng = StdRng::seed_from_u64(3);
        let proposal = policy
            .propose(&mut rng, Some(&session), &MaxWeightConstraint::unbounded(2))
            .unwrap();
        assert_eq!(proposal.result.tag(), "fitted");
        assert!((proposal.weights.sum() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_converging_session_keeps_exploiting() {
        let policy = ProposalPolicy::default();
        let mut session = session_with(51, 6);
        let mut rng = StdRng::seed_from_u64(6);
        let bound = MaxWeightConstraint::unbounded(2);

        // Feed proposals back until the top observations cluster around the optimum
        for round in 0..150 {
            let proposal = policy.propose(&mut rng, Some(&session), &bound).unwrap();
            assert_eq!(
                proposal.result.tag(),
                "fitted",
                "round {}: {:?}",
                round,
                proposal.result
            );
            let w = proposal.weights.into_inner();
            let metric = 1.0 / ((w[0] - 0.9).powi(2) + (w[1] - 0.1).powi(2));
            session.record(Observation::new(w, metric));
        }

        let best = session.best_weights();
        assert!((best[0] - 0.9).abs() < 0.01, "best {:?}", best);
    }

    #[test]
    fn test_fit_failure_degrades_to_explore() {
        let policy = ProposalPolicy::default();
        let mut session = Session::seeded(Observation::new(vec![0.5, 0.5], 1.0));
        for _ in 0..60 {
            session.record(Observation::new(vec![0.5, 0.5], 1.0));
        }

        let mut rng = StdRng::seed_from_u64(4);
        let proposal = policy
            .propose(&mut rng, Some(&session), &MaxWeightConstraint::unbounded(2))
            .unwrap();
        match proposal.result {
            ProposalResult::RandomAfterFitFailure { kind, ref message } => {
                assert_eq!(kind, ErrorKind::FitDivergence);
                assert!(!message.is_empty());
            }
            other => panic!("expected degraded result, got {:?}", other),
        }
    }

    #[test]
    fn test_exploration_failure_is_an_error() {
        let policy = ProposalPolicy::default();
        let mut rng = StdRng::seed_from_u64(5);
        let bound = MaxWeightConstraint::new(vec![0.4, 0.4]);

        let err = policy.propose(&mut rng, None, &bound).unwrap_err();
        assert!(matches!(err, SamplingError::EmptyAcceptanceSet { .. }));
    }

    #[test]
    fn test_proposal_serializes_with_result_tag() {
        let proposal = Proposal {
            weights: WeightVector::new(vec![0.5, 0.5]),
            result: ProposalResult::RandomInsufficientData,
        };
        let json = serde_json::to_value(&proposal).unwrap();
        assert_eq!(json["result"], "random_insufficient_data");
        assert_eq!(json["weights"][0], 0.5);
    }
}
