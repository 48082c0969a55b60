//! Constrained simplex sampling
//!
//! Draws weight vectors from a Dirichlet distribution and keeps the first
//! one whose every coordinate sits strictly below its per-node bound.
//!
//! After acceptance the last coordinate is recomputed as `1 - sum(others)`
//! so the vector closes exactly. That fix-up can move the last coordinate
//! by a rounding error, so the candidate is re-checked against its bound
//! and discarded if the fix-up pushed it over (or below zero).

use mixtune_common::types::weights::close_simplex;
use mixtune_common::{MaxWeightConstraint, SamplingError, WeightVector};
use rand::Rng;
use rand_distr::{Dirichlet, Distribution};
use tracing::debug;

/// Rejection sampler over the probability simplex
#[derive(Debug, Clone)]
pub struct SimplexSampler {
    /// Dirichlet draws per batch
    batch_size: usize,
    /// Batches to try before giving up
    max_batches: usize,
}

impl Default for SimplexSampler {
    fn default() -> Self {
        Self::new(mixtune_common::DEFAULT_SAMPLE_BATCH, 1)
    }
}

impl SimplexSampler {
    pub fn new(batch_size: usize, max_batches: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            max_batches: max_batches.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Sample with the uninformative prior `[1, 1, ..., 1]`
    pub fn sample_uniform<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        bound: &MaxWeightConstraint,
    ) -> Result<WeightVector, SamplingError> {
        let concentration = vec![1.0; bound.len()];
        self.sample(rng, &concentration, bound)
    }

    /// Draw one admissible weight vector from `Dirichlet(concentration)`
    pub fn sample<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        concentration: &[f64],
        bound: &MaxWeightConstraint,
    ) -> Result<WeightVector, SamplingError> {
        if bound.len() != concentration.len() {
            return Err(SamplingError::BoundLength {
                bound: bound.len(),
                concentration: concentration.len(),
            });
        }
        if concentration.len() < 2 {
            return Err(SamplingError::InvalidConcentration(format!(
                "need at least 2 parameters, got {}",
                concentration.len()
            )));
        }
        if let Some(bad) = concentration.iter().find(|a| !a.is_finite() || **a <= 0.0) {
            return Err(SamplingError::InvalidConcentration(format!(
                "parameters must be positive and finite, got {}",
                bad
            )));
        }

        if !bound.is_feasible() {
            debug!(bounds = ?bound.as_slice(), "Max weight constraint is infeasible");
            return Err(SamplingError::EmptyAcceptanceSet {
                batch_size: self.batch_size,
                batches: 0,
            });
        }

        let dirichlet = Dirichlet::new(concentration)
            .map_err(|e| SamplingError::InvalidConcentration(e.to_string()))?;

        for batch in 0..self.max_batches {
            for _ in 0..self.batch_size {
                let mut candidate: Vec<f64> = dirichlet.sample(rng);
                if !bound.admits(&candidate) {
                    continue;
                }

                close_simplex(&mut candidate);
                let last = candidate[candidate.len() - 1];
                if last < 0.0 || !bound.admits(&candidate) {
                    continue;
                }

                if batch > 0 {
                    debug!(batch, "Accepted sample after retrying");
                }
                return Ok(WeightVector::new(candidate));
            }
        }

        Err(SamplingError::EmptyAcceptanceSet {
            batch_size: self.batch_size,
            batches: self.max_batches,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_uniform_sample_is_on_simplex() {
        let sampler = SimplexSampler::default();
        let mut rng = StdRng::seed_from_u64(7);
        let bound = MaxWeightConstraint::unbounded(4);

        for _ in 0..50 {
            let w = sampler.sample_uniform(&mut rng, &bound).unwrap();
            assert_eq!(w.number_of_nodes(), 4);
            assert!((w.sum() - 1.0).abs() < 1e-12);
            assert!(w.iter().all(|x| *x >= 0.0 && *x < 1.0));
        }
    }

    #[test]
    fn test_respects_tight_bounds() {
        let sampler = SimplexSampler::default();
        let mut rng = StdRng::seed_from_u64(11);
        let bound = MaxWeightConstraint::new(vec![0.3, 0.5, 0.6]);

        for _ in 0..50 {
            let w = sampler.sample_uniform(&mut rng, &bound).unwrap();
            assert!(bound.admits(&w), "sample {:?} violates {:?}", w, bound);
        }
    }

    #[test]
    fn test_same_seed_same_sample() {
        let sampler = SimplexSampler::default();
        let bound = MaxWeightConstraint::unbounded(3);
        let a = sampler
            .sample(&mut StdRng::seed_from_u64(3), &[2.0, 1.0, 4.0], &bound)
            .unwrap();
        let b = sampler
            .sample(&mut StdRng::seed_from_u64(3), &[2.0, 1.0, 4.0], &bound)
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_infeasible_bound_is_empty_acceptance() {
        let sampler = SimplexSampler::default();
        let mut rng = StdRng::seed_from_u64(1);
        let bound = MaxWeightConstraint::new(vec![0.5, 0.5]);

        let err = sampler.sample_uniform(&mut rng, &bound).unwrap_err();
        assert!(matches!(err, SamplingError::EmptyAcceptanceSet { .. }));
    }

    #[test]
    fn test_unlikely_region_exhausts_batch() {
        // Feasible, but concentrated mass on node 0 makes admission vanishingly rare
        let sampler = SimplexSampler::new(100, 2);
        let mut rng = StdRng::seed_from_u64(5);
        let bound = MaxWeightConstraint::new(vec![0.05, 1.0]);

        let err = sampler.sample(&mut rng, &[500.0, 1.0], &bound).unwrap_err();
        assert!(matches!(
            err,
            SamplingError::EmptyAcceptanceSet {
                batch_size: 100,
                batches: 2
            }
        ));
    }

    #[test]
    fn test_rejects_bad_concentration() {
        let sampler = SimplexSampler::default();
        let mut rng = StdRng::seed_from_u64(1);
        let bound = MaxWeightConstraint::unbounded(2);

        assert!(matches!(
            sampler.sample(&mut rng, &[1.0, -1.0], &bound),
            Err(SamplingError::InvalidConcentration(_))
        ));
        assert!(matches!(
            sampler.sample(&mut rng, &[1.0, 1.0, 1.0], &bound),
            Err(SamplingError::BoundLength { .. })
        ));
    }
}
