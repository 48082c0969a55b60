//! Maximum-likelihood Dirichlet fit
//!
//! Mean/precision alternation: each round solves for the precision
//! `s = Σα` by Newton's method with the mean held fixed, then for the mean
//! `m = α / s` by Minka's fixed point with the precision held fixed:
//!
//! ```text
//! m_k ∝ ψ⁻¹( log x̄_k − Σ_j m_j (log x̄_j − ψ(s m_j)) )
//! ```
//!
//! Rounds stop once the log-likelihood moves by less than the tolerance,
//! relative to its magnitude. Tightly clustered samples drive the precision
//! very high; every stopping rule also accepts a step that has reached
//! floating-point noise.

use mixtune_common::SamplingError;
use statrs::function::gamma::{digamma, ln_gamma};

/// ψ(1) = -γ
const DIGAMMA_ONE: f64 = -0.577_215_664_901_532_9;

/// Newton iterations allowed when inverting the digamma function
const INV_DIGAMMA_ITERATIONS: usize = 10;
const INV_DIGAMMA_TOLERANCE: f64 = 1.48e-9;

/// Iterations allowed inside one precision or mean update
const INNER_ITERATIONS: usize = 1000;

/// Multiple of machine epsilon below which a residual is rounding noise
const NOISE_ULPS: f64 = 64.0;

/// Below this first-coordinate variance the samples are treated as identical
const MIN_SPREAD: f64 = 1e-12;

/// Fits Dirichlet concentration parameters to samples on the simplex
#[derive(Debug, Clone)]
pub struct DirichletFitter {
    tolerance: f64,
    max_iterations: usize,
}

impl Default for DirichletFitter {
    fn default() -> Self {
        Self::new(1e-7, 1000)
    }
}

impl DirichletFitter {
    /// `max_iterations` bounds the mean/precision rounds
    pub fn new(tolerance: f64, max_iterations: usize) -> Self {
        Self {
            tolerance,
            max_iterations: max_iterations.max(1),
        }
    }

    /// Fit concentration parameters to `samples`.
    ///
    /// Every sample must have the same length and strictly positive entries;
    /// a zero coordinate has no finite log-likelihood.
    pub fn fit<S: AsRef<[f64]>>(&self, samples: &[S]) -> Result<Vec<f64>, SamplingError> {
        let n = samples.len();
        if n < 2 {
            return Err(SamplingError::FitDivergence(format!(
                "need at least 2 samples, got {}",
                n
            )));
        }

        let k = samples[0].as_ref().len();
        if k < 2 {
            return Err(SamplingError::FitDivergence(format!(
                "need at least 2 dimensions, got {}",
                k
            )));
        }

        let mut log_mean = vec![0.0; k];
        let mut mean = vec![0.0; k];
        for sample in samples {
            let sample = sample.as_ref();
            if sample.len() != k {
                return Err(SamplingError::FitDivergence(format!(
                    "ragged samples: expected {} dimensions, got {}",
                    k,
                    sample.len()
                )));
            }
            for (j, &x) in sample.iter().enumerate() {
                if !x.is_finite() || x <= 0.0 {
                    return Err(SamplingError::FitDivergence(format!(
                        "sample coordinate {} on the simplex boundary",
                        x
                    )));
                }
                log_mean[j] += x.ln();
                mean[j] += x;
            }
        }
        let n_f = n as f64;
        log_mean.iter_mut().for_each(|v| *v /= n_f);
        mean.iter_mut().for_each(|v| *v /= n_f);

        let mut alpha = initial_alpha(samples, &mean)?;
        let mut likelihood = log_likelihood(n_f, &alpha, &log_mean);

        for _ in 0..self.max_iterations {
            let precision = self.fit_precision(&alpha, &log_mean)?;
            let next = self.fit_mean(precision, &alpha, &log_mean)?;
            ensure_valid(&next)?;

            let next_likelihood = log_likelihood(n_f, &next, &log_mean);
            if !next_likelihood.is_finite() {
                return Err(SamplingError::FitDivergence(
                    "log-likelihood is not finite".to_string(),
                ));
            }
            let threshold = (self.tolerance * likelihood.abs().max(1.0))
                .max(likelihood_noise(n_f, &next, &log_mean));
            if (next_likelihood - likelihood).abs() <= threshold {
                return Ok(next);
            }

            alpha = next;
            likelihood = next_likelihood;
        }

        Err(SamplingError::FitDivergence(format!(
            "no convergence after {} iterations",
            self.max_iterations
        )))
    }

    /// Newton's method on the precision with the mean of `alpha` held fixed
    fn fit_precision(&self, alpha: &[f64], log_mean: &[f64]) -> Result<f64, SamplingError> {
        let mut precision: f64 = alpha.iter().sum();
        let mean: Vec<f64> = alpha.iter().map(|a| a / precision).collect();
        let mean_log: f64 = mean.iter().zip(log_mean).map(|(m, lp)| m * lp).sum();
        let usable = |v: f64| v.is_finite() && v > 0.0;

        for _ in 0..INNER_ITERATIONS {
            let s = precision;
            let gradient =
                digamma(s) - mean.iter().map(|m| m * digamma(s * m)).sum::<f64>() + mean_log;
            if gradient.abs() <= NOISE_ULPS * f64::EPSILON * (digamma(s).abs() + mean_log.abs()) {
                return Ok(s);
            }
            let hessian =
                trigamma(s) - mean.iter().map(|m| m * m * trigamma(s * m)).sum::<f64>();

            // Newton on 1/s, then on log s, then plain Newton
            let mut next = if gradient + s * hessian < 0.0 {
                1.0 / (1.0 / s + gradient / (hessian * s * s))
            } else {
                f64::NAN
            };
            if !usable(next) {
                next = s * (-gradient / (s * hessian + gradient)).exp();
            }
            if !usable(next) {
                next = s - gradient / hessian;
            }
            if !usable(next) {
                return Err(SamplingError::FitDivergence(format!(
                    "precision update left the positive axis from {}",
                    s
                )));
            }

            precision = next;
            if (next - s).abs() <= self.tolerance * s.max(1.0) {
                return Ok(next);
            }
        }

        Err(SamplingError::FitDivergence(format!(
            "precision did not converge after {} iterations",
            INNER_ITERATIONS
        )))
    }

    /// Fixed point on the mean with the precision held fixed
    fn fit_mean(
        &self,
        precision: f64,
        alpha: &[f64],
        log_mean: &[f64],
    ) -> Result<Vec<f64>, SamplingError> {
        let total: f64 = alpha.iter().sum();
        let mut current: Vec<f64> = alpha.iter().map(|a| a / total * precision).collect();

        for _ in 0..INNER_ITERATIONS {
            let shift: f64 = current
                .iter()
                .zip(log_mean)
                .map(|(a, lp)| a / precision * (digamma(*a) - lp))
                .sum();
            let raw = log_mean
                .iter()
                .map(|lp| inv_digamma(lp + shift))
                .collect::<Result<Vec<f64>, SamplingError>>()?;
            let raw_total: f64 = raw.iter().sum();
            let next: Vec<f64> = raw.iter().map(|a| a / raw_total * precision).collect();
            ensure_valid(&next)?;

            let step = next
                .iter()
                .zip(&current)
                .map(|(x, y)| (x - y).powi(2))
                .sum::<f64>()
                .sqrt();
            current = next;
            if step <= self.tolerance * precision.max(1.0) {
                return Ok(current);
            }
        }

        Err(SamplingError::FitDivergence(format!(
            "mean did not converge after {} iterations",
            INNER_ITERATIONS
        )))
    }
}

/// Moment-matched starting point: `α = s · E[x]` with
/// `s = (E[x₀] − E[x₀²]) / Var[x₀]`
fn initial_alpha<S: AsRef<[f64]>>(samples: &[S], mean: &[f64]) -> Result<Vec<f64>, SamplingError> {
    let n = samples.len() as f64;
    let variance = samples
        .iter()
        .map(|s| (s.as_ref()[0] - mean[0]).powi(2))
        .sum::<f64>()
        / n;
    if variance.is_nan() || variance <= MIN_SPREAD {
        return Err(SamplingError::FitDivergence(
            "samples have no spread".to_string(),
        ));
    }

    let second_moment = variance + mean[0] * mean[0];
    let precision = (mean[0] - second_moment) / variance;
    let alpha: Vec<f64> = mean.iter().map(|m| precision * m).collect();
    ensure_valid(&alpha)?;
    Ok(alpha)
}

fn ensure_valid(alpha: &[f64]) -> Result<(), SamplingError> {
    match alpha.iter().find(|a| !a.is_finite() || **a <= 0.0) {
        Some(bad) => Err(SamplingError::FitDivergence(format!(
            "invalid concentration parameter {}",
            bad
        ))),
        None => Ok(()),
    }
}

/// Rounding error carried by [`log_likelihood`] at `alpha`
fn likelihood_noise(n: f64, alpha: &[f64], log_mean: &[f64]) -> f64 {
    let total: f64 = alpha.iter().sum();
    let magnitude = ln_gamma(total).abs()
        + alpha
            .iter()
            .zip(log_mean)
            .map(|(a, lp)| ln_gamma(*a).abs() + ((a - 1.0) * lp).abs())
            .sum::<f64>();
    NOISE_ULPS * f64::EPSILON * n * magnitude
}

fn log_likelihood(n: f64, alpha: &[f64], log_mean: &[f64]) -> f64 {
    let total: f64 = alpha.iter().sum();
    let per_dim: f64 = alpha
        .iter()
        .zip(log_mean)
        .map(|(a, lp)| (a - 1.0) * lp - ln_gamma(*a))
        .sum();
    n * (ln_gamma(total) + per_dim)
}

/// Solve ψ(x) = y by Newton's method
fn inv_digamma(y: f64) -> Result<f64, SamplingError> {
    let mut x = if y >= -2.22 {
        y.exp() + 0.5
    } else {
        -1.0 / (y - DIGAMMA_ONE)
    };

    for _ in 0..INV_DIGAMMA_ITERATIONS {
        let next = x - (digamma(x) - y) / trigamma(x);
        if (next - x).abs() < INV_DIGAMMA_TOLERANCE * x.abs().max(1.0) {
            return Ok(next);
        }
        x = next;
    }

    Err(SamplingError::FitDivergence(format!(
        "inverse digamma did not converge for {}",
        y
    )))
}

/// ψ′(x) for x > 0: recurrence up to x ≥ 6, then the asymptotic series
fn trigamma(mut x: f64) -> f64 {
    let mut acc = 0.0;
    while x < 6.0 {
        acc += 1.0 / (x * x);
        x += 1.0;
    }
    let inv = 1.0 / x;
    let inv2 = inv * inv;
    acc + inv
        + inv2 / 2.0
        + inv * inv2 * (1.0 / 6.0 - inv2 * (1.0 / 30.0 - inv2 * (1.0 / 42.0 - inv2 / 30.0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Dirichlet, Distribution};

    #[test]
    fn test_trigamma_known_values() {
        // ψ′(1) = π²/6
        let expected = std::f64::consts::PI.powi(2) / 6.0;
        assert!((trigamma(1.0) - expected).abs() < 1e-9);
        // ψ′(x+1) = ψ′(x) − 1/x²
        assert!((trigamma(3.5) - (trigamma(2.5) - 1.0 / 6.25)).abs() < 1e-9);
    }

    #[test]
    fn test_inv_digamma_round_trips() {
        for x in [0.05, 0.5, 1.0, 3.0, 40.0] {
            let y = digamma(x);
            let back = inv_digamma(y).unwrap();
            assert!((back - x).abs() / x < 1e-6, "x={} back={}", x, back);
        }
    }

    #[test]
    fn test_recovers_known_parameters() {
        let truth = [2.0, 5.0, 3.0];
        let dirichlet = Dirichlet::new(&truth[..]).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let samples: Vec<Vec<f64>> = (0..5000).map(|_| dirichlet.sample(&mut rng)).collect();

        let alpha = DirichletFitter::new(1e-6, 10_000).fit(&samples).unwrap();
        for (fitted, expected) in alpha.iter().zip(truth.iter()) {
            let rel = (fitted - expected).abs() / expected;
            assert!(rel < 0.15, "fitted {:?} vs truth {:?}", alpha, truth);
        }
    }

    #[test]
    fn test_small_top_k_sample_fits() {
        let dirichlet = Dirichlet::new(&[8.0, 2.0][..]).unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        let samples: Vec<Vec<f64>> = (0..20).map(|_| dirichlet.sample(&mut rng)).collect();

        let alpha = DirichletFitter::default().fit(&samples).unwrap();
        assert_eq!(alpha.len(), 2);
        assert!(alpha.iter().all(|a| a.is_finite() && *a > 0.0));
        // Mean of the fitted distribution favours the first node
        assert!(alpha[0] / (alpha[0] + alpha[1]) > 0.6);
    }

    #[test]
    fn test_fits_clustered_top_k() {
        let samples: Vec<Vec<f64>> = (0..20)
            .map(|i| {
                let x = 0.88 + 0.04 * i as f64 / 19.0;
                vec![x, 1.0 - x]
            })
            .collect();

        let alpha = DirichletFitter::default().fit(&samples).unwrap();
        let mean = alpha[0] / (alpha[0] + alpha[1]);
        assert!((mean - 0.9).abs() < 1e-3, "fitted {:?}", alpha);
        assert!(alpha[0] + alpha[1] > 100.0);
    }

    #[test]
    fn test_fits_near_converged_top_k() {
        // Spread of 1e-5 around 0.9 pushes the precision past 1e9
        let samples: Vec<Vec<f64>> = (0..20)
            .map(|i| {
                let x = 0.9 + 1e-5 * (i as f64 - 9.5) / 9.5;
                vec![x, 1.0 - x]
            })
            .collect();

        let alpha = DirichletFitter::default().fit(&samples).unwrap();
        assert!(alpha.iter().all(|a| a.is_finite() && *a > 0.0));
        let mean = alpha[0] / (alpha[0] + alpha[1]);
        assert!((mean - 0.9).abs() < 1e-4, "fitted {:?}", alpha);
    }

    #[test]
    fn test_identical_samples_diverge() {
        let samples = vec![vec![0.3, 0.7]; 20];
        let err = DirichletFitter::default().fit(&samples).unwrap_err();
        assert!(matches!(err, SamplingError::FitDivergence(_)));
    }

    #[test]
    fn test_boundary_samples_diverge() {
        let samples = vec![vec![0.0, 1.0], vec![0.4, 0.6], vec![0.5, 0.5]];
        let err = DirichletFitter::default().fit(&samples).unwrap_err();
        assert!(err.to_string().contains("boundary"));
    }

    #[test]
    fn test_too_few_samples() {
        let samples = vec![vec![0.4, 0.6]];
        assert!(DirichletFitter::default().fit(&samples).is_err());
    }
}
