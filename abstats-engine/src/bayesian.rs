//! Beta-Binomial analysis of conversion rates.
//!
//! Each variant's conversion rate gets a uniform Beta(1, 1) prior, updated to
//! Beta(1 + conversions, 1 + non-conversions). `prob_b_better` is estimated
//! by drawing paired samples from both posteriors with a fixed seed, so the
//! same dataset always produces the same estimate.

use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use statrs::distribution::{Beta, ContinuousCDF};

use crate::errors::{AnalysisError, AnalysisResult};
use crate::metrics::{round_to, VariantMetrics};

pub const PRIOR_ALPHA: f64 = 1.0;
pub const PRIOR_BETA: f64 = 1.0;
pub const POSTERIOR_DRAWS: usize = 10_000;
pub const POSTERIOR_SEED: u64 = 42;
/// Central credible mass
pub const CREDIBLE_MASS: f64 = 0.95;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posterior {
    pub alpha: f64,
    pub beta: f64,
    /// Central 95% credible interval for the conversion rate
    pub credible_interval: [f64; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BayesianAnalysis {
    pub variant_a: Posterior,
    pub variant_b: Posterior,
    pub prob_b_better: f64,
    pub draws: usize,
    pub seed: u64,
}

/// Posterior summary of both variants.
pub fn beta_binomial(a: &VariantMetrics, b: &VariantMetrics) -> AnalysisResult<BayesianAnalysis> {
    beta_binomial_with(a, b, POSTERIOR_DRAWS, POSTERIOR_SEED)
}

pub fn beta_binomial_with(
    a: &VariantMetrics,
    b: &VariantMetrics,
    draws: usize,
    seed: u64,
) -> AnalysisResult<BayesianAnalysis> {
    let (dist_a, variant_a) = posterior(a)?;
    let (dist_b, variant_b) = posterior(b)?;

    Ok(BayesianAnalysis {
        variant_a,
        variant_b,
        prob_b_better: round_to(prob_b_better(&dist_a, &dist_b, draws, seed), 4),
        draws,
        seed,
    })
}

#[allow(clippy::cast_precision_loss)]
fn posterior(metrics: &VariantMetrics) -> AnalysisResult<(Beta, Posterior)> {
    let alpha = PRIOR_ALPHA + metrics.conversions as f64;
    let beta = PRIOR_BETA + metrics.non_conversions() as f64;
    let dist = Beta::new(alpha, beta)
        .map_err(|e| AnalysisError::numeric_failure("beta posterior", &e.to_string()))?;

    let tail = (1.0 - CREDIBLE_MASS) / 2.0;
    let credible_interval = [
        round_to(dist.inverse_cdf(tail), 4),
        round_to(dist.inverse_cdf(1.0 - tail), 4),
    ];

    Ok((
        dist,
        Posterior {
            alpha,
            beta,
            credible_interval,
        },
    ))
}

/// Share of paired posterior draws where B's rate exceeds A's.
#[allow(clippy::cast_precision_loss)]
fn prob_b_better(a: &Beta, b: &Beta, draws: usize, seed: u64) -> f64 {
    if draws == 0 {
        return 0.5;
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let wins = (0..draws)
        .filter(|_| {
            let sample_a = a.sample(&mut rng);
            let sample_b = b.sample(&mut rng);
            sample_b > sample_a
        })
        .count();
    wins as f64 / draws as f64
}
