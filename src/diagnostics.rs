//! MCMC convergence diagnostics: split R-hat and effective sample size.
//!
//! Both follow the formulations in Vehtari et al. (2021), the same ones Stan
//! reports. R-hat compares within-chain to between-chain variance on
//! half-split chains; ESS discounts the pooled draw count by the chains'
//! autocorrelation, truncated with Geyer's initial positive sequence.

use crate::error::{Error, Result};
use crate::posterior::{Param, PosteriorSamples};
use tracing::debug;

#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

/// Pass/fail thresholds for [`check_convergence`].
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DiagnosticThresholds {
    /// Maximum acceptable split R-hat.
    pub rhat: f64,
    /// Minimum acceptable effective sample size, pooled over chains.
    pub ess: f64,
}

impl Default for DiagnosticThresholds {
    fn default() -> Self {
        Self {
            rhat: 1.01,
            ess: 400.0,
        }
    }
}

/// Diagnostics for a single model parameter.
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct ParamDiagnostic {
    /// Which parameter.
    pub param: Param,
    /// Split R-hat. Values near 1 indicate the chains agree.
    pub rhat: f64,
    /// Effective sample size across all chains.
    pub ess: f64,
    /// Whether this parameter passes both thresholds.
    pub converged: bool,
}

/// Convergence assessment for a whole posterior.
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct ConvergenceReport {
    /// Per-parameter diagnostics, in [`Param::ALL`] order.
    pub params: Vec<ParamDiagnostic>,
    /// Total divergent post-warmup transitions.
    pub divergences: usize,
    /// Thresholds the report was judged against.
    pub thresholds: DiagnosticThresholds,
    /// True only when every parameter converged and no draw was divergent.
    pub reliable: bool,
}

impl ConvergenceReport {
    /// Diagnostic for one parameter, if the report carries it.
    ///
    /// Reports built by [`check_convergence`] carry every parameter, but
    /// `params` is public and caller-constructible, so absence is
    /// representable.
    #[must_use]
    pub fn param(&self, param: Param) -> Option<&ParamDiagnostic> {
        self.params.iter().find(|d| d.param == param)
    }

    /// Worst (largest) R-hat across parameters.
    #[must_use]
    pub fn max_rhat(&self) -> f64 {
        self.params.iter().map(|d| d.rhat).fold(f64::NAN, f64::max)
    }

    /// Worst (smallest) ESS across parameters.
    #[must_use]
    pub fn min_ess(&self) -> f64 {
        self.params.iter().map(|d| d.ess).fold(f64::NAN, f64::min)
    }
}

/// Assess convergence of a posterior against the given thresholds.
///
/// # Errors
/// Returns [`Error::EmptyPosterior`] for a posterior with no draws,
/// [`Error::InsufficientChains`] for fewer than two chains, and
/// [`Error::InsufficientData`] when chains are too short to split.
pub fn check_convergence(
    posterior: &PosteriorSamples,
    thresholds: DiagnosticThresholds,
) -> Result<ConvergenceReport> {
    if posterior.is_empty() {
        return Err(Error::EmptyPosterior);
    }
    if posterior.n_chains() < 2 {
        return Err(Error::InsufficientChains {
            chains: posterior.n_chains(),
        });
    }
    if posterior.n_draws() < 4 {
        return Err(Error::InsufficientData {
            operation: "convergence diagnostics",
            required: 4,
            actual: posterior.n_draws(),
        });
    }

    let mut params = Vec::with_capacity(Param::ALL.len());
    for param in Param::ALL {
        let split = split_chains(posterior, param);
        let rhat = split_rhat(&split);
        let ess = effective_sample_size(&split);
        let converged = rhat <= thresholds.rhat && ess >= thresholds.ess;
        debug!(param = param.name(), rhat, ess, converged, "diagnostic");
        params.push(ParamDiagnostic {
            param,
            rhat,
            ess,
            converged,
        });
    }

    let divergences = posterior.divergences().iter().sum();
    let reliable = params.iter().all(|d| d.converged) && divergences == 0;
    Ok(ConvergenceReport {
        params,
        divergences,
        thresholds,
        reliable,
    })
}

/// Split every chain in half so within-chain trends show up as
/// between-chain disagreement.
fn split_chains(posterior: &PosteriorSamples, param: Param) -> Vec<Vec<f64>> {
    let half = posterior.n_draws() / 2;
    let mut out = Vec::with_capacity(2 * posterior.n_chains());
    for c in 0..posterior.n_chains() {
        let chain = posterior.chain(param, c);
        out.push(chain.iter().take(half).copied().collect());
        // Odd draw counts drop the middle draw.
        out.push(chain.iter().skip(posterior.n_draws() - half).copied().collect());
    }
    out
}

fn mean(xs: &[f64]) -> f64 {
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Sample variance (n - 1 denominator).
fn sample_var(xs: &[f64]) -> f64 {
    let m = mean(xs);
    xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (xs.len() - 1) as f64
}

/// Between/within variance decomposition shared by R-hat and ESS.
fn variance_components(chains: &[Vec<f64>]) -> (f64, f64, f64) {
    let m = chains.len() as f64;
    let n = chains[0].len() as f64;
    let chain_means: Vec<f64> = chains.iter().map(|c| mean(c)).collect();
    let grand = mean(&chain_means);
    let b = n / (m - 1.0)
        * chain_means
            .iter()
            .map(|cm| (cm - grand).powi(2))
            .sum::<f64>();
    let w = chains.iter().map(|c| sample_var(c)).sum::<f64>() / m;
    let var_hat = (n - 1.0) / n * w + b / n;
    (b, w, var_hat)
}

fn split_rhat(chains: &[Vec<f64>]) -> f64 {
    let (_, w, var_hat) = variance_components(chains);
    if w <= 0.0 {
        // All chains constant and identical: the posterior is a point mass.
        return if var_hat <= 0.0 { 1.0 } else { f64::INFINITY };
    }
    (var_hat / w).sqrt()
}

/// Multi-chain ESS with Geyer's initial positive sequence truncation.
fn effective_sample_size(chains: &[Vec<f64>]) -> f64 {
    let m = chains.len() as f64;
    let n = chains[0].len();
    let total = m * n as f64;
    let (_, w, var_hat) = variance_components(chains);
    if var_hat <= 0.0 {
        return total;
    }

    // Per-chain autocovariances, averaged, turned into pooled correlations.
    let mut rho = Vec::with_capacity(n);
    rho.push(1.0);
    let demeaned: Vec<Vec<f64>> = chains
        .iter()
        .map(|c| {
            let cm = mean(c);
            c.iter().map(|x| x - cm).collect()
        })
        .collect();
    for t in 1..n {
        let acov_t: f64 = demeaned
            .iter()
            .map(|c| c.iter().skip(t).zip(c.iter()).map(|(a, b)| a * b).sum::<f64>() / n as f64)
            .sum::<f64>()
            / m;
        rho.push(1.0 - (w - acov_t) / var_hat);
    }

    // Sum consecutive pairs while they stay positive, enforcing monotone
    // decrease as Stan does.
    let mut tau = 1.0;
    let mut prev_pair = f64::INFINITY;
    let mut t = 1;
    while t + 1 < rho.len() {
        let pair = rho[t] + rho[t + 1];
        if pair <= 0.0 {
            break;
        }
        let pair = pair.min(prev_pair);
        tau += 2.0 * pair;
        prev_pair = pair;
        t += 2;
    }

    (total / tau).min(total)
}
