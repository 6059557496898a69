//! Posterior sample storage: one homogeneous array per parameter.
//!
//! No library-specific trace object; each parameter is a `chains x draws`
//! panel, pooled across chains only when a consumer asks for it.

use ndarray::{Array2, ArrayView1, Axis};

#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

/// Model parameters with posterior draws.
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Param {
    /// Change-point index.
    Tau,
    /// Regime mean before the change point.
    Mu1,
    /// Regime mean after the change point.
    Mu2,
    /// Regime standard deviation before the change point.
    Sigma1,
    /// Regime standard deviation after the change point.
    Sigma2,
}

impl Param {
    /// All parameters, in reporting order.
    pub const ALL: [Param; 5] = [
        Param::Tau,
        Param::Mu1,
        Param::Mu2,
        Param::Sigma1,
        Param::Sigma2,
    ];

    /// Display name used in reports and logs.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Param::Tau => "tau",
            Param::Mu1 => "mu_1",
            Param::Mu2 => "mu_2",
            Param::Sigma1 => "sigma_1",
            Param::Sigma2 => "sigma_2",
        }
    }
}

/// Posterior draws of (τ, μ₁, μ₂, σ₁, σ₂) from one or more chains.
///
/// Each panel has shape `chains x draws`; all panels share the same shape.
/// τ draws are stored as `f64` for uniform downstream handling but every
/// draw is an exact integer within
/// `[min_segment_length, n - min_segment_length]`.
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct PosteriorSamples {
    pub(crate) tau: Array2<f64>,
    pub(crate) mu1: Array2<f64>,
    pub(crate) mu2: Array2<f64>,
    pub(crate) sigma1: Array2<f64>,
    pub(crate) sigma2: Array2<f64>,
    /// Divergent post-warmup transitions per chain.
    pub(crate) divergences: Vec<usize>,
}

impl PosteriorSamples {
    /// Number of chains.
    #[must_use]
    pub fn n_chains(&self) -> usize {
        self.tau.nrows()
    }

    /// Draws per chain.
    #[must_use]
    pub fn n_draws(&self) -> usize {
        self.tau.ncols()
    }

    /// Whether the posterior contains no draws.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tau.is_empty()
    }

    /// The `chains x draws` panel for a parameter.
    #[must_use]
    pub fn panel(&self, param: Param) -> &Array2<f64> {
        match param {
            Param::Tau => &self.tau,
            Param::Mu1 => &self.mu1,
            Param::Mu2 => &self.mu2,
            Param::Sigma1 => &self.sigma1,
            Param::Sigma2 => &self.sigma2,
        }
    }

    /// One chain's draws for a parameter.
    #[must_use]
    pub fn chain(&self, param: Param, chain: usize) -> ArrayView1<'_, f64> {
        self.panel(param).index_axis(Axis(0), chain)
    }

    /// All draws for a parameter, pooled across chains.
    #[must_use]
    pub fn pooled(&self, param: Param) -> Vec<f64> {
        self.panel(param).iter().copied().collect()
    }

    /// Posterior mean of a parameter over all pooled draws.
    #[must_use]
    pub fn pooled_mean(&self, param: Param) -> f64 {
        let panel = self.panel(param);
        panel.iter().sum::<f64>() / panel.len() as f64
    }

    /// Divergent post-warmup transitions per chain.
    #[must_use]
    pub fn divergences(&self) -> &[usize] {
        &self.divergences
    }

    /// Fraction of all post-warmup draws that were divergent.
    #[must_use]
    pub fn divergence_rate(&self) -> f64 {
        let total = self.tau.len();
        if total == 0 {
            return 0.0;
        }
        self.divergences.iter().sum::<usize>() as f64 / total as f64
    }

    /// Whether the sampler reported any divergent transitions.
    #[must_use]
    pub fn has_divergences(&self) -> bool {
        self.divergences.iter().any(|&d| d > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn two_by_three() -> PosteriorSamples {
        PosteriorSamples {
            tau: array![[10.0, 11.0, 10.0], [12.0, 10.0, 11.0]],
            mu1: array![[0.1, 0.2, 0.3], [0.2, 0.2, 0.2]],
            mu2: array![[1.0, 1.1, 0.9], [1.0, 1.0, 1.0]],
            sigma1: array![[0.5, 0.6, 0.5], [0.5, 0.5, 0.6]],
            sigma2: array![[0.8, 0.8, 0.9], [0.9, 0.8, 0.8]],
            divergences: vec![1, 0],
        }
    }

    #[test]
    fn shape_and_pooling() {
        let post = two_by_three();
        assert_eq!(post.n_chains(), 2);
        assert_eq!(post.n_draws(), 3);
        assert_eq!(post.pooled(Param::Tau).len(), 6);
        assert::close(post.pooled_mean(Param::Tau), 64.0 / 6.0, 1e-12);
    }

    #[test]
    fn divergence_accounting() {
        let post = two_by_three();
        assert!(post.has_divergences());
        assert::close(post.divergence_rate(), 1.0 / 6.0, 1e-12);
    }
}
