//! The single-change-point generative model and its MCMC sampler.
//!
//! Model, for a series `y` of length `n`:
//!
//! ```text
//! τ  ~ DiscreteUniform(min_segment_length, n - min_segment_length)
//! μ₁, μ₂ ~ Normal(mean(y), std(y) * prior_std_scale)
//! σ₁, σ₂ ~ HalfNormal(std(y) * prior_std_scale)
//! y_t ~ Normal(μ₁, σ₁) if t < τ else Normal(μ₂, σ₂)
//! ```
//!
//! τ is discrete, so gradient-based samplers cannot update it directly. The
//! sampler here alternates a collapsed discrete Gibbs step on τ (categorical
//! over all candidate breakpoints, O(n) per sweep via prefix sums), exact
//! conjugate Gibbs steps on μ₁/μ₂, and adaptive log-space random-walk
//! Metropolis steps on σ₁/σ₂. Chains run in parallel with independent seeded
//! generators; draws are bit-identical for a fixed seed.

use crate::error::{Error, Result};
use crate::posterior::PosteriorSamples;
use crate::series::Series;
use ndarray::Array2;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use rv::dist::{Categorical, Gaussian};
use rv::misc::logsumexp;
use rv::traits::Rv;
use std::f64::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// Divergent-draw fraction above which a fit is rejected outright.
const DIVERGENCE_CEILING: f64 = 0.10;

/// Prior configuration for [`ChangePointModel`].
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PriorConfig {
    /// Minimum observations required on each side of the change point.
    pub min_segment_length: usize,
    /// Width of the parameter priors relative to the data's standard
    /// deviation.
    pub prior_std_scale: f64,
}

impl Default for PriorConfig {
    fn default() -> Self {
        Self {
            min_segment_length: 30,
            prior_std_scale: 2.0,
        }
    }
}

/// Sampler configuration for [`ChangePointModel::fit`].
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FitOptions {
    /// Post-warmup draws per chain.
    pub samples: usize,
    /// Warmup draws per chain, discarded from the output.
    pub tune: usize,
    /// Independent chains. Two or more are needed for R-hat.
    pub chains: usize,
    /// Target acceptance rate for the Metropolis steps on σ₁/σ₂.
    pub target_accept: f64,
    /// Seed for reproducible draws; `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            samples: 2000,
            tune: 1000,
            chains: 2,
            target_accept: 0.95,
            seed: None,
        }
    }
}

/// A built single-change-point model over a fixed series.
///
/// Construction validates the configuration against the data, so a model
/// value is always fit-ready; configuration errors surface before any
/// sampling compute is spent.
#[derive(Clone, Debug)]
pub struct ChangePointModel {
    values: Vec<f64>,
    prior: PriorConfig,
    /// Empirical mean, the center of the μ priors.
    data_mean: f64,
    /// `std(y) * prior_std_scale`, the scale of all parameter priors.
    prior_scale: f64,
    /// Inclusive candidate range for τ.
    tau_lo: usize,
    tau_hi: usize,
    /// Prefix sums of y and y² for O(1) segment likelihoods.
    sum: Vec<f64>,
    sum_sq: Vec<f64>,
}

impl ChangePointModel {
    /// Build the model for a series under the given priors.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] when `min_segment_length` is zero or
    /// too large for the series, when `prior_std_scale` is not positive, or
    /// when the series has zero variance (no regime structure to infer).
    pub fn new(series: &Series, prior: PriorConfig) -> Result<Self> {
        let n = series.len();
        if prior.min_segment_length < 1 {
            return Err(Error::Configuration {
                parameter: "min_segment_length",
                value: prior.min_segment_length.to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if 2 * prior.min_segment_length > n {
            return Err(Error::Configuration {
                parameter: "min_segment_length",
                value: prior.min_segment_length.to_string(),
                reason: format!(
                    "needs 2 * min_segment_length <= series length, but series has {n} observations"
                ),
            });
        }
        if !(prior.prior_std_scale > 0.0 && prior.prior_std_scale.is_finite()) {
            return Err(Error::Configuration {
                parameter: "prior_std_scale",
                value: prior.prior_std_scale.to_string(),
                reason: "must be a positive finite number".to_string(),
            });
        }
        let data_std = series.std();
        if !(data_std > 0.0) {
            return Err(Error::Configuration {
                parameter: "series",
                value: format!("std = {data_std}"),
                reason: "series has zero variance; regime parameters are unidentifiable"
                    .to_string(),
            });
        }

        let values = series.values().to_vec();
        let mut sum = Vec::with_capacity(n + 1);
        let mut sum_sq = Vec::with_capacity(n + 1);
        sum.push(0.0);
        sum_sq.push(0.0);
        for &v in &values {
            sum.push(sum.last().copied().unwrap_or(0.0) + v);
            sum_sq.push(sum_sq.last().copied().unwrap_or(0.0) + v * v);
        }

        Ok(Self {
            values,
            prior,
            data_mean: series.mean(),
            prior_scale: data_std * prior.prior_std_scale,
            tau_lo: prior.min_segment_length,
            tau_hi: n - prior.min_segment_length,
            sum,
            sum_sq,
        })
    }

    /// The prior configuration the model was built with.
    #[must_use]
    pub fn prior(&self) -> PriorConfig {
        self.prior
    }

    /// Inclusive candidate range for τ.
    #[must_use]
    pub fn tau_bounds(&self) -> (usize, usize) {
        (self.tau_lo, self.tau_hi)
    }

    /// Draw posterior samples.
    ///
    /// Runs `opts.chains` chains in parallel, each with `opts.tune` adaptive
    /// warmup sweeps followed by `opts.samples` recorded sweeps.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] for invalid options and
    /// [`Error::FatalSampling`] when more than 10% of post-warmup draws are
    /// divergent. A smaller number of divergences is non-fatal and surfaced
    /// through [`PosteriorSamples::divergences`].
    pub fn fit(&self, opts: &FitOptions) -> Result<PosteriorSamples> {
        let cancel = AtomicBool::new(false);
        self.fit_with_cancel(opts, &cancel)
    }

    /// [`Self::fit`] with external cancellation.
    ///
    /// The flag is polled between sweeps; a cancelled fit returns
    /// [`Error::Cancelled`] and never partial samples.
    ///
    /// # Errors
    /// As [`Self::fit`], plus [`Error::Cancelled`].
    pub fn fit_with_cancel(
        &self,
        opts: &FitOptions,
        cancel: &AtomicBool,
    ) -> Result<PosteriorSamples> {
        validate_options(opts)?;
        let base_seed = opts.seed.unwrap_or_else(|| rand::thread_rng().gen());
        debug!(
            n = self.values.len(),
            chains = opts.chains,
            samples = opts.samples,
            tune = opts.tune,
            seed = base_seed,
            "starting change point MCMC"
        );

        let runs: Result<Vec<ChainRun>> = (0..opts.chains)
            .into_par_iter()
            .map(|chain| {
                let seed = base_seed.wrapping_add((chain as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
                self.run_chain(opts, seed, cancel)
            })
            .collect();
        let runs = runs?;

        let chains = opts.chains;
        let draws = opts.samples;
        let mut tau = Array2::zeros((chains, draws));
        let mut mu1 = Array2::zeros((chains, draws));
        let mut mu2 = Array2::zeros((chains, draws));
        let mut sigma1 = Array2::zeros((chains, draws));
        let mut sigma2 = Array2::zeros((chains, draws));
        let mut divergences = Vec::with_capacity(chains);
        for (c, run) in runs.into_iter().enumerate() {
            for d in 0..draws {
                tau[(c, d)] = run.tau[d];
                mu1[(c, d)] = run.mu1[d];
                mu2[(c, d)] = run.mu2[d];
                sigma1[(c, d)] = run.sigma1[d];
                sigma2[(c, d)] = run.sigma2[d];
            }
            divergences.push(run.divergences);
        }

        let total_divergent: usize = divergences.iter().sum();
        let total = chains * draws;
        if (total_divergent as f64) > DIVERGENCE_CEILING * total as f64 {
            return Err(Error::FatalSampling {
                divergent: total_divergent,
                total,
                ceiling: DIVERGENCE_CEILING * 100.0,
            });
        }
        if total_divergent > 0 {
            warn!(
                divergent = total_divergent,
                total, "sampler reported divergent transitions; treat results with caution"
            );
        }

        Ok(PosteriorSamples {
            tau,
            mu1,
            mu2,
            sigma1,
            sigma2,
            divergences,
        })
    }

    fn run_chain(&self, opts: &FitOptions, seed: u64, cancel: &AtomicBool) -> Result<ChainRun> {
        let mut rng = SmallRng::seed_from_u64(seed);
        let total = opts.tune + opts.samples;

        let mut state = State {
            tau: rng.gen_range(self.tau_lo..=self.tau_hi),
            mu1: self.data_mean,
            mu2: self.data_mean,
            sigma1: self.prior_scale / self.prior.prior_std_scale,
            sigma2: self.prior_scale / self.prior.prior_std_scale,
        };
        // Log-space proposal scales for the two Metropolis steps.
        let mut step1 = 0.5_f64;
        let mut step2 = 0.5_f64;

        let mut run = ChainRun::with_capacity(opts.samples);
        for sweep in 0..total {
            if cancel.load(Ordering::Relaxed) {
                return Err(Error::Cancelled);
            }
            let warming = sweep < opts.tune;
            let mut divergent = false;

            self.gibbs_mu(&mut state, &mut rng);
            for side in [RegimeSide::Before, RegimeSide::After] {
                let step = match side {
                    RegimeSide::Before => &mut step1,
                    RegimeSide::After => &mut step2,
                };
                let alpha = self.metropolis_sigma(&mut state, side, *step, &mut rng, &mut divergent);
                if warming {
                    // Robbins-Monro adaptation toward the target rate.
                    let gain = (sweep as f64 + 1.0).powf(-0.6);
                    *step = (step.ln() + gain * (alpha - opts.target_accept)).exp();
                }
            }
            self.gibbs_tau(&mut state, &mut rng, &mut divergent);

            if !warming {
                run.tau.push(state.tau as f64);
                run.mu1.push(state.mu1);
                run.mu2.push(state.mu2);
                run.sigma1.push(state.sigma1);
                run.sigma2.push(state.sigma2);
                if divergent {
                    run.divergences += 1;
                }
            }
        }
        Ok(run)
    }

    /// Exact conjugate update for both regime means.
    fn gibbs_mu(&self, state: &mut State, rng: &mut SmallRng) {
        let n = self.values.len();
        state.mu1 = self.draw_conjugate_mean(0, state.tau, state.sigma1, rng);
        state.mu2 = self.draw_conjugate_mean(state.tau, n, state.sigma2, rng);
    }

    fn draw_conjugate_mean(&self, a: usize, b: usize, sigma: f64, rng: &mut SmallRng) -> f64 {
        let m = (b - a) as f64;
        let seg_sum = self.sum[b] - self.sum[a];
        let prior_prec = self.prior_scale.powi(-2);
        let lik_prec = m / (sigma * sigma);
        let prec = prior_prec + lik_prec;
        let mean = (self.data_mean * prior_prec + seg_sum / (sigma * sigma)) / prec;
        let dist = Gaussian::new_unchecked(mean, prec.sqrt().recip());
        dist.draw(rng)
    }

    /// One log-space random-walk Metropolis step for a regime standard
    /// deviation. Returns the acceptance probability used for adaptation.
    fn metropolis_sigma(
        &self,
        state: &mut State,
        side: RegimeSide,
        step: f64,
        rng: &mut SmallRng,
        divergent: &mut bool,
    ) -> f64 {
        let n = self.values.len();
        let (a, b, mu, sigma) = match side {
            RegimeSide::Before => (0, state.tau, state.mu1, state.sigma1),
            RegimeSide::After => (state.tau, n, state.mu2, state.sigma2),
        };

        let standard = Gaussian::standard();
        let z: f64 = standard.draw(rng);
        let proposal = (sigma.ln() + step * z).exp();

        let current_target = self.sigma_log_target(a, b, mu, sigma);
        let proposal_target = self.sigma_log_target(a, b, mu, proposal);
        if !proposal_target.is_finite() {
            *divergent = true;
            return 0.0;
        }

        let log_alpha = proposal_target - current_target;
        let alpha = log_alpha.exp().min(1.0);
        let u: f64 = rng.gen();
        if u.ln() < log_alpha {
            match side {
                RegimeSide::Before => state.sigma1 = proposal,
                RegimeSide::After => state.sigma2 = proposal,
            }
        }
        alpha
    }

    /// Log density of σ's full conditional up to a constant: segment
    /// likelihood, half-normal prior, and the log-space Jacobian.
    fn sigma_log_target(&self, a: usize, b: usize, mu: f64, sigma: f64) -> f64 {
        if sigma <= 0.0 || !sigma.is_finite() {
            return f64::NEG_INFINITY;
        }
        let half_normal = -0.5 * (sigma / self.prior_scale).powi(2);
        self.segment_loglik(a, b, mu, sigma) + half_normal + sigma.ln()
    }

    /// Collapsed discrete Gibbs update for τ over all candidate breakpoints.
    fn gibbs_tau(&self, state: &mut State, rng: &mut SmallRng, divergent: &mut bool) {
        let n = self.values.len();
        let ln_weights: Vec<f64> = (self.tau_lo..=self.tau_hi)
            .map(|k| {
                self.segment_loglik(0, k, state.mu1, state.sigma1)
                    + self.segment_loglik(k, n, state.mu2, state.sigma2)
            })
            .collect();

        // `from_ln_weights` expects normalized ln-weights.
        let norm = logsumexp(&ln_weights);
        if !norm.is_finite() {
            *divergent = true;
            return;
        }
        let ln_weights: Vec<f64> = ln_weights.iter().map(|w| w - norm).collect();

        match Categorical::from_ln_weights(ln_weights) {
            Ok(cat) => {
                let k: usize = cat.draw(rng);
                state.tau = self.tau_lo + k;
            }
            Err(_) => {
                // Degenerate weights; keep the current τ and flag the draw.
                *divergent = true;
            }
        }
    }

    /// Gaussian log likelihood of `values[a..b]` under N(mu, sigma) from the
    /// prefix sums, O(1).
    fn segment_loglik(&self, a: usize, b: usize, mu: f64, sigma: f64) -> f64 {
        let m = (b - a) as f64;
        if m == 0.0 {
            return 0.0;
        }
        let seg_sum = self.sum[b] - self.sum[a];
        let seg_sum_sq = self.sum_sq[b] - self.sum_sq[a];
        let var = sigma * sigma;
        let quad = seg_sum_sq - 2.0 * mu * seg_sum + m * mu * mu;
        -0.5 * m * (2.0 * PI * var).ln() - quad / (2.0 * var)
    }
}

fn validate_options(opts: &FitOptions) -> Result<()> {
    if opts.samples < 1 {
        return Err(Error::Configuration {
            parameter: "samples",
            value: opts.samples.to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    if opts.chains < 1 {
        return Err(Error::Configuration {
            parameter: "chains",
            value: opts.chains.to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    if !(opts.target_accept > 0.0 && opts.target_accept < 1.0) {
        return Err(Error::Configuration {
            parameter: "target_accept",
            value: opts.target_accept.to_string(),
            reason: "must lie in (0, 1)".to_string(),
        });
    }
    Ok(())
}

#[derive(Clone, Copy)]
enum RegimeSide {
    Before,
    After,
}

struct State {
    tau: usize,
    mu1: f64,
    mu2: f64,
    sigma1: f64,
    sigma2: f64,
}

struct ChainRun {
    tau: Vec<f64>,
    mu1: Vec<f64>,
    mu2: Vec<f64>,
    sigma1: Vec<f64>,
    sigma2: Vec<f64>,
    divergences: usize,
}

impl ChainRun {
    fn with_capacity(n: usize) -> Self {
        Self {
            tau: Vec::with_capacity(n),
            mu1: Vec::with_capacity(n),
            mu2: Vec::with_capacity(n),
            sigma1: Vec::with_capacity(n),
            sigma2: Vec::with_capacity(n),
            divergences: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators;
    use crate::posterior::Param;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn jump_series(switch: usize, size: usize) -> Series {
        let mut rng = SmallRng::seed_from_u64(0xABCD);
        let data = generators::discontinuous_jump(&mut rng, 0.0, 1.0, 3.0, 1.0, switch, size);
        Series::from_values(data).unwrap()
    }

    fn quick_opts(seed: u64) -> FitOptions {
        FitOptions {
            samples: 500,
            tune: 300,
            chains: 2,
            target_accept: 0.44,
            seed: Some(seed),
        }
    }

    #[test]
    fn rejects_oversized_min_segment() {
        let series = Series::from_values(vec![1.0, 2.0, 3.0, 2.5]).unwrap();
        let err = ChangePointModel::new(
            &series,
            PriorConfig {
                min_segment_length: 3,
                prior_std_scale: 2.0,
            },
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::Configuration {
                parameter: "min_segment_length",
                ..
            }
        ));
    }

    #[test]
    fn rejects_constant_series() {
        let series = Series::from_values(vec![5.0; 100]).unwrap();
        let err = ChangePointModel::new(&series, PriorConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn tau_draws_respect_bounds() {
        let series = jump_series(100, 200);
        let prior = PriorConfig {
            min_segment_length: 20,
            prior_std_scale: 2.0,
        };
        let model = ChangePointModel::new(&series, prior).unwrap();
        let post = model.fit(&quick_opts(7)).unwrap();
        for &t in &post.pooled(Param::Tau) {
            assert!(t >= 20.0 && t <= 180.0, "tau draw {t} out of bounds");
            assert!((t - t.round()).abs() < 1e-12, "tau draw {t} not integral");
        }
        for &s in &post.pooled(Param::Sigma1) {
            assert!(s > 0.0);
        }
    }

    #[test]
    fn recovers_obvious_switch() {
        let series = jump_series(250, 500);
        let model = ChangePointModel::new(&series, PriorConfig::default()).unwrap();
        let post = model.fit(&quick_opts(11)).unwrap();
        let tau_mean = post.pooled_mean(Param::Tau);
        assert!(
            (tau_mean - 250.0).abs() < 5.0,
            "posterior mean tau = {tau_mean}"
        );
        assert!((post.pooled_mean(Param::Mu1)).abs() < 0.5);
        assert!((post.pooled_mean(Param::Mu2) - 3.0).abs() < 0.5);
    }

    #[test]
    fn clean_fit_reports_no_divergences() {
        let series = jump_series(250, 500);
        let model = ChangePointModel::new(&series, PriorConfig::default()).unwrap();
        let post = model.fit(&quick_opts(13)).unwrap();
        assert!(!post.has_divergences());
        assert::close(post.divergence_rate(), 0.0, 1e-12);
        // Tau has to have moved off each chain's random init.
        let tau_mean = post.pooled_mean(Param::Tau);
        assert!((tau_mean - 250.0).abs() < 5.0, "tau mean = {tau_mean}");
    }

    #[test]
    fn seeded_fits_are_reproducible() {
        let series = jump_series(150, 300);
        let model = ChangePointModel::new(&series, PriorConfig::default()).unwrap();
        let a = model.fit(&quick_opts(42)).unwrap();
        let b = model.fit(&quick_opts(42)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn cancellation_returns_no_partial_output() {
        let series = jump_series(150, 300);
        let model = ChangePointModel::new(&series, PriorConfig::default()).unwrap();
        let cancel = AtomicBool::new(true);
        let err = model
            .fit_with_cancel(&quick_opts(1), &cancel)
            .unwrap_err();
        assert_eq!(err, Error::Cancelled);
    }

    #[test]
    fn invalid_options_fail_before_sampling() {
        let series = jump_series(150, 300);
        let model = ChangePointModel::new(&series, PriorConfig::default()).unwrap();
        let mut opts = FitOptions::default();
        opts.samples = 0;
        assert!(model.fit(&opts).is_err());
        let mut opts = FitOptions::default();
        opts.target_accept = 1.5;
        assert!(model.fit(&opts).is_err());
    }
}
