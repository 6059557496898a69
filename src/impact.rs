//! Before/after impact quantification for a detected change point.
//!
//! Everything here is computed from the posterior draws, never from the raw
//! data split at the point estimate; the regime parameters already integrate
//! over the uncertainty in τ.

use crate::error::{Error, Result};
use crate::extract::hdi;
use crate::posterior::{Param, PosteriorSamples};

#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

/// Baselines this close to zero make percentage change meaningless.
const PCT_BASELINE_FLOOR: f64 = 1e-9;

/// Sign of the mean shift, with a dead zone for shifts that are small
/// relative to the regimes' spread.
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// The regime mean rose.
    Increase,
    /// The regime mean fell.
    Decrease,
    /// The shift is under 0.2 pooled standard deviations either way.
    Negligible,
}

/// Magnitude of the mean shift in pooled standard deviations.
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum MagnitudeClass {
    /// Under 0.2 pooled standard deviations.
    Negligible,
    /// 0.2 to 0.5.
    Small,
    /// 0.5 to 1.0.
    Moderate,
    /// 1.0 to 2.0.
    Large,
    /// 2.0 or more.
    VeryLarge,
}

impl MagnitudeClass {
    fn from_ratio(ratio: f64) -> Self {
        if ratio < 0.2 {
            MagnitudeClass::Negligible
        } else if ratio < 0.5 {
            MagnitudeClass::Small
        } else if ratio < 1.0 {
            MagnitudeClass::Moderate
        } else if ratio < 2.0 {
            MagnitudeClass::Large
        } else {
            MagnitudeClass::VeryLarge
        }
    }

    /// Adjective used in impact statements.
    #[must_use]
    pub fn adjective(self) -> &'static str {
        match self {
            MagnitudeClass::Negligible => "negligible",
            MagnitudeClass::Small => "small",
            MagnitudeClass::Moderate => "moderate",
            MagnitudeClass::Large => "large",
            MagnitudeClass::VeryLarge => "very large",
        }
    }
}

/// Before/after comparison of the regime volatilities.
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct VolatilityImpact {
    /// Posterior mean of σ₁.
    pub before: f64,
    /// Posterior mean of σ₂.
    pub after: f64,
    /// `after - before`.
    pub change: f64,
    /// Percentage change relative to the pre-change volatility.
    pub change_pct: f64,
    /// Sign of the volatility shift; negligible under a 1% relative change.
    pub direction: Direction,
    /// Highest-density interval over σ₁.
    pub before_hdi: (f64, f64),
    /// Highest-density interval over σ₂.
    pub after_hdi: (f64, f64),
}

/// What changed, by how much, and in what units.
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct ImpactSummary {
    /// Posterior mean of μ₁.
    pub mean_before: f64,
    /// Posterior mean of μ₂.
    pub mean_after: f64,
    /// `mean_after - mean_before`, in data units.
    pub mean_change: f64,
    /// Percentage change relative to `|mean_before|`, or `None` when the
    /// baseline is too close to zero for a percentage to mean anything.
    pub mean_change_pct: Option<f64>,
    /// Highest-density interval over μ₁.
    pub mean_before_hdi: (f64, f64),
    /// Highest-density interval over μ₂.
    pub mean_after_hdi: (f64, f64),
    /// Sign of the shift, with a dead zone.
    pub direction: Direction,
    /// `|mean_change|` in pooled standard deviations.
    pub magnitude_in_std: f64,
    /// Size class of the shift, derived from `magnitude_in_std`.
    pub magnitude: MagnitudeClass,
    /// Average of the posterior mean regime standard deviations, the
    /// yardstick for `direction` and `magnitude`.
    pub pooled_std: f64,
    /// Volatility comparison, when requested.
    pub volatility: Option<VolatilityImpact>,
}

/// Computes [`ImpactSummary`] from a fitted posterior.
#[derive(Clone, Copy, Debug)]
pub struct ImpactQuantifier {
    /// Whether to include the volatility block.
    pub include_volatility: bool,
    /// Mass of the parameter credible intervals, in (0, 1).
    pub credible_probability: f64,
}

impl Default for ImpactQuantifier {
    fn default() -> Self {
        Self {
            include_volatility: true,
            credible_probability: 0.94,
        }
    }
}

impl ImpactQuantifier {
    /// Quantify the impact of the change point.
    ///
    /// # Errors
    /// Returns [`Error::EmptyPosterior`] when the posterior has no draws and
    /// [`Error::Configuration`] when `credible_probability` is outside (0, 1).
    pub fn quantify(&self, posterior: &PosteriorSamples) -> Result<ImpactSummary> {
        if posterior.is_empty() {
            return Err(Error::EmptyPosterior);
        }
        if !(self.credible_probability > 0.0 && self.credible_probability < 1.0) {
            return Err(Error::Configuration {
                parameter: "credible_probability",
                value: self.credible_probability.to_string(),
                reason: "must lie in (0, 1)".to_string(),
            });
        }

        let mean_before = posterior.pooled_mean(Param::Mu1);
        let mean_after = posterior.pooled_mean(Param::Mu2);
        let mean_change = mean_after - mean_before;
        let mean_change_pct = if mean_before.abs() < PCT_BASELINE_FLOOR {
            None
        } else {
            Some(100.0 * mean_change / mean_before.abs())
        };

        let sigma_before = posterior.pooled_mean(Param::Sigma1);
        let sigma_after = posterior.pooled_mean(Param::Sigma2);
        let pooled_std = (sigma_before + sigma_after) / 2.0;

        let ratio = mean_change.abs() / pooled_std;
        let direction = if ratio < 0.2 {
            Direction::Negligible
        } else if mean_change > 0.0 {
            Direction::Increase
        } else {
            Direction::Decrease
        };
        let magnitude = MagnitudeClass::from_ratio(ratio);

        let prob = self.credible_probability;
        let volatility = self.include_volatility.then(|| {
            let change = sigma_after - sigma_before;
            // σ draws are strictly positive, so the baseline never vanishes.
            let change_pct = 100.0 * change / sigma_before;
            let direction = if change_pct.abs() < 1.0 {
                Direction::Negligible
            } else if change > 0.0 {
                Direction::Increase
            } else {
                Direction::Decrease
            };
            VolatilityImpact {
                before: sigma_before,
                after: sigma_after,
                change,
                change_pct,
                direction,
                before_hdi: hdi(&posterior.pooled(Param::Sigma1), prob),
                after_hdi: hdi(&posterior.pooled(Param::Sigma2), prob),
            }
        });

        Ok(ImpactSummary {
            mean_before,
            mean_after,
            mean_change,
            mean_change_pct,
            mean_before_hdi: hdi(&posterior.pooled(Param::Mu1), prob),
            mean_after_hdi: hdi(&posterior.pooled(Param::Mu2), prob),
            direction,
            magnitude_in_std: ratio,
            magnitude,
            pooled_std,
            volatility,
        })
    }
}
