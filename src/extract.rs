//! Point estimates and credible intervals for the change-point location.

use crate::error::{Error, Result};
use crate::posterior::{Param, PosteriorSamples};
use crate::series::Series;
use chrono::NaiveDate;
use std::str::FromStr;

#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

/// How to collapse the τ posterior to a single index.
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EstimateMethod {
    /// Posterior mean, rounded to the nearest index.
    #[default]
    Mean,
    /// Posterior median.
    Median,
    /// Most frequently sampled index. Best for multimodal posteriors.
    Mode,
}

impl EstimateMethod {
    /// Name used in reports.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            EstimateMethod::Mean => "mean",
            EstimateMethod::Median => "median",
            EstimateMethod::Mode => "mode",
        }
    }
}

impl FromStr for EstimateMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mean" => Ok(EstimateMethod::Mean),
            "median" => Ok(EstimateMethod::Median),
            "mode" => Ok(EstimateMethod::Mode),
            _ => Err(Error::InvalidMethod {
                given: s.to_string(),
            }),
        }
    }
}

/// The extracted change point.
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct ChangePointEstimate {
    /// Index of the first observation of the new regime.
    pub index: usize,
    /// Calendar date at `index`, when the series carries dates.
    pub date: Option<NaiveDate>,
    /// Method that produced `index`.
    pub method: EstimateMethod,
    /// Highest-density interval over τ, as inclusive indices.
    pub credible_interval: (usize, usize),
    /// Probability mass the interval was built for.
    pub credible_interval_probability: f64,
    /// Standard deviation of the pooled τ draws. Wide values mean the
    /// change-point location itself is uncertain.
    pub posterior_std: f64,
}

/// Collapses a τ posterior into a [`ChangePointEstimate`].
#[derive(Clone, Copy, Debug)]
pub struct ChangePointExtractor {
    /// Point-estimate method.
    pub method: EstimateMethod,
    /// Mass of the credible interval, in (0, 1).
    pub credible_probability: f64,
}

impl Default for ChangePointExtractor {
    fn default() -> Self {
        Self {
            method: EstimateMethod::Mean,
            credible_probability: 0.94,
        }
    }
}

impl ChangePointExtractor {
    /// Extract the change point from a fitted posterior.
    ///
    /// `series` is the series the model was fit on; it supplies the date
    /// axis, if any.
    ///
    /// # Errors
    /// Returns [`Error::EmptyPosterior`] when the posterior has no draws and
    /// [`Error::Configuration`] when `credible_probability` is outside (0, 1).
    pub fn extract(
        &self,
        posterior: &PosteriorSamples,
        series: &Series,
    ) -> Result<ChangePointEstimate> {
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

        let draws = posterior.pooled(Param::Tau);
        let index = match self.method {
            EstimateMethod::Mean => {
                let mean = draws.iter().sum::<f64>() / draws.len() as f64;
                mean.round() as usize
            }
            EstimateMethod::Median => {
                let mut sorted = draws.clone();
                sorted.sort_by(|a, b| a.partial_cmp(b).expect("tau draws are finite"));
                let mid = sorted.len() / 2;
                let median = if sorted.len() % 2 == 0 {
                    (sorted[mid - 1] + sorted[mid]) / 2.0
                } else {
                    sorted[mid]
                };
                median.round() as usize
            }
            EstimateMethod::Mode => mode_index(&draws),
        };

        let (lo, hi) = hdi(&draws, self.credible_probability);
        let mean = draws.iter().sum::<f64>() / draws.len() as f64;
        let posterior_std = (draws.iter().map(|t| (t - mean).powi(2)).sum::<f64>()
            / draws.len() as f64)
            .sqrt();

        Ok(ChangePointEstimate {
            index,
            date: series.date_at(index),
            method: self.method,
            credible_interval: (lo.round() as usize, hi.round() as usize),
            credible_interval_probability: self.credible_probability,
            posterior_std,
        })
    }
}

/// Most frequently drawn index; ties go to the smallest index.
fn mode_index(draws: &[f64]) -> usize {
    let max = draws.iter().fold(0.0_f64, |m, &t| m.max(t)) as usize;
    let mut counts = vec![0usize; max + 1];
    for &t in draws {
        counts[t as usize] += 1;
    }
    counts
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(&a.0)))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Highest-density interval: the narrowest window over the sorted draws that
/// contains at least `prob` of them.
pub(crate) fn hdi(draws: &[f64], prob: f64) -> (f64, f64) {
    let mut sorted = draws.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).expect("draws are finite"));
    let n = sorted.len();
    let k = ((prob * n as f64).ceil() as usize).clamp(1, n);
    let mut best = (sorted[0], sorted[k - 1]);
    let mut best_width = best.1 - best.0;
    for i in 1..=(n - k) {
        let width = sorted[i + k - 1] - sorted[i];
        if width < best_width {
            best_width = width;
            best = (sorted[i], sorted[i + k - 1]);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::posterior::PosteriorSamples;
    use chrono::NaiveDate;
    use ndarray::Array2;

    fn posterior_with_tau(tau_draws: Vec<f64>) -> PosteriorSamples {
        let n = tau_draws.len();
        let fill = |v: f64| Array2::from_elem((1, n), v);
        PosteriorSamples {
            tau: Array2::from_shape_vec((1, n), tau_draws).unwrap(),
            mu1: fill(0.0),
            mu2: fill(3.0),
            sigma1: fill(1.0),
            sigma2: fill(1.0),
            divergences: vec![0],
        }
    }

    fn dated_series(n: usize) -> Series {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let pairs = (0..n)
            .map(|i| (start + chrono::Duration::days(i as i64), i as f64 + 0.1 * (i % 3) as f64))
            .collect();
        Series::from_pairs(pairs).unwrap()
    }

    #[test]
    fn method_strings_parse() {
        assert_eq!("mean".parse::<EstimateMethod>().unwrap(), EstimateMethod::Mean);
        assert_eq!("  Mode ".parse::<EstimateMethod>().unwrap(), EstimateMethod::Mode);
        let err = "banana".parse::<EstimateMethod>().unwrap_err();
        assert!(matches!(err, Error::InvalidMethod { given } if given == "banana"));
    }

    #[test]
    fn mean_median_mode_on_a_skewed_posterior() {
        let draws = vec![
            250.0, 250.0, 250.0, 250.0, 250.0, 250.0, 251.0, 251.0, 249.0, 260.0,
        ];
        let post = posterior_with_tau(draws);
        let series = dated_series(300);

        let mean_est = ChangePointExtractor {
            method: EstimateMethod::Mean,
            ..Default::default()
        }
        .extract(&post, &series)
        .unwrap();
        assert_eq!(mean_est.index, 251); // skewed up by the 260 outlier

        let median_est = ChangePointExtractor {
            method: EstimateMethod::Median,
            ..Default::default()
        }
        .extract(&post, &series)
        .unwrap();
        assert_eq!(median_est.index, 250);

        let mode_est = ChangePointExtractor {
            method: EstimateMethod::Mode,
            ..Default::default()
        }
        .extract(&post, &series)
        .unwrap();
        assert_eq!(mode_est.index, 250);
        assert_eq!(
            mode_est.date,
            Some(NaiveDate::from_ymd_opt(2020, 9, 7).unwrap())
        );
    }

    #[test]
    fn hdi_is_the_narrowest_window() {
        // 10 draws; 80% HDI needs 8. The narrowest 8-wide window skips the
        // two stragglers on the right.
        let draws = vec![10.0, 10.0, 11.0, 11.0, 12.0, 12.0, 13.0, 13.0, 40.0, 41.0];
        let (lo, hi) = hdi(&draws, 0.8);
        assert::close(lo, 10.0, 1e-12);
        assert::close(hi, 13.0, 1e-12);
    }

    #[test]
    fn interval_contains_the_point_estimate() {
        let draws: Vec<f64> = (0..200)
            .map(|i| 250.0 + f64::from(i % 7) - 3.0)
            .collect();
        let post = posterior_with_tau(draws);
        let series = dated_series(300);
        let est = ChangePointExtractor::default().extract(&post, &series).unwrap();
        assert!(est.credible_interval.0 <= est.index);
        assert!(est.index <= est.credible_interval.1);
        assert::close(est.credible_interval_probability, 0.94, 1e-12);
        assert!(est.posterior_std > 0.0);
    }

    #[test]
    fn interval_mass_meets_the_requested_probability() {
        // Integer draws over an uneven, skewed frequency profile.
        let draws: Vec<f64> = (0..500_u32)
            .map(|i| 240.0 + f64::from((i * i) % 23))
            .collect();
        let post = posterior_with_tau(draws.clone());
        let series = dated_series(300);
        let est = ChangePointExtractor::default().extract(&post, &series).unwrap();

        let (lo, hi) = est.credible_interval;
        let inside = draws
            .iter()
            .filter(|&&t| t >= lo as f64 && t <= hi as f64)
            .count();
        let mass = inside as f64 / draws.len() as f64;
        assert!(
            mass >= est.credible_interval_probability - 1e-9,
            "interval ({lo}, {hi}) holds only {mass} of the draws"
        );
    }

    #[test]
    fn empty_posterior_is_rejected() {
        let post = posterior_with_tau(Vec::new());
        let series = dated_series(300);
        let err = ChangePointExtractor::default().extract(&post, &series).unwrap_err();
        assert_eq!(err, Error::EmptyPosterior);
    }

    #[test]
    fn invalid_probability_is_rejected() {
        let post = posterior_with_tau(vec![250.0; 10]);
        let series = dated_series(300);
        let extractor = ChangePointExtractor {
            credible_probability: 1.0,
            ..Default::default()
        };
        assert!(matches!(
            extractor.extract(&post, &series).unwrap_err(),
            Error::Configuration { .. }
        ));
    }
}
