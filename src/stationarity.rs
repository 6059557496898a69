//! Classical stationarity tests: Augmented Dickey-Fuller and KPSS.
//!
//! Both tests use the constant-only ("c") regression. ADF p-values follow the
//! MacKinnon (1994, 2010) regression-surface approximation; KPSS p-values are
//! interpolated against the Kwiatkowski et al. (1992) critical-value table
//! and therefore bounded in [0.01, 0.10].

use crate::error::{Error, Result};
use crate::series::Series;
use nalgebra::{Cholesky, DMatrix, DVector};
use rv::dist::Gaussian;
use rv::traits::Cdf;

#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

/// Minimum observations accepted by either test.
const MIN_OBSERVATIONS: usize = 15;

/// MacKinnon (1994) switching point and domain for the "c" tau statistic.
const TAU_STAR_C: f64 = -1.61;
const TAU_MIN_C: f64 = -18.83;
const TAU_MAX_C: f64 = 2.74;

/// MacKinnon (1994) polynomial for small statistics (stat <= `TAU_STAR_C`).
const TAU_C_SMALLP: [f64; 3] = [2.1659, 1.4412, 0.038_269];

/// MacKinnon (1994) polynomial for large statistics.
const TAU_C_LARGEP: [f64; 4] = [1.7339, 0.93202, -0.12745, -0.010_368];

/// KPSS "c" critical values paired with their significance levels.
const KPSS_CRIT_C: [(f64, f64); 4] = [(0.347, 0.10), (0.463, 0.05), (0.574, 0.025), (0.739, 0.01)];

/// Outcome of a single hypothesis test.
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct TestOutcome {
    /// The test statistic.
    pub statistic: f64,
    /// Approximate p-value.
    pub p_value: f64,
    /// Lags used by the test regression / long-run variance estimate.
    pub lags: usize,
    /// Effective number of observations used.
    pub n_obs: usize,
    /// Decision at the configured significance level. Note the inverted
    /// direction between ADF (reject null => stationary) and KPSS
    /// (reject null => non-stationary).
    pub is_stationary: bool,
}

/// Combined conclusion from running both tests.
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StationarityConclusion {
    /// Both tests agree the series is stationary.
    Stationary,
    /// Both tests agree the series is non-stationary.
    NonStationary,
    /// The tests disagree.
    Ambiguous,
}

/// Report from [`StationarityTester::test`].
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct StationarityReport {
    /// ADF outcome (null: unit root).
    pub adf: TestOutcome,
    /// KPSS outcome (null: stationary).
    pub kpss: TestOutcome,
    /// Combined conclusion.
    pub conclusion: StationarityConclusion,
    /// What to do next, phrased for a human reader.
    pub recommendation: String,
}

/// Runs ADF and KPSS and combines their decisions.
///
/// Pure function of the input series and the significance level; no state is
/// kept between calls.
#[derive(Clone, Copy, Debug)]
pub struct StationarityTester {
    significance: f64,
}

impl Default for StationarityTester {
    fn default() -> Self {
        Self { significance: 0.05 }
    }
}

impl StationarityTester {
    /// Tester with a custom significance level in (0, 1).
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] for a level outside (0, 1).
    pub fn new(significance: f64) -> Result<Self> {
        if !(significance > 0.0 && significance < 1.0) {
            return Err(Error::Configuration {
                parameter: "significance",
                value: significance.to_string(),
                reason: "must lie in (0, 1)".to_string(),
            });
        }
        Ok(Self { significance })
    }

    /// Run both tests on the series.
    ///
    /// # Errors
    /// Returns [`Error::InsufficientData`] when the series is too short for
    /// the tests' lag structure.
    pub fn test(&self, series: &Series) -> Result<StationarityReport> {
        let adf = self.adf_test(series.values())?;
        let kpss = self.kpss_test(series.values())?;

        let (conclusion, recommendation) = match (adf.is_stationary, kpss.is_stationary) {
            (true, true) => (
                StationarityConclusion::Stationary,
                "Both tests agree: no transform needed before modeling.".to_string(),
            ),
            (false, false) => (
                StationarityConclusion::NonStationary,
                "Both tests agree the series is non-stationary: difference it \
                 or model log returns instead."
                    .to_string(),
            ),
            (true, false) => (
                StationarityConclusion::Ambiguous,
                "ADF rejects a unit root but KPSS rejects stationarity; the \
                 series may be trend-stationary. Inspect it visually or detrend."
                    .to_string(),
            ),
            (false, true) => (
                StationarityConclusion::Ambiguous,
                "KPSS accepts stationarity but ADF cannot reject a unit root; \
                 inspect the series visually or try a different transform."
                    .to_string(),
            ),
        };

        Ok(StationarityReport {
            adf,
            kpss,
            conclusion,
            recommendation,
        })
    }

    /// Augmented Dickey-Fuller test, constant-only regression, AIC lag
    /// selection up to the Schwert bound `12 * (n / 100)^(1/4)`.
    ///
    /// Null hypothesis: the series has a unit root. `is_stationary` is true
    /// when `p < significance`.
    ///
    /// # Errors
    /// Returns [`Error::InsufficientData`] when fewer than
    /// `MIN_OBSERVATIONS` remain after differencing and lagging.
    pub fn adf_test(&self, values: &[f64]) -> Result<TestOutcome> {
        let n = values.len();
        if n < MIN_OBSERVATIONS {
            return Err(Error::InsufficientData {
                operation: "adf_test",
                required: MIN_OBSERVATIONS,
                actual: n,
            });
        }

        let dy: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();
        let n_diff = dy.len();

        let schwert = (12.0 * (n as f64 / 100.0).powf(0.25)).floor() as usize;
        // Keep enough rows for the widest regression: const + level + maxlag.
        let max_allowed = n_diff.saturating_sub(4) / 2;
        let maxlag = schwert.min(max_allowed);
        if n_diff <= maxlag + 3 {
            return Err(Error::InsufficientData {
                operation: "adf_test",
                required: maxlag + 4,
                actual: n_diff,
            });
        }

        // Lag selection on the common sample starting at maxlag.
        let mut best = (0usize, f64::INFINITY);
        for k in 0..=maxlag {
            let (x, y) = adf_design(values, &dy, k, maxlag);
            let Some(fit) = ols(&x, &y) else { continue };
            let n_eff = y.len() as f64;
            let aic = n_eff * (fit.rss / n_eff).ln() + 2.0 * (k as f64 + 2.0);
            if aic < best.1 {
                best = (k, aic);
            }
        }
        let k = best.0;

        // Final regression on the full usable sample for the chosen lag.
        let (x, y) = adf_design(values, &dy, k, k);
        let n_eff = y.len();
        let p = x.ncols();
        let fit = ols(&x, &y).ok_or(Error::InsufficientData {
            operation: "adf_test",
            required: p + 1,
            actual: n_eff,
        })?;
        let sigma2 = fit.rss / (n_eff - p) as f64;
        let se = (sigma2 * fit.xtx_inv[(1, 1)]).sqrt();
        let statistic = fit.beta[1] / se;
        let p_value = mackinnon_p(statistic);

        Ok(TestOutcome {
            statistic,
            p_value,
            lags: k,
            n_obs: n_eff,
            is_stationary: p_value < self.significance,
        })
    }

    /// KPSS test, constant-only (level stationarity), Bartlett-kernel
    /// long-run variance with `ceil(12 * (n / 100)^(1/4))` lags.
    ///
    /// Null hypothesis: the series is stationary. `is_stationary` is true
    /// when `p > significance` — the inverse of the ADF decision direction.
    ///
    /// # Errors
    /// Returns [`Error::InsufficientData`] for series shorter than
    /// `MIN_OBSERVATIONS`.
    pub fn kpss_test(&self, values: &[f64]) -> Result<TestOutcome> {
        let n = values.len();
        if n < MIN_OBSERVATIONS {
            return Err(Error::InsufficientData {
                operation: "kpss_test",
                required: MIN_OBSERVATIONS,
                actual: n,
            });
        }

        let mean = values.iter().sum::<f64>() / n as f64;
        let resid: Vec<f64> = values.iter().map(|v| v - mean).collect();

        let mut cumulative = 0.0;
        let mut eta = 0.0;
        for &e in &resid {
            cumulative += e;
            eta += cumulative * cumulative;
        }
        eta /= (n * n) as f64;

        let lags = ((12.0 * (n as f64 / 100.0).powf(0.25)).ceil() as usize).min(n - 1);
        let mut s2 = resid.iter().map(|e| e * e).sum::<f64>() / n as f64;
        for lag in 1..=lags {
            let weight = 1.0 - lag as f64 / (lags as f64 + 1.0);
            let cov: f64 = (lag..n).map(|t| resid[t] * resid[t - lag]).sum();
            s2 += 2.0 * weight * cov / n as f64;
        }

        let statistic = eta / s2;
        let p_value = kpss_p(statistic);

        Ok(TestOutcome {
            statistic,
            p_value,
            lags,
            n_obs: n,
            is_stationary: p_value > self.significance,
        })
    }
}

struct OlsFit {
    beta: DVector<f64>,
    rss: f64,
    xtx_inv: DMatrix<f64>,
}

/// Least squares via the normal equations; `None` when X'X is singular.
fn ols(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<OlsFit> {
    let xtx = x.transpose() * x;
    let chol = Cholesky::new(xtx)?;
    let beta = chol.solve(&(x.transpose() * y));
    let resid = y - x * &beta;
    let rss = resid.norm_squared();
    Some(OlsFit {
        beta,
        rss,
        xtx_inv: chol.inverse(),
    })
}

/// ADF design matrix with `k` lagged differences, rows starting at `start`:
/// columns are [const, level, Δy_{t-1}, ..., Δy_{t-k}].
fn adf_design(values: &[f64], dy: &[f64], k: usize, start: usize) -> (DMatrix<f64>, DVector<f64>) {
    let rows = dy.len() - start;
    let cols = 2 + k;
    let mut x = DMatrix::zeros(rows, cols);
    let mut y = DVector::zeros(rows);
    for (row, t) in (start..dy.len()).enumerate() {
        y[row] = dy[t];
        x[(row, 0)] = 1.0;
        x[(row, 1)] = values[t];
        for j in 1..=k {
            x[(row, 1 + j)] = dy[t - j];
        }
    }
    (x, y)
}

/// MacKinnon approximate p-value for the constant-only tau statistic.
fn mackinnon_p(stat: f64) -> f64 {
    if stat > TAU_MAX_C {
        return 1.0;
    }
    if stat < TAU_MIN_C {
        return 0.0;
    }
    let z = if stat <= TAU_STAR_C {
        polyval(&TAU_C_SMALLP, stat)
    } else {
        polyval(&TAU_C_LARGEP, stat)
    };
    Gaussian::standard().cdf(&z)
}

/// KPSS p-value by linear interpolation of the critical-value table,
/// clamped to [0.01, 0.10].
fn kpss_p(stat: f64) -> f64 {
    let (first_crit, first_p) = KPSS_CRIT_C[0];
    let (last_crit, last_p) = KPSS_CRIT_C[KPSS_CRIT_C.len() - 1];
    if stat <= first_crit {
        return first_p;
    }
    if stat >= last_crit {
        return last_p;
    }
    for window in KPSS_CRIT_C.windows(2) {
        let (lo_crit, lo_p) = window[0];
        let (hi_crit, hi_p) = window[1];
        if stat <= hi_crit {
            let frac = (stat - lo_crit) / (hi_crit - lo_crit);
            return lo_p + frac * (hi_p - lo_p);
        }
    }
    last_p
}

fn polyval(coeffs: &[f64], x: f64) -> f64 {
    coeffs
        .iter()
        .rev()
        .fold(0.0, |acc, &c| acc * x + c)
}
