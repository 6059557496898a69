//! Date-indexed univariate series and its ingestion checks.

use crate::error::{Error, Result};
use chrono::NaiveDate;

#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

/// An ordered univariate series with an optional date axis.
///
/// The date axis, when present, is strictly increasing with no duplicates.
/// Validation happens at construction; nothing downstream repairs data.
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct Series {
    dates: Option<Vec<NaiveDate>>,
    values: Vec<f64>,
}

impl Series {
    /// Create an undated series from raw values.
    ///
    /// # Errors
    /// Returns [`Error::NonFiniteValue`] if any value is NaN or infinite.
    pub fn from_values(values: Vec<f64>) -> Result<Self> {
        check_finite(&values)?;
        Ok(Self {
            dates: None,
            values,
        })
    }

    /// Create a dated series from (date, value) pairs.
    ///
    /// # Errors
    /// Returns [`Error::NonFiniteValue`] for NaN/infinite values and
    /// [`Error::NonMonotonicDates`] when dates are not strictly increasing
    /// (duplicates included).
    pub fn from_pairs(pairs: Vec<(NaiveDate, f64)>) -> Result<Self> {
        let (dates, values): (Vec<NaiveDate>, Vec<f64>) = pairs.into_iter().unzip();
        check_finite(&values)?;
        for i in 1..dates.len() {
            if dates[i] <= dates[i - 1] {
                return Err(Error::NonMonotonicDates {
                    index: i,
                    date: dates[i],
                    previous: dates[i - 1],
                });
            }
        }
        Ok(Self {
            dates: Some(dates),
            values,
        })
    }

    /// Number of observations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the series is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The observed values, in order.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// The date axis, if the series carries one.
    #[must_use]
    pub fn dates(&self) -> Option<&[NaiveDate]> {
        self.dates.as_deref()
    }

    /// The date at `index`, if the series carries a date axis.
    #[must_use]
    pub fn date_at(&self, index: usize) -> Option<NaiveDate> {
        self.dates.as_ref().and_then(|d| d.get(index)).copied()
    }

    /// Log returns: `ln(P_t / P_{t-1})`, one observation shorter than the
    /// price series. Return `t` carries the date of `P_t`.
    ///
    /// # Errors
    /// Returns [`Error::InsufficientData`] for fewer than two observations
    /// and [`Error::NonPositivePrice`] if any price is zero or negative.
    pub fn log_returns(&self) -> Result<Self> {
        if self.values.len() < 2 {
            return Err(Error::InsufficientData {
                operation: "log_returns",
                required: 2,
                actual: self.values.len(),
            });
        }
        for (index, &value) in self.values.iter().enumerate() {
            if value <= 0.0 {
                return Err(Error::NonPositivePrice { index, value });
            }
        }
        let values = self
            .values
            .windows(2)
            .map(|w| (w[1] / w[0]).ln())
            .collect();
        let dates = self.dates.as_ref().map(|d| d[1..].to_vec());
        Ok(Self { dates, values })
    }

    /// Calendar gaps longer than `threshold_days` between consecutive
    /// observations, as (date before gap, date after gap) pairs.
    ///
    /// Gaps are surfaced, never interpolated. Returns an empty vector for
    /// undated series.
    #[must_use]
    pub fn gaps(&self, threshold_days: i64) -> Vec<(NaiveDate, NaiveDate)> {
        let Some(dates) = &self.dates else {
            return Vec::new();
        };
        dates
            .windows(2)
            .filter(|w| (w[1] - w[0]).num_days() > threshold_days)
            .map(|w| (w[0], w[1]))
            .collect()
    }

    /// Sample mean of the values.
    #[must_use]
    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return f64::NAN;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    /// Population standard deviation of the values.
    #[must_use]
    pub fn std(&self) -> f64 {
        if self.values.is_empty() {
            return f64::NAN;
        }
        let mean = self.mean();
        let var = self
            .values
            .iter()
            .map(|v| (v - mean).powi(2))
            .sum::<f64>()
            / self.values.len() as f64;
        var.sqrt()
    }
}

fn check_finite(values: &[f64]) -> Result<()> {
    for (index, &value) in values.iter().enumerate() {
        if !value.is_finite() {
            return Err(Error::NonFiniteValue { index, value });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn rejects_nan() {
        let err = Series::from_values(vec![1.0, f64::NAN, 2.0]).unwrap_err();
        assert!(matches!(err, Error::NonFiniteValue { index: 1, .. }));
    }

    #[test]
    fn rejects_duplicate_and_reversed_dates() {
        let err = Series::from_pairs(vec![(d(2020, 1, 2), 1.0), (d(2020, 1, 2), 2.0)]).unwrap_err();
        assert!(matches!(err, Error::NonMonotonicDates { index: 1, .. }));

        let err = Series::from_pairs(vec![(d(2020, 1, 2), 1.0), (d(2020, 1, 1), 2.0)]).unwrap_err();
        assert!(matches!(err, Error::NonMonotonicDates { .. }));
    }

    #[test]
    fn log_returns_shrink_by_one_and_shift_dates() {
        let series = Series::from_pairs(vec![
            (d(2020, 1, 1), 100.0),
            (d(2020, 1, 2), 110.0),
            (d(2020, 1, 3), 121.0),
        ])
        .unwrap();
        let returns = series.log_returns().unwrap();
        assert_eq!(returns.len(), 2);
        assert_eq!(returns.date_at(0), Some(d(2020, 1, 2)));
        assert::close(returns.values()[0], (110.0_f64 / 100.0).ln(), 1e-12);
        assert::close(returns.values()[1], (121.0_f64 / 110.0).ln(), 1e-12);
    }

    #[test]
    fn log_returns_reject_non_positive_prices() {
        let series = Series::from_values(vec![10.0, 0.0, 12.0]).unwrap();
        let err = series.log_returns().unwrap_err();
        assert!(matches!(err, Error::NonPositivePrice { index: 1, .. }));
    }

    #[test]
    fn gaps_are_surfaced_not_hidden() {
        let series = Series::from_pairs(vec![
            (d(2020, 1, 1), 1.0),
            (d(2020, 1, 2), 1.0),
            (d(2020, 1, 20), 1.0),
        ])
        .unwrap();
        let gaps = series.gaps(5);
        assert_eq!(gaps, vec![(d(2020, 1, 2), d(2020, 1, 20))]);
        assert!(series.gaps(30).is_empty());
    }

    #[test]
    fn moments() {
        let series = Series::from_values(vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert::close(series.mean(), 2.5, 1e-12);
        assert::close(series.std(), (1.25_f64).sqrt(), 1e-12);
    }
}
