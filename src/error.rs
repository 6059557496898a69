//! Error types shared across the analysis pipeline.

use thiserror::Error;

/// Alias for results produced by this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures raised by ingestion, configuration, sampling, and analysis.
///
/// Every variant carries enough structured context (which parameter, which
/// threshold, observed value) to diagnose the failure without rerunning.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// The series is too short for the requested operation.
    #[error("insufficient data: {operation} requires at least {required} observations, got {actual}")]
    InsufficientData {
        /// Operation that rejected the series.
        operation: &'static str,
        /// Minimum observations required.
        required: usize,
        /// Observations supplied.
        actual: usize,
    },

    /// Dates are not strictly increasing at the given position.
    #[error("non-monotonic date axis at index {index}: {date} does not follow {previous}")]
    NonMonotonicDates {
        /// Index of the offending observation.
        index: usize,
        /// Date at `index`.
        date: chrono::NaiveDate,
        /// Date at `index - 1`.
        previous: chrono::NaiveDate,
    },

    /// A value is NaN or infinite where a finite number is required.
    #[error("non-finite value {value} at index {index}")]
    NonFiniteValue {
        /// Index of the offending observation.
        index: usize,
        /// The offending value.
        value: f64,
    },

    /// A price is zero or negative where positivity is required.
    #[error("non-positive price {value} at index {index}; log returns are undefined")]
    NonPositivePrice {
        /// Index of the offending observation.
        index: usize,
        /// The offending value.
        value: f64,
    },

    /// A configuration parameter is out of range for the given data.
    #[error("invalid configuration: {parameter} = {value} ({reason})")]
    Configuration {
        /// Name of the rejected parameter.
        parameter: &'static str,
        /// Stringified rejected value.
        value: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// An unrecognized point-estimate method string.
    #[error("unrecognized estimate method '{given}'; expected 'mean', 'median', or 'mode'")]
    InvalidMethod {
        /// The string that failed to parse.
        given: String,
    },

    /// The posterior contains no draws.
    #[error("posterior contains zero draws")]
    EmptyPosterior,

    /// Convergence diagnostics require at least two chains.
    #[error("convergence diagnostics require at least 2 chains, got {chains}")]
    InsufficientChains {
        /// Number of chains in the posterior.
        chains: usize,
    },

    /// Event association was requested but the series carries no date axis.
    #[error("event association requires a dated series; the change point has no date")]
    MissingDates,

    /// The sampler produced too many divergent transitions to trust the fit.
    #[error(
        "sampling rejected: {divergent} of {total} post-warmup draws were divergent \
         (ceiling {ceiling:.0}%)"
    )]
    FatalSampling {
        /// Number of divergent post-warmup draws.
        divergent: usize,
        /// Total post-warmup draws.
        total: usize,
        /// Rejection ceiling as a percentage.
        ceiling: f64,
    },

    /// The fit was cancelled before completion; no partial results exist.
    #[error("sampling cancelled before completion")]
    Cancelled,
}
