//! Retrospective Bayesian change-point analysis for univariate time series
//! such as
//!  * Stationarity screening with ADF and KPSS
//!  * A single-change-point model over (τ, μ₁, μ₂, σ₁, σ₂) fit by MCMC
//!  * Convergence diagnostics, impact quantification, and event association
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

pub mod generators;

mod error;
pub use error::*;

mod series;
pub use series::*;

mod stationarity;
pub use stationarity::*;

mod model;
pub use model::*;

mod posterior;
pub use posterior::*;

mod diagnostics;
pub use diagnostics::*;

mod extract;
pub use extract::*;

mod impact;
pub use impact::*;

mod events;
pub use events::*;

mod statement;
pub use statement::*;

mod analysis;
pub use analysis::*;

pub use rv;
