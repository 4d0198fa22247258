//! Bayesian inference for the dementia study: logistic likelihood, priors,
//! NUTS sampling with warmup adaptation, convergence diagnostics, and
//! posterior summaries.
//!
//! The main entry points are:
//! - [`mode::fit_mode`] — Newton posterior-mode fit (MLE under flat priors)
//! - [`chain::sample_nuts_multichain`] — parallel multi-chain NUTS
//! - [`diagnostics::compute_diagnostics`] / [`diagnostics::quality_summary`]
//! - [`summary::summarize_posterior`] / [`summary::odds_ratios`]

#![warn(missing_docs)]

pub mod adapt;
pub mod chain;
pub mod diagnostics;
pub mod hmc;
pub mod mode;
pub mod model;
pub mod nuts;
pub mod posterior;
pub mod summary;

pub use chain::{sample_nuts_multichain, Chain, SamplerResult};
pub use diagnostics::{compute_diagnostics, quality_summary, Diagnostics, QualityGates, QualityStatus, QualitySummary};
pub use mode::{fit_mode, NewtonConfig};
pub use model::LogisticModel;
pub use nuts::{sample_nuts, NutsConfig};
pub use posterior::{Posterior, Prior};
pub use summary::{odds_ratios, summarize_posterior};
