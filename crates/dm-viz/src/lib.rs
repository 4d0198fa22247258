//! # dm-viz
//!
//! Visualization data artifacts for demstat.
//!
//! This crate is intentionally dependency-light and focuses on emitting
//! plot-friendly JSON structures (arrays instead of nested objects). Actual
//! rendering happens downstream (matplotlib, vega, etc.).

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Trace artifacts (per-chain parameter traces with divergence markers).
pub mod trace;

/// Posterior density artifacts (pooled histograms).
pub mod density;

/// Forest artifacts (credible intervals for coefficients and odds ratios).
pub mod forest;

mod meta;

pub use density::{DensityArtifact, ParameterDensity};
pub use forest::{ForestArtifact, ForestRow};
pub use meta::ArtifactMeta;
pub use trace::{ParameterTrace, TraceArtifact};
