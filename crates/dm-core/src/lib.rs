//! # dm-core
//!
//! Core types for the demstat workspace: the error type, the
//! [`LogDensityModel`](traits::LogDensityModel) trait that samplers and
//! optimizers work against, shared result types, and stable math helpers.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Error types.
pub mod error;
/// Numerically-stable math helpers.
pub mod math;
/// Core traits.
pub mod traits;
/// Common data types.
pub mod types;

pub use error::{Error, Result};
pub use types::{FitResult, OddsRatioSummary, ParameterSummary};

/// Crate version (propagated into artifact metadata).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
