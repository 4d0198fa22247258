//! # dm-data
//!
//! OASIS cohort ingestion for demstat: CSV loading, complete-case cleaning,
//! derived columns (dementia indicator, z-scores) and descriptive statistics.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Cohort loading, cleaning and design-matrix assembly.
pub mod cohort;
/// Descriptive statistics.
pub mod summary;

pub use cohort::{Cohort, ColumnScale, DesignMatrix};
pub use summary::{describe, DescribeReport, VariableSummary};
