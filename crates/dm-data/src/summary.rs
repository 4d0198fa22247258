//! Descriptive statistics for the cleaned cohort.

use serde::Serialize;

use crate::cohort::{mean, sample_sd, Cohort};

/// Descriptive statistics for one variable.
#[derive(Debug, Clone, Serialize)]
pub struct VariableSummary {
    /// Variable name.
    pub name: String,
    /// Number of observations.
    pub n: usize,
    /// Sample mean.
    pub mean: f64,
    /// Sample standard deviation (n-1 denominator).
    pub sd: f64,
    /// Minimum.
    pub min: f64,
    /// Maximum.
    pub max: f64,
    /// Mean among nondemented subjects (CDR == 0).
    pub mean_nondemented: f64,
    /// Mean among demented subjects (CDR > 0).
    pub mean_demented: f64,
}

/// Full descriptive report for a cleaned cohort.
#[derive(Debug, Clone, Serialize)]
pub struct DescribeReport {
    /// Complete-case subjects.
    pub n: usize,
    /// Rows dropped during cleaning.
    pub n_dropped: usize,
    /// Demented subjects (CDR > 0).
    pub n_demented: usize,
    /// Nondemented subjects.
    pub n_nondemented: usize,
    /// Male subjects.
    pub n_male: usize,
    /// Per-variable summaries.
    pub variables: Vec<VariableSummary>,
}

fn summarize_variable(name: &str, values: &[f64], demented: &[u8]) -> VariableSummary {
    let by_class = |class: u8| -> f64 {
        let vals: Vec<f64> = values
            .iter()
            .zip(demented.iter())
            .filter(|(_, &d)| d == class)
            .map(|(&v, _)| v)
            .collect();
        if vals.is_empty() { f64::NAN } else { mean(&vals) }
    };

    VariableSummary {
        name: name.to_string(),
        n: values.len(),
        mean: mean(values),
        sd: sample_sd(values),
        min: values.iter().copied().fold(f64::INFINITY, f64::min),
        max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        mean_nondemented: by_class(0),
        mean_demented: by_class(1),
    }
}

/// Build the descriptive report for a cleaned cohort.
pub fn describe(cohort: &Cohort) -> DescribeReport {
    let n_demented = cohort.n_demented();
    DescribeReport {
        n: cohort.len(),
        n_dropped: cohort.n_dropped,
        n_demented,
        n_nondemented: cohort.len() - n_demented,
        n_male: cohort.sex.iter().filter(|&&s| s == 1.0).count(),
        variables: vec![
            summarize_variable("Age", &cohort.age, &cohort.demented),
            summarize_variable("MMSE", &cohort.mmse, &cohort.demented),
            summarize_variable("nWBV", &cohort.nwbv, &cohort.demented),
            summarize_variable("CDR", &cohort.cdr, &cohort.demented),
        ],
    }
}
