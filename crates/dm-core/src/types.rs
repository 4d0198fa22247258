//! Common data types for demstat

use serde::{Deserialize, Serialize};

/// Point-estimate fit result (posterior mode / MLE).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitResult {
    /// Best-fit parameter values.
    pub parameters: Vec<f64>,

    /// Standard errors from the observed information (sqrt of inverse-Hessian diagonal).
    pub std_errors: Vec<f64>,

    /// Objective value (penalized NLL) at the minimum.
    pub nll: f64,

    /// Convergence status.
    pub converged: bool,

    /// Number of Newton iterations used.
    pub n_iterations: usize,
}

impl FitResult {
    /// Create a new fit result.
    pub fn new(
        parameters: Vec<f64>,
        std_errors: Vec<f64>,
        nll: f64,
        converged: bool,
        n_iterations: usize,
    ) -> Self {
        Self { parameters, std_errors, nll, converged, n_iterations }
    }
}

/// Posterior summary for one parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSummary {
    /// Parameter name.
    pub name: String,
    /// Posterior mean.
    pub mean: f64,
    /// Posterior standard deviation.
    pub sd: f64,
    /// Posterior median.
    pub median: f64,
    /// 2.5% posterior quantile.
    pub q025: f64,
    /// 97.5% posterior quantile.
    pub q975: f64,
    /// Rank-normalized folded split R-hat.
    pub r_hat: f64,
    /// Bulk effective sample size.
    pub ess_bulk: f64,
    /// Tail effective sample size.
    pub ess_tail: f64,
}

/// Odds-ratio summary for one coefficient (`exp(beta)` draws).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OddsRatioSummary {
    /// Coefficient name.
    pub name: String,
    /// Posterior mean of `exp(beta)`.
    pub mean: f64,
    /// Posterior median of `exp(beta)`.
    pub median: f64,
    /// Lower bound of the 95% credible interval.
    pub q025: f64,
    /// Upper bound of the 95% credible interval.
    pub q975: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_result() {
        let result = FitResult::new(vec![1.0, 2.0], vec![0.1, 0.2], 123.45, true, 7);
        assert_eq!(result.parameters.len(), 2);
        assert_eq!(result.std_errors.len(), 2);
        assert!(result.converged);
    }
}
