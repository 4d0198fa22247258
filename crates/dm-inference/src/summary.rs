//! Posterior summary tables: per-parameter summaries with convergence
//! diagnostics attached, and odds ratios for the coefficients.

use crate::chain::SamplerResult;
use crate::diagnostics::{quantile_sorted, Diagnostics};
use dm_core::types::{OddsRatioSummary, ParameterSummary};

fn mean_sd(draws: &[f64]) -> (f64, f64) {
    let n = draws.len() as f64;
    let mean = draws.iter().sum::<f64>() / n;
    let var = draws.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, var.sqrt())
}

fn sorted(draws: &[f64]) -> Vec<f64> {
    let mut s = draws.to_vec();
    s.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Greater));
    s
}

/// Summarize each parameter's pooled posterior draws.
///
/// Diagnostics are matched by index, so `diag` must come from the same
/// [`SamplerResult`].
pub fn summarize_posterior(result: &SamplerResult, diag: &Diagnostics) -> Vec<ParameterSummary> {
    result
        .parameter_names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let draws = result.param_draws(i);
            let (mean, sd) = mean_sd(&draws);
            let s = sorted(&draws);
            ParameterSummary {
                name: name.clone(),
                mean,
                sd,
                median: quantile_sorted(&s, 0.5),
                q025: quantile_sorted(&s, 0.025),
                q975: quantile_sorted(&s, 0.975),
                r_hat: diag.r_hat[i],
                ess_bulk: diag.ess_bulk[i],
                ess_tail: diag.ess_tail[i],
            }
        })
        .collect()
}

/// Odds ratios `exp(beta)` for each coefficient, intercept excluded.
///
/// Summaries are computed on the exponentiated draws, not by exponentiating
/// the beta summaries, so the interval endpoints are genuine posterior
/// quantiles of the odds ratio.
pub fn odds_ratios(result: &SamplerResult) -> Vec<OddsRatioSummary> {
    result
        .parameter_names
        .iter()
        .enumerate()
        .skip(1) // intercept is not an odds ratio
        .map(|(i, name)| {
            let draws: Vec<f64> = result.param_draws(i).iter().map(|&b| b.exp()).collect();
            let (mean, _) = mean_sd(&draws);
            let s = sorted(&draws);
            OddsRatioSummary {
                name: name.clone(),
                mean,
                median: quantile_sorted(&s, 0.5),
                q025: quantile_sorted(&s, 0.025),
                q975: quantile_sorted(&s, 0.975),
            }
        })
        .collect()
}
