//! Convergence diagnostics for multi-chain NUTS runs.
//!
//! Implements split R-hat in its rank-normalized + folded form (Vehtari et
//! al. 2021), bulk/tail effective sample sizes via Geyer's initial monotone
//! sequence on variogram autocorrelations, and E-BFMI. A small set of
//! quality gates turns these into an ok/warn/fail verdict for the fit report.

use std::fmt;

use crate::chain::SamplerResult;
use statrs::distribution::{ContinuousCDF, Normal};

/// Per-parameter and per-chain diagnostics for a sampling run.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    /// Rank-normalized folded split R-hat, per parameter.
    pub r_hat: Vec<f64>,
    /// Bulk ESS (on rank-normalized draws), per parameter.
    pub ess_bulk: Vec<f64>,
    /// Tail ESS (min of 5%/95% indicator ESS), per parameter.
    pub ess_tail: Vec<f64>,
    /// Fraction of post-warmup transitions that diverged.
    pub divergence_rate: f64,
    /// Fraction of transitions that saturated the maximum tree depth.
    pub max_treedepth_rate: f64,
    /// Energy Bayesian fraction of missing information, per chain.
    pub ebfmi: Vec<f64>,
}

/// Verdict of the quality gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityStatus {
    /// All gates passed.
    Ok,
    /// At least one gate in the warn band.
    Warn,
    /// At least one hard failure: treat the run as unusable.
    Fail,
}

impl fmt::Display for QualityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityStatus::Ok => write!(f, "ok"),
            QualityStatus::Warn => write!(f, "warn"),
            QualityStatus::Fail => write!(f, "fail"),
        }
    }
}

/// Thresholds separating ok / warn / fail for each diagnostic.
#[derive(Debug, Clone)]
pub struct QualityGates {
    /// R-hat/ESS/E-BFMI gates only apply with at least this many chains.
    pub min_chains: usize,
    /// ... and at least this many post-warmup draws per chain.
    pub min_draws_per_chain: usize,
    /// Divergence rate warn / fail thresholds.
    pub divergence_rate: (f64, f64),
    /// Max-treedepth rate warn / fail thresholds.
    pub treedepth_rate: (f64, f64),
    /// R-hat warn / fail thresholds.
    pub r_hat: (f64, f64),
    /// Minimum ESS as a fraction of total draws: warn / fail.
    pub ess_frac: (f64, f64),
    /// Minimum per-chain E-BFMI: warn / fail.
    pub ebfmi: (f64, f64),
}

impl Default for QualityGates {
    fn default() -> Self {
        Self {
            min_chains: 2,
            min_draws_per_chain: 50,
            divergence_rate: (0.01, 0.10),
            treedepth_rate: (0.05, 0.20),
            r_hat: (1.01, 1.10),
            ess_frac: (0.10, 0.01),
            ebfmi: (0.30, 0.20),
        }
    }
}

/// Outcome of evaluating [`QualityGates`] against a [`Diagnostics`].
#[derive(Debug, Clone)]
pub struct QualitySummary {
    /// Aggregate verdict.
    pub status: QualityStatus,
    /// Gate names in the warn band.
    pub warnings: Vec<String>,
    /// Gate names that failed.
    pub failures: Vec<String>,
    /// Whether R-hat/ESS/E-BFMI gates were active for this run length.
    pub gated: bool,
    /// Worst (largest) R-hat across parameters.
    pub max_r_hat: f64,
    /// Smallest bulk ESS across parameters.
    pub min_ess_bulk: f64,
    /// Smallest tail ESS across parameters.
    pub min_ess_tail: f64,
    /// Smallest E-BFMI across chains.
    pub min_ebfmi: f64,
}

fn finite_max(xs: &[f64]) -> f64 {
    xs.iter().copied().filter(|v| v.is_finite()).fold(f64::NAN, |a, b| if a.is_nan() || b > a { b } else { a })
}

fn finite_min(xs: &[f64]) -> f64 {
    xs.iter().copied().filter(|v| v.is_finite()).fold(f64::NAN, |a, b| if a.is_nan() || b < a { b } else { a })
}

/// Evaluate the quality gates.
///
/// R-hat, ESS and E-BFMI gates are skipped (with a warning) when the run is
/// too short for them to be meaningful; divergence and treedepth rates are
/// always checked.
pub fn quality_summary(
    diag: &Diagnostics,
    n_chains: usize,
    n_samples: usize,
    gates: &QualityGates,
) -> QualitySummary {
    let gated = n_chains >= gates.min_chains && n_samples >= gates.min_draws_per_chain;
    let total_draws = (n_chains * n_samples) as f64;

    let max_r_hat = finite_max(&diag.r_hat);
    let min_ess_bulk = finite_min(&diag.ess_bulk);
    let min_ess_tail = finite_min(&diag.ess_tail);
    let min_ebfmi = finite_min(&diag.ebfmi);

    let mut warnings = Vec::new();
    let mut failures = Vec::new();

    let mut check_high = |name: &str, value: f64, (warn, fail): (f64, f64)| {
        if !value.is_finite() || value > fail {
            failures.push(name.to_string());
        } else if value > warn {
            warnings.push(name.to_string());
        }
    };
    check_high("divergence_rate", diag.divergence_rate, gates.divergence_rate);
    check_high("max_treedepth_rate", diag.max_treedepth_rate, gates.treedepth_rate);

    if !gated {
        warnings.push("run_too_short_for_rhat_ess_gates".to_string());
    } else {
        if !max_r_hat.is_finite() || max_r_hat > gates.r_hat.1 {
            failures.push("r_hat".to_string());
        } else if max_r_hat > gates.r_hat.0 {
            warnings.push("r_hat".to_string());
        }

        let (warn_frac, fail_frac) = gates.ess_frac;
        for (name, value) in [("ess_bulk", min_ess_bulk), ("ess_tail", min_ess_tail)] {
            if !value.is_finite() || value < fail_frac * total_draws {
                failures.push(name.to_string());
            } else if value < warn_frac * total_draws {
                warnings.push(name.to_string());
            }
        }

        if !min_ebfmi.is_finite() || min_ebfmi < gates.ebfmi.1 {
            failures.push("ebfmi".to_string());
        } else if min_ebfmi < gates.ebfmi.0 {
            warnings.push("ebfmi".to_string());
        }
    }

    let status = if !failures.is_empty() {
        QualityStatus::Fail
    } else if !warnings.is_empty() {
        QualityStatus::Warn
    } else {
        QualityStatus::Ok
    };

    QualitySummary {
        status,
        warnings,
        failures,
        gated,
        max_r_hat,
        min_ess_bulk,
        min_ess_tail,
        min_ebfmi,
    }
}

fn chain_mean(c: &[f64]) -> f64 {
    c.iter().sum::<f64>() / c.len() as f64
}

fn chain_var(c: &[f64], mean: f64) -> f64 {
    c.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / (c.len() as f64 - 1.0)
}

/// Split each chain in half and trim all halves to a common length.
fn split_halves<'a>(chains: &[&'a [f64]]) -> Option<Vec<&'a [f64]>> {
    if chains.is_empty() || chains.iter().any(|c| c.len() < 4) {
        return None;
    }
    let mut halves = Vec::with_capacity(chains.len() * 2);
    for c in chains {
        let mid = c.len() / 2;
        halves.push(&c[..mid]);
        halves.push(&c[mid..]);
    }
    let min_len = halves.iter().map(|h| h.len()).min()?;
    if min_len < 2 {
        return None;
    }
    Some(halves.into_iter().map(|h| &h[..min_len]).collect())
}

/// Plain split R-hat (Gelman et al.): sqrt(var_hat_plus / W).
pub fn split_r_hat(chains: &[&[f64]]) -> f64 {
    let halves = match split_halves(chains) {
        Some(h) => h,
        None => return f64::NAN,
    };

    let m = halves.len() as f64;
    let n = halves[0].len() as f64;

    let means: Vec<f64> = halves.iter().map(|h| chain_mean(h)).collect();
    let grand = means.iter().sum::<f64>() / m;

    let b = means.iter().map(|&mu| (mu - grand).powi(2)).sum::<f64>() * n / (m - 1.0);
    let w = halves.iter().zip(&means).map(|(h, &mu)| chain_var(h, mu)).sum::<f64>() / m;

    if w < 1e-30 {
        return f64::NAN;
    }
    let var_hat_plus = (n - 1.0) / n * w + b / n;
    (var_hat_plus / w).sqrt()
}

/// Replace draws by normal quantiles of their pooled average ranks.
fn rank_normalize(chains: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let normal = Normal::new(0.0, 1.0).expect("unit normal is valid");
    let total: usize = chains.iter().map(Vec::len).sum();
    if total == 0 {
        return chains.to_vec();
    }

    let mut flat: Vec<(f64, usize, usize)> = Vec::with_capacity(total);
    for (ci, chain) in chains.iter().enumerate() {
        for (ti, &x) in chain.iter().enumerate() {
            flat.push((x, ci, ti));
        }
    }
    flat.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Greater));

    let mut out: Vec<Vec<f64>> = chains.iter().map(|c| vec![0.0; c.len()]).collect();
    let n = flat.len();
    let mut i = 0;
    while i < n {
        // Ties share the averaged rank.
        let mut j = i + 1;
        while j < n && flat[j].0 == flat[i].0 {
            j += 1;
        }
        let rank = 0.5 * ((i + 1) as f64 + j as f64);
        let p = ((rank - 0.5) / n as f64).clamp(1e-12, 1.0 - 1e-12);
        let z = normal.inverse_cdf(p);
        for &(_, ci, ti) in &flat[i..j] {
            out[ci][ti] = z;
        }
        i = j;
    }
    out
}

fn pooled_median(chains: &[Vec<f64>]) -> f64 {
    let mut all: Vec<f64> = chains.iter().flatten().copied().collect();
    all.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Greater));
    all.get(all.len() / 2).copied().unwrap_or(f64::NAN)
}

/// Rank-normalized folded split R-hat: max of R-hat on rank-normalized draws
/// and on rank-normalized folded draws `|x - median|`.
pub fn r_hat(chains: &[Vec<f64>]) -> f64 {
    if chains.is_empty() || chains.iter().any(|c| c.len() < 4) {
        return f64::NAN;
    }

    let z = rank_normalize(chains);
    let z_refs: Vec<&[f64]> = z.iter().map(Vec::as_slice).collect();
    let r_bulk = split_r_hat(&z_refs);

    let med = pooled_median(chains);
    let folded: Vec<Vec<f64>> =
        chains.iter().map(|c| c.iter().map(|&x| (x - med).abs()).collect()).collect();
    let zf = rank_normalize(&folded);
    let zf_refs: Vec<&[f64]> = zf.iter().map(Vec::as_slice).collect();
    let r_tail = split_r_hat(&zf_refs);

    r_bulk.max(r_tail)
}

/// ESS via Geyer's initial monotone sequence on variogram autocorrelations.
fn ess_raw(chains: &[&[f64]]) -> f64 {
    let halves = match split_halves(chains) {
        Some(h) => h,
        None => return 0.0,
    };

    let m = halves.len();
    let n = halves[0].len();
    let total = (m * n) as f64;

    let means: Vec<f64> = halves.iter().map(|h| chain_mean(h)).collect();
    let vars: Vec<f64> = halves.iter().zip(&means).map(|(h, &mu)| chain_var(h, mu)).collect();

    let m_f = m as f64;
    let n_f = n as f64;
    let grand = means.iter().sum::<f64>() / m_f;
    let b = means.iter().map(|&mu| (mu - grand).powi(2)).sum::<f64>() * n_f / (m_f - 1.0);
    let w = vars.iter().sum::<f64>() / m_f;
    let var_hat_plus = (n_f - 1.0) / n_f * w + b / n_f;

    if !var_hat_plus.is_finite() || var_hat_plus < 1e-30 {
        // Degenerate chains (e.g. all-zero tail indicators): no information
        // about mixing, report total draws.
        return total;
    }

    // rho_t = 1 - V_t / (2 var_hat_plus), V_t the lag-t variogram.
    let mut rho: Vec<f64> = Vec::new();
    for lag in 1..n {
        let mut sum = 0.0;
        let mut count = 0usize;
        for h in &halves {
            for i in 0..(n - lag) {
                let d = h[i] - h[i + lag];
                sum += d * d;
                count += 1;
            }
        }
        if count == 0 {
            break;
        }
        let r = (1.0 - sum / (count as f64) / (2.0 * var_hat_plus)).clamp(-1.0, 1.0);
        rho.push(r);

        // Stop early once a paired sum goes negative.
        let k = rho.len();
        if k >= 2 && k % 2 == 0 && rho[k - 2] + rho[k - 1] < 0.0 {
            break;
        }
    }

    // Initial positive sequence of paired sums, then monotone adjustment.
    let mut gammas: Vec<f64> = Vec::new();
    let mut i = 0;
    while i + 1 < rho.len() {
        let g = rho[i] + rho[i + 1];
        if g < 0.0 {
            break;
        }
        gammas.push(g);
        i += 2;
    }
    for k in 1..gammas.len() {
        if gammas[k] > gammas[k - 1] {
            gammas[k] = gammas[k - 1];
        }
    }

    let tau = 1.0 + 2.0 * gammas.iter().sum::<f64>();
    if !tau.is_finite() || tau <= 0.0 {
        return total;
    }
    (total / tau).clamp(1.0, total)
}

/// Bulk ESS: ESS of the rank-normalized draws.
pub fn ess_bulk(chains: &[Vec<f64>]) -> f64 {
    let z = rank_normalize(chains);
    let refs: Vec<&[f64]> = z.iter().map(Vec::as_slice).collect();
    ess_raw(&refs)
}

/// Tail ESS: minimum of the ESS of the 5% and 95% tail indicator chains.
pub fn ess_tail(chains: &[Vec<f64>]) -> f64 {
    let mut all: Vec<f64> = chains.iter().flatten().copied().collect();
    if all.is_empty() {
        return 0.0;
    }
    all.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Greater));
    let q05 = quantile_sorted(&all, 0.05);
    let q95 = quantile_sorted(&all, 0.95);

    let indicator = |cut: f64, lower: bool| -> f64 {
        let ind: Vec<Vec<f64>> = chains
            .iter()
            .map(|c| {
                c.iter()
                    .map(|&x| if (lower && x <= cut) || (!lower && x >= cut) { 1.0 } else { 0.0 })
                    .collect()
            })
            .collect();
        let refs: Vec<&[f64]> = ind.iter().map(Vec::as_slice).collect();
        ess_raw(&refs)
    };

    indicator(q05, true).min(indicator(q95, false))
}

/// Linear-interpolation quantile of a sorted slice.
pub(crate) fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() as f64 - 1.0);
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let f = pos - lo as f64;
    sorted[lo] * (1.0 - f) + sorted[hi] * f
}

/// E-BFMI of one chain's energy trace.
///
/// Values below ~0.3 indicate the momentum resampling cannot explore the
/// energy marginal efficiently.
pub fn ebfmi(energies: &[f64]) -> f64 {
    if energies.len() < 2 {
        return f64::NAN;
    }
    let mean = chain_mean(energies);
    let var = energies.iter().map(|&e| (e - mean).powi(2)).sum::<f64>() / energies.len() as f64;
    if var < 1e-30 {
        return f64::NAN;
    }
    let sq_diff: f64 =
        energies.windows(2).map(|w| (w[1] - w[0]).powi(2)).sum::<f64>() / (energies.len() - 1) as f64;
    sq_diff / var
}

/// Compute all diagnostics for a multi-chain run.
pub fn compute_diagnostics(result: &SamplerResult) -> Diagnostics {
    let n_params = result.parameter_names.len();

    let mut r_hat_vals = Vec::with_capacity(n_params);
    let mut ess_bulk_vals = Vec::with_capacity(n_params);
    let mut ess_tail_vals = Vec::with_capacity(n_params);

    for p in 0..n_params {
        let per_chain: Vec<Vec<f64>> =
            result.chains.iter().map(|c| c.param_trace(p)).collect();
        r_hat_vals.push(r_hat(&per_chain));
        ess_bulk_vals.push(ess_bulk(&per_chain));
        ess_tail_vals.push(ess_tail(&per_chain));
    }

    let total: usize = result.chains.iter().map(|c| c.len()).sum();
    let n_div: usize = result.chains.iter().map(|c| c.n_divergent()).sum();
    let n_deep: usize = result.chains.iter().map(|c| c.n_max_treedepth()).sum();
    let divergence_rate = if total > 0 { n_div as f64 / total as f64 } else { 0.0 };
    let max_treedepth_rate = if total > 0 { n_deep as f64 / total as f64 } else { 0.0 };

    let ebfmi_vals: Vec<f64> = result.chains.iter().map(|c| ebfmi(&c.energies)).collect();

    Diagnostics {
        r_hat: r_hat_vals,
        ess_bulk: ess_bulk_vals,
        ess_tail: ess_tail_vals,
        divergence_rate,
        max_treedepth_rate,
        ebfmi: ebfmi_vals,
    }
}
