use dm_core::{Error, Result};
use dm_inference::SamplerResult;
use serde::Serialize;

use crate::meta::ArtifactMeta;

/// Pooled posterior histogram of one parameter.
#[derive(Debug, Clone, Serialize)]
pub struct ParameterDensity {
    /// Parameter name.
    pub name: String,
    /// Bin edges, length `n_bins + 1`.
    pub edges: Vec<f64>,
    /// Normalized density per bin (integrates to 1).
    pub density: Vec<f64>,
    /// Pooled posterior mean, for a center line.
    pub mean: f64,
}

/// Plot-friendly artifact for posterior density plots.
#[derive(Debug, Clone, Serialize)]
pub struct DensityArtifact {
    /// Schema version for downstream consumers.
    pub schema_version: String,
    /// Tool metadata.
    pub meta: ArtifactMeta,
    /// Number of bins used for every parameter.
    pub n_bins: usize,
    /// Per-parameter histograms.
    pub parameters: Vec<ParameterDensity>,
}

fn histogram(draws: &[f64], n_bins: usize) -> Result<(Vec<f64>, Vec<f64>)> {
    let lo = draws.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = draws.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !lo.is_finite() || !hi.is_finite() {
        return Err(Error::Computation("non-finite draws in density artifact".to_string()));
    }

    // Degenerate (constant) traces get a single-bin spike.
    let (lo, hi) = if hi > lo { (lo, hi) } else { (lo - 0.5, hi + 0.5) };
    let width = (hi - lo) / n_bins as f64;

    let edges: Vec<f64> = (0..=n_bins).map(|i| lo + i as f64 * width).collect();
    let mut counts = vec![0usize; n_bins];
    for &x in draws {
        let mut bin = ((x - lo) / width) as usize;
        if bin >= n_bins {
            bin = n_bins - 1;
        }
        counts[bin] += 1;
    }

    let total = draws.len() as f64;
    let density = counts.iter().map(|&c| c as f64 / (total * width)).collect();
    Ok((edges, density))
}

impl DensityArtifact {
    /// Build a density artifact from pooled draws, `n_bins` bins per
    /// parameter.
    pub fn from_result(result: &SamplerResult, n_bins: usize) -> Result<Self> {
        if n_bins == 0 {
            return Err(Error::Validation("n_bins must be >= 1".to_string()));
        }
        if result.total_draws() == 0 {
            return Err(Error::Validation("no draws to summarize".to_string()));
        }

        let parameters = result
            .parameter_names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let draws = result.param_draws(i);
                let (edges, density) = histogram(&draws, n_bins)?;
                Ok(ParameterDensity {
                    name: name.clone(),
                    edges,
                    density,
                    mean: result.param_mean(i),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            schema_version: "1.0".to_string(),
            meta: ArtifactMeta::now()?,
            n_bins,
            parameters,
        })
    }
}
