//! Multi-chain orchestration.
//!
//! Chains run in parallel via rayon, each with its own RNG stream derived
//! from the base seed, so results are reproducible regardless of thread
//! scheduling.

use crate::nuts::{sample_nuts, NutsConfig};
use crate::posterior::Posterior;
use dm_core::traits::LogDensityModel;
use dm_core::{Error, Result};
use rayon::prelude::*;

/// Raw output of a single NUTS chain.
#[derive(Debug, Clone)]
pub struct Chain {
    /// Post-warmup draws, one `Vec<f64>` of length `dim` per iteration.
    pub draws: Vec<Vec<f64>>,
    /// Per-draw divergence flags.
    pub divergences: Vec<bool>,
    /// Tree depth reached at each draw (0-based).
    pub tree_depths: Vec<usize>,
    /// Mean Metropolis acceptance probability of each transition.
    pub accept_probs: Vec<f64>,
    /// Hamiltonian at the start of each transition (for E-BFMI).
    pub energies: Vec<f64>,
    /// Configured maximum tree depth.
    pub max_treedepth: usize,
    /// Adapted step size used for sampling.
    pub step_size: f64,
    /// Diagonal of the adapted mass matrix.
    pub mass_diag: Vec<f64>,
}

impl Chain {
    /// Number of post-warmup draws.
    pub fn len(&self) -> usize {
        self.draws.len()
    }

    /// True if the chain has no draws.
    pub fn is_empty(&self) -> bool {
        self.draws.is_empty()
    }

    /// Number of divergent transitions.
    pub fn n_divergent(&self) -> usize {
        self.divergences.iter().filter(|&&d| d).count()
    }

    /// Number of transitions that saturated the maximum tree depth.
    pub fn n_max_treedepth(&self) -> usize {
        self.tree_depths.iter().filter(|&&d| d >= self.max_treedepth).count()
    }

    /// Extract the trace of a single parameter.
    pub fn param_trace(&self, index: usize) -> Vec<f64> {
        self.draws.iter().map(|d| d[index]).collect()
    }
}

/// Combined output of a multi-chain NUTS run.
#[derive(Debug, Clone)]
pub struct SamplerResult {
    /// Parameter names, in draw order.
    pub parameter_names: Vec<String>,
    /// One [`Chain`] per requested chain.
    pub chains: Vec<Chain>,
}

impl SamplerResult {
    /// All draws of one parameter, chains concatenated in order.
    pub fn param_draws(&self, index: usize) -> Vec<f64> {
        let total: usize = self.chains.iter().map(Chain::len).sum();
        let mut out = Vec::with_capacity(total);
        for chain in &self.chains {
            out.extend(chain.draws.iter().map(|d| d[index]));
        }
        out
    }

    /// Posterior mean of one parameter across all chains.
    pub fn param_mean(&self, index: usize) -> f64 {
        let draws = self.param_draws(index);
        draws.iter().sum::<f64>() / draws.len() as f64
    }

    /// Total post-warmup draws across chains.
    pub fn total_draws(&self) -> usize {
        self.chains.iter().map(Chain::len).sum()
    }
}

/// Run `n_chains` NUTS chains in parallel.
///
/// Chain `c` uses seed `seed + c`, so a run is fully determined by
/// `(seed, n_chains, n_warmup, n_samples, config)`.
pub fn sample_nuts_multichain<M: LogDensityModel + ?Sized>(
    posterior: &Posterior<'_, M>,
    n_chains: usize,
    n_warmup: usize,
    n_samples: usize,
    seed: u64,
    config: NutsConfig,
) -> Result<SamplerResult> {
    if n_chains == 0 {
        return Err(Error::Validation("n_chains must be >= 1".to_string()));
    }
    if n_samples == 0 {
        return Err(Error::Validation("n_samples must be >= 1".to_string()));
    }

    tracing::info!(n_chains, n_warmup, n_samples, seed, "starting NUTS");

    let chains: Vec<Chain> = (0..n_chains)
        .into_par_iter()
        .map(|c| sample_nuts(posterior, n_warmup, n_samples, seed + c as u64, config.clone()))
        .collect::<Result<Vec<_>>>()?;

    let n_divergent: usize = chains.iter().map(Chain::n_divergent).sum();
    tracing::info!(
        total_draws = chains.iter().map(Chain::len).sum::<usize>(),
        n_divergent,
        "sampling complete"
    );

    Ok(SamplerResult { parameter_names: posterior.model().parameter_names(), chains })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LogisticModel;
    use crate::posterior::Prior;

    fn fixture_model() -> LogisticModel {
        let json = include_str!("../../../tests/fixtures/logistic_small.json");
        let v: serde_json::Value = serde_json::from_str(json).unwrap();
        let x: Vec<Vec<f64>> = serde_json::from_value(v["x"].clone()).unwrap();
        let y: Vec<u8> = v["y"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| if e.as_f64().unwrap() >= 0.5 { 1u8 } else { 0u8 })
            .collect();
        LogisticModel::new(x, y, vec!["x1".to_string(), "x2".to_string()]).unwrap()
    }

    #[test]
    fn test_multichain_shapes() {
        let m = fixture_model();
        let post = Posterior::new(&m).with_priors(Prior::weakly_informative(3)).unwrap();
        let result =
            sample_nuts_multichain(&post, 2, 50, 25, 7, NutsConfig::default()).unwrap();

        assert_eq!(result.chains.len(), 2);
        assert_eq!(result.total_draws(), 50);
        assert_eq!(result.parameter_names, vec!["intercept", "x1", "x2"]);
        assert_eq!(result.param_draws(0).len(), 50);
    }

    #[test]
    fn test_multichain_chains_differ() {
        let m = fixture_model();
        let post = Posterior::new(&m).with_priors(Prior::weakly_informative(3)).unwrap();
        let result =
            sample_nuts_multichain(&post, 2, 50, 25, 7, NutsConfig::default()).unwrap();

        assert_ne!(
            result.chains[0].draws, result.chains[1].draws,
            "chains with different seeds should not coincide"
        );
    }

    #[test]
    fn test_multichain_deterministic() {
        let m = fixture_model();
        let post = Posterior::new(&m).with_priors(Prior::weakly_informative(3)).unwrap();
        let config = NutsConfig { init_jitter: 0.0, ..Default::default() };

        let r1 = sample_nuts_multichain(&post, 2, 50, 20, 11, config.clone()).unwrap();
        let r2 = sample_nuts_multichain(&post, 2, 50, 20, 11, config).unwrap();

        for (c1, c2) in r1.chains.iter().zip(r2.chains.iter()) {
            assert_eq!(c1.draws, c2.draws);
        }
    }

    #[test]
    fn test_multichain_rejects_zero_chains() {
        let m = fixture_model();
        let post = Posterior::new(&m).with_priors(Prior::weakly_informative(3)).unwrap();
        assert!(sample_nuts_multichain(&post, 0, 10, 10, 1, NutsConfig::default()).is_err());
    }

    #[test]
    #[ignore] // slow: full-length recovery run
    fn test_posterior_mean_recovers_mle_region() {
        let m = fixture_model();
        // Flat priors: posterior mean should land near the MLE.
        let post = Posterior::new(&m).with_priors(Prior::flat(3)).unwrap();
        let result =
            sample_nuts_multichain(&post, 4, 500, 500, 42, NutsConfig::default()).unwrap();

        let json = include_str!("../../../tests/fixtures/logistic_small.json");
        let v: serde_json::Value = serde_json::from_str(json).unwrap();
        let beta_hat: Vec<f64> = serde_json::from_value(v["beta_hat"].clone()).unwrap();

        for (i, &b) in beta_hat.iter().enumerate() {
            let mean = result.param_mean(i);
            // Wide tolerance: small n, heavy-tailed posterior.
            assert!(
                (mean - b).abs() < 1.5,
                "posterior mean {} for param {} too far from MLE {}",
                mean,
                i,
                b
            );
        }
    }
}
