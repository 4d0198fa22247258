use dm_core::Result;
use dm_inference::SamplerResult;
use serde::Serialize;

use crate::meta::ArtifactMeta;

/// Trace of one parameter: one value array per chain.
#[derive(Debug, Clone, Serialize)]
pub struct ParameterTrace {
    /// Parameter name.
    pub name: String,
    /// `chains[c][t]` is draw `t` of chain `c`.
    pub chains: Vec<Vec<f64>>,
}

/// Plot-friendly artifact for MCMC trace plots.
#[derive(Debug, Clone, Serialize)]
pub struct TraceArtifact {
    /// Schema version for downstream consumers.
    pub schema_version: String,
    /// Tool metadata.
    pub meta: ArtifactMeta,
    /// Number of chains.
    pub n_chains: usize,
    /// Post-warmup draws per chain.
    pub n_draws: usize,
    /// Per-parameter traces, in draw order.
    pub parameters: Vec<ParameterTrace>,
    /// `divergent[c]` lists the draw indices of chain `c` that diverged.
    pub divergent: Vec<Vec<usize>>,
}

impl TraceArtifact {
    /// Build a trace artifact from a sampler result.
    pub fn from_result(result: &SamplerResult) -> Result<Self> {
        let parameters = result
            .parameter_names
            .iter()
            .enumerate()
            .map(|(i, name)| ParameterTrace {
                name: name.clone(),
                chains: result.chains.iter().map(|c| c.param_trace(i)).collect(),
            })
            .collect();

        let divergent = result
            .chains
            .iter()
            .map(|c| {
                c.divergences
                    .iter()
                    .enumerate()
                    .filter_map(|(t, &d)| d.then_some(t))
                    .collect()
            })
            .collect();

        Ok(Self {
            schema_version: "1.0".to_string(),
            meta: ArtifactMeta::now()?,
            n_chains: result.chains.len(),
            n_draws: result.chains.first().map(|c| c.len()).unwrap_or(0),
            parameters,
            divergent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dm_inference::Chain;

    fn tiny_result() -> SamplerResult {
        let chain = Chain {
            draws: vec![vec![0.1, 1.0], vec![0.2, 1.1], vec![0.3, 1.2]],
            divergences: vec![false, true, false],
            tree_depths: vec![2, 2, 3],
            accept_probs: vec![0.9, 0.5, 0.95],
            energies: vec![10.0, 11.0, 10.5],
            max_treedepth: 10,
            step_size: 0.2,
            mass_diag: vec![1.0, 1.0],
        };
        SamplerResult {
            parameter_names: vec!["intercept".to_string(), "z_age".to_string()],
            chains: vec![chain],
        }
    }

    #[test]
    fn test_trace_artifact_layout() {
        let artifact = TraceArtifact::from_result(&tiny_result()).unwrap();

        assert_eq!(artifact.n_chains, 1);
        assert_eq!(artifact.n_draws, 3);
        assert_eq!(artifact.parameters.len(), 2);
        assert_eq!(artifact.parameters[0].name, "intercept");
        assert_eq!(artifact.parameters[0].chains[0], vec![0.1, 0.2, 0.3]);
        assert_eq!(artifact.divergent, vec![vec![1]]);
    }

    #[test]
    fn test_trace_artifact_serializes() {
        let artifact = TraceArtifact::from_result(&tiny_result()).unwrap();
        let json = serde_json::to_value(&artifact).unwrap();

        assert_eq!(json["schema_version"], "1.0");
        assert_eq!(json["meta"]["tool"], "demstat");
        assert_eq!(json["parameters"][1]["name"], "z_age");
    }
}
