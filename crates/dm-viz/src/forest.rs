use dm_core::types::{OddsRatioSummary, ParameterSummary};
use dm_core::Result;
use serde::Serialize;

use crate::meta::ArtifactMeta;

/// One row of a forest plot: point estimate with a 95% interval.
#[derive(Debug, Clone, Serialize)]
pub struct ForestRow {
    /// Parameter or odds-ratio name.
    pub name: String,
    /// Posterior median (the plotted marker).
    pub median: f64,
    /// Posterior mean.
    pub mean: f64,
    /// Lower bound of the 95% credible interval.
    pub q025: f64,
    /// Upper bound of the 95% credible interval.
    pub q975: f64,
}

/// Plot-friendly artifact for coefficient / odds-ratio forest plots.
#[derive(Debug, Clone, Serialize)]
pub struct ForestArtifact {
    /// Schema version for downstream consumers.
    pub schema_version: String,
    /// Tool metadata.
    pub meta: ArtifactMeta,
    /// Reference line for the interval plot: 0 for log-odds, 1 for odds
    /// ratios.
    pub reference: f64,
    /// Whether rows are odds ratios (`exp(beta)`) rather than raw
    /// coefficients.
    pub odds_ratio_scale: bool,
    /// Rows in model order.
    pub rows: Vec<ForestRow>,
}

impl ForestArtifact {
    /// Forest of raw coefficients (log-odds scale, reference at 0).
    pub fn from_parameter_summaries(summaries: &[ParameterSummary]) -> Result<Self> {
        let rows = summaries
            .iter()
            .map(|s| ForestRow {
                name: s.name.clone(),
                median: s.median,
                mean: s.mean,
                q025: s.q025,
                q975: s.q975,
            })
            .collect();
        Ok(Self {
            schema_version: "1.0".to_string(),
            meta: ArtifactMeta::now()?,
            reference: 0.0,
            odds_ratio_scale: false,
            rows,
        })
    }

    /// Forest of odds ratios (reference at 1).
    pub fn from_odds_ratios(odds: &[OddsRatioSummary]) -> Result<Self> {
        let rows = odds
            .iter()
            .map(|o| ForestRow {
                name: o.name.clone(),
                median: o.median,
                mean: o.mean,
                q025: o.q025,
                q975: o.q975,
            })
            .collect();
        Ok(Self {
            schema_version: "1.0".to_string(),
            meta: ArtifactMeta::now()?,
            reference: 1.0,
            odds_ratio_scale: true,
            rows,
        })
    }
}
