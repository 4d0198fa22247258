use std::time::{SystemTime, UNIX_EPOCH};

use dm_core::Result;
use serde::Serialize;

/// Shared metadata block for all artifacts.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactMeta {
    /// Tool identifier.
    pub tool: String,
    /// Tool version.
    pub tool_version: String,
    /// Creation timestamp (unix milliseconds).
    pub created_unix_ms: u128,
}

impl ArtifactMeta {
    /// Metadata stamped with the current time.
    pub fn now() -> Result<Self> {
        let d = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| dm_core::Error::Computation(format!("system time error: {}", e)))?;
        Ok(Self {
            tool: "demstat".to_string(),
            tool_version: dm_core::VERSION.to_string(),
            created_unix_ms: d.as_millis(),
        })
    }
}
