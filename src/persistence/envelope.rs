//! Versioned on-disk record for one exploration grid

use serde::{Deserialize, Serialize};

use super::StoreError;
use crate::engine::exploration::ExplorationGrid;

/// Current record version
pub const ENVELOPE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridEnvelope {
    pub version: u32,
    /// Unix time (ms) of the write
    pub saved_at_ms: u64,
    pub grid: ExplorationGrid,
}

impl GridEnvelope {
    pub fn wrap(grid: ExplorationGrid) -> Self {
        let saved_at_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            version: ENVELOPE_VERSION,
            saved_at_ms,
            grid,
        }
    }

    pub fn to_json(&self) -> Result<String, StoreError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse and check the version of a record
    pub fn from_json(json: &str) -> Result<ExplorationGrid, StoreError> {
        let envelope: GridEnvelope = serde_json::from_str(json)?;
        if envelope.version == 0 || envelope.version > ENVELOPE_VERSION {
            return Err(StoreError::UnsupportedVersion(envelope.version));
        }
        Ok(envelope.grid)
    }
}
