//! # GitSync Status

use serde::{Deserialize, Serialize};

/// Observed state of a `GitSync`
///
/// Only written at the end of a fully successful pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GitSyncStatus {
    /// Commit hash of the last snapshot that was applied in full
    #[serde(default)]
    pub current_commit: String,
}
