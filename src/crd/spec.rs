//! # GitSync Spec
//!
//! Main CRD specification types and default values.

use crate::source::{BranchRef, SourceKey};
use serde::{Deserialize, Serialize};

/// GitSync Custom Resource Definition
///
/// Declares a git repository and branch whose manifests are continuously
/// applied to the namespace the resource lives in.
///
/// # Example
///
/// ```yaml
/// apiVersion: gitsync.dev/v1alpha1
/// kind: GitSync
/// metadata:
///   name: my-app
///   namespace: my-app
/// spec:
///   repository: https://github.com/example/my-app-manifests.git
///   branchReference: production
///   forceUpdate: true
/// ```
#[derive(
    kube::CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, schemars::JsonSchema,
)]
#[kube(
    kind = "GitSync",
    group = "gitsync.dev",
    version = "v1alpha1",
    namespaced,
    status = "crate::crd::GitSyncStatus",
    shortname = "gs",
    printcolumn = r#"{"name":"Repository", "type":"string", "jsonPath":".spec.repository"}, {"name":"Branch", "type":"string", "jsonPath":".spec.branchReference"}, {"name":"Commit", "type":"string", "jsonPath":".status.currentCommit"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GitSyncSpec {
    /// Repository location passed to `git clone` (https, ssh or local path)
    pub repository: String,
    /// Branch to apply. Empty or "master" (any case) selects the repository's default branch.
    #[serde(default)]
    pub branch_reference: String,
    /// Delete and recreate objects whose changes touch immutable fields
    #[serde(default = "default_false")]
    pub force_update: bool,
}

impl GitSyncSpec {
    /// Repository and resolved branch, used as the snapshot cache key
    #[must_use]
    pub fn source_key(&self) -> SourceKey {
        SourceKey {
            repository: self.repository.clone(),
            reference: BranchRef::parse(&self.branch_reference),
        }
    }
}

#[must_use]
pub fn default_false() -> bool {
    false
}
