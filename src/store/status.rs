//! # GitSync Status Writer
//!
//! Writes `status.currentCommit` through the status subresource so spec and
//! metadata are never touched.

use super::cluster::map_kube_error;
use super::{StatusWriter, StoreError};
use crate::constants::CONTROLLER_NAME;
use crate::crd::{GitSync, GitSyncStatus};
use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, ResourceExt};
use tracing::debug;

#[derive(Clone)]
pub struct KubeStatusWriter {
    client: Client,
}

impl std::fmt::Debug for KubeStatusWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStatusWriter").finish_non_exhaustive()
    }
}

impl KubeStatusWriter {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StatusWriter for KubeStatusWriter {
    async fn write_status(
        &self,
        owner: &GitSync,
        status: &GitSyncStatus,
    ) -> Result<(), StoreError> {
        let name = owner.name_any();
        let namespace = owner.namespace().unwrap_or_default();
        let resource = format!("GitSync {namespace}/{name}");
        let api: Api<GitSync> = Api::namespaced(self.client.clone(), &namespace);

        let patch = serde_json::json!({ "status": status });
        let params = PatchParams {
            field_manager: Some(CONTROLLER_NAME.to_string()),
            ..PatchParams::default()
        };
        api.patch_status(&name, &params, &Patch::Merge(&patch))
            .await
            .map_err(|e| map_kube_error(&resource, e))?;

        debug!(
            resource.name = %name,
            resource.namespace = %namespace,
            commit = %status.current_commit,
            "status updated"
        );
        Ok(())
    }
}
