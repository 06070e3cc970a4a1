//! # Kubernetes Object Store
//!
//! [`ObjectStore`] over `kube::Api<DynamicObject>`. The API resource is derived
//! from the manifest's group/version/kind, so any kind can be handled without
//! compiled-in types.

use super::{LiveObject, ObjectKey, ObjectStore, StoreError};
use crate::constants::CONTROLLER_NAME;
use crate::manifest::DesiredObject;
use async_trait::async_trait;
use kube::api::{Api, ApiResource, DeleteParams, Patch, PatchParams, PostParams};
use kube::core::DynamicObject;
use kube::Client;
use serde_json::Value;
use tracing::debug;

#[derive(Clone)]
pub struct KubeObjectStore {
    client: Client,
}

impl std::fmt::Debug for KubeObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeObjectStore").finish_non_exhaustive()
    }
}

impl KubeObjectStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, key: &ObjectKey) -> Api<DynamicObject> {
        let ar = ApiResource::from_gvk(&key.kind.to_gvk());
        Api::namespaced_with(self.client.clone(), &key.namespace, &ar)
    }
}

pub(crate) fn map_kube_error(key: &impl ToString, err: kube::Error) -> StoreError {
    match err {
        kube::Error::Api(api_err) => StoreError::Rejected {
            key: key.to_string(),
            code: api_err.code,
            message: api_err.message.clone(),
        },
        other => StoreError::Transport {
            key: key.to_string(),
            source: anyhow::Error::new(other),
        },
    }
}

#[async_trait]
impl ObjectStore for KubeObjectStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<LiveObject>, StoreError> {
        let found = self
            .api(key)
            .get_opt(&key.name)
            .await
            .map_err(|e| map_kube_error(key, e))?;

        found
            .map(|obj| {
                serde_json::to_value(obj)
                    .map(|document| LiveObject {
                        key: key.clone(),
                        document,
                    })
                    .map_err(|e| StoreError::Encode {
                        key: key.to_string(),
                        message: e.to_string(),
                    })
            })
            .transpose()
    }

    async fn create(&self, desired: &DesiredObject) -> Result<(), StoreError> {
        let key = ObjectKey::new(
            desired.kind.clone(),
            &desired.name,
            desired.namespace.as_deref().unwrap_or_default(),
        );
        let obj: DynamicObject =
            serde_json::from_value(desired.document.clone()).map_err(|e| StoreError::Encode {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        let params = PostParams {
            field_manager: Some(CONTROLLER_NAME.to_string()),
            ..PostParams::default()
        };
        self.api(&key)
            .create(&params, &obj)
            .await
            .map_err(|e| map_kube_error(&key, e))?;
        debug!(object = %key, "created object");
        Ok(())
    }

    async fn merge_patch(&self, key: &ObjectKey, patch: &Value) -> Result<(), StoreError> {
        let params = PatchParams {
            field_manager: Some(CONTROLLER_NAME.to_string()),
            ..PatchParams::default()
        };
        self.api(key)
            .patch(&key.name, &params, &Patch::Merge(patch))
            .await
            .map_err(|e| map_kube_error(key, e))?;
        debug!(object = %key, "patched object");
        Ok(())
    }

    async fn delete(&self, key: &ObjectKey) -> Result<(), StoreError> {
        match self.api(key).delete(&key.name, &DeleteParams::default()).await {
            Ok(_) => {
                debug!(object = %key, "deletion requested");
                Ok(())
            }
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => Ok(()),
            Err(e) => Err(map_kube_error(key, e)),
        }
    }
}
