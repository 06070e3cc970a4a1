//! # Object Store
//!
//! The boundary between the reconciliation engine and the cluster.
//!
//! - [`ObjectStore`]: get / create / merge-patch / delete of arbitrary kinds
//! - [`StatusWriter`]: status-only writes to the owning `GitSync`
//!
//! `cluster.rs` and `status.rs` implement both over the Kubernetes API.

mod cluster;
mod status;

pub use cluster::KubeObjectStore;
pub use status::KubeStatusWriter;

use crate::crd::{GitSync, GitSyncStatus};
use crate::manifest::{DesiredObject, KindId};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Location of an object in the store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub kind: KindId,
    pub name: String,
    pub namespace: String,
}

impl ObjectKey {
    #[must_use]
    pub fn new(kind: KindId, name: &str, namespace: &str) -> Self {
        Self {
            kind,
            name: name.to_string(),
            namespace: namespace.to_string(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.kind.kind, self.namespace, self.name)
    }
}

/// An object as currently stored
#[derive(Debug, Clone, PartialEq)]
pub struct LiveObject {
    pub key: ObjectKey,
    pub document: Value,
}

impl LiveObject {
    /// Stored `spec`; `Value::Null` when the object has none
    #[must_use]
    pub fn spec(&self) -> &Value {
        self.document.get("spec").unwrap_or(&Value::Null)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// The API server answered with an error status
    #[error("request for {key} rejected ({code}): {message}")]
    Rejected {
        key: String,
        code: u16,
        message: String,
    },
    /// The request never got an answer
    #[error("request for {key} failed: {source}")]
    Transport {
        key: String,
        #[source]
        source: anyhow::Error,
    },
    /// The object could not be converted to a request body
    #[error("cannot encode {key}: {message}")]
    Encode { key: String, message: String },
}

impl StoreError {
    /// Unprocessable entity caused by a change to an immutable field
    #[must_use]
    pub fn is_immutable_field(&self) -> bool {
        matches!(self, Self::Rejected { code: 422, message, .. } if message.contains("immutable"))
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Rejected { code: 404, .. })
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// `Ok(None)` when the object does not exist
    async fn get(&self, key: &ObjectKey) -> Result<Option<LiveObject>, StoreError>;

    /// Create `desired` in its (already injected) namespace
    async fn create(&self, desired: &DesiredObject) -> Result<(), StoreError>;

    /// Apply a JSON merge patch
    async fn merge_patch(&self, key: &ObjectKey, patch: &Value) -> Result<(), StoreError>;

    /// Request deletion. Deleting an absent object succeeds.
    async fn delete(&self, key: &ObjectKey) -> Result<(), StoreError>;
}

#[async_trait]
pub trait StatusWriter: Send + Sync {
    /// Persist `status` on the status subresource of `owner`
    async fn write_status(&self, owner: &GitSync, status: &GitSyncStatus)
        -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(code: u16, message: &str) -> StoreError {
        StoreError::Rejected {
            key: "Deployment ns/web".to_string(),
            code,
            message: message.to_string(),
        }
    }

    #[test]
    fn test_immutable_rejection_detected() {
        let err = rejected(
            422,
            r#"Deployment.apps "web" is invalid: spec.selector: Invalid value: field is immutable"#,
        );
        assert!(err.is_immutable_field());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_other_rejections_are_not_immutable() {
        assert!(!rejected(422, "spec.replicas: Invalid value: -1").is_immutable_field());
        assert!(!rejected(409, "field is immutable").is_immutable_field());
        assert!(rejected(404, "not found").is_not_found());
    }
}
