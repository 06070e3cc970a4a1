//! # Manifest Decoder
//!
//! Decodes one snapshot file into a generic envelope: kind identifier, name,
//! namespace and desired `spec`. The kind is discovered at runtime from the
//! document's `apiVersion`/`kind`; there is no closed set of supported kinds.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::core::GroupVersionKind;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Group/version/kind of a manifest
///
/// Ordered so it can be collected into sets reported by a reconcile pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KindId {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl KindId {
    #[must_use]
    pub fn new(group: &str, version: &str, kind: &str) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            kind: kind.to_string(),
        }
    }

    /// Split `apiVersion` into group and version. The core group has no prefix (`v1`).
    pub fn from_api_version(api_version: &str, kind: &str) -> Result<Self, ManifestError> {
        let (group, version) = match api_version.split_once('/') {
            Some((group, version)) => (group, version),
            None => ("", api_version),
        };
        if version.is_empty() || kind.is_empty() {
            return Err(ManifestError::Decode(format!(
                "invalid type discriminator apiVersion={api_version:?} kind={kind:?}"
            )));
        }
        Ok(Self::new(group, version, kind))
    }

    #[must_use]
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    #[must_use]
    pub fn to_gvk(&self) -> GroupVersionKind {
        GroupVersionKind::gvk(&self.group, &self.version, &self.kind)
    }
}

impl fmt::Display for KindId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, Kind={}", self.api_version(), self.kind)
    }
}

#[derive(Debug, Error)]
pub enum ManifestError {
    /// Not a well-formed single document of the expected shape
    #[error("cannot decode manifest: {0}")]
    Decode(String),
    /// Decoded, but `metadata.name` is absent
    #[error("manifest has no metadata.name")]
    MissingName,
}

/// A decoded manifest
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredObject {
    pub kind: KindId,
    pub name: String,
    /// Unset until the target namespace is injected
    pub namespace: Option<String>,
    /// Full document, sent as-is on create
    pub document: Value,
}

impl DesiredObject {
    /// Desired `spec`; `Value::Null` when the document has none
    #[must_use]
    pub fn spec(&self) -> &Value {
        self.document.get("spec").unwrap_or(&Value::Null)
    }

    /// Override whatever namespace the file declared
    pub fn set_namespace(&mut self, namespace: &str) {
        self.namespace = Some(namespace.to_string());
        if let Some(metadata) = self.document.get_mut("metadata").and_then(Value::as_object_mut) {
            metadata.insert("namespace".to_string(), Value::String(namespace.to_string()));
        }
    }

    /// Make `owner` the controlling owner. Non-controller references declared
    /// in the manifest are kept.
    pub fn set_owner_reference(&mut self, owner: &OwnerReference) {
        let Some(metadata) = self.document.get_mut("metadata").and_then(Value::as_object_mut)
        else {
            return;
        };
        let mut references: Vec<Value> = metadata
            .get("ownerReferences")
            .and_then(Value::as_array)
            .map(|refs| {
                refs.iter()
                    .filter(|r| r.get("controller").and_then(Value::as_bool) != Some(true))
                    .filter(|r| r.get("uid") != Some(&Value::String(owner.uid.clone())))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        references.push(serde_json::json!(owner));
        metadata.insert("ownerReferences".to_string(), Value::Array(references));
    }
}

/// Decode the raw bytes of one snapshot file.
///
/// Accepts one YAML document (JSON is a subset). Pure: touches neither network
/// nor storage.
pub fn decode(bytes: &[u8]) -> Result<DesiredObject, ManifestError> {
    let document: Value =
        serde_yaml::from_slice(bytes).map_err(|e| ManifestError::Decode(e.to_string()))?;
    let Value::Object(fields) = &document else {
        return Err(ManifestError::Decode(
            "document is not a mapping".to_string(),
        ));
    };

    let api_version = fields
        .get("apiVersion")
        .and_then(Value::as_str)
        .ok_or_else(|| ManifestError::Decode("missing apiVersion".to_string()))?;
    let kind = fields
        .get("kind")
        .and_then(Value::as_str)
        .ok_or_else(|| ManifestError::Decode("missing kind".to_string()))?;
    let kind = KindId::from_api_version(api_version, kind)?;

    let metadata = match fields.get("metadata") {
        None | Some(Value::Null) => None,
        Some(Value::Object(metadata)) => Some(metadata),
        Some(_) => {
            return Err(ManifestError::Decode(
                "metadata is not a mapping".to_string(),
            ))
        }
    };
    let name = metadata
        .and_then(|m| m.get("name"))
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .ok_or(ManifestError::MissingName)?
        .to_string();
    let namespace = metadata
        .and_then(|m| m.get("namespace"))
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(DesiredObject {
        kind,
        name,
        namespace,
        document,
    })
}
