//! Common test utilities
//!
//! In-memory stand-ins for the engine's seams: a fetcher serving a fixed
//! snapshot, an object store that records every call, and a status writer.

#![allow(dead_code, reason = "not every test binary uses every helper")]

use async_trait::async_trait;
use gitsync_controller::crd::{GitSync, GitSyncSpec, GitSyncStatus};
use gitsync_controller::manifest::{DesiredObject, KindId};
use gitsync_controller::source::{Snapshot, SourceError, SourceFetcher, SourceKey};
use gitsync_controller::store::{LiveObject, ObjectKey, ObjectStore, StatusWriter, StoreError};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub const NAMESPACE: &str = "team-a";
pub const COMMIT: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

pub fn gitsync(repository: &str, branch: &str, force_update: bool) -> GitSync {
    let mut obj = GitSync::new(
        "apps",
        GitSyncSpec {
            repository: repository.to_string(),
            branch_reference: branch.to_string(),
            force_update,
        },
    );
    obj.metadata.namespace = Some(NAMESPACE.to_string());
    obj.metadata.uid = Some("7d3c1e52-0000-4000-8000-000000000001".to_string());
    obj
}

pub fn config_map_kind() -> KindId {
    KindId::new("", "v1", "ConfigMap")
}

pub fn service_kind() -> KindId {
    KindId::new("", "v1", "Service")
}

pub fn key(kind: KindId, name: &str) -> ObjectKey {
    ObjectKey::new(kind, name, NAMESPACE)
}

pub fn service_yaml(name: &str, cluster_ip: &str) -> Vec<u8> {
    format!(
        "apiVersion: v1\nkind: Service\nmetadata:\n  name: {name}\nspec:\n  clusterIP: {cluster_ip}\n  ports:\n    - port: 80\n"
    )
    .into_bytes()
}

pub fn snapshot(files: &[(&str, Vec<u8>)]) -> Snapshot {
    let files: BTreeMap<String, Vec<u8>> = files
        .iter()
        .map(|(path, bytes)| ((*path).to_string(), bytes.clone()))
        .collect();
    Snapshot::new(COMMIT, files)
}

#[derive(Debug)]
pub struct FakeFetcher {
    snapshot: Mutex<Snapshot>,
    pub calls: AtomicUsize,
    pub fail: Mutex<Option<String>>,
}

impl FakeFetcher {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
            calls: AtomicUsize::new(0),
            fail: Mutex::new(None),
        }
    }

    pub fn set_snapshot(&self, snapshot: Snapshot) {
        *self.snapshot.lock().unwrap() = snapshot;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceFetcher for FakeFetcher {
    async fn fetch(&self, key: &SourceKey) -> Result<Snapshot, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.fail.lock().unwrap().clone() {
            return Err(SourceError::Unavailable {
                key: key.clone(),
                message,
            });
        }
        Ok(self.snapshot.lock().unwrap().clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Get(ObjectKey),
    Create(ObjectKey),
    Patch(ObjectKey),
    Delete(ObjectKey),
}

impl Call {
    pub fn is_write(&self) -> bool {
        !matches!(self, Call::Get(_))
    }
}

/// Object store backed by a map
///
/// Patch rejections, read failures and deletion lag (number of reads that
/// still see an object after it was deleted) are configured per key.
#[derive(Debug, Default)]
pub struct FakeStore {
    objects: Mutex<BTreeMap<ObjectKey, Value>>,
    terminating: Mutex<HashMap<ObjectKey, (Value, u32)>>,
    patch_rejections: Mutex<HashMap<ObjectKey, (u16, String)>>,
    deletion_lag: Mutex<HashMap<ObjectKey, u32>>,
    read_failures: Mutex<HashMap<ObjectKey, u32>>,
    calls: Mutex<Vec<Call>>,
}

impl FakeStore {
    pub fn insert(&self, key: ObjectKey, document: Value) {
        self.objects.lock().unwrap().insert(key, document);
    }

    pub fn object(&self, key: &ObjectKey) -> Option<Value> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn reject_patch(&self, key: ObjectKey, code: u16, message: &str) {
        self.patch_rejections
            .lock()
            .unwrap()
            .insert(key, (code, message.to_string()));
    }

    pub fn reject_patch_as_immutable(&self, key: ObjectKey) {
        self.reject_patch(
            key,
            422,
            "Service \"web\" is invalid: spec.clusterIP: Invalid value: \"10.0.0.2\": field is immutable",
        );
    }

    pub fn lag_deletion(&self, key: ObjectKey, reads: u32) {
        self.deletion_lag.lock().unwrap().insert(key, reads);
    }

    /// Let `reads` lookups of `key` succeed, then fail every later one
    pub fn fail_reads_after(&self, key: ObjectKey, reads: u32) {
        self.read_failures.lock().unwrap().insert(key, reads);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_write).collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<LiveObject>, StoreError> {
        self.record(Call::Get(key.clone()));
        if let Some(remaining) = self.read_failures.lock().unwrap().get_mut(key) {
            if *remaining == 0 {
                return Err(StoreError::Rejected {
                    key: key.to_string(),
                    code: 503,
                    message: "the server is currently unable to handle the request".to_string(),
                });
            }
            *remaining -= 1;
        }
        if let Some(document) = self.objects.lock().unwrap().get(key) {
            return Ok(Some(LiveObject {
                key: key.clone(),
                document: document.clone(),
            }));
        }
        let mut terminating = self.terminating.lock().unwrap();
        if let Some((document, remaining)) = terminating.get_mut(key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(Some(LiveObject {
                    key: key.clone(),
                    document: document.clone(),
                }));
            }
            terminating.remove(key);
        }
        Ok(None)
    }

    async fn create(&self, desired: &DesiredObject) -> Result<(), StoreError> {
        let namespace = desired.namespace.clone().unwrap_or_default();
        let key = ObjectKey::new(desired.kind.clone(), &desired.name, &namespace);
        self.record(Call::Create(key.clone()));

        let still_terminating = self
            .terminating
            .lock()
            .unwrap()
            .get(&key)
            .is_some_and(|(_, remaining)| *remaining > 0);
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(&key) || still_terminating {
            return Err(StoreError::Rejected {
                key: key.to_string(),
                code: 409,
                message: "already exists".to_string(),
            });
        }
        self.terminating.lock().unwrap().remove(&key);
        objects.insert(key, desired.document.clone());
        Ok(())
    }

    async fn merge_patch(&self, key: &ObjectKey, patch: &Value) -> Result<(), StoreError> {
        self.record(Call::Patch(key.clone()));
        if let Some((code, message)) = self.patch_rejections.lock().unwrap().get(key) {
            return Err(StoreError::Rejected {
                key: key.to_string(),
                code: *code,
                message: message.clone(),
            });
        }
        let mut objects = self.objects.lock().unwrap();
        let Some(document) = objects.get_mut(key) else {
            return Err(StoreError::Rejected {
                key: key.to_string(),
                code: 404,
                message: "not found".to_string(),
            });
        };
        merge(document, patch);
        Ok(())
    }

    async fn delete(&self, key: &ObjectKey) -> Result<(), StoreError> {
        self.record(Call::Delete(key.clone()));
        let removed = self.objects.lock().unwrap().remove(key);
        if let Some(document) = removed {
            let lag = self
                .deletion_lag
                .lock()
                .unwrap()
                .get(key)
                .copied()
                .unwrap_or(0);
            if lag > 0 {
                self.terminating
                    .lock()
                    .unwrap()
                    .insert(key.clone(), (document, lag));
            }
            // A rejection belonged to the old object
            self.patch_rejections.lock().unwrap().remove(key);
        }
        Ok(())
    }
}

/// JSON merge patch
fn merge(target: &mut Value, patch: &Value) {
    let Value::Object(patch) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = json!({});
    }
    if let Value::Object(fields) = target {
        for (name, value) in patch {
            if value.is_null() {
                fields.remove(name);
            } else {
                merge(fields.entry(name.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct FakeStatusWriter {
    writes: Mutex<Vec<(String, GitSyncStatus)>>,
}

impl FakeStatusWriter {
    pub fn writes(&self) -> Vec<(String, GitSyncStatus)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn last_commit(&self) -> Option<String> {
        self.writes()
            .last()
            .map(|(_, status)| status.current_commit.clone())
    }
}

#[async_trait]
impl StatusWriter for FakeStatusWriter {
    async fn write_status(
        &self,
        owner: &GitSync,
        status: &GitSyncStatus,
    ) -> Result<(), StoreError> {
        let name = owner.metadata.name.clone().unwrap_or_default();
        self.writes.lock().unwrap().push((name, status.clone()));
        Ok(())
    }
}
