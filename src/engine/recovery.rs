//! # Conflict Recovery
//!
//! Applies a spec difference to a live object. A merge patch overwrites only
//! `spec`, nulling out keys the desired spec no longer has; when the API server refuses it because an immutable field changed,
//! the object is deleted, polled until gone and created again (only with
//! `forceUpdate`).

use super::ReconcilerError;
use crate::manifest::DesiredObject;
use crate::store::{LiveObject, ObjectKey, ObjectStore};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Bounds for waiting on a deleted object before recreating it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecreatePolicy {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for RecreatePolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            timeout: Duration::from_secs(60),
        }
    }
}

impl RecreatePolicy {
    /// Number of existence checks that fit in the timeout (at least one)
    #[must_use]
    pub fn max_polls(&self) -> u32 {
        if self.poll_interval.is_zero() {
            return 1;
        }
        let polls = self.timeout.as_nanos() / self.poll_interval.as_nanos();
        u32::try_from(polls).unwrap_or(u32::MAX).max(1)
    }
}

/// What happened to an object whose spec differed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffOutcome {
    Patched,
    Recreated,
    /// Immutable field changed and `forceUpdate` is off; the object was left alone
    DriftTolerated,
}

/// Merge patch that replaces the live `spec` with the desired one
///
/// A plain merge would keep keys that only the live object has, so those are
/// sent as `null` at every level of nesting.
#[must_use]
pub fn spec_patch(live: &Value, desired: &Value) -> Value {
    serde_json::json!({ "spec": overwrite(live, desired) })
}

fn overwrite(live: &Value, desired: &Value) -> Value {
    let (Value::Object(live), Value::Object(desired)) = (live, desired) else {
        return desired.clone();
    };
    let mut patch: Map<String, Value> = desired
        .iter()
        .map(|(name, value)| {
            let value = match live.get(name) {
                Some(current) => overwrite(current, value),
                None => value.clone(),
            };
            (name.clone(), value)
        })
        .collect();
    for name in live.keys().filter(|name| !desired.contains_key(*name)) {
        patch.insert(name.clone(), Value::Null);
    }
    Value::Object(patch)
}

/// Bring `live` to `desired` after a spec difference was detected
pub async fn reconcile_diff(
    store: &dyn ObjectStore,
    live: &LiveObject,
    desired: &DesiredObject,
    owner: &OwnerReference,
    force_update: bool,
    policy: &RecreatePolicy,
) -> Result<DiffOutcome, ReconcilerError> {
    debug!(object = %live.key, "spec differs, patching");
    match store
        .merge_patch(&live.key, &spec_patch(live.spec(), desired.spec()))
        .await {
        Ok(()) => Ok(DiffOutcome::Patched),
        Err(err) if err.is_immutable_field() && force_update => {
            info!(object = %live.key, "immutable field changed, recreating (forceUpdate)");
            recreate(store, &live.key, desired, owner, policy).await?;
            Ok(DiffOutcome::Recreated)
        }
        Err(err) if err.is_immutable_field() => {
            warn!(
                object = %live.key,
                error = %err,
                "immutable field changed and forceUpdate is disabled, leaving object as is"
            );
            Ok(DiffOutcome::DriftTolerated)
        }
        Err(err) => Err(err.into()),
    }
}

async fn recreate(
    store: &dyn ObjectStore,
    key: &ObjectKey,
    desired: &DesiredObject,
    owner: &OwnerReference,
    policy: &RecreatePolicy,
) -> Result<(), ReconcilerError> {
    store.delete(key).await?;
    wait_for_absence(store, key, policy).await?;

    let mut fresh = desired.clone();
    fresh.set_owner_reference(owner);
    store.create(&fresh).await?;
    info!(object = %key, "object recreated");
    Ok(())
}

async fn wait_for_absence(
    store: &dyn ObjectStore,
    key: &ObjectKey,
    policy: &RecreatePolicy,
) -> Result<(), ReconcilerError> {
    for attempt in 1..=policy.max_polls() {
        tokio::time::sleep(policy.poll_interval).await;
        if store.get(key).await?.is_none() {
            debug!(object = %key, attempt, "deleted object is gone");
            return Ok(());
        }
        debug!(object = %key, attempt, "waiting for deletion");
    }
    Err(ReconcilerError::RecreateTimeout {
        key: key.to_string(),
        timeout: policy.timeout,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::decode;
    use serde_json::json;

    #[test]
    fn test_default_policy_polls_twelve_times() {
        let policy = RecreatePolicy::default();
        assert_eq!(policy.poll_interval, Duration::from_secs(5));
        assert_eq!(policy.timeout, Duration::from_secs(60));
        assert_eq!(policy.max_polls(), 12);
    }

    #[test]
    fn test_degenerate_policies_poll_once() {
        let zero_interval = RecreatePolicy {
            poll_interval: Duration::ZERO,
            timeout: Duration::from_secs(60),
        };
        assert_eq!(zero_interval.max_polls(), 1);

        let short_timeout = RecreatePolicy {
            poll_interval: Duration::from_secs(5),
            timeout: Duration::from_secs(1),
        };
        assert_eq!(short_timeout.max_polls(), 1);
    }

    #[test]
    fn test_spec_patch_only_carries_spec() {
        let desired = decode(
            b"apiVersion: v1\nkind: Service\nmetadata:\n  name: web\n  labels: {a: b}\nspec:\n  type: ClusterIP\nstatus: {}\n",
        )
        .unwrap();
        assert_eq!(
            spec_patch(&Value::Null, desired.spec()),
            json!({ "spec": { "type": "ClusterIP" } })
        );
    }

    #[test]
    fn test_spec_patch_removes_live_only_keys() {
        let live = json!({
            "type": "ClusterIP",
            "sessionAffinity": "ClientIP",
            "selector": {"app": "web", "tier": "front"},
            "ports": [{"port": 80, "name": "http"}]
        });
        let desired = json!({
            "type": "ClusterIP",
            "selector": {"app": "web"},
            "ports": [{"port": 8080}]
        });

        assert_eq!(
            spec_patch(&live, &desired),
            json!({
                "spec": {
                    "type": "ClusterIP",
                    "sessionAffinity": null,
                    "selector": {"app": "web", "tier": null},
                    "ports": [{"port": 8080}]
                }
            })
        );
    }

    #[test]
    fn test_spec_patch_replaces_non_map_values() {
        let live = json!({"replicas": {"min": 1}});
        let desired = json!({"replicas": 3});
        assert_eq!(spec_patch(&live, &desired), json!({"spec": {"replicas": 3}}));
    }
}
