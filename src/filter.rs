//! # Change Filter
//!
//! Decides whether an update to a `GitSync` warrants a reconcile pass. Only a
//! change of the declared spec counts; status writes (including the engine's
//! own `currentCommit` update) and metadata churn are dropped.

use crate::crd::{GitSync, GitSyncSpec};
use kube::ResourceExt;
use std::collections::HashMap;

/// True when the declared intent differs between the two versions
#[must_use]
pub fn should_reconcile(old: &GitSync, new: &GitSync) -> bool {
    old.spec != new.spec
}

/// Applies [`should_reconcile`] to a stream of applied objects
///
/// Remembers the last spec seen per `namespace/name`. The first sighting of an
/// object (a create, or the initial list after a restart) always passes.
#[derive(Debug, Default)]
pub struct ChangeFilter {
    seen: HashMap<String, GitSyncSpec>,
}

impl ChangeFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `obj` and return whether it should be reconciled
    pub fn admit(&mut self, obj: &GitSync) -> bool {
        let key = format!(
            "{}/{}",
            obj.namespace().unwrap_or_default(),
            obj.name_any()
        );
        let changed = self
            .seen
            .get(&key)
            .is_none_or(|previous| previous != &obj.spec);
        if changed {
            self.seen.insert(key, obj.spec.clone());
        }
        changed
    }

    /// Forget a deleted object so a recreation passes again
    pub fn forget(&mut self, obj: &GitSync) {
        let key = format!(
            "{}/{}",
            obj.namespace().unwrap_or_default(),
            obj.name_any()
        );
        self.seen.remove(&key);
    }
}
