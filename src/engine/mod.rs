//! # Reconciliation Engine
//!
//! Drives every manifest of the current snapshot through the
//! create / no-op / patch / recreate decision for one `GitSync`.
//!
//! ## Pass
//!
//! 1. Get the snapshot for the declared repository and branch from the cache
//! 2. Decode every file, in path order, before touching the cluster
//! 3. Inject the `GitSync` namespace and look each object up
//! 4. Create missing objects (owned by the `GitSync`), skip equal specs,
//!    hand differing specs to [`recovery`]
//! 5. Write `status.currentCommit`, then mark the snapshot key as synced
//!
//! Any fatal error aborts the pass before the status write, so the commit only
//! advances when every object was reconciled.

pub mod recovery;

pub use recovery::{DiffOutcome, RecreatePolicy};

use crate::cache::{CachePolicy, SnapshotCache};
use crate::crd::{GitSync, GitSyncStatus};
use crate::manifest::{self, DesiredObject, KindId, ManifestError};
use crate::observability::metrics;
use crate::source::{Snapshot, SourceError, SourceFetcher};
use crate::store::{ObjectKey, ObjectStore, StatusWriter, StoreError};
use kube::{Resource, ResourceExt};
use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, info_span, Instrument};

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("GitSync {0} has no namespace")]
    MissingNamespace(String),
    #[error("GitSync {0} has no uid and cannot own objects")]
    MissingOwnerUid(String),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("manifest {path}: {source}")]
    Manifest {
        path: String,
        #[source]
        source: ManifestError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{key} still present {timeout:?} after deletion")]
    RecreateTimeout { key: String, timeout: Duration },
    #[error("{key} differs in an immutable field and forceUpdate is disabled")]
    ImmutableDrift { key: String },
}

/// Handling of immutable-field drift when `forceUpdate` is off
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DriftPolicy {
    /// Log and continue with the next manifest
    #[default]
    Tolerate,
    /// Abort the pass
    Fail,
}

impl FromStr for DriftPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tolerate" => Ok(Self::Tolerate),
            "fail" => Ok(Self::Fail),
            other => Err(format!("unknown drift policy {other:?}")),
        }
    }
}

/// Per-object decision taken during a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyAction {
    Created,
    Unchanged,
    Patched,
    Recreated,
    DriftTolerated,
}

impl ApplyAction {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplyAction::Created => "created",
            ApplyAction::Unchanged => "unchanged",
            ApplyAction::Patched => "patched",
            ApplyAction::Recreated => "recreated",
            ApplyAction::DriftTolerated => "drift",
        }
    }
}

impl From<DiffOutcome> for ApplyAction {
    fn from(outcome: DiffOutcome) -> Self {
        match outcome {
            DiffOutcome::Patched => Self::Patched,
            DiffOutcome::Recreated => Self::Recreated,
            DiffOutcome::DriftTolerated => Self::DriftTolerated,
        }
    }
}

/// Result of a successful pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Commit recorded in the status
    pub commit: String,
    pub created: usize,
    pub unchanged: usize,
    pub patched: usize,
    pub recreated: usize,
    pub drift_tolerated: usize,
    /// Kinds applied by this pass; the runtime watches them for the owner
    pub observed_kinds: BTreeSet<KindId>,
}

impl PassReport {
    fn new(commit: &str) -> Self {
        Self {
            commit: commit.to_string(),
            ..Self::default()
        }
    }

    fn record(&mut self, kind: &KindId, action: ApplyAction) {
        self.observed_kinds.insert(kind.clone());
        let counter = match action {
            ApplyAction::Created => &mut self.created,
            ApplyAction::Unchanged => &mut self.unchanged,
            ApplyAction::Patched => &mut self.patched,
            ApplyAction::Recreated => &mut self.recreated,
            ApplyAction::DriftTolerated => &mut self.drift_tolerated,
        };
        *counter += 1;
        metrics::increment_objects_applied(action.as_str());
    }

    /// Number of create/patch/recreate writes issued
    #[must_use]
    pub fn writes(&self) -> usize {
        self.created + self.patched + self.recreated
    }
}

/// Reconciliation engine for `GitSync` resources
///
/// Owns the snapshot cache; all cluster access goes through the injected
/// store and status writer.
pub struct Engine {
    fetcher: Arc<dyn SourceFetcher>,
    store: Arc<dyn ObjectStore>,
    status: Arc<dyn StatusWriter>,
    cache: SnapshotCache,
    recreate: RecreatePolicy,
    drift: DriftPolicy,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("cache", &self.cache)
            .field("recreate", &self.recreate)
            .field("drift", &self.drift)
            .finish_non_exhaustive()
    }
}

impl Engine {
    #[must_use]
    pub fn new(
        fetcher: Arc<dyn SourceFetcher>,
        store: Arc<dyn ObjectStore>,
        status: Arc<dyn StatusWriter>,
    ) -> Self {
        Self {
            fetcher,
            store,
            status,
            cache: SnapshotCache::default(),
            recreate: RecreatePolicy::default(),
            drift: DriftPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache = SnapshotCache::new(policy);
        self
    }

    #[must_use]
    pub fn with_recreate_policy(mut self, policy: RecreatePolicy) -> Self {
        self.recreate = policy;
        self
    }

    #[must_use]
    pub fn with_drift_policy(mut self, policy: DriftPolicy) -> Self {
        self.drift = policy;
        self
    }

    #[must_use]
    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    /// Run one pass for `owner` against its own namespace
    pub async fn reconcile(&self, owner: &GitSync) -> Result<PassReport, ReconcilerError> {
        self.reconcile_observing(owner, &mut BTreeSet::new()).await
    }

    /// Like [`Engine::reconcile`], also adding each kind to `observed` as soon
    /// as its object was applied
    ///
    /// `observed` keeps the kinds of a pass that aborts halfway, so objects
    /// created before the failure can still be watched.
    pub async fn reconcile_observing(
        &self,
        owner: &GitSync,
        observed: &mut BTreeSet<KindId>,
    ) -> Result<PassReport, ReconcilerError> {
        let name = owner.name_any();
        let namespace = owner
            .namespace()
            .ok_or_else(|| ReconcilerError::MissingNamespace(name.clone()))?;
        let span = info_span!(
            "gitsync.reconcile",
            resource.name = %name,
            resource.namespace = %namespace,
            repository = %owner.spec.repository
        );

        self.run_pass(owner, &namespace, observed)
            .instrument(span)
            .await
    }

    async fn run_pass(
        &self,
        owner: &GitSync,
        namespace: &str,
        observed: &mut BTreeSet<KindId>,
    ) -> Result<PassReport, ReconcilerError> {
        let owner_ref = owner
            .controller_owner_ref(&())
            .ok_or_else(|| ReconcilerError::MissingOwnerUid(owner.name_any()))?;
        let source_key = owner.spec.source_key();

        let snapshot = self.cache.get(self.fetcher.as_ref(), &source_key).await?;
        let desired = decode_all(&snapshot)?;
        let mut report = PassReport::new(&snapshot.commit);

        for mut object in desired {
            object.set_namespace(namespace);
            let key = ObjectKey::new(object.kind.clone(), &object.name, namespace);

            let action = match self.store.get(&key).await? {
                None => {
                    object.set_owner_reference(&owner_ref);
                    self.store.create(&object).await?;
                    observed.insert(object.kind.clone());
                    info!(object = %key, "created");
                    ApplyAction::Created
                }
                Some(live) if live.spec() == object.spec() => {
                    debug!(object = %key, "up to date");
                    ApplyAction::Unchanged
                }
                Some(live) => {
                    let outcome = recovery::reconcile_diff(
                        self.store.as_ref(),
                        &live,
                        &object,
                        &owner_ref,
                        owner.spec.force_update,
                        &self.recreate,
                    )
                    .await?;
                    if outcome == DiffOutcome::DriftTolerated && self.drift == DriftPolicy::Fail {
                        return Err(ReconcilerError::ImmutableDrift {
                            key: key.to_string(),
                        });
                    }
                    outcome.into()
                }
            };
            observed.insert(object.kind.clone());
            report.record(&object.kind, action);
        }

        let status = GitSyncStatus {
            current_commit: snapshot.commit.clone(),
        };
        self.status.write_status(owner, &status).await?;
        self.cache.mark_synced(&source_key);

        info!(
            commit = %report.commit,
            created = report.created,
            unchanged = report.unchanged,
            patched = report.patched,
            recreated = report.recreated,
            drift = report.drift_tolerated,
            "pass complete"
        );
        Ok(report)
    }
}

/// Decode every file in path order; the first failure aborts before any write
fn decode_all(snapshot: &Snapshot) -> Result<Vec<DesiredObject>, ReconcilerError> {
    snapshot
        .files()
        .map(|(path, bytes)| {
            manifest::decode(bytes).map_err(|source| ReconcilerError::Manifest {
                path: path.to_string(),
                source,
            })
        })
        .collect()
}
