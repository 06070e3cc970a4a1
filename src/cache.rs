//! # Snapshot Cache
//!
//! Holds at most one snapshot and the source key of the last successful pass.
//! A fetch happens when nothing is cached, when the requested key differs from
//! the last synced key, or when the optional max age has elapsed. A branch that
//! moved upstream under an unchanged key is not re-fetched otherwise.
//!
//! The lock is never held across the fetch, so concurrent passes for different
//! keys may both fetch; the last writer wins.

use crate::observability::metrics;
use crate::source::{Snapshot, SourceError, SourceFetcher, SourceKey};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CachePolicy {
    /// Force a re-fetch once the snapshot is older than this
    pub max_age: Option<Duration>,
}

#[derive(Debug)]
struct Entry {
    fetched_for: SourceKey,
    fetched_at: Instant,
    snapshot: Arc<Snapshot>,
}

#[derive(Debug, Default)]
struct State {
    entry: Option<Entry>,
    last_synced: Option<SourceKey>,
}

#[derive(Debug, Default)]
pub struct SnapshotCache {
    policy: CachePolicy,
    state: Mutex<State>,
}

impl SnapshotCache {
    #[must_use]
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            policy,
            state: Mutex::new(State::default()),
        }
    }

    /// Return the cached snapshot for `key`, fetching a new one when required
    pub async fn get(
        &self,
        fetcher: &dyn SourceFetcher,
        key: &SourceKey,
    ) -> Result<Arc<Snapshot>, SourceError> {
        if let Some(snapshot) = self.cached(key) {
            debug!(source = %key, commit = %snapshot.commit, "using cached snapshot");
            return Ok(snapshot);
        }

        info!(source = %key, "fetching repository snapshot");
        metrics::increment_snapshot_fetches();
        let snapshot = Arc::new(fetcher.fetch(key).await?);

        self.lock().entry = Some(Entry {
            fetched_for: key.clone(),
            fetched_at: Instant::now(),
            snapshot: Arc::clone(&snapshot),
        });
        Ok(snapshot)
    }

    /// Record that a pass for `key` completed. Later requests for the same key reuse the snapshot.
    pub fn mark_synced(&self, key: &SourceKey) {
        self.lock().last_synced = Some(key.clone());
    }

    /// Drop the snapshot so the next request fetches
    pub fn invalidate(&self) {
        let mut state = self.lock();
        state.entry = None;
        state.last_synced = None;
    }

    fn cached(&self, key: &SourceKey) -> Option<Arc<Snapshot>> {
        let state = self.lock();
        let entry = state.entry.as_ref()?;
        if state.last_synced.as_ref() != Some(key) || &entry.fetched_for != key {
            return None;
        }
        if let Some(max_age) = self.policy.max_age {
            if entry.fetched_at.elapsed() >= max_age {
                debug!(source = %key, "cached snapshot expired");
                return None;
            }
        }
        Some(Arc::clone(&entry.snapshot))
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // State is replaced wholesale, so a poisoned lock still holds a consistent value
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
