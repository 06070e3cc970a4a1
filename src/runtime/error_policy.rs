//! # Error Policy
//!
//! Requeue decisions for failed passes. Each `GitSync` keeps its own Fibonacci
//! backoff so a broken repository does not slow down retries of healthy ones.

use super::Context;
use crate::crd::GitSync;
use crate::engine::ReconcilerError;
use crate::observability::metrics;
use crate::runtime::backoff::FibonacciBackoff;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{error, info};

/// Per-resource backoff state, keyed by `namespace/name`
#[derive(Debug)]
pub struct BackoffStates {
    min_secs: u64,
    max_secs: u64,
    states: Mutex<HashMap<String, FibonacciBackoff>>,
}

impl BackoffStates {
    #[must_use]
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        Self {
            min_secs,
            max_secs,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Next retry delay for `key`
    pub fn next_delay(&self, key: &str) -> Duration {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        states
            .entry(key.to_string())
            .or_insert_with(|| FibonacciBackoff::new(self.min_secs, self.max_secs))
            .next_backoff()
    }

    /// Whether `key` has failures on record
    #[must_use]
    pub fn is_tracking(&self, key: &str) -> bool {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Forget the failures of `key` after a successful pass or its deletion
    pub fn reset(&self, key: &str) {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

pub(crate) fn resource_key(obj: &GitSync) -> String {
    format!("{}/{}", obj.namespace().unwrap_or_default(), obj.name_any())
}

/// Handle a failed pass: count it and requeue after the resource's next backoff delay
pub fn handle_reconciliation_error(
    obj: Arc<GitSync>,
    error: &ReconcilerError,
    ctx: Arc<Context>,
) -> Action {
    let key = resource_key(&obj);
    metrics::increment_reconciliation_errors();

    let delay = ctx.backoff.next_delay(&key);
    error!(
        resource.name = %obj.name_any(),
        resource.namespace = %obj.namespace().unwrap_or_default(),
        error = %error,
        "reconcile pass failed"
    );
    let next_attempt = chrono::Utc::now()
        + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::seconds(60));
    info!(
        resource = %key,
        retry_in_secs = delay.as_secs(),
        next_attempt = %next_attempt.to_rfc3339(),
        "retrying with Fibonacci backoff"
    );
    Action::requeue(delay)
}
