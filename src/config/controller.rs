//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use crate::cache::CachePolicy;
use crate::constants::{
    DEFAULT_BACKOFF_MAX_SECS, DEFAULT_BACKOFF_MIN_SECS, DEFAULT_GIT_BINARY,
    DEFAULT_GIT_TIMEOUT_SECS, DEFAULT_LOG_LEVEL, DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
    DEFAULT_METRICS_PORT, DEFAULT_RECONCILE_INTERVAL_SECS, DEFAULT_RECREATE_POLL_INTERVAL_SECS,
    DEFAULT_RECREATE_TIMEOUT_SECS, DEFAULT_SNAPSHOT_MAX_AGE_SECS,
};
use crate::engine::{DriftPolicy, RecreatePolicy};
use std::time::Duration;

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Port for `/metrics`, `/healthz` and `/readyz`
    pub metrics_port: u16,
    /// Requeue interval after a successful pass (seconds)
    pub reconcile_interval_secs: u64,
    /// Fibonacci backoff floor (seconds)
    pub backoff_min_secs: u64,
    /// Fibonacci backoff ceiling (seconds)
    pub backoff_max_secs: u64,
    /// Poll interval while waiting for a deleted object to disappear (seconds)
    pub recreate_poll_interval_secs: u64,
    /// Total wait for a deleted object to disappear (seconds)
    pub recreate_timeout_secs: u64,
    /// Snapshot max age (seconds), 0 disables
    pub snapshot_max_age_secs: u64,
    /// Per git invocation timeout (seconds, `0` = unbounded)
    pub git_timeout_secs: u64,
    /// Git executable
    pub git_binary: String,
    /// What to do when an immutable field drifted and `forceUpdate` is off
    pub drift_policy: DriftPolicy,
    /// Limits how many resources can be reconciled simultaneously
    pub max_concurrent_reconciliations: u16,
    /// Global log level (error, warn, info, debug, trace)
    pub log_level: String,
    /// Restrict the controller to one namespace. `None` watches all namespaces.
    pub watch_namespace: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            metrics_port: DEFAULT_METRICS_PORT,
            reconcile_interval_secs: DEFAULT_RECONCILE_INTERVAL_SECS,
            backoff_min_secs: DEFAULT_BACKOFF_MIN_SECS,
            backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
            recreate_poll_interval_secs: DEFAULT_RECREATE_POLL_INTERVAL_SECS,
            recreate_timeout_secs: DEFAULT_RECREATE_TIMEOUT_SECS,
            snapshot_max_age_secs: DEFAULT_SNAPSHOT_MAX_AGE_SECS,
            git_timeout_secs: DEFAULT_GIT_TIMEOUT_SECS,
            git_binary: DEFAULT_GIT_BINARY.to_string(),
            drift_policy: DriftPolicy::Tolerate,
            max_concurrent_reconciliations: DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            watch_namespace: None,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// Unparseable values fall back to the default for that key.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            metrics_port: parsed_or(&lookup, "METRICS_PORT", defaults.metrics_port),
            reconcile_interval_secs: parsed_or(
                &lookup,
                "RECONCILE_INTERVAL_SECS",
                defaults.reconcile_interval_secs,
            ),
            backoff_min_secs: parsed_or(&lookup, "BACKOFF_MIN_SECS", defaults.backoff_min_secs),
            backoff_max_secs: parsed_or(&lookup, "BACKOFF_MAX_SECS", defaults.backoff_max_secs),
            recreate_poll_interval_secs: parsed_or(
                &lookup,
                "RECREATE_POLL_INTERVAL_SECS",
                defaults.recreate_poll_interval_secs,
            ),
            recreate_timeout_secs: parsed_or(
                &lookup,
                "RECREATE_TIMEOUT_SECS",
                defaults.recreate_timeout_secs,
            ),
            snapshot_max_age_secs: parsed_or(
                &lookup,
                "SNAPSHOT_MAX_AGE_SECS",
                defaults.snapshot_max_age_secs,
            ),
            git_timeout_secs: parsed_or(&lookup, "GIT_TIMEOUT_SECS", defaults.git_timeout_secs),
            git_binary: lookup("GIT_BINARY")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.git_binary),
            drift_policy: parsed_or(&lookup, "DRIFT_POLICY", defaults.drift_policy),
            max_concurrent_reconciliations: parsed_or(
                &lookup,
                "MAX_CONCURRENT_RECONCILIATIONS",
                defaults.max_concurrent_reconciliations,
            ),
            log_level: lookup("LOG_LEVEL").unwrap_or(defaults.log_level),
            watch_namespace: lookup("WATCH_NAMESPACE").filter(|ns| !ns.trim().is_empty()),
        }
    }

    #[must_use]
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }

    #[must_use]
    pub fn git_timeout(&self) -> Option<Duration> {
        (self.git_timeout_secs > 0).then(|| Duration::from_secs(self.git_timeout_secs))
    }

    /// Delete/poll/recreate bounds used by conflict recovery
    #[must_use]
    pub fn recreate_policy(&self) -> RecreatePolicy {
        RecreatePolicy {
            poll_interval: Duration::from_secs(self.recreate_poll_interval_secs),
            timeout: Duration::from_secs(self.recreate_timeout_secs),
        }
    }

    /// Snapshot refresh rule. A zero max age keeps the ref-only invalidation.
    #[must_use]
    pub fn cache_policy(&self) -> CachePolicy {
        CachePolicy {
            max_age: (self.snapshot_max_age_secs > 0)
                .then(|| Duration::from_secs(self.snapshot_max_age_secs)),
        }
    }
}

fn parsed_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_empty_environment_yields_defaults() {
        let config = ControllerConfig::from_lookup(|_| None);
        assert_eq!(config, ControllerConfig::default());
        assert_eq!(config.recreate_policy().poll_interval, Duration::from_secs(5));
        assert_eq!(config.recreate_policy().timeout, Duration::from_secs(60));
        assert_eq!(config.cache_policy().max_age, None);
        assert_eq!(config.git_timeout(), Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_zero_git_timeout_means_unbounded() {
        let config = ControllerConfig::from_lookup(lookup_from(&[("GIT_TIMEOUT_SECS", "0")]));
        assert_eq!(config.git_timeout(), None);
    }

    #[test]
    fn test_overrides_are_parsed() {
        let config = ControllerConfig::from_lookup(lookup_from(&[
            ("METRICS_PORT", "9090"),
            ("RECREATE_TIMEOUT_SECS", "30"),
            ("SNAPSHOT_MAX_AGE_SECS", "600"),
            ("DRIFT_POLICY", "Fail"),
            ("WATCH_NAMESPACE", "apps"),
            ("GIT_BINARY", "/usr/local/bin/git"),
        ]));
        assert_eq!(config.metrics_port, 9090);
        assert_eq!(config.recreate_policy().timeout, Duration::from_secs(30));
        assert_eq!(config.cache_policy().max_age, Some(Duration::from_secs(600)));
        assert_eq!(config.drift_policy, DriftPolicy::Fail);
        assert_eq!(config.watch_namespace.as_deref(), Some("apps"));
        assert_eq!(config.git_binary, "/usr/local/bin/git");
    }

    #[test]
    fn test_invalid_values_fall_back_to_defaults() {
        let config = ControllerConfig::from_lookup(lookup_from(&[
            ("METRICS_PORT", "not-a-port"),
            ("DRIFT_POLICY", "sometimes"),
            ("WATCH_NAMESPACE", "  "),
        ]));
        assert_eq!(config.metrics_port, DEFAULT_METRICS_PORT);
        assert_eq!(config.drift_policy, DriftPolicy::Tolerate);
        assert_eq!(config.watch_namespace, None);
    }
}
