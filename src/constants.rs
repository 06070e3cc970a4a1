//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Requeue interval after a successful pass (seconds)
pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 300;

/// Fibonacci backoff floor for failed passes (seconds)
pub const DEFAULT_BACKOFF_MIN_SECS: u64 = 5;

/// Fibonacci backoff ceiling for failed passes (seconds)
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 300;

/// How often a deleted object is polled for disappearance before it is recreated
pub const DEFAULT_RECREATE_POLL_INTERVAL_SECS: u64 = 5;

/// Upper bound on waiting for a deleted object to disappear
pub const DEFAULT_RECREATE_TIMEOUT_SECS: u64 = 60;

/// Snapshot max age in seconds. Zero disables age-based refresh.
pub const DEFAULT_SNAPSHOT_MAX_AGE_SECS: u64 = 0;

/// Upper bound for a single git invocation (seconds). Zero removes the bound.
pub const DEFAULT_GIT_TIMEOUT_SECS: u64 = 120;

/// Git executable used by the fetcher
pub const DEFAULT_GIT_BINARY: &str = "git";

/// Branch name that selects the repository's default branch (case-insensitive)
pub const PRIMARY_BRANCH_NAME: &str = "master";

/// Field manager / owner name used for API writes
pub const CONTROLLER_NAME: &str = "gitsync-controller";

/// Default tracing filter when neither `RUST_LOG` nor `LOG_LEVEL` is set
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default maximum number of `GitSync` resources reconciled at the same time
pub const DEFAULT_MAX_CONCURRENT_RECONCILIATIONS: u16 = 10;
