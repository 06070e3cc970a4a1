//! # Prelude
//!
//! Re-exports commonly used types and traits.
//!
//! ```rust
//! use gitsync_controller::prelude::*;
//! ```

// CRD types
pub use crate::crd::{GitSync, GitSyncSpec, GitSyncStatus};

// Engine and its seams
pub use crate::engine::{DriftPolicy, Engine, PassReport, RecreatePolicy, ReconcilerError};
pub use crate::source::{SourceError, SourceFetcher, SourceKey, Snapshot};
pub use crate::store::{ObjectKey, ObjectStore, StatusWriter, StoreError};

pub use crate::config::ControllerConfig;
