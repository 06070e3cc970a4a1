//! # Custom Resource Definitions
//!
//! CRD types for the GitSync controller.
//!
//! ## Module Structure
//!
//! - `spec.rs` - `GitSync` specification (the declared sync request)
//! - `status.rs` - Status written after a successful pass

mod spec;
mod status;

pub use spec::{default_false, GitSync, GitSyncSpec};
pub use status::GitSyncStatus;
