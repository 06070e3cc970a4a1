//! GitSync Controller Library
//!
//! Continuously applies the manifests committed to a git branch into the
//! namespace of the `GitSync` resource that declares them.
//!
//! ## Quick Start
//!
//! ```rust
//! use gitsync_controller::prelude::*;
//! ```
//!
//! The engine only talks to the outside world through [`source::SourceFetcher`],
//! [`store::ObjectStore`] and [`store::StatusWriter`]; the `runtime` module
//! wires the git and Kubernetes implementations into a kube-runtime controller.

pub mod cache;
pub mod config;
pub mod constants;
pub mod crd;
pub mod engine;
pub mod filter;
pub mod manifest;
pub mod observability;
pub mod prelude;
pub mod runtime;
pub mod server;
pub mod source;
pub mod store;
