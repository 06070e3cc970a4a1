//! # Observability
//!
//! Prometheus metrics for the controller. Logging goes through `tracing`
//! directly; the subscriber is set up in [`crate::runtime::initialization`].

pub mod metrics;
