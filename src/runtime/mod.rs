//! # Runtime
//!
//! Process wiring around the engine: initialization, the controller watch
//! loop, the error policy and the owned-kind watch registry.

pub mod backoff;
pub mod error_policy;
pub mod initialization;
pub mod owned_watch;
pub mod watch_loop;

use crate::config::ControllerConfig;
use crate::engine::Engine;
use error_policy::BackoffStates;
use owned_watch::OwnedKindWatches;

/// Shared state handed to every reconcile call
#[derive(Debug)]
pub struct Context {
    pub engine: Engine,
    pub owned: OwnedKindWatches,
    pub backoff: BackoffStates,
    pub config: ControllerConfig,
}

impl Context {
    #[must_use]
    pub fn new(engine: Engine, owned: OwnedKindWatches, config: ControllerConfig) -> Self {
        Self {
            engine,
            owned,
            backoff: BackoffStates::new(config.backoff_min_secs, config.backoff_max_secs),
            config,
        }
    }
}
