//! # GitSync Controller
//!
//! Kubernetes controller that keeps a namespace in line with the manifests
//! committed to a git branch.
//!
//! For every `GitSync` resource it clones the declared repository and branch,
//! decodes each file as one manifest and creates, patches or (with
//! `forceUpdate`) recreates the matching objects in the resource's namespace.
//! The applied commit is recorded in `status.currentCommit`.
//!
//! Configuration comes from the environment, see
//! [`ControllerConfig`](gitsync_controller::config::ControllerConfig).

use anyhow::Result;
use gitsync_controller::config::ControllerConfig;
use gitsync_controller::runtime::{initialization, watch_loop};

#[tokio::main]
async fn main() -> Result<()> {
    let config = ControllerConfig::from_env();
    let init = initialization::initialize(config).await?;

    watch_loop::run_watch_loop(
        init.api,
        init.context,
        init.owned_triggers,
        init.server_state,
    )
    .await
}
