//! # CRD Generator
//!
//! Prints the `GitSync` CustomResourceDefinition as YAML.
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/gitsync.yaml
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use gitsync_controller::crd::GitSync;
use kube::core::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&GitSync::crd())?);
    Ok(())
}
