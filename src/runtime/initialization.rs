//! # Initialization
//!
//! Process bootstrap: rustls provider, tracing, metrics, the HTTP server, the
//! Kubernetes client and the engine with its cluster adapters.

use super::owned_watch::OwnedKindWatches;
use super::Context;
use crate::config::ControllerConfig;
use crate::constants::CONTROLLER_NAME;
use crate::crd::GitSync;
use crate::engine::Engine;
use crate::observability;
use crate::server::{start_server, ServerState};
use crate::source::GitCliFetcher;
use crate::store::{KubeObjectStore, KubeStatusWriter};
use anyhow::{Context as _, Result};
use futures::channel::mpsc::UnboundedReceiver;
use kube::{api::Api, Client};
use kube_runtime::reflector::ObjectRef;
use std::sync::Arc;
use tracing::{error, info};

/// Everything the watch loop needs
pub struct InitializationResult {
    pub api: Api<GitSync>,
    pub context: Arc<Context>,
    pub owned_triggers: UnboundedReceiver<ObjectRef<GitSync>>,
    pub server_state: Arc<ServerState>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("server_ready", &self.server_state.ready())
            .finish_non_exhaustive()
    }
}

/// Set up tracing from `RUST_LOG`, falling back to `LOG_LEVEL` for this crate
pub fn init_tracing(config: &ControllerConfig) {
    let fallback = format!("gitsync_controller={}", config.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback.into()),
        )
        .init();
}

pub async fn initialize(config: ControllerConfig) -> Result<InitializationResult> {
    // Required for rustls 0.23+ when no provider is selected through features
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_existing| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    init_tracing(&config);

    info!("Starting {}", CONTROLLER_NAME);
    info!("Build info: git_hash={}", env!("BUILD_GIT_HASH"));
    info!(?config, "configuration loaded");

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let server_port = config.metrics_port;
    let server_state_clone = Arc::clone(&server_state);
    tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });

    let client = Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;

    let api: Api<GitSync> = match &config.watch_namespace {
        Some(namespace) => {
            info!(namespace = %namespace, "watching a single namespace");
            Api::namespaced(client.clone(), namespace)
        }
        None => Api::all(client.clone()),
    };

    let engine = Engine::new(
        Arc::new(GitCliFetcher::new(config.git_binary.clone(), config.git_timeout())),
        Arc::new(KubeObjectStore::new(client.clone())),
        Arc::new(KubeStatusWriter::new(client.clone())),
    )
    .with_cache_policy(config.cache_policy())
    .with_recreate_policy(config.recreate_policy())
    .with_drift_policy(config.drift_policy);

    let (owned, owned_triggers) = OwnedKindWatches::new(client, config.watch_namespace.clone());
    let context = Arc::new(Context::new(engine, owned, config));

    Ok(InitializationResult {
        api,
        context,
        owned_triggers,
        server_state,
    })
}
