//! # Owned Kind Watches
//!
//! Objects created by a pass are owned by their `GitSync`. When one of them is
//! changed or deleted out of band, the owner has to be reconciled again. Kinds
//! are only known once a pass decoded them, so watchers are started lazily:
//! every kind reported in a [`PassReport`](crate::engine::PassReport) gets one
//! watcher for the lifetime of the process. Events are mapped back to the
//! controlling `GitSync` and sent to the controller through a channel.

use crate::crd::GitSync;
use crate::manifest::KindId;
use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::StreamExt;
use kube::api::{Api, ApiResource, DynamicObject};
use kube::{Client, Resource, ResourceExt};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{watcher, WatchStreamExt};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct OwnedKindWatches {
    client: Client,
    namespace: Option<String>,
    sender: UnboundedSender<ObjectRef<GitSync>>,
    watches: Mutex<HashMap<KindId, JoinHandle<()>>>,
}

impl std::fmt::Debug for OwnedKindWatches {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let watched = self.watches.lock().map(|w| w.len()).unwrap_or_default();
        f.debug_struct("OwnedKindWatches")
            .field("namespace", &self.namespace)
            .field("watched", &watched)
            .finish_non_exhaustive()
    }
}

impl OwnedKindWatches {
    /// Registry plus the trigger stream to hand to `Controller::reconcile_on`
    #[must_use]
    pub fn new(
        client: Client,
        namespace: Option<String>,
    ) -> (Self, UnboundedReceiver<ObjectRef<GitSync>>) {
        let (sender, receiver) = mpsc::unbounded();
        let registry = Self {
            client,
            namespace,
            sender,
            watches: Mutex::new(HashMap::new()),
        };
        (registry, receiver)
    }

    /// Start a watcher for every kind not watched yet
    pub fn observe(&self, kinds: &BTreeSet<KindId>) {
        let mut watches = self.watches.lock().unwrap_or_else(PoisonError::into_inner);
        for kind in kinds {
            if watches.contains_key(kind) {
                continue;
            }
            info!(kind = %kind, "watching owned objects");
            let handle = tokio::spawn(watch_kind(
                self.client.clone(),
                self.namespace.clone(),
                kind.clone(),
                self.sender.clone(),
            ));
            watches.insert(kind.clone(), handle);
        }
    }
}

impl Drop for OwnedKindWatches {
    fn drop(&mut self) {
        let watches = self.watches.get_mut().unwrap_or_else(PoisonError::into_inner);
        for (_, handle) in watches.drain() {
            handle.abort();
        }
    }
}

async fn watch_kind(
    client: Client,
    namespace: Option<String>,
    kind: KindId,
    sender: UnboundedSender<ObjectRef<GitSync>>,
) {
    let resource = ApiResource::from_gvk(&kind.to_gvk());
    let api: Api<DynamicObject> = match &namespace {
        Some(ns) => Api::namespaced_with(client, ns, &resource),
        None => Api::all_with(client, &resource),
    };

    let mut events = watcher(api, watcher::Config::default())
        .default_backoff()
        .touched_objects()
        .boxed();
    while let Some(event) = events.next().await {
        match event {
            Ok(obj) => {
                let Some(owner) = controlling_owner(&obj) else {
                    continue;
                };
                debug!(kind = %kind, object = %obj.name_any(), owner = %owner, "owned object changed");
                if sender.unbounded_send(owner).is_err() {
                    debug!(kind = %kind, "controller stopped, ending watch");
                    return;
                }
            }
            Err(e) => warn!(kind = %kind, error = %e, "owned object watch error"),
        }
    }
}

/// The `GitSync` controlling `obj`, if any
pub(crate) fn controlling_owner(obj: &DynamicObject) -> Option<ObjectRef<GitSync>> {
    let namespace = obj.namespace()?;
    let api_version = GitSync::api_version(&());
    let kind = GitSync::kind(&());
    obj.owner_references()
        .iter()
        .find(|r| r.controller == Some(true) && r.kind == kind && r.api_version == api_version)
        .map(|r| ObjectRef::new(&r.name).within(&namespace))
}
