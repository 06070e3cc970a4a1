//! # Watch Loop
//!
//! Runs the kube-runtime `Controller` for `GitSync` resources.
//!
//! The primary stream is the `GitSync` watcher passed through the
//! [`ChangeFilter`], so status writes and metadata churn never start a pass.
//! Deleted resources are dropped from the filter and from the backoff states.
//! Owned object events arrive through `reconcile_on`, and successful passes
//! requeue themselves after the configured interval.

use super::error_policy::{handle_reconciliation_error, resource_key, BackoffStates};
use super::Context;
use crate::crd::GitSync;
use crate::engine::ReconcilerError;
use crate::filter::ChangeFilter;
use crate::observability::metrics;
use crate::server::ServerState;
use futures::channel::mpsc::UnboundedReceiver;
use futures::{future, StreamExt, TryStreamExt};
use kube::api::Api;
use kube::ResourceExt;
use kube_runtime::controller::{self, Action};
use kube_runtime::reflector::{self, ObjectRef};
use kube_runtime::{watcher, Controller, WatchStreamExt};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Run the controller until SIGINT/SIGTERM
pub async fn run_watch_loop(
    api: Api<GitSync>,
    ctx: Arc<Context>,
    owned_triggers: UnboundedReceiver<ObjectRef<GitSync>>,
    server_state: Arc<ServerState>,
) -> Result<(), anyhow::Error> {
    let (reader, writer) = reflector::store();
    let mut filter = ChangeFilter::new();
    let filter_ctx = Arc::clone(&ctx);
    let gitsyncs = watcher(api, watcher::Config::default())
        .default_backoff()
        .reflect(writer)
        .try_filter_map(move |event| {
            future::ready(Ok(admit_event(&mut filter, &filter_ctx.backoff, event)))
        });

    let config = controller::Config::default().concurrency(ctx.config.max_concurrent_reconciliations);

    info!("Starting controller watch loop...");
    server_state.set_ready(true);

    Controller::for_stream(gitsyncs, reader)
        .with_config(config)
        .reconcile_on(owned_triggers)
        .shutdown_on_signal()
        .run(reconcile, handle_reconciliation_error, ctx)
        .for_each(|result| {
            match result {
                Ok((obj, _)) => debug!(resource = %obj, "reconciled"),
                Err(e) => warn!(error = %e, "controller event failed"),
            }
            future::ready(())
        })
        .await;

    server_state.set_ready(false);
    info!("Controller stopped gracefully");
    Ok(())
}

/// Map a watch event to the object that should be reconciled, if any
///
/// Deletes drop the resource's filter memo and backoff state; owned objects
/// are garbage collected by the API server.
fn admit_event(
    filter: &mut ChangeFilter,
    backoff: &BackoffStates,
    event: watcher::Event<GitSync>,
) -> Option<GitSync> {
    match event {
        watcher::Event::Apply(obj) | watcher::Event::InitApply(obj) => {
            filter.admit(&obj).then_some(obj)
        }
        watcher::Event::Delete(obj) => {
            filter.forget(&obj);
            backoff.reset(&resource_key(&obj));
            None
        }
        watcher::Event::Init | watcher::Event::InitDone => None,
    }
}

/// Reconcile one `GitSync`: run a pass, watch the kinds it touched, requeue
async fn reconcile(obj: Arc<GitSync>, ctx: Arc<Context>) -> Result<Action, ReconcilerError> {
    let started = Instant::now();
    metrics::increment_reconciliations();

    let mut observed = BTreeSet::new();
    let result = ctx.engine.reconcile_observing(&obj, &mut observed).await;
    metrics::observe_reconciliation_duration(started.elapsed().as_secs_f64());
    // Objects created before an abort still need their kind watched
    ctx.owned.observe(&observed);
    let report = result?;

    ctx.backoff.reset(&resource_key(&obj));

    debug!(
        resource.name = %obj.name_any(),
        commit = %report.commit,
        writes = report.writes(),
        "pass succeeded, requeueing"
    );
    Ok(Action::requeue(ctx.config.reconcile_interval()))
}
